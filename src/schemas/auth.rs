use serde::Serialize;

use crate::schemas::user::UserResponse;

/// Bearer token issued by `/auth/login`. `expires_in` is in seconds.
#[derive(Debug, Serialize)]
pub(crate) struct TokenResponse {
    pub(crate) access_token: String,
    pub(crate) token_type: &'static str,
    pub(crate) expires_in: u64,
    pub(crate) user: UserResponse,
}
