use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentStaff;
use crate::api::validation::validate_payload;
use crate::core::security;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::User;
use crate::db::types::UserRole;
use crate::repositories;
use crate::schemas::user::{UserCreate, UserResponse, UserUpdate};

#[derive(Debug, Deserialize)]
pub(crate) struct UserListQuery {
    #[serde(default)]
    skip: i64,
    #[serde(default = "crate::api::pagination::default_limit")]
    limit: i64,
    #[serde(default)]
    role: Option<UserRole>,
    #[serde(default)]
    #[serde(alias = "isActive")]
    is_active: Option<bool>,
    #[serde(default)]
    search: Option<String>,
}

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/:user_id", get(get_user).patch(update_user))
}

async fn list_users(
    Query(params): Query<UserListQuery>,
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    // Teachers only see the students they created.
    let (role, created_by) = match user.role {
        UserRole::Admin => (params.role, None),
        _ => (Some(UserRole::Student), Some(user.id.clone())),
    };

    let users = repositories::users::list(
        state.db(),
        repositories::users::ListUsersParams {
            role,
            created_by,
            is_active: params.is_active,
            search: params.search.filter(|value| !value.trim().is_empty()),
            skip: params.skip,
            limit: params.limit,
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to list users"))?;

    Ok(Json(users.into_iter().map(UserResponse::from_db).collect()))
}

async fn get_user(
    Path(user_id): Path<String>,
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
) -> Result<Json<UserResponse>, ApiError> {
    let target = fetch_managed_user(&state, &user, &user_id).await?;
    Ok(Json(UserResponse::from_db(target)))
}

async fn create_user(
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
    Json(payload): Json<UserCreate>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    validate_payload(&payload)?;

    if user.role != UserRole::Admin && payload.role != UserRole::Student {
        return Err(ApiError::Forbidden("Teachers can only create students"));
    }

    let username = payload.username.trim();
    let exists = repositories::users::exists_by_username(state.db(), username)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to check existing user"))?;
    if exists {
        return Err(ApiError::Conflict("User with this username already exists".to_string()));
    }

    let hashed_password = security::hash_password(&payload.password)
        .map_err(|e| ApiError::internal(e, "Failed to hash password"))?;

    let created = repositories::users::create(
        state.db(),
        repositories::users::CreateUser {
            id: &Uuid::new_v4().to_string(),
            username,
            hashed_password,
            full_name: payload.full_name.trim(),
            role: payload.role,
            is_active: true,
            created_by: Some(&user.id),
            now: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create user"))?;

    tracing::info!(
        user_id = %created.id,
        role = ?created.role,
        created_by = %user.id,
        "User created"
    );

    Ok((StatusCode::CREATED, Json(UserResponse::from_db(created))))
}

async fn update_user(
    Path(user_id): Path<String>,
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
    Json(payload): Json<UserUpdate>,
) -> Result<Json<UserResponse>, ApiError> {
    validate_payload(&payload)?;
    let target = fetch_managed_user(&state, &user, &user_id).await?;

    if target.id == user.id && payload.is_active == Some(false) {
        return Err(ApiError::BadRequest("You cannot deactivate yourself".to_string()));
    }

    let hashed_password = match payload.password.as_deref() {
        Some(password) => Some(
            security::hash_password(password)
                .map_err(|e| ApiError::internal(e, "Failed to hash password"))?,
        ),
        None => None,
    };

    let updated = repositories::users::update(
        state.db(),
        &target.id,
        repositories::users::UpdateUser {
            full_name: payload.full_name.map(|name| name.trim().to_string()),
            role: None,
            is_active: payload.is_active,
            hashed_password,
            updated_at: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to update user"))?
    .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(Json(UserResponse::from_db(updated)))
}

/// Admins manage everyone; teachers only the students they created.
async fn fetch_managed_user(
    state: &AppState,
    user: &User,
    user_id: &str,
) -> Result<User, ApiError> {
    let target = repositories::users::find_by_id(state.db(), user_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch user"))?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    let managed = user.role == UserRole::Admin
        || (target.role == UserRole::Student && target.created_by.as_deref() == Some(&user.id));
    if !managed {
        return Err(ApiError::NotFound("User not found".to_string()));
    }

    Ok(target)
}

#[cfg(test)]
mod tests;
