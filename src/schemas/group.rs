use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::StudentGroup;
use crate::repositories::groups::GroupSummaryRow;
use crate::schemas::user::UserResponse;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct GroupCreate {
    #[validate(length(min = 1, max = 200, message = "name must not be empty"))]
    pub(crate) name: String,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct GroupMembersAdd {
    #[serde(alias = "studentIds")]
    #[validate(length(min = 1, message = "student_ids must not be empty"))]
    pub(crate) student_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct GroupResponse {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) created_by: String,
    pub(crate) created_at: String,
    pub(crate) member_count: i64,
}

impl GroupResponse {
    pub(crate) fn from_summary(row: GroupSummaryRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            created_by: row.created_by,
            created_at: format_primitive(row.created_at),
            member_count: row.member_count,
        }
    }

    pub(crate) fn from_db(group: StudentGroup, member_count: i64) -> Self {
        Self {
            id: group.id,
            name: group.name,
            created_by: group.created_by,
            created_at: format_primitive(group.created_at),
            member_count,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct GroupDetailResponse {
    #[serde(flatten)]
    pub(crate) group: GroupResponse,
    pub(crate) members: Vec<UserResponse>,
}

#[derive(Debug, Serialize)]
pub(crate) struct GroupMembersAddResponse {
    pub(crate) added: usize,
    pub(crate) skipped: Vec<String>,
}
