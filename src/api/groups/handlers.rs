use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::api::guards::{ensure_owner, owner_scope, CurrentStaff};
use crate::api::validation::{normalize_ids, validate_payload};
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::{StudentGroup, User};
use crate::repositories;
use crate::schemas::group::{
    GroupCreate, GroupDetailResponse, GroupMembersAdd, GroupMembersAddResponse, GroupResponse,
};
use crate::schemas::user::UserResponse;

pub(super) async fn create_group(
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
    Json(payload): Json<GroupCreate>,
) -> Result<(StatusCode, Json<GroupResponse>), ApiError> {
    validate_payload(&payload)?;
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Group name must not be empty".to_string()));
    }

    let group = repositories::groups::create(
        state.db(),
        &Uuid::new_v4().to_string(),
        name,
        &user.id,
        primitive_now_utc(),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create group"))?;

    Ok((StatusCode::CREATED, Json(GroupResponse::from_db(group, 0))))
}

pub(super) async fn list_groups(
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
) -> Result<Json<Vec<GroupResponse>>, ApiError> {
    let rows = repositories::groups::list(state.db(), owner_scope(&user))
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list groups"))?;

    Ok(Json(rows.into_iter().map(GroupResponse::from_summary).collect()))
}

pub(super) async fn get_group(
    Path(group_id): Path<String>,
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
) -> Result<Json<GroupDetailResponse>, ApiError> {
    let group = fetch_owned_group(&state, &user, &group_id).await?;
    let members = repositories::groups::list_students(state.db(), &group.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load group members"))?;

    let member_count = i64::try_from(members.len()).unwrap_or(i64::MAX);
    Ok(Json(GroupDetailResponse {
        group: GroupResponse::from_db(group, member_count),
        members: members.into_iter().map(UserResponse::from_db).collect(),
    }))
}

pub(super) async fn update_group(
    Path(group_id): Path<String>,
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
    Json(payload): Json<GroupCreate>,
) -> Result<Json<GroupResponse>, ApiError> {
    validate_payload(&payload)?;
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Group name must not be empty".to_string()));
    }

    let group = fetch_owned_group(&state, &user, &group_id).await?;
    let renamed = repositories::groups::rename(state.db(), &group.id, name)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to rename group"))?
        .ok_or_else(|| ApiError::NotFound("Group not found".to_string()))?;
    let member_count = repositories::groups::list_students(state.db(), &renamed.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load group members"))?
        .len();

    Ok(Json(GroupResponse::from_db(renamed, i64::try_from(member_count).unwrap_or(i64::MAX))))
}

pub(super) async fn delete_group(
    Path(group_id): Path<String>,
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let group = fetch_owned_group(&state, &user, &group_id).await?;
    repositories::groups::delete(state.db(), &group.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to delete group"))?;

    tracing::info!(group_id = %group.id, deleted_by = %user.id, "Group deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn add_members(
    Path(group_id): Path<String>,
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
    Json(payload): Json<GroupMembersAdd>,
) -> Result<Json<GroupMembersAddResponse>, ApiError> {
    validate_payload(&payload)?;
    let group = fetch_owned_group(&state, &user, &group_id).await?;

    let requested = normalize_ids(&payload.student_ids);
    let students = repositories::users::list_students_by_ids(state.db(), &requested)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load students"))?;

    let now = primitive_now_utc();
    let mut tx = state
        .db()
        .begin()
        .await
        .map_err(|e| ApiError::internal(e, "Failed to start transaction"))?;

    let mut added = 0;
    let mut skipped = Vec::new();
    for student_id in requested {
        let known = students.iter().any(|student| student.id == student_id);
        if !known {
            skipped.push(student_id);
            continue;
        }
        let inserted = repositories::groups::add_member(&mut *tx, &group.id, &student_id, now)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to add group member"))?;
        if inserted {
            added += 1;
        } else {
            skipped.push(student_id);
        }
    }

    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit transaction"))?;

    tracing::info!(group_id = %group.id, added, skipped = skipped.len(), "Group members added");
    Ok(Json(GroupMembersAddResponse { added, skipped }))
}

pub(super) async fn remove_member(
    Path((group_id, student_id)): Path<(String, String)>,
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let group = fetch_owned_group(&state, &user, &group_id).await?;
    let removed = repositories::groups::remove_member(state.db(), &group.id, &student_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to remove group member"))?;

    if !removed {
        return Err(ApiError::NotFound("Student is not a member of this group".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn fetch_owned_group(
    state: &AppState,
    user: &User,
    group_id: &str,
) -> Result<StudentGroup, ApiError> {
    let group = repositories::groups::find_by_id(state.db(), group_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch group"))?
        .ok_or_else(|| ApiError::NotFound("Group not found".to_string()))?;
    ensure_owner(user, &group.created_by)?;
    Ok(group)
}
