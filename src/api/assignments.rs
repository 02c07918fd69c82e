use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::api::groups::fetch_owned_group;
use crate::api::guards::{ensure_owner, CurrentStaff, CurrentStudent};
use crate::api::validation::{normalize_ids, validate_payload};
use crate::api::variants::fetch_owned_variant;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::types::UserRole;
use crate::repositories;
use crate::schemas::assignment::{
    AssignToGroup, AssignToStudent, AssignmentOverviewResponse, AssignmentResponse,
    DeactivateResponse, GroupAssignmentResponse, ListAssignmentsQuery,
};
use crate::services::distribution;
use crate::services::DomainError;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(assign_to_student))
        .route("/group", post(assign_to_group))
        .route("/my", get(my_assignments))
        .route("/variant/:variant_id", get(list_for_variant))
        .route("/:assignment_id/deactivate", post(deactivate_assignment))
}

/// Direct assignment always adds a new row; older assignments of the same pair stay.
async fn assign_to_student(
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
    Json(payload): Json<AssignToStudent>,
) -> Result<(StatusCode, Json<AssignmentResponse>), ApiError> {
    validate_payload(&payload)?;
    let variant = fetch_owned_variant(&state, &user, payload.variant_id.trim()).await?;

    let student = repositories::users::find_by_id(state.db(), payload.student_id.trim())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch student"))?
        .filter(|student| student.role == UserRole::Student && student.is_active)
        .ok_or_else(|| ApiError::NotFound("Student not found".to_string()))?;

    let assignment = repositories::assignments::create(
        state.db(),
        repositories::assignments::CreateAssignment {
            id: &Uuid::new_v4().to_string(),
            variant_id: &variant.id,
            student_id: &student.id,
            assigned_by: &user.id,
            deadline: payload.deadline,
            now: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create assignment"))?;

    metrics::counter!("assignments_created_total", "mode" => "student").increment(1);
    tracing::info!(
        assignment_id = %assignment.id,
        variant_id = %variant.id,
        student_id = %student.id,
        "Variant assigned to student"
    );

    Ok((StatusCode::CREATED, Json(AssignmentResponse::from_db(assignment))))
}

async fn assign_to_group(
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
    Json(payload): Json<AssignToGroup>,
) -> Result<(StatusCode, Json<GroupAssignmentResponse>), ApiError> {
    validate_payload(&payload)?;
    let group = fetch_owned_group(&state, &user, payload.group_id.trim()).await?;

    let variant_ids = normalize_ids(&payload.variant_ids);
    let variants = repositories::variants::find_many(state.db(), &variant_ids)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load variants"))?;
    if variants.len() != variant_ids.len() {
        return Err(DomainError::NotFound("Variant").into());
    }
    for variant in &variants {
        ensure_owner(&user, &variant.created_by)?;
    }

    let students = repositories::groups::list_students(state.db(), &group.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load group students"))?;
    let student_ids: Vec<String> = students.into_iter().map(|student| student.id).collect();
    let variant_ids: Vec<String> = variants.into_iter().map(|variant| variant.id).collect();
    let pairings =
        distribution::round_robin(&student_ids, &variant_ids, &mut rand::thread_rng())?;

    let now = primitive_now_utc();
    let mut tx = state
        .db()
        .begin()
        .await
        .map_err(|e| ApiError::internal(e, "Failed to start transaction"))?;

    let mut assignments = Vec::with_capacity(pairings.len());
    for pairing in &pairings {
        let assignment = repositories::assignments::create(
            &mut *tx,
            repositories::assignments::CreateAssignment {
                id: &Uuid::new_v4().to_string(),
                variant_id: &pairing.variant,
                student_id: &pairing.student,
                assigned_by: &user.id,
                deadline: payload.deadline,
                now,
            },
        )
        .await
        .map_err(|e| ApiError::internal(e, "Failed to create assignment"))?;
        assignments.push(AssignmentResponse::from_db(assignment));
    }

    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit transaction"))?;

    metrics::counter!("assignments_created_total", "mode" => "group")
        .increment(assignments.len() as u64);
    tracing::info!(
        group_id = %group.id,
        students = assignments.len(),
        variants = variant_ids.len(),
        "Variants distributed over group"
    );

    Ok((StatusCode::CREATED, Json(GroupAssignmentResponse { group_id: group.id, assignments })))
}

/// Deactivation keeps the assignment row and cascades to its execution.
async fn deactivate_assignment(
    Path(assignment_id): Path<String>,
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
) -> Result<Json<DeactivateResponse>, ApiError> {
    let assignment = repositories::assignments::find_by_id(state.db(), &assignment_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch assignment"))?
        .ok_or_else(|| ApiError::NotFound("Assignment not found".to_string()))?;
    fetch_owned_variant(&state, &user, &assignment.variant_id).await?;

    let mut tx = state
        .db()
        .begin()
        .await
        .map_err(|e| ApiError::internal(e, "Failed to start transaction"))?;

    repositories::assignments::deactivate(&mut *tx, &assignment.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to deactivate assignment"))?;
    let outcome =
        repositories::executions::cascade_deactivation(&mut tx, &assignment.id, primitive_now_utc())
            .await
            .map_err(|e| ApiError::internal(e, "Failed to update executions"))?;

    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit transaction"))?;

    metrics::counter!("assignments_deactivated_total").increment(1);
    tracing::info!(
        assignment_id = %assignment.id,
        cancelled = outcome.cancelled,
        hidden = outcome.deactivated,
        "Assignment deactivated"
    );

    Ok(Json(DeactivateResponse {
        assignment_id: assignment.id,
        cancelled_executions: outcome.cancelled,
        hidden_executions: outcome.deactivated,
    }))
}

async fn list_for_variant(
    Path(variant_id): Path<String>,
    Query(query): Query<ListAssignmentsQuery>,
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
) -> Result<Json<Vec<AssignmentOverviewResponse>>, ApiError> {
    let variant = fetch_owned_variant(&state, &user, &variant_id).await?;
    let rows =
        repositories::assignments::list_by_variant(state.db(), &variant.id, query.include_inactive)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to list assignments"))?;

    let now = primitive_now_utc();
    Ok(Json(rows.into_iter().map(|row| AssignmentOverviewResponse::from_row(row, now)).collect()))
}

async fn my_assignments(
    CurrentStudent(student): CurrentStudent,
    State(state): State<AppState>,
) -> Result<Json<Vec<AssignmentOverviewResponse>>, ApiError> {
    let rows = repositories::assignments::list_active_for_student(state.db(), &student.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list assignments"))?;

    let now = primitive_now_utc();
    Ok(Json(rows.into_iter().map(|row| AssignmentOverviewResponse::from_row(row, now)).collect()))
}

#[cfg(test)]
mod tests;
