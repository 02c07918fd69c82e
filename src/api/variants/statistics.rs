use axum::extract::{Path, Query, State};
use axum::Json;

use crate::api::errors::ApiError;
use crate::api::groups::fetch_owned_group;
use crate::api::guards::CurrentStaff;
use crate::api::variants::fetch_owned_variant;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::{Execution, User};
use crate::repositories;
use crate::schemas::variant::{StatisticsQuery, VariantStatisticsResponse};
use crate::services::execution_engine::ExecutionState;
use crate::services::scoring::{self, AnswerKey, ExecutionRecord, StudentRef, VariantProfile};

/// Per-student progress on one variant. With `group_id` the rows cover every student of
/// the group, otherwise everyone who was assigned or attempted the variant.
pub(super) async fn variant_statistics(
    Path(variant_id): Path<String>,
    Query(query): Query<StatisticsQuery>,
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
) -> Result<Json<VariantStatisticsResponse>, ApiError> {
    let variant = fetch_owned_variant(&state, &user, &variant_id).await?;

    let tasks = repositories::variants::list_tasks(state.db(), &variant.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load variant tasks"))?;
    let keys: Vec<AnswerKey> = tasks.iter().map(AnswerKey::from).collect();

    let executions: Vec<Execution> =
        repositories::executions::list_by_variant(state.db(), &variant.id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to load executions"))?
            .into_iter()
            .filter(|execution| execution.is_active)
            .collect();

    let students = load_students(&state, &user, &variant.id, &executions, query.group_id).await?;

    let now = primitive_now_utc();
    let records: Vec<ExecutionRecord> = executions
        .iter()
        .map(|execution| {
            // Expired attempts read as timed out even before their next access persists it.
            let mut current = ExecutionState::from(execution);
            current.expire_if_due(variant.time_limit_minutes, now);
            ExecutionRecord {
                id: execution.id.clone(),
                student_id: execution.student_id.clone(),
                status: current.status,
                started_at: current.started_at,
                completed_at: current.completed_at,
                answers: current.answers,
                current_task_order: current.current_task_order,
                created_at: execution.created_at,
            }
        })
        .collect();

    let rows = scoring::build_statistics(
        VariantProfile { kind: variant.kind, time_limit_minutes: variant.time_limit_minutes },
        &keys,
        &students,
        &records,
        now,
    );

    Ok(Json(VariantStatisticsResponse {
        variant_id: variant.id,
        variant_name: variant.name,
        kind: variant.kind,
        time_limit_minutes: variant.time_limit_minutes,
        total_tasks: keys.len(),
        rows,
    }))
}

async fn load_students(
    state: &AppState,
    user: &User,
    variant_id: &str,
    executions: &[Execution],
    group_id: Option<String>,
) -> Result<Vec<StudentRef>, ApiError> {
    let students = match group_id.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
        Some(group_id) => {
            let group = fetch_owned_group(state, user, group_id).await?;
            repositories::groups::list_students(state.db(), &group.id)
                .await
                .map_err(|e| ApiError::internal(e, "Failed to load group students"))?
        }
        None => {
            let assignments = repositories::assignments::list_by_variant(state.db(), variant_id, false)
                .await
                .map_err(|e| ApiError::internal(e, "Failed to load assignments"))?;
            let mut ids: Vec<String> =
                assignments.into_iter().map(|assignment| assignment.student_id).collect();
            ids.extend(executions.iter().map(|execution| execution.student_id.clone()));
            ids.sort();
            ids.dedup();
            repositories::users::list_students_by_ids(state.db(), &ids)
                .await
                .map_err(|e| ApiError::internal(e, "Failed to load students"))?
        }
    };

    Ok(students
        .into_iter()
        .map(|student| StudentRef { id: student.id, full_name: student.full_name })
        .collect())
}
