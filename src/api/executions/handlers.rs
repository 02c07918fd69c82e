use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::Json;
use time::PrimitiveDateTime;
use uuid::Uuid;

use super::helpers::{self, Tx};
use crate::api::errors::ApiError;
use crate::api::guards::CurrentStudent;
use crate::api::validation::validate_payload;
use crate::core::state::AppState;
use crate::core::time::{format_primitive, primitive_now_utc};
use crate::db::models::{Execution, User, Variant};
use crate::db::types::ExecutionStatus;
use crate::repositories;
use crate::schemas::execution::{
    CompleteRequest, ExecutionResult, ExecutionSummary, ExecutionView, ListExecutionsQuery,
    Navigate, NavigationResponse, SaveAnswer, SaveAnswerResponse, StartByNumber,
};
use crate::services::execution_engine::{
    self, AssignmentCandidate, LatestExecution, NavigationOutcome, StartPlan,
};

pub(super) async fn start_execution(
    Path(variant_id): Path<String>,
    CurrentStudent(student): CurrentStudent,
    State(state): State<AppState>,
) -> Result<Json<ExecutionView>, ApiError> {
    let mut tx = begin(&state).await?;
    let (variant, tasks) = helpers::load_variant(&mut tx, &variant_id).await?;

    let execution = open_assigned_execution(&state, &mut tx, &student, &variant).await?;
    let now = primitive_now_utc();
    let execution = start_or_resume(&mut tx, execution, &variant, now).await?;

    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit transaction"))?;
    Ok(Json(helpers::build_view(&execution, &variant, &tasks, now)))
}

/// Students who only know a variant number can open it directly. An active assignment
/// of that variant takes precedence; otherwise a self-service execution without an
/// assignment is reused or created.
pub(super) async fn start_by_number(
    CurrentStudent(student): CurrentStudent,
    State(state): State<AppState>,
    Json(payload): Json<StartByNumber>,
) -> Result<Json<ExecutionView>, ApiError> {
    validate_payload(&payload)?;

    let variant = repositories::variants::find_by_number(state.db(), payload.number)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch variant"))?
        .ok_or_else(|| ApiError::NotFound("Variant not found".to_string()))?;

    let mut tx = begin(&state).await?;
    let (variant, tasks) = helpers::load_variant(&mut tx, &variant.id).await?;

    let assignment =
        repositories::assignments::find_newest_active(&mut *tx, &variant.id, &student.id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to fetch assignment"))?;

    let execution = match assignment {
        Some(_) => open_assigned_execution(&state, &mut tx, &student, &variant).await?,
        None => open_self_service_execution(&mut tx, &student, &variant).await?,
    };
    let now = primitive_now_utc();
    let execution = start_or_resume(&mut tx, execution, &variant, now).await?;

    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit transaction"))?;
    Ok(Json(helpers::build_view(&execution, &variant, &tasks, now)))
}

pub(super) async fn get_execution(
    Path(execution_id): Path<String>,
    CurrentStudent(student): CurrentStudent,
    State(state): State<AppState>,
) -> Result<Json<ExecutionView>, ApiError> {
    let mut tx = begin(&state).await?;
    let execution = helpers::lock_owned_execution(&mut tx, &student, &execution_id).await?;
    let (variant, tasks) = helpers::load_variant(&mut tx, &execution.variant_id).await?;

    let now = primitive_now_utc();
    let current = helpers::expire(&execution, &variant, now);
    let execution = helpers::sync_state(&mut tx, execution, &current, now).await?;

    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit transaction"))?;
    Ok(Json(helpers::build_view(&execution, &variant, &tasks, now)))
}

pub(super) async fn save_answer(
    Path(execution_id): Path<String>,
    CurrentStudent(student): CurrentStudent,
    State(state): State<AppState>,
    Json(payload): Json<SaveAnswer>,
) -> Result<Json<SaveAnswerResponse>, ApiError> {
    validate_payload(&payload)?;

    let mut tx = begin(&state).await?;
    let execution = helpers::lock_owned_execution(&mut tx, &student, &execution_id).await?;

    // Keyed per student and execution; charged after the ownership check.
    let settings = state.settings().variants();
    let rate_key = format!("rl:answers:{}:{}", student.id, execution.id);
    let allowed = state
        .redis()
        .rate_limit(&rate_key, settings.answer_save_limit, settings.answer_save_window_seconds)
        .await
        .unwrap_or(true);
    if !allowed {
        return Err(ApiError::TooManyRequests("Too many answer saves, slow down"));
    }

    let (variant, tasks) = helpers::load_variant(&mut tx, &execution.variant_id).await?;

    let task_id = payload.task_id.trim();
    if !tasks.iter().any(|task| task.task_id == task_id) {
        return Err(ApiError::BadRequest("Task does not belong to this variant".to_string()));
    }

    let now = primitive_now_utc();
    let mut current = helpers::expire(&execution, &variant, now);
    let outcome =
        current.save_answer(task_id, &payload.answer, payload.current_task_order, tasks.len());
    // A timeout found on the way is persisted even though the save is rejected.
    let execution = helpers::sync_state(&mut tx, execution, &current, now).await?;
    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit transaction"))?;
    outcome?;

    let answered_count =
        execution.answers.0.values().filter(|answer| !answer.trim().is_empty()).count();
    Ok(Json(SaveAnswerResponse {
        task_id: task_id.to_string(),
        current_task_order: execution.current_task_order,
        answered_count,
    }))
}

pub(super) async fn navigate(
    Path(execution_id): Path<String>,
    CurrentStudent(student): CurrentStudent,
    State(state): State<AppState>,
    Json(payload): Json<Navigate>,
) -> Result<Json<NavigationResponse>, ApiError> {
    let mut tx = begin(&state).await?;
    let execution = helpers::lock_owned_execution(&mut tx, &student, &execution_id).await?;
    let (variant, tasks) = helpers::load_variant(&mut tx, &execution.variant_id).await?;

    let now = primitive_now_utc();
    let mut current = helpers::expire(&execution, &variant, now);
    let outcome = current.advance(payload.direction.into(), tasks.len());
    let execution = helpers::sync_state(&mut tx, execution, &current, now).await?;
    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit transaction"))?;

    let boundary = match outcome? {
        NavigationOutcome::Moved(_) => None,
        NavigationOutcome::AtFirst => Some("first"),
        NavigationOutcome::AtLast => Some("last"),
    };
    Ok(Json(NavigationResponse { current_task_order: execution.current_task_order, boundary }))
}

pub(super) async fn complete_execution(
    Path(execution_id): Path<String>,
    CurrentStudent(student): CurrentStudent,
    State(state): State<AppState>,
    payload: Option<Json<CompleteRequest>>,
) -> Result<Json<ExecutionResult>, ApiError> {
    let Json(payload) = payload.unwrap_or_default();
    let mut tx = begin(&state).await?;
    let execution = helpers::lock_owned_execution(&mut tx, &student, &execution_id).await?;
    let (variant, tasks) = helpers::load_variant(&mut tx, &execution.variant_id).await?;

    let execution =
        finish(&mut tx, execution, &variant, &helpers::task_ids(&tasks), payload.answers).await?;

    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit transaction"))?;
    Ok(Json(helpers::build_result(&execution, &variant, &tasks)))
}

/// Viewing the result closes the attempt if it is still open.
pub(super) async fn execution_result(
    Path(execution_id): Path<String>,
    CurrentStudent(student): CurrentStudent,
    State(state): State<AppState>,
) -> Result<Json<ExecutionResult>, ApiError> {
    let mut tx = begin(&state).await?;
    let execution = helpers::lock_owned_execution(&mut tx, &student, &execution_id).await?;
    let (variant, tasks) = helpers::load_variant(&mut tx, &execution.variant_id).await?;

    let execution = finish(&mut tx, execution, &variant, &helpers::task_ids(&tasks), None).await?;

    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit transaction"))?;
    Ok(Json(helpers::build_result(&execution, &variant, &tasks)))
}

pub(super) async fn list_my_executions(
    Query(query): Query<ListExecutionsQuery>,
    CurrentStudent(student): CurrentStudent,
    State(state): State<AppState>,
) -> Result<Json<Vec<ExecutionSummary>>, ApiError> {
    let rows = repositories::executions::list_for_student(state.db(), &student.id, query.status)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list executions"))?;

    let now = primitive_now_utc();
    let summaries = rows
        .into_iter()
        .map(|row| {
            let answered_count =
                row.answers.0.values().filter(|answer| !answer.trim().is_empty()).count();
            ExecutionSummary {
                remaining_seconds: execution_engine::remaining_seconds(
                    row.time_limit_minutes,
                    row.started_at,
                    row.completed_at,
                    now,
                ),
                id: row.id,
                variant_id: row.variant_id,
                variant_name: row.variant_name,
                variant_number: row.variant_number,
                variant_kind: row.variant_kind,
                assignment_id: row.assignment_id,
                status: row.status,
                started_at: row.started_at.map(format_primitive),
                completed_at: row.completed_at.map(format_primitive),
                answered_count,
                total_tasks: row.task_count,
            }
        })
        .collect();

    Ok(Json(summaries))
}

async fn begin(state: &AppState) -> Result<Tx<'static>, ApiError> {
    state.db().begin().await.map_err(|e| ApiError::internal(e, "Failed to start transaction"))
}

/// Picks the execution a start request works on, creating one for the newest active
/// assignment when the re-entry rule allows a fresh attempt.
async fn open_assigned_execution(
    state: &AppState,
    tx: &mut Tx<'_>,
    student: &User,
    variant: &Variant,
) -> Result<Execution, ApiError> {
    let now = primitive_now_utc();
    let latest =
        repositories::executions::find_latest_active_for_update(&mut **tx, &variant.id, &student.id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to fetch execution"))?;
    let latest = match latest {
        Some(execution) => {
            let current = helpers::expire(&execution, variant, now);
            Some(helpers::sync_state(tx, execution, &current, now).await?)
        }
        None => None,
    };
    let newest =
        repositories::assignments::find_newest_active(&mut **tx, &variant.id, &student.id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to fetch assignment"))?;

    let plan = execution_engine::plan_start(
        latest.as_ref().map(|execution| LatestExecution {
            status: execution.status,
            completed_at: execution.completed_at,
        }),
        newest.as_ref().map(|assignment| AssignmentCandidate {
            assigned_at: assignment.assigned_at,
            has_execution: assignment.has_execution,
        }),
        now,
        state.settings().variants().new_attempt_window(),
    )?;

    match (plan, latest, newest) {
        (StartPlan::ResumeLatest, Some(execution), _) => Ok(execution),
        (StartPlan::StartNew, _, Some(assignment)) => {
            let created = repositories::executions::create(
                &mut **tx,
                repositories::executions::CreateExecution {
                    id: &Uuid::new_v4().to_string(),
                    variant_id: &variant.id,
                    student_id: &student.id,
                    assignment_id: Some(&assignment.id),
                    now,
                },
            )
            .await
            .map_err(|e| ApiError::internal(e, "Failed to create execution"))?;
            if created {
                tracing::info!(
                    assignment_id = %assignment.id,
                    variant_id = %variant.id,
                    student_id = %student.id,
                    "Execution created"
                );
            }

            repositories::executions::find_by_assignment_for_update(&mut **tx, &assignment.id)
                .await
                .map_err(|e| ApiError::internal(e, "Failed to fetch execution"))?
                .ok_or_else(|| ApiError::Internal("Execution vanished after insert".to_string()))
        }
        _ => Err(ApiError::Internal("Inconsistent start plan".to_string())),
    }
}

async fn open_self_service_execution(
    tx: &mut Tx<'_>,
    student: &User,
    variant: &Variant,
) -> Result<Execution, ApiError> {
    let existing = repositories::executions::find_open_unassigned_for_update(
        &mut **tx,
        &variant.id,
        &student.id,
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to fetch execution"))?;
    if let Some(execution) = existing {
        return Ok(execution);
    }

    let id = Uuid::new_v4().to_string();
    repositories::executions::create(
        &mut **tx,
        repositories::executions::CreateExecution {
            id: &id,
            variant_id: &variant.id,
            student_id: &student.id,
            assignment_id: None,
            now: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create execution"))?;
    tracing::info!(execution_id = %id, variant_id = %variant.id, "Self-service execution created");

    repositories::executions::find_by_id_for_update(&mut **tx, &id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch execution"))?
        .ok_or_else(|| ApiError::NotFound("Execution not found".to_string()))
}

/// Starts a `not_started` execution; a running one only gets its timeout checked.
async fn start_or_resume(
    tx: &mut Tx<'_>,
    execution: Execution,
    variant: &Variant,
    now: PrimitiveDateTime,
) -> Result<Execution, ApiError> {
    let mut current = helpers::expire(&execution, variant, now);
    if current.status == ExecutionStatus::NotStarted {
        current.start(now)?;
    }
    helpers::sync_state(tx, execution, &current, now).await
}

async fn finish(
    tx: &mut Tx<'_>,
    execution: Execution,
    variant: &Variant,
    task_ids: &[String],
    answers: Option<HashMap<String, String>>,
) -> Result<Execution, ApiError> {
    let now = primitive_now_utc();
    let mut current = helpers::expire(&execution, variant, now);
    current.complete(task_ids, answers.as_ref(), now);
    helpers::sync_state(tx, execution, &current, now).await
}
