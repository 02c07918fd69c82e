use time::PrimitiveDateTime;

use crate::api::errors::ApiError;
use crate::core::time::format_primitive;
use crate::db::models::{Execution, User, Variant, VariantTaskDetail};
use crate::db::types::ExecutionStatus;
use crate::repositories;
use crate::schemas::execution::{ExecutionResult, ExecutionTaskView, ExecutionView, ResultTaskView};
use crate::services::execution_engine::ExecutionState;
use crate::services::scoring::{self, AnswerKey};

pub(super) type Tx<'a> = sqlx::Transaction<'a, sqlx::Postgres>;

/// Locks the caller's execution. Other students' and hidden executions read as missing.
pub(super) async fn lock_owned_execution(
    tx: &mut Tx<'_>,
    student: &User,
    execution_id: &str,
) -> Result<Execution, ApiError> {
    repositories::executions::find_by_id_for_update(&mut **tx, execution_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch execution"))?
        .filter(|execution| execution.student_id == student.id && execution.is_active)
        .ok_or_else(|| ApiError::NotFound("Execution not found".to_string()))
}

pub(super) async fn load_variant(
    tx: &mut Tx<'_>,
    variant_id: &str,
) -> Result<(Variant, Vec<VariantTaskDetail>), ApiError> {
    let variant = repositories::variants::find_by_id(&mut **tx, variant_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch variant"))?
        .ok_or_else(|| ApiError::NotFound("Variant not found".to_string()))?;
    let tasks = repositories::variants::list_tasks(&mut **tx, variant_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load variant tasks"))?;
    Ok((variant, tasks))
}

/// Applies the lazy timeout and persists the state when anything changed.
pub(super) async fn sync_state(
    tx: &mut Tx<'_>,
    execution: Execution,
    state: &ExecutionState,
    now: PrimitiveDateTime,
) -> Result<Execution, ApiError> {
    if ExecutionState::from(&execution) == *state {
        return Ok(execution);
    }

    let finished = !execution.status.is_terminal() && state.status.is_terminal();
    let saved = repositories::executions::save_state(
        &mut **tx,
        &execution.id,
        repositories::executions::SaveExecutionState {
            status: state.status,
            started_at: state.started_at,
            completed_at: state.completed_at,
            answers: &state.answers,
            current_task_order: state.current_task_order,
            now,
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to save execution"))?;

    if finished {
        record_finish(&saved);
    }
    Ok(saved)
}

fn record_finish(execution: &Execution) {
    metrics::counter!("executions_completed_total", "status" => execution.status.as_str())
        .increment(1);
    tracing::info!(
        execution_id = %execution.id,
        variant_id = %execution.variant_id,
        student_id = %execution.student_id,
        status = %execution.status,
        "Execution finished"
    );
}

pub(super) fn expire(
    execution: &Execution,
    variant: &Variant,
    now: PrimitiveDateTime,
) -> ExecutionState {
    let mut state = ExecutionState::from(execution);
    state.expire_if_due(variant.time_limit_minutes, now);
    state
}

pub(super) fn task_ids(tasks: &[VariantTaskDetail]) -> Vec<String> {
    tasks.iter().map(|task| task.task_id.clone()).collect()
}

pub(super) fn build_view(
    execution: &Execution,
    variant: &Variant,
    tasks: &[VariantTaskDetail],
    now: PrimitiveDateTime,
) -> ExecutionView {
    let answers = &execution.answers.0;
    ExecutionView {
        id: execution.id.clone(),
        variant_id: variant.id.clone(),
        variant_name: variant.name.clone(),
        variant_kind: variant.kind,
        assignment_id: execution.assignment_id.clone(),
        status: execution.status,
        started_at: execution.started_at.map(format_primitive),
        completed_at: execution.completed_at.map(format_primitive),
        time_limit_minutes: variant.time_limit_minutes,
        remaining_seconds: ExecutionState::from(execution)
            .remaining_seconds(variant.time_limit_minutes, now),
        current_task_order: execution.current_task_order,
        total_tasks: tasks.len(),
        tasks: tasks
            .iter()
            .map(|task| ExecutionTaskView {
                order: task.order,
                task_id: task.task_id.clone(),
                text: task.text.clone(),
                answer: answers.get(&task.task_id).cloned().unwrap_or_default(),
            })
            .collect(),
    }
}

pub(super) fn build_result(
    execution: &Execution,
    variant: &Variant,
    tasks: &[VariantTaskDetail],
) -> ExecutionResult {
    let answers = &execution.answers.0;
    let keys: Vec<AnswerKey> = tasks.iter().map(AnswerKey::from).collect();
    let score = scoring::summarize(&keys, answers, execution.completed_at);
    let finished =
        matches!(execution.status, ExecutionStatus::Completed | ExecutionStatus::Timeout);

    ExecutionResult {
        execution_id: execution.id.clone(),
        variant_id: variant.id.clone(),
        variant_name: variant.name.clone(),
        status: execution.status,
        started_at: execution.started_at.map(format_primitive),
        completed_at: execution.completed_at.map(format_primitive),
        score,
        elapsed: if finished {
            scoring::elapsed_breakdown(execution.started_at, execution.completed_at)
        } else {
            None
        },
        tasks: tasks
            .iter()
            .map(|task| {
                let answer = answers.get(&task.task_id).cloned().unwrap_or_default();
                ResultTaskView {
                    order: task.order,
                    task_id: task.task_id.clone(),
                    status: scoring::task_status(Some(&answer), &task.correct_answer),
                    text: task.text.clone(),
                    answer,
                    correct_answer: task.correct_answer.clone(),
                }
            })
            .collect(),
    }
}
