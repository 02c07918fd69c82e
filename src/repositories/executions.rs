use std::collections::HashMap;

use sqlx::types::Json;
use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::Execution;
use crate::db::types::{ExecutionStatus, VariantKind};

pub(crate) const COLUMNS: &str = "\
    id, variant_id, student_id, assignment_id, status, is_active, started_at, completed_at, \
    answers, current_task_order, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ExecutionOverviewRow {
    pub(crate) id: String,
    pub(crate) variant_id: String,
    pub(crate) variant_name: String,
    pub(crate) variant_number: i64,
    pub(crate) variant_kind: VariantKind,
    pub(crate) time_limit_minutes: Option<i32>,
    pub(crate) assignment_id: Option<String>,
    pub(crate) status: ExecutionStatus,
    pub(crate) is_active: bool,
    pub(crate) started_at: Option<PrimitiveDateTime>,
    pub(crate) completed_at: Option<PrimitiveDateTime>,
    pub(crate) answers: Json<HashMap<String, String>>,
    pub(crate) task_count: i64,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct OrphanExecutionRow {
    pub(crate) id: String,
    pub(crate) variant_id: String,
    pub(crate) student_id: String,
}

pub(crate) struct CreateExecution<'a> {
    pub(crate) id: &'a str,
    pub(crate) variant_id: &'a str,
    pub(crate) student_id: &'a str,
    pub(crate) assignment_id: Option<&'a str>,
    pub(crate) now: PrimitiveDateTime,
}

/// Inserts a `not_started` execution. Returns false when the assignment already owns one.
pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateExecution<'_>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO executions (
            id, variant_id, student_id, assignment_id, status, is_active, answers,
            current_task_order, created_at, updated_at
         ) VALUES ($1,$2,$3,$4,$5,TRUE,'{}'::jsonb,0,$6,$6)
         ON CONFLICT (assignment_id) DO NOTHING",
    )
    .bind(params.id)
    .bind(params.variant_id)
    .bind(params.student_id)
    .bind(params.assignment_id)
    .bind(ExecutionStatus::NotStarted)
    .bind(params.now)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<Execution>, sqlx::Error> {
    sqlx::query_as::<_, Execution>(&format!("SELECT {COLUMNS} FROM executions WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

/// Row-locks the execution for the rest of the transaction.
pub(crate) async fn find_by_id_for_update(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<Execution>, sqlx::Error> {
    sqlx::query_as::<_, Execution>(&format!(
        "SELECT {COLUMNS} FROM executions WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn find_by_assignment_for_update(
    executor: impl sqlx::PgExecutor<'_>,
    assignment_id: &str,
) -> Result<Option<Execution>, sqlx::Error> {
    sqlx::query_as::<_, Execution>(&format!(
        "SELECT {COLUMNS} FROM executions WHERE assignment_id = $1 FOR UPDATE"
    ))
    .bind(assignment_id)
    .fetch_optional(executor)
    .await
}

/// Most recently created active execution of a variant by a student.
pub(crate) async fn find_latest_active_for_update(
    executor: impl sqlx::PgExecutor<'_>,
    variant_id: &str,
    student_id: &str,
) -> Result<Option<Execution>, sqlx::Error> {
    sqlx::query_as::<_, Execution>(&format!(
        "SELECT {COLUMNS} FROM executions
         WHERE variant_id = $1 AND student_id = $2 AND is_active
         ORDER BY created_at DESC, id DESC
         LIMIT 1
         FOR UPDATE"
    ))
    .bind(variant_id)
    .bind(student_id)
    .fetch_optional(executor)
    .await
}

/// The student's unfinished self-service execution (no assignment) of a variant.
pub(crate) async fn find_open_unassigned_for_update(
    executor: impl sqlx::PgExecutor<'_>,
    variant_id: &str,
    student_id: &str,
) -> Result<Option<Execution>, sqlx::Error> {
    sqlx::query_as::<_, Execution>(&format!(
        "SELECT {COLUMNS} FROM executions
         WHERE variant_id = $1 AND student_id = $2 AND assignment_id IS NULL
           AND is_active AND status IN ($3, $4)
         ORDER BY created_at DESC, id DESC
         LIMIT 1
         FOR UPDATE"
    ))
    .bind(variant_id)
    .bind(student_id)
    .bind(ExecutionStatus::NotStarted)
    .bind(ExecutionStatus::InProgress)
    .fetch_optional(executor)
    .await
}

pub(crate) struct SaveExecutionState<'a> {
    pub(crate) status: ExecutionStatus,
    pub(crate) started_at: Option<PrimitiveDateTime>,
    pub(crate) completed_at: Option<PrimitiveDateTime>,
    pub(crate) answers: &'a HashMap<String, String>,
    pub(crate) current_task_order: i32,
    pub(crate) now: PrimitiveDateTime,
}

pub(crate) async fn save_state(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    state: SaveExecutionState<'_>,
) -> Result<Execution, sqlx::Error> {
    sqlx::query_as::<_, Execution>(&format!(
        "UPDATE executions SET
            status = $1,
            started_at = $2,
            completed_at = $3,
            answers = $4,
            current_task_order = $5,
            updated_at = $6
         WHERE id = $7
         RETURNING {COLUMNS}"
    ))
    .bind(state.status)
    .bind(state.started_at)
    .bind(state.completed_at)
    .bind(Json(state.answers))
    .bind(state.current_task_order)
    .bind(state.now)
    .bind(id)
    .fetch_one(executor)
    .await
}

pub(crate) async fn list_by_variant(
    executor: impl sqlx::PgExecutor<'_>,
    variant_id: &str,
) -> Result<Vec<Execution>, sqlx::Error> {
    sqlx::query_as::<_, Execution>(&format!(
        "SELECT {COLUMNS} FROM executions WHERE variant_id = $1"
    ))
    .bind(variant_id)
    .fetch_all(executor)
    .await
}

pub(crate) async fn list_for_student(
    pool: &PgPool,
    student_id: &str,
    status: Option<ExecutionStatus>,
) -> Result<Vec<ExecutionOverviewRow>, sqlx::Error> {
    sqlx::query_as::<_, ExecutionOverviewRow>(
        "SELECT e.id, e.variant_id, v.name AS variant_name, v.number AS variant_number,
                v.kind AS variant_kind, v.time_limit_minutes, e.assignment_id, e.status,
                e.is_active, e.started_at, e.completed_at, e.answers,
                (SELECT COUNT(*) FROM variant_tasks vt WHERE vt.variant_id = v.id) AS task_count
         FROM executions e
         JOIN variants v ON v.id = e.variant_id
         WHERE e.student_id = $1 AND e.is_active AND ($2::executionstatus IS NULL OR e.status = $2)
         ORDER BY e.started_at DESC NULLS LAST, e.created_at DESC, e.id DESC",
    )
    .bind(student_id)
    .bind(status)
    .fetch_all(pool)
    .await
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CascadeOutcome {
    pub(crate) cancelled: u64,
    pub(crate) deactivated: u64,
}

/// Applies assignment deactivation to its execution: unfinished ones are cancelled,
/// finished ones are hidden but kept.
pub(crate) async fn cascade_deactivation(
    executor: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    assignment_id: &str,
    now: PrimitiveDateTime,
) -> Result<CascadeOutcome, sqlx::Error> {
    let cancelled = sqlx::query(
        "UPDATE executions
         SET status = $1, is_active = FALSE, updated_at = $2
         WHERE assignment_id = $3 AND status IN ($4, $5)",
    )
    .bind(ExecutionStatus::Cancelled)
    .bind(now)
    .bind(assignment_id)
    .bind(ExecutionStatus::NotStarted)
    .bind(ExecutionStatus::InProgress)
    .execute(&mut **executor)
    .await?
    .rows_affected();

    let deactivated = sqlx::query(
        "UPDATE executions
         SET is_active = FALSE, updated_at = $1
         WHERE assignment_id = $2 AND is_active AND status IN ($3, $4)",
    )
    .bind(now)
    .bind(assignment_id)
    .bind(ExecutionStatus::Completed)
    .bind(ExecutionStatus::Timeout)
    .execute(&mut **executor)
    .await?
    .rows_affected();

    Ok(CascadeOutcome { cancelled, deactivated })
}

/// Hides executions still marked active although their assignment is not.
pub(crate) async fn deactivate_for_inactive_assignments(
    pool: &PgPool,
    now: PrimitiveDateTime,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE executions e
         SET is_active = FALSE, updated_at = $1
         FROM assignments a
         WHERE e.assignment_id = a.id AND NOT a.is_active AND e.is_active",
    )
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Active executions without an assignment whose (variant, student) pair has an active
/// assignment that owns no execution yet.
pub(crate) async fn list_orphans(
    pool: &PgPool,
    limit: i64,
) -> Result<Vec<OrphanExecutionRow>, sqlx::Error> {
    sqlx::query_as::<_, OrphanExecutionRow>(
        "SELECT e.id, e.variant_id, e.student_id FROM executions e
         WHERE e.assignment_id IS NULL AND e.is_active
           AND EXISTS (
               SELECT 1 FROM assignments a
               WHERE a.variant_id = e.variant_id AND a.student_id = e.student_id
                 AND a.is_active
                 AND NOT EXISTS (SELECT 1 FROM executions x WHERE x.assignment_id = a.id)
           )
         ORDER BY e.created_at, e.id
         LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Attaches an orphan execution to an assignment that has none yet.
pub(crate) async fn link_to_assignment(
    executor: impl sqlx::PgExecutor<'_>,
    execution_id: &str,
    assignment_id: &str,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE executions
         SET assignment_id = $1, updated_at = $2
         WHERE id = $3 AND assignment_id IS NULL
           AND NOT EXISTS (SELECT 1 FROM executions other WHERE other.assignment_id = $1)",
    )
    .bind(assignment_id)
    .bind(now)
    .bind(execution_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}
