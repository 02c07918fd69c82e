use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::Assignment;
use crate::db::types::{ExecutionStatus, VariantKind};

pub(crate) const COLUMNS: &str =
    "id, variant_id, student_id, assigned_by, assigned_at, deadline, is_active";

/// Assignment joined with the variant and the execution attached to it, if any.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct AssignmentOverviewRow {
    pub(crate) id: String,
    pub(crate) variant_id: String,
    pub(crate) variant_name: String,
    pub(crate) variant_number: i64,
    pub(crate) variant_kind: VariantKind,
    pub(crate) time_limit_minutes: Option<i32>,
    pub(crate) student_id: String,
    pub(crate) student_name: String,
    pub(crate) assigned_by: String,
    pub(crate) assigned_at: PrimitiveDateTime,
    pub(crate) deadline: Option<PrimitiveDateTime>,
    pub(crate) is_active: bool,
    pub(crate) execution_id: Option<String>,
    pub(crate) execution_status: Option<ExecutionStatus>,
    pub(crate) completed_at: Option<PrimitiveDateTime>,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct NewestAssignmentRow {
    pub(crate) id: String,
    pub(crate) assigned_at: PrimitiveDateTime,
    pub(crate) has_execution: bool,
}

const OVERVIEW_SELECT: &str = "\
    SELECT a.id, a.variant_id, v.name AS variant_name, v.number AS variant_number,
           v.kind AS variant_kind, v.time_limit_minutes, a.student_id,
           u.full_name AS student_name, a.assigned_by, a.assigned_at, a.deadline, a.is_active,
           e.id AS execution_id, e.status AS execution_status, e.completed_at
    FROM assignments a
    JOIN variants v ON v.id = a.variant_id
    JOIN users u ON u.id = a.student_id
    LEFT JOIN executions e ON e.assignment_id = a.id";

pub(crate) struct CreateAssignment<'a> {
    pub(crate) id: &'a str,
    pub(crate) variant_id: &'a str,
    pub(crate) student_id: &'a str,
    pub(crate) assigned_by: &'a str,
    pub(crate) deadline: Option<PrimitiveDateTime>,
    pub(crate) now: PrimitiveDateTime,
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateAssignment<'_>,
) -> Result<Assignment, sqlx::Error> {
    sqlx::query_as::<_, Assignment>(&format!(
        "INSERT INTO assignments (
            id, variant_id, student_id, assigned_by, assigned_at, deadline, is_active
         ) VALUES ($1,$2,$3,$4,$5,$6,TRUE)
         RETURNING {COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.variant_id)
    .bind(params.student_id)
    .bind(params.assigned_by)
    .bind(params.now)
    .bind(params.deadline)
    .fetch_one(executor)
    .await
}

pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<Assignment>, sqlx::Error> {
    sqlx::query_as::<_, Assignment>(&format!("SELECT {COLUMNS} FROM assignments WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

/// Flips `is_active` off. Returns false when the assignment was already inactive.
pub(crate) async fn deactivate(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<bool, sqlx::Error> {
    let result =
        sqlx::query("UPDATE assignments SET is_active = FALSE WHERE id = $1 AND is_active")
            .bind(id)
            .execute(executor)
            .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn find_newest_active(
    executor: impl sqlx::PgExecutor<'_>,
    variant_id: &str,
    student_id: &str,
) -> Result<Option<NewestAssignmentRow>, sqlx::Error> {
    sqlx::query_as::<_, NewestAssignmentRow>(
        "SELECT a.id, a.assigned_at,
                EXISTS(SELECT 1 FROM executions e WHERE e.assignment_id = a.id) AS has_execution
         FROM assignments a
         WHERE a.variant_id = $1 AND a.student_id = $2 AND a.is_active
         ORDER BY a.assigned_at DESC, a.id DESC
         LIMIT 1",
    )
    .bind(variant_id)
    .bind(student_id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn list_by_variant(
    pool: &PgPool,
    variant_id: &str,
    include_inactive: bool,
) -> Result<Vec<AssignmentOverviewRow>, sqlx::Error> {
    sqlx::query_as::<_, AssignmentOverviewRow>(&format!(
        "{OVERVIEW_SELECT}
         WHERE a.variant_id = $1 AND ($2 OR a.is_active)
         ORDER BY a.assigned_at DESC, a.id DESC"
    ))
    .bind(variant_id)
    .bind(include_inactive)
    .fetch_all(pool)
    .await
}

pub(crate) async fn list_active_for_student(
    pool: &PgPool,
    student_id: &str,
) -> Result<Vec<AssignmentOverviewRow>, sqlx::Error> {
    sqlx::query_as::<_, AssignmentOverviewRow>(&format!(
        "{OVERVIEW_SELECT}
         WHERE a.student_id = $1 AND a.is_active
         ORDER BY a.assigned_at DESC, a.id DESC"
    ))
    .bind(student_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn count_for_control_work(
    executor: impl sqlx::PgExecutor<'_>,
    control_work_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM assignments a
         JOIN variants v ON v.id = a.variant_id
         WHERE v.control_work_id = $1",
    )
    .bind(control_work_id)
    .fetch_one(executor)
    .await
}
