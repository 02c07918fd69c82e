use sqlx::types::Json;
use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::ControlWork;

const COLUMNS: &str = "\
    id, title, description, variants_count, tasks_per_variant, time_limit_minutes, task_pool, \
    created_by, created_at, updated_at";

pub(crate) struct CreateControlWork<'a> {
    pub(crate) id: &'a str,
    pub(crate) title: &'a str,
    pub(crate) description: Option<&'a str>,
    pub(crate) variants_count: i32,
    pub(crate) tasks_per_variant: i32,
    pub(crate) time_limit_minutes: Option<i32>,
    pub(crate) task_pool: &'a [String],
    pub(crate) created_by: &'a str,
    pub(crate) now: PrimitiveDateTime,
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateControlWork<'_>,
) -> Result<ControlWork, sqlx::Error> {
    sqlx::query_as::<_, ControlWork>(&format!(
        "INSERT INTO control_works (
            id, title, description, variants_count, tasks_per_variant, time_limit_minutes,
            task_pool, created_by, created_at, updated_at
         ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$9)
         RETURNING {COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.title)
    .bind(params.description)
    .bind(params.variants_count)
    .bind(params.tasks_per_variant)
    .bind(params.time_limit_minutes)
    .bind(Json(params.task_pool))
    .bind(params.created_by)
    .bind(params.now)
    .fetch_one(executor)
    .await
}

pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<ControlWork>, sqlx::Error> {
    sqlx::query_as::<_, ControlWork>(&format!("SELECT {COLUMNS} FROM control_works WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

/// Locks the control work so concurrent regenerations serialize.
pub(crate) async fn find_by_id_for_update(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<ControlWork>, sqlx::Error> {
    sqlx::query_as::<_, ControlWork>(&format!(
        "SELECT {COLUMNS} FROM control_works WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn list(
    pool: &PgPool,
    owner: Option<&str>,
) -> Result<Vec<ControlWork>, sqlx::Error> {
    sqlx::query_as::<_, ControlWork>(&format!(
        "SELECT {COLUMNS} FROM control_works
         WHERE ($1::text IS NULL OR created_by = $1)
         ORDER BY created_at DESC, id"
    ))
    .bind(owner)
    .fetch_all(pool)
    .await
}

pub(crate) async fn touch(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE control_works SET updated_at = $1 WHERE id = $2")
        .bind(now)
        .bind(id)
        .execute(executor)
        .await?;
    Ok(())
}

pub(crate) async fn delete(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<bool, sqlx::Error> {
    let result =
        sqlx::query("DELETE FROM control_works WHERE id = $1").bind(id).execute(executor).await?;
    Ok(result.rows_affected() > 0)
}
