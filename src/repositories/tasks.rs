use sqlx::{PgPool, Postgres, QueryBuilder};
use time::PrimitiveDateTime;

use crate::db::models::Task;
use crate::db::types::DifficultyLevel;

pub(crate) const COLUMNS: &str =
    "id, text, task_type, subtype, difficulty, correct_answer, import_id, created_by, created_at";

pub(crate) struct CreateTask<'a> {
    pub(crate) id: &'a str,
    pub(crate) text: &'a str,
    pub(crate) task_type: &'a str,
    pub(crate) subtype: Option<&'a str>,
    pub(crate) difficulty: DifficultyLevel,
    pub(crate) correct_answer: &'a str,
    pub(crate) import_id: Option<&'a str>,
    pub(crate) created_by: &'a str,
    pub(crate) now: PrimitiveDateTime,
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateTask<'_>,
) -> Result<Task, sqlx::Error> {
    sqlx::query_as::<_, Task>(&format!(
        "INSERT INTO tasks (
            id, text, task_type, subtype, difficulty, correct_answer, import_id, created_by,
            created_at
         ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)
         RETURNING {COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.text)
    .bind(params.task_type)
    .bind(params.subtype)
    .bind(params.difficulty)
    .bind(params.correct_answer)
    .bind(params.import_id)
    .bind(params.created_by)
    .bind(params.now)
    .fetch_one(executor)
    .await
}

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Task>, sqlx::Error> {
    sqlx::query_as::<_, Task>(&format!("SELECT {COLUMNS} FROM tasks WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) struct UpdateTask<'a> {
    pub(crate) text: Option<&'a str>,
    pub(crate) subtype: Option<&'a str>,
    pub(crate) difficulty: Option<DifficultyLevel>,
    pub(crate) correct_answer: Option<&'a str>,
}

/// Overwrites the given fields; `None` keeps the stored value.
pub(crate) async fn update(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    params: UpdateTask<'_>,
) -> Result<Option<Task>, sqlx::Error> {
    sqlx::query_as::<_, Task>(&format!(
        "UPDATE tasks SET
            text = COALESCE($2, text),
            subtype = COALESCE($3, subtype),
            difficulty = COALESCE($4, difficulty),
            correct_answer = COALESCE($5, correct_answer)
         WHERE id = $1
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(params.text)
    .bind(params.subtype)
    .bind(params.difficulty)
    .bind(params.correct_answer)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn delete(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM tasks WHERE id = $1").bind(id).execute(executor).await?;
    Ok(result.rows_affected() > 0)
}

/// Deletes every task of one import batch. `owner` restricts to one creator.
pub(crate) async fn delete_import(
    executor: impl sqlx::PgExecutor<'_>,
    import_id: &str,
    owner: Option<&str>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "DELETE FROM tasks WHERE import_id = $1 AND ($2::text IS NULL OR created_by = $2)",
    )
    .bind(import_id)
    .bind(owner)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

#[derive(Debug, Default, Clone)]
pub(crate) struct TaskFilter {
    pub(crate) task_type: Option<String>,
    pub(crate) subtype: Option<String>,
    pub(crate) difficulty: Option<DifficultyLevel>,
    pub(crate) search: Option<String>,
    pub(crate) ids: Option<Vec<String>>,
}

fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &TaskFilter) {
    if let Some(task_type) = filter.task_type.as_ref() {
        builder.push(" AND task_type = ");
        builder.push_bind(task_type.clone());
    }
    if let Some(subtype) = filter.subtype.as_ref() {
        builder.push(" AND subtype = ");
        builder.push_bind(subtype.clone());
    }
    if let Some(difficulty) = filter.difficulty {
        builder.push(" AND difficulty = ");
        builder.push_bind(difficulty);
    }
    if let Some(search) = filter.search.as_ref() {
        builder.push(" AND text ILIKE ");
        builder.push_bind(format!("%{}%", search.trim()));
    }
    if let Some(ids) = filter.ids.as_ref() {
        builder.push(" AND id = ANY(");
        builder.push_bind(ids.clone());
        builder.push(")");
    }
}

pub(crate) async fn count(pool: &PgPool, filter: &TaskFilter) -> Result<i64, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM tasks WHERE TRUE");
    push_filter(&mut builder, filter);
    builder.build_query_scalar::<i64>().fetch_one(pool).await
}

pub(crate) async fn list(
    pool: &PgPool,
    filter: &TaskFilter,
    skip: i64,
    limit: i64,
) -> Result<Vec<Task>, sqlx::Error> {
    let mut builder =
        QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM tasks WHERE TRUE"));
    push_filter(&mut builder, filter);
    builder.push(" ORDER BY created_at, id OFFSET ");
    builder.push_bind(skip.max(0));
    builder.push(" LIMIT ");
    builder.push_bind(limit.clamp(1, 1000));
    builder.build_query_as::<Task>().fetch_all(pool).await
}

/// Task ids matching `filter` in catalog order. This order is the pool order fed to
/// the variant builder.
pub(crate) async fn list_ids(
    executor: impl sqlx::PgExecutor<'_>,
    filter: &TaskFilter,
    max: i64,
) -> Result<Vec<String>, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new("SELECT id FROM tasks WHERE TRUE");
    push_filter(&mut builder, filter);
    builder.push(" ORDER BY created_at, id LIMIT ");
    builder.push_bind(max);
    builder.build_query_scalar::<String>().fetch_all(executor).await
}

/// Ids from `ids` that exist in the catalog.
pub(crate) async fn existing_ids(
    executor: impl sqlx::PgExecutor<'_>,
    ids: &[String],
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>("SELECT id FROM tasks WHERE id = ANY($1)")
        .bind(ids)
        .fetch_all(executor)
        .await
}
