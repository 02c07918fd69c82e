use sqlx::{PgPool, Postgres, QueryBuilder};
use time::PrimitiveDateTime;

use crate::db::models::{Variant, VariantTaskDetail};
use crate::db::types::VariantKind;

pub(crate) const COLUMNS: &str = "\
    id, number, name, task_type, kind, time_limit_minutes, control_work_id, created_by, created_at";

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct VariantSummaryRow {
    pub(crate) id: String,
    pub(crate) number: i64,
    pub(crate) name: String,
    pub(crate) task_type: Option<String>,
    pub(crate) kind: VariantKind,
    pub(crate) time_limit_minutes: Option<i32>,
    pub(crate) control_work_id: Option<String>,
    pub(crate) created_by: String,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) task_count: i64,
    pub(crate) active_assignment_count: i64,
    pub(crate) total_count: i64,
}

pub(crate) struct CreateVariant<'a> {
    pub(crate) id: &'a str,
    pub(crate) name: &'a str,
    pub(crate) task_type: Option<&'a str>,
    pub(crate) kind: VariantKind,
    pub(crate) time_limit_minutes: Option<i32>,
    pub(crate) control_work_id: Option<&'a str>,
    pub(crate) created_by: &'a str,
    pub(crate) now: PrimitiveDateTime,
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateVariant<'_>,
) -> Result<Variant, sqlx::Error> {
    sqlx::query_as::<_, Variant>(&format!(
        "INSERT INTO variants (
            id, name, task_type, kind, time_limit_minutes, control_work_id, created_by, created_at
         ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8)
         RETURNING {COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.name)
    .bind(params.task_type)
    .bind(params.kind)
    .bind(params.time_limit_minutes)
    .bind(params.control_work_id)
    .bind(params.created_by)
    .bind(params.now)
    .fetch_one(executor)
    .await
}

/// Links tasks to a variant with `order` starting at 1.
pub(crate) async fn insert_tasks(
    executor: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    variant_id: &str,
    task_ids: &[String],
) -> Result<(), sqlx::Error> {
    for (index, task_id) in task_ids.iter().enumerate() {
        sqlx::query(
            "INSERT INTO variant_tasks (variant_id, task_id, task_order)
             VALUES ($1,$2,$3)",
        )
        .bind(variant_id)
        .bind(task_id)
        .bind(index as i32 + 1)
        .execute(&mut **executor)
        .await?;
    }

    Ok(())
}

pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<Variant>, sqlx::Error> {
    sqlx::query_as::<_, Variant>(&format!("SELECT {COLUMNS} FROM variants WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub(crate) async fn find_by_number(
    pool: &PgPool,
    number: i64,
) -> Result<Option<Variant>, sqlx::Error> {
    sqlx::query_as::<_, Variant>(&format!("SELECT {COLUMNS} FROM variants WHERE number = $1"))
        .bind(number)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn find_many(
    executor: impl sqlx::PgExecutor<'_>,
    ids: &[String],
) -> Result<Vec<Variant>, sqlx::Error> {
    sqlx::query_as::<_, Variant>(&format!(
        "SELECT {COLUMNS} FROM variants WHERE id = ANY($1) ORDER BY number"
    ))
    .bind(ids)
    .fetch_all(executor)
    .await
}

pub(crate) async fn list_tasks(
    executor: impl sqlx::PgExecutor<'_>,
    variant_id: &str,
) -> Result<Vec<VariantTaskDetail>, sqlx::Error> {
    sqlx::query_as::<_, VariantTaskDetail>(
        "SELECT vt.variant_id, vt.task_id, vt.task_order, t.text, t.task_type, t.subtype,
                t.difficulty, t.correct_answer
         FROM variant_tasks vt
         JOIN tasks t ON t.id = vt.task_id
         WHERE vt.variant_id = $1
         ORDER BY vt.task_order",
    )
    .bind(variant_id)
    .fetch_all(executor)
    .await
}

pub(crate) struct ListVariantsParams {
    pub(crate) created_by: Option<String>,
    pub(crate) kind: Option<VariantKind>,
    pub(crate) control_work_id: Option<String>,
    pub(crate) skip: i64,
    pub(crate) limit: i64,
}

pub(crate) async fn list(
    pool: &PgPool,
    params: ListVariantsParams,
) -> Result<Vec<VariantSummaryRow>, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(
        "SELECT v.id, v.number, v.name, v.task_type, v.kind, v.time_limit_minutes,
                v.control_work_id, v.created_by, v.created_at,
                (SELECT COUNT(*) FROM variant_tasks vt WHERE vt.variant_id = v.id) AS task_count,
                (SELECT COUNT(*) FROM assignments a
                  WHERE a.variant_id = v.id AND a.is_active) AS active_assignment_count,
                COUNT(*) OVER() AS total_count
         FROM variants v
         WHERE TRUE",
    );

    if let Some(created_by) = params.created_by {
        builder.push(" AND v.created_by = ");
        builder.push_bind(created_by);
    }
    if let Some(kind) = params.kind {
        builder.push(" AND v.kind = ");
        builder.push_bind(kind);
    }
    if let Some(control_work_id) = params.control_work_id {
        builder.push(" AND v.control_work_id = ");
        builder.push_bind(control_work_id);
    }

    builder.push(" ORDER BY v.number DESC OFFSET ");
    builder.push_bind(params.skip.max(0));
    builder.push(" LIMIT ");
    builder.push_bind(params.limit.clamp(1, 1000));

    builder.build_query_as::<VariantSummaryRow>().fetch_all(pool).await
}

pub(crate) async fn list_by_control_work(
    executor: impl sqlx::PgExecutor<'_>,
    control_work_id: &str,
) -> Result<Vec<Variant>, sqlx::Error> {
    sqlx::query_as::<_, Variant>(&format!(
        "SELECT {COLUMNS} FROM variants WHERE control_work_id = $1 ORDER BY number"
    ))
    .bind(control_work_id)
    .fetch_all(executor)
    .await
}

pub(crate) async fn delete(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<bool, sqlx::Error> {
    let result =
        sqlx::query("DELETE FROM variants WHERE id = $1").bind(id).execute(executor).await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn delete_by_control_work(
    executor: impl sqlx::PgExecutor<'_>,
    control_work_id: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM variants WHERE control_work_id = $1")
        .bind(control_work_id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}
