use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::{StudentGroup, User};
use crate::db::types::UserRole;

const COLUMNS: &str = "id, name, created_by, created_at";

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct GroupSummaryRow {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) created_by: String,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) member_count: i64,
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    name: &str,
    created_by: &str,
    now: PrimitiveDateTime,
) -> Result<StudentGroup, sqlx::Error> {
    sqlx::query_as::<_, StudentGroup>(&format!(
        "INSERT INTO student_groups (id, name, created_by, created_at)
         VALUES ($1,$2,$3,$4)
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(name)
    .bind(created_by)
    .bind(now)
    .fetch_one(executor)
    .await
}

pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<StudentGroup>, sqlx::Error> {
    sqlx::query_as::<_, StudentGroup>(&format!(
        "SELECT {COLUMNS} FROM student_groups WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
}

/// Groups with member counts. `owner` restricts to one creator.
pub(crate) async fn list(
    pool: &PgPool,
    owner: Option<&str>,
) -> Result<Vec<GroupSummaryRow>, sqlx::Error> {
    sqlx::query_as::<_, GroupSummaryRow>(
        "SELECT g.id, g.name, g.created_by, g.created_at, COUNT(m.user_id) AS member_count
         FROM student_groups g
         LEFT JOIN group_members m ON m.group_id = g.id
         WHERE ($1::text IS NULL OR g.created_by = $1)
         GROUP BY g.id
         ORDER BY g.name",
    )
    .bind(owner)
    .fetch_all(pool)
    .await
}

pub(crate) async fn rename(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    name: &str,
) -> Result<Option<StudentGroup>, sqlx::Error> {
    sqlx::query_as::<_, StudentGroup>(&format!(
        "UPDATE student_groups SET name = $2 WHERE id = $1 RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(name)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn delete(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM student_groups WHERE id = $1")
        .bind(id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn add_member(
    executor: impl sqlx::PgExecutor<'_>,
    group_id: &str,
    user_id: &str,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO group_members (group_id, user_id, added_at)
         VALUES ($1,$2,$3)
         ON CONFLICT DO NOTHING",
    )
    .bind(group_id)
    .bind(user_id)
    .bind(now)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn remove_member(
    executor: impl sqlx::PgExecutor<'_>,
    group_id: &str,
    user_id: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM group_members WHERE group_id = $1 AND user_id = $2")
        .bind(group_id)
        .bind(user_id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Student members of a group, in the stable order used for round-robin distribution.
pub(crate) async fn list_students(
    executor: impl sqlx::PgExecutor<'_>,
    group_id: &str,
) -> Result<Vec<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(
        "SELECT u.id, u.username, u.hashed_password, u.full_name, u.role, u.is_active,
                u.created_by, u.created_at, u.updated_at
         FROM group_members m
         JOIN users u ON u.id = m.user_id
         WHERE m.group_id = $1 AND u.role = $2 AND u.is_active
         ORDER BY u.full_name, u.username, u.id",
    )
    .bind(group_id)
    .bind(UserRole::Student)
    .fetch_all(executor)
    .await
}
