use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::api::guards::{ensure_owner, owner_scope, CurrentStaff};
use crate::api::pagination::{PageWindow, PaginatedResponse};
use crate::api::validation::validate_payload;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::{Task, User};
use crate::db::types::DifficultyLevel;
use crate::repositories;
use crate::schemas::task::{
    non_blank, ImportDeleteResponse, TaskCreate, TaskFilterParams, TaskImportQuery, TaskResponse,
    TaskUpdate,
};
use crate::services::task_import::{self, ImportSummary};

#[derive(Debug, Deserialize)]
pub(crate) struct ListTasksQuery {
    #[serde(default)]
    #[serde(alias = "taskType")]
    task_type: Option<String>,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    difficulty: Option<DifficultyLevel>,
    #[serde(default)]
    search: Option<String>,
    #[serde(default)]
    skip: i64,
    #[serde(default = "crate::api::pagination::default_limit")]
    limit: i64,
}

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tasks).post(create_task))
        .route("/import", post(import_tasks))
        .route("/imports/:import_id", delete(delete_import))
        .route("/:task_id", get(get_task).patch(update_task).delete(delete_task))
}

async fn create_task(
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
    Json(payload): Json<TaskCreate>,
) -> Result<(StatusCode, Json<TaskResponse>), ApiError> {
    validate_payload(&payload)?;

    let text = payload.text.trim();
    let task_type = payload.task_type.trim();
    if text.is_empty() || task_type.is_empty() {
        return Err(ApiError::BadRequest("Task text and type must not be blank".to_string()));
    }
    let subtype = non_blank(payload.subtype.as_deref());

    let task = repositories::tasks::create(
        state.db(),
        repositories::tasks::CreateTask {
            id: &Uuid::new_v4().to_string(),
            text,
            task_type,
            subtype: subtype.as_deref(),
            difficulty: payload.difficulty,
            correct_answer: &payload.correct_answer,
            import_id: None,
            created_by: &user.id,
            now: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create task"))?;

    Ok((StatusCode::CREATED, Json(TaskResponse::from_db(task))))
}

async fn list_tasks(
    Query(query): Query<ListTasksQuery>,
    CurrentStaff(_user): CurrentStaff,
    State(state): State<AppState>,
) -> Result<Json<PaginatedResponse<TaskResponse>>, ApiError> {
    let window = PageWindow::new(query.skip, query.limit);
    let filter = TaskFilterParams {
        task_type: query.task_type,
        subtype: query.subtype,
        difficulty: query.difficulty,
        search: query.search,
    }
    .to_filter(None);

    let total_count = repositories::tasks::count(state.db(), &filter)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count tasks"))?;
    let tasks = repositories::tasks::list(state.db(), &filter, window.skip, window.limit)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list tasks"))?;

    Ok(Json(PaginatedResponse::new(
        tasks.into_iter().map(TaskResponse::from_db).collect(),
        total_count,
        window,
    )))
}

async fn get_task(
    Path(task_id): Path<String>,
    CurrentStaff(_user): CurrentStaff,
    State(state): State<AppState>,
) -> Result<Json<TaskResponse>, ApiError> {
    let task = repositories::tasks::find_by_id(state.db(), &task_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch task"))?
        .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))?;

    Ok(Json(TaskResponse::from_db(task)))
}

async fn update_task(
    Path(task_id): Path<String>,
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
    Json(payload): Json<TaskUpdate>,
) -> Result<Json<TaskResponse>, ApiError> {
    validate_payload(&payload)?;
    let task = fetch_owned_task(&state, &user, &task_id).await?;

    let text = payload.text.as_deref().map(str::trim);
    if text.is_some_and(str::is_empty) {
        return Err(ApiError::BadRequest("Task text must not be blank".to_string()));
    }
    let subtype = non_blank(payload.subtype.as_deref());

    let updated = repositories::tasks::update(
        state.db(),
        &task.id,
        repositories::tasks::UpdateTask {
            text,
            subtype: subtype.as_deref(),
            difficulty: payload.difficulty,
            correct_answer: payload.correct_answer.as_deref(),
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to update task"))?
    .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))?;

    tracing::info!(task_id = %updated.id, updated_by = %user.id, "Task updated");
    Ok(Json(TaskResponse::from_db(updated)))
}

async fn delete_task(
    Path(task_id): Path<String>,
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let task = fetch_owned_task(&state, &user, &task_id).await?;

    repositories::tasks::delete(state.db(), &task.id).await.map_err(|e| match e {
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
            ApiError::Conflict("Task is used by existing variants".to_string())
        }
        other => ApiError::internal(other, "Failed to delete task"),
    })?;

    Ok(StatusCode::NO_CONTENT)
}

/// Accepts the raw JSON file body; type and subtype apply to the whole batch.
async fn import_tasks(
    Query(query): Query<TaskImportQuery>,
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
    body: String,
) -> Result<(StatusCode, Json<ImportSummary>), ApiError> {
    let task_type = query.task_type.trim();
    if task_type.is_empty() {
        return Err(ApiError::BadRequest("task_type must not be empty".to_string()));
    }
    let subtype = non_blank(query.subtype.as_deref());

    let parsed = task_import::parse_import(&body)?;
    if parsed.accepted.is_empty() {
        return Err(ApiError::BadRequest("Import file contains no valid tasks".to_string()));
    }

    let summary =
        task_import::import_tasks(state.db(), parsed, task_type, subtype.as_deref(), &user.id)
            .await
            .map_err(|e| ApiError::internal(format!("{e:#}"), "Failed to import tasks"))?;

    Ok((StatusCode::CREATED, Json(summary)))
}

/// Removes every task of one import batch. Refused as a whole while any of them is
/// used by a variant.
async fn delete_import(
    Path(import_id): Path<String>,
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
) -> Result<Json<ImportDeleteResponse>, ApiError> {
    let deleted = repositories::tasks::delete_import(state.db(), &import_id, owner_scope(&user))
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                ApiError::Conflict("Imported tasks are used by existing variants".to_string())
            }
            other => ApiError::internal(other, "Failed to delete imported tasks"),
        })?;

    if deleted == 0 {
        return Err(ApiError::NotFound("Import not found".to_string()));
    }

    tracing::info!(%import_id, deleted, deleted_by = %user.id, "Imported tasks deleted");
    Ok(Json(ImportDeleteResponse { import_id, deleted }))
}

async fn fetch_owned_task(
    state: &AppState,
    user: &User,
    task_id: &str,
) -> Result<Task, ApiError> {
    let task = repositories::tasks::find_by_id(state.db(), task_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch task"))?
        .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))?;
    ensure_owner(user, &task.created_by)?;
    Ok(task)
}
