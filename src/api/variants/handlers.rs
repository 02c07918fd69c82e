use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::api::guards::{ensure_owner, owner_scope, CurrentStaff};
use crate::api::pagination::{PageWindow, PaginatedResponse};
use crate::api::validation::{normalize_ids, validate_payload};
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::{User, Variant};
use crate::repositories;
use crate::schemas::variant::{
    ListVariantsQuery, VariantBatchResponse, VariantDetailResponse, VariantPoolCreate,
    VariantResponse, VariantTaskResponse, VariantTasksCreate,
};
use crate::services::variant_builder::{self, Strategy, VariantPlan};

/// Upper bound on how many catalog tasks a filter may pull into one pool.
pub(crate) const MAX_POOL_SIZE: i64 = 5_000;

pub(super) async fn create_from_pool(
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
    Json(payload): Json<VariantPoolCreate>,
) -> Result<(StatusCode, Json<VariantBatchResponse>), ApiError> {
    validate_payload(&payload)?;

    let pool = match payload.task_ids.as_deref() {
        Some(ids) => load_explicit_pool(&state, ids).await?,
        None => {
            let filter = payload.filter.to_filter(None);
            repositories::tasks::list_ids(state.db(), &filter, MAX_POOL_SIZE)
                .await
                .map_err(|e| ApiError::internal(e, "Failed to load task pool"))?
        }
    };

    let plan = VariantPlan {
        tasks_per_variant: payload.tasks_per_variant,
        variant_count: payload.variant_count,
    };
    let drafts = variant_builder::build_variants(
        Strategy::SliceOrShuffle,
        &pool,
        plan,
        &payload.base_name,
        &mut rand::thread_rng(),
    )?;

    let task_type = payload.filter.to_filter(None).task_type;
    let now = primitive_now_utc();
    let mut tx = state
        .db()
        .begin()
        .await
        .map_err(|e| ApiError::internal(e, "Failed to start transaction"))?;

    let mut created = Vec::with_capacity(drafts.len());
    for draft in &drafts {
        let variant = repositories::variants::create(
            &mut *tx,
            repositories::variants::CreateVariant {
                id: &Uuid::new_v4().to_string(),
                name: &draft.name,
                task_type: task_type.as_deref(),
                kind: payload.kind,
                time_limit_minutes: payload.time_limit_minutes,
                control_work_id: None,
                created_by: &user.id,
                now,
            },
        )
        .await
        .map_err(|e| ApiError::internal(e, "Failed to create variant"))?;
        repositories::variants::insert_tasks(&mut tx, &variant.id, &draft.tasks)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to link variant tasks"))?;
        created.push(variant);
    }

    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit transaction"))?;

    metrics::counter!("variants_created_total", "strategy" => Strategy::SliceOrShuffle.as_str())
        .increment(created.len() as u64);
    tracing::info!(
        created_by = %user.id,
        pool_size = pool.len(),
        variants = created.len(),
        "Variants generated from pool"
    );

    let mut variants = Vec::with_capacity(created.len());
    for variant in created {
        variants.push(load_detail(&state, variant).await?);
    }

    Ok((
        StatusCode::CREATED,
        Json(VariantBatchResponse {
            strategy: Strategy::SliceOrShuffle.as_str(),
            pool_size: pool.len(),
            variants,
        }),
    ))
}

pub(super) async fn create_from_tasks(
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
    Json(payload): Json<VariantTasksCreate>,
) -> Result<(StatusCode, Json<VariantDetailResponse>), ApiError> {
    validate_payload(&payload)?;
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Variant name must not be empty".to_string()));
    }

    let requested = normalize_ids(&payload.task_ids);
    let task_ids = load_explicit_pool(&state, &requested).await?;
    if task_ids.len() != requested.len() {
        return Err(ApiError::BadRequest("Some tasks do not exist".to_string()));
    }

    let mut tx = state
        .db()
        .begin()
        .await
        .map_err(|e| ApiError::internal(e, "Failed to start transaction"))?;

    let variant = repositories::variants::create(
        &mut *tx,
        repositories::variants::CreateVariant {
            id: &Uuid::new_v4().to_string(),
            name,
            task_type: None,
            kind: payload.kind,
            time_limit_minutes: payload.time_limit_minutes,
            control_work_id: None,
            created_by: &user.id,
            now: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create variant"))?;
    repositories::variants::insert_tasks(&mut tx, &variant.id, &task_ids)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to link variant tasks"))?;

    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit transaction"))?;

    metrics::counter!("variants_created_total", "strategy" => "manual").increment(1);

    let detail = load_detail(&state, variant).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

pub(super) async fn list_variants(
    Query(query): Query<ListVariantsQuery>,
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
) -> Result<Json<PaginatedResponse<VariantResponse>>, ApiError> {
    let window = PageWindow::new(query.skip, query.limit);

    let rows = repositories::variants::list(
        state.db(),
        repositories::variants::ListVariantsParams {
            created_by: owner_scope(&user).map(str::to_string),
            kind: query.kind,
            control_work_id: None,
            skip: window.skip,
            limit: window.limit,
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to list variants"))?;

    let total_count = rows.first().map(|row| row.total_count).unwrap_or(0);
    Ok(Json(PaginatedResponse::new(
        rows.into_iter().map(VariantResponse::from_summary).collect(),
        total_count,
        window,
    )))
}

pub(super) async fn get_variant(
    Path(variant_id): Path<String>,
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
) -> Result<Json<VariantDetailResponse>, ApiError> {
    let variant = fetch_owned_variant(&state, &user, &variant_id).await?;
    Ok(Json(load_detail(&state, variant).await?))
}

pub(super) async fn delete_variant(
    Path(variant_id): Path<String>,
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let variant = fetch_owned_variant(&state, &user, &variant_id).await?;
    repositories::variants::delete(state.db(), &variant.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to delete variant"))?;

    tracing::info!(variant_id = %variant.id, deleted_by = %user.id, "Variant deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn fetch_owned_variant(
    state: &AppState,
    user: &User,
    variant_id: &str,
) -> Result<Variant, ApiError> {
    let variant = repositories::variants::find_by_id(state.db(), variant_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch variant"))?
        .ok_or_else(|| ApiError::NotFound("Variant not found".to_string()))?;
    ensure_owner(user, &variant.created_by)?;
    Ok(variant)
}

async fn load_detail(
    state: &AppState,
    variant: Variant,
) -> Result<VariantDetailResponse, ApiError> {
    let tasks = repositories::variants::list_tasks(state.db(), &variant.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load variant tasks"))?;

    let task_count = i64::try_from(tasks.len()).unwrap_or(i64::MAX);
    Ok(VariantDetailResponse {
        variant: VariantResponse::from_db(variant, task_count),
        tasks: tasks.into_iter().map(VariantTaskResponse::from_db).collect(),
    })
}

/// Keeps the caller's order and drops ids that are not in the catalog.
pub(crate) async fn load_explicit_pool(state: &AppState, ids: &[String]) -> Result<Vec<String>, ApiError> {
    let requested = normalize_ids(ids);
    let existing = repositories::tasks::existing_ids(state.db(), &requested)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load tasks"))?;

    Ok(requested.into_iter().filter(|id| existing.contains(id)).collect())
}
