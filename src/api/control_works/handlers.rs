use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::api::guards::{ensure_owner, owner_scope, CurrentStaff};
use crate::api::variants::load_explicit_pool;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::{ControlWork, User, Variant};
use crate::db::types::VariantKind;
use crate::repositories;
use crate::schemas::control_work::{ControlWorkDetailResponse, ControlWorkResponse};
use crate::schemas::variant::VariantResponse;
use crate::services::variant_builder::{self, DraftVariant, Strategy, VariantPlan};

pub(super) type Tx<'a> = sqlx::Transaction<'a, sqlx::Postgres>;

pub(super) async fn list_control_works(
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
) -> Result<Json<Vec<ControlWorkResponse>>, ApiError> {
    let works = repositories::control_works::list(state.db(), owner_scope(&user))
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list control works"))?;

    Ok(Json(works.into_iter().map(ControlWorkResponse::from_db).collect()))
}

pub(super) async fn get_control_work(
    Path(control_work_id): Path<String>,
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
) -> Result<Json<ControlWorkDetailResponse>, ApiError> {
    let work = fetch_owned_control_work(&state, &user, &control_work_id).await?;
    let variants = repositories::variants::list_by_control_work(state.db(), &work.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list control work variants"))?;

    Ok(Json(detail_response(work, variants)))
}

pub(super) async fn delete_control_work(
    Path(control_work_id): Path<String>,
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let work = fetch_owned_control_work(&state, &user, &control_work_id).await?;
    repositories::control_works::delete(state.db(), &work.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to delete control work"))?;

    tracing::info!(control_work_id = %work.id, deleted_by = %user.id, "Control work deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Replaces every variant of the control work with a fresh cyclic distribution of its
/// pool. Refused once any of its variants has been assigned.
pub(super) async fn regenerate_variants(
    Path(control_work_id): Path<String>,
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
) -> Result<Json<ControlWorkDetailResponse>, ApiError> {
    let work = fetch_owned_control_work(&state, &user, &control_work_id).await?;
    ensure_pool_exists(&state, &work.task_pool.0).await?;

    let mut tx = state
        .db()
        .begin()
        .await
        .map_err(|e| ApiError::internal(e, "Failed to start transaction"))?;

    let work = repositories::control_works::find_by_id_for_update(&mut *tx, &work.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to lock control work"))?
        .ok_or_else(|| ApiError::NotFound("Control work not found".to_string()))?;

    let assigned = repositories::assignments::count_for_control_work(&mut *tx, &work.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count assignments"))?;
    if assigned > 0 {
        return Err(ApiError::Conflict(
            "Variants of this control work are already assigned".to_string(),
        ));
    }

    let plan = VariantPlan {
        tasks_per_variant: usize::try_from(work.tasks_per_variant).unwrap_or_default(),
        variant_count: usize::try_from(work.variants_count).unwrap_or_default(),
    };
    let drafts = variant_builder::build_variants(
        Strategy::CyclicReuse,
        &work.task_pool.0,
        plan,
        &work.title,
        &mut rand::thread_rng(),
    )?;

    let now = primitive_now_utc();
    let removed = repositories::variants::delete_by_control_work(&mut *tx, &work.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to remove old variants"))?;
    let variants = insert_control_variants(&mut tx, &work, &drafts, now).await?;
    repositories::control_works::touch(&mut *tx, &work.id, now)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to update control work"))?;

    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit transaction"))?;

    metrics::counter!("variants_created_total", "strategy" => Strategy::CyclicReuse.as_str())
        .increment(variants.len() as u64);
    tracing::info!(
        control_work_id = %work.id,
        removed,
        created = variants.len(),
        "Control work variants regenerated"
    );

    Ok(Json(detail_response(work, variants)))
}

pub(super) async fn fetch_owned_control_work(
    state: &AppState,
    user: &User,
    control_work_id: &str,
) -> Result<ControlWork, ApiError> {
    let work = repositories::control_works::find_by_id(state.db(), control_work_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch control work"))?
        .ok_or_else(|| ApiError::NotFound("Control work not found".to_string()))?;
    ensure_owner(user, &work.created_by)?;
    Ok(work)
}

pub(super) async fn ensure_pool_exists(state: &AppState, pool: &[String]) -> Result<(), ApiError> {
    let existing = load_explicit_pool(state, pool).await?;
    if existing.len() != pool.len() {
        return Err(ApiError::BadRequest("Some tasks of the pool no longer exist".to_string()));
    }
    Ok(())
}

/// Stores the drafted variants as control variants of `work`.
pub(super) async fn insert_control_variants(
    tx: &mut Tx<'_>,
    work: &ControlWork,
    drafts: &[DraftVariant<String>],
    now: PrimitiveDateTime,
) -> Result<Vec<Variant>, ApiError> {
    let mut variants = Vec::with_capacity(drafts.len());
    for draft in drafts {
        let variant = repositories::variants::create(
            &mut **tx,
            repositories::variants::CreateVariant {
                id: &Uuid::new_v4().to_string(),
                name: &draft.name,
                task_type: None,
                kind: VariantKind::Control,
                time_limit_minutes: work.time_limit_minutes,
                control_work_id: Some(&work.id),
                created_by: &work.created_by,
                now,
            },
        )
        .await
        .map_err(|e| ApiError::internal(e, "Failed to create variant"))?;
        repositories::variants::insert_tasks(tx, &variant.id, &draft.tasks)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to link variant tasks"))?;
        variants.push(variant);
    }
    Ok(variants)
}

pub(super) fn detail_response(
    work: ControlWork,
    variants: Vec<Variant>,
) -> ControlWorkDetailResponse {
    let task_count = i64::from(work.tasks_per_variant);
    ControlWorkDetailResponse {
        control_work: ControlWorkResponse::from_db(work),
        variants: variants
            .into_iter()
            .map(|variant| VariantResponse::from_db(variant, task_count))
            .collect(),
    }
}
