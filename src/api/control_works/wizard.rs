use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use super::handlers::{detail_response, ensure_pool_exists, insert_control_variants};
use crate::api::errors::ApiError;
use crate::api::guards::CurrentStaff;
use crate::api::validation::{normalize_ids, validate_payload};
use crate::api::variants::{load_explicit_pool, MAX_POOL_SIZE};
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::User;
use crate::repositories;
use crate::schemas::control_work::{
    ControlWorkDetailResponse, WizardDetails, WizardResponse, WizardSettings, WizardTasks,
};
use crate::services::control_wizard::{self, WizardDraft, WizardStoreError};
use crate::services::variant_builder::{self, Strategy};

pub(super) async fn start_wizard(
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
    Json(payload): Json<WizardDetails>,
) -> Result<(StatusCode, Json<WizardResponse>), ApiError> {
    validate_payload(&payload)?;

    let mut draft = WizardDraft::new(Uuid::new_v4().to_string(), user.id.clone());
    draft.apply_details(&payload.title, payload.description.as_deref())?;
    save_draft(&state, &draft).await?;

    tracing::info!(wizard_id = %draft.id, owner_id = %user.id, "Control work wizard started");
    Ok((StatusCode::CREATED, Json(WizardResponse::from_draft(draft))))
}

pub(super) async fn get_wizard(
    Path(wizard_id): Path<String>,
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
) -> Result<Json<WizardResponse>, ApiError> {
    let draft = load_owned_draft(&state, &user, &wizard_id).await?;
    Ok(Json(WizardResponse::from_draft(draft)))
}

pub(super) async fn submit_details(
    Path(wizard_id): Path<String>,
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
    Json(payload): Json<WizardDetails>,
) -> Result<Json<WizardResponse>, ApiError> {
    validate_payload(&payload)?;
    let mut draft = load_owned_draft(&state, &user, &wizard_id).await?;
    draft.apply_details(&payload.title, payload.description.as_deref())?;
    save_draft(&state, &draft).await?;
    Ok(Json(WizardResponse::from_draft(draft)))
}

pub(super) async fn submit_tasks(
    Path(wizard_id): Path<String>,
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
    Json(payload): Json<WizardTasks>,
) -> Result<Json<WizardResponse>, ApiError> {
    let mut draft = load_owned_draft(&state, &user, &wizard_id).await?;

    let pool = match payload.task_ids.as_deref() {
        Some(ids) => {
            let requested = normalize_ids(ids);
            let existing = load_explicit_pool(&state, &requested).await?;
            if existing.len() != requested.len() {
                return Err(ApiError::BadRequest("Some tasks do not exist".to_string()));
            }
            existing
        }
        None => {
            let filter = payload.filter.to_filter(None);
            repositories::tasks::list_ids(state.db(), &filter, MAX_POOL_SIZE)
                .await
                .map_err(|e| ApiError::internal(e, "Failed to load task pool"))?
        }
    };

    draft.apply_tasks(&pool)?;
    save_draft(&state, &draft).await?;
    Ok(Json(WizardResponse::from_draft(draft)))
}

pub(super) async fn submit_settings(
    Path(wizard_id): Path<String>,
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
    Json(payload): Json<WizardSettings>,
) -> Result<Json<WizardResponse>, ApiError> {
    validate_payload(&payload)?;
    let mut draft = load_owned_draft(&state, &user, &wizard_id).await?;
    draft.apply_settings(
        payload.tasks_per_variant,
        payload.variants_count,
        payload.time_limit_minutes,
    )?;
    save_draft(&state, &draft).await?;
    Ok(Json(WizardResponse::from_draft(draft)))
}

/// Creates the control work and all its variants in one transaction, then drops the draft.
pub(super) async fn confirm_wizard(
    Path(wizard_id): Path<String>,
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<ControlWorkDetailResponse>), ApiError> {
    let draft = load_owned_draft(&state, &user, &wizard_id).await?;
    let confirmed = draft.confirm()?;
    ensure_pool_exists(&state, &confirmed.task_pool).await?;

    let variants_count = i32::try_from(confirmed.plan.variant_count)
        .map_err(|_| ApiError::BadRequest("variants_count is too large".to_string()))?;
    let tasks_per_variant = i32::try_from(confirmed.plan.tasks_per_variant)
        .map_err(|_| ApiError::BadRequest("tasks_per_variant is too large".to_string()))?;
    let drafts = variant_builder::build_variants(
        Strategy::CyclicReuse,
        &confirmed.task_pool,
        confirmed.plan,
        &confirmed.title,
        &mut rand::thread_rng(),
    )?;

    let now = primitive_now_utc();
    let mut tx = state
        .db()
        .begin()
        .await
        .map_err(|e| ApiError::internal(e, "Failed to start transaction"))?;

    let work = repositories::control_works::create(
        &mut *tx,
        repositories::control_works::CreateControlWork {
            id: &Uuid::new_v4().to_string(),
            title: &confirmed.title,
            description: confirmed.description.as_deref(),
            variants_count,
            tasks_per_variant,
            time_limit_minutes: confirmed.time_limit_minutes,
            task_pool: &confirmed.task_pool,
            created_by: &user.id,
            now,
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create control work"))?;
    let variants = insert_control_variants(&mut tx, &work, &drafts, now).await?;

    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit transaction"))?;

    if let Err(err) = control_wizard::discard_draft(state.redis(), &draft.id).await {
        tracing::warn!(wizard_id = %draft.id, error = %err, "Failed to discard wizard draft");
    }

    metrics::counter!("control_works_created_total").increment(1);
    metrics::counter!("variants_created_total", "strategy" => Strategy::CyclicReuse.as_str())
        .increment(variants.len() as u64);
    tracing::info!(
        control_work_id = %work.id,
        created_by = %user.id,
        pool_size = confirmed.task_pool.len(),
        variants = variants.len(),
        "Control work created"
    );

    Ok((StatusCode::CREATED, Json(detail_response(work, variants))))
}

pub(super) async fn discard_wizard(
    Path(wizard_id): Path<String>,
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let draft = load_owned_draft(&state, &user, &wizard_id).await?;
    control_wizard::discard_draft(state.redis(), &draft.id).await.map_err(store_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Drafts of other users read as expired.
async fn load_owned_draft(
    state: &AppState,
    user: &User,
    wizard_id: &str,
) -> Result<WizardDraft, ApiError> {
    control_wizard::load_draft(state.redis(), wizard_id)
        .await
        .map_err(store_error)?
        .filter(|draft| draft.owner_id == user.id)
        .ok_or_else(|| ApiError::NotFound("Wizard not found or expired".to_string()))
}

async fn save_draft(state: &AppState, draft: &WizardDraft) -> Result<(), ApiError> {
    control_wizard::store_draft(state.redis(), draft, state.settings().variants().wizard_ttl_seconds)
        .await
        .map_err(store_error)
}

fn store_error(err: WizardStoreError) -> ApiError {
    match err {
        WizardStoreError::Redis(err) => {
            ApiError::ServiceUnavailable(format!("Wizard storage is unavailable: {err}"))
        }
        WizardStoreError::Payload(err) => ApiError::internal(err, "Failed to decode wizard draft"),
    }
}
