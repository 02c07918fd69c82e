mod handlers;
mod statistics;

use axum::{
    routing::{get, post},
    Router,
};

use crate::core::state::AppState;

pub(crate) use handlers::{fetch_owned_variant, load_explicit_pool, MAX_POOL_SIZE};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_variants))
        .route("/from-pool", post(handlers::create_from_pool))
        .route("/from-tasks", post(handlers::create_from_tasks))
        .route("/:variant_id", get(handlers::get_variant).delete(handlers::delete_variant))
        .route("/:variant_id/statistics", get(statistics::variant_statistics))
}
