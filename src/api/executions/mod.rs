mod handlers;
mod helpers;

use axum::{routing::get, routing::post, Router};

use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_my_executions))
        .route("/start/:variant_id", post(handlers::start_execution))
        .route("/start-by-number", post(handlers::start_by_number))
        .route("/:execution_id", get(handlers::get_execution))
        .route("/:execution_id/answers", post(handlers::save_answer))
        .route("/:execution_id/navigate", post(handlers::navigate))
        .route("/:execution_id/complete", post(handlers::complete_execution))
        .route("/:execution_id/result", get(handlers::execution_result))
}

#[cfg(test)]
mod tests;
