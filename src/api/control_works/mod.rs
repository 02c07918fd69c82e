mod handlers;
mod wizard;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_control_works))
        .route("/wizard", post(wizard::start_wizard))
        .route("/wizard/:wizard_id", get(wizard::get_wizard).delete(wizard::discard_wizard))
        .route("/wizard/:wizard_id/details", put(wizard::submit_details))
        .route("/wizard/:wizard_id/tasks", put(wizard::submit_tasks))
        .route("/wizard/:wizard_id/settings", put(wizard::submit_settings))
        .route("/wizard/:wizard_id/confirm", post(wizard::confirm_wizard))
        .route(
            "/:control_work_id",
            get(handlers::get_control_work).delete(handlers::delete_control_work),
        )
        .route("/:control_work_id/regenerate", post(handlers::regenerate_variants))
}

#[cfg(test)]
mod tests;
