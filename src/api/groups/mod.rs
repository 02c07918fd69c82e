mod handlers;

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::core::state::AppState;

pub(crate) use handlers::fetch_owned_group;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_groups).post(handlers::create_group))
        .route(
            "/:group_id",
            get(handlers::get_group)
                .patch(handlers::update_group)
                .delete(handlers::delete_group),
        )
        .route("/:group_id/members", post(handlers::add_members))
        .route("/:group_id/members/:student_id", delete(handlers::remove_member))
}

#[cfg(test)]
mod tests;
