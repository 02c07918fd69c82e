pub(crate) mod assignments;
pub(crate) mod auth;
pub(crate) mod control_works;
pub(crate) mod errors;
pub(crate) mod executions;
pub(crate) mod groups;
pub(crate) mod guards;
pub(crate) mod handlers;
pub(crate) mod pagination;
pub(crate) mod router;
pub(crate) mod tasks;
pub(crate) mod users;
pub(crate) mod validation;
pub(crate) mod variants;
