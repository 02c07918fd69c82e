pub(crate) mod assignments;
pub(crate) mod control_works;
pub(crate) mod executions;
pub(crate) mod groups;
pub(crate) mod tasks;
pub(crate) mod users;
pub(crate) mod variants;
