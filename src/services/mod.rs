pub(crate) mod control_wizard;
pub(crate) mod distribution;
pub(crate) mod errors;
pub(crate) mod execution_engine;
pub(crate) mod scoring;
pub(crate) mod task_import;
pub(crate) mod variant_builder;

pub(crate) use errors::DomainError;
