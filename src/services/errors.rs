use thiserror::Error;

use crate::db::types::ExecutionStatus;

/// Failures of the variant, assignment and execution rules. Raised before any write,
/// so a failed operation never leaves partial state behind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum DomainError {
    #[error("Task pool has {pool} tasks but {required} are required per variant")]
    InsufficientPool { pool: usize, required: usize },
    #[error("Group has no students")]
    EmptyGroup,
    #[error("Cannot {action} an execution in status '{from}'")]
    InvalidStateTransition { from: ExecutionStatus, action: &'static str },
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Invalid(String),
}
