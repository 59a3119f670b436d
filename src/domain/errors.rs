//! Domain errors for the swarm orchestrator.

use thiserror::Error;

/// Domain-level errors that can occur while driving a run.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("invalid state transition from {from:?} to {to:?} for task {task_id}")]
    InvalidTransition {
        task_id: String,
        from: String,
        to: String,
    },

    #[error("dependency cycle detected involving task: {0}")]
    DependencyCycle(String),

    #[error("decomposition returned a cyclic subtask graph for parent {0}")]
    CyclicDecomposition(String),

    #[error("budget exhausted: no allocation possible for task {0}")]
    BudgetExhausted(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type DomainResult<T> = Result<T, DomainError>;
