//! Error kinds surfaced by the hierarchy, dependency and activity engines.

use serde::Serialize;
use thiserror::Error;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotFound,
    InvalidArgument,
    Cycle,
    Conflict,
    TransactionFailure,
}

#[derive(Debug, Error)]
pub enum TaskError {
    /// Task, parent, category or dependency absent or not owned by the caller.
    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A tree move or dependency insert would close a cycle.
    #[error("cycle: {0}")]
    Cycle(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// The store failed inside a unit of work; the transaction was rolled back.
    #[error("transaction failed: {0}")]
    TransactionFailure(#[from] rusqlite::Error),

    #[error("schema migration failed: {0}")]
    Migration(#[from] refinery::Error),
}

impl TaskError {
    pub fn task_not_found(task_id: i64) -> Self {
        Self::NotFound(format!("task {}", task_id))
    }

    pub fn dependency_cycle(source: i64, target: i64) -> Self {
        Self::Cycle(format!(
            "dependency {} -> {} would create a circular dependency",
            source, target
        ))
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Cycle(_) => ErrorCode::Cycle,
            Self::Conflict(_) => ErrorCode::Conflict,
            Self::TransactionFailure(_) | Self::Migration(_) => ErrorCode::TransactionFailure,
        }
    }
}

pub type Result<T> = std::result::Result<T, TaskError>;
