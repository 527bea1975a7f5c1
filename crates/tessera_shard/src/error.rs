//! # Shard Error Types

use thiserror::Error;

/// Errors raised by shard assignment and leader election.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShardError {
    /// The assignment is malformed.
    #[error("invalid shard assignment: {0}")]
    InvalidAssignment(String),

    /// Leadership ended before the leader's work finished.
    #[error("leadership lost by {0}")]
    ElectionLost(String),
}

/// Result type for shard operations.
pub type ShardResult<T> = Result<T, ShardError>;
