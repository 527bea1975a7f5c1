//! # Replica Error Types

use thiserror::Error;

/// Errors raised while maintaining a replica.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReplicaError {
    /// The change feed ended while the replica was still following it.
    #[error("change stream closed")]
    StreamClosed,
}

/// Result type for replica operations.
pub type ReplicaResult<T> = Result<T, ReplicaError>;
