//! # Store Error Types
//!
//! Failures of the backing store and id allocator contracts.

use thiserror::Error;

use crate::ecs::{EntityId, Version};

/// Errors raised by store implementations.
///
/// Version conflicts on individual changes are not errors: they are reported
/// per change through [`crate::store::ChangeOutcome`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Optimistic concurrency check failed outside a batch apply.
    #[error("version conflict on {id}: expected {expected}, found {actual}")]
    Conflict {
        /// Entity in conflict.
        id: EntityId,
        /// Version the caller expected.
        expected: Version,
        /// Version the store holds.
        actual: Version,
    },

    /// Entity does not exist.
    #[error("entity not found: {0}")]
    NotFound(EntityId),

    /// Attempted to create an entity whose id is taken.
    #[error("entity already exists: {0}")]
    AlreadyExists(EntityId),

    /// The store or allocator cannot serve requests.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
