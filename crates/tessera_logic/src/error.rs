//! # Logic Error Types
//!
//! [`HandlerError`] rejects a single event and is never retried.
//! [`EngineError`] covers everything the engine can report for an event.

use tessera_core::{ComponentKind, EntityId, ItemId, StoreError};
use tessera_firehose::FirehoseError;
use thiserror::Error;

use crate::event::EventKind;

/// Why a handler refused an event.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HandlerError {
    /// A role the handler needs did not resolve to an entity.
    #[error("no entity resolved for role `{0}`")]
    MissingEntity(&'static str),

    /// The entity in a role lacks a component the handler needs.
    #[error("entity in role `{role}` has no {kind:?} component")]
    MissingComponent {
        /// Role that was read.
        role: &'static str,
        /// Missing component.
        kind: ComponentKind,
    },

    /// Two entities are too far apart to interact.
    #[error("out of range: {distance:.2} > {range:.2}")]
    OutOfRange {
        /// Actual distance.
        distance: f32,
        /// Allowed distance.
        range: f32,
    },

    /// An inventory holds fewer items than requested.
    #[error("{entity} holds {have} of item {item_id}, needs {need}")]
    InsufficientItems {
        /// Inventory owner.
        entity: EntityId,
        /// Item requested.
        item_id: ItemId,
        /// Count held.
        have: u32,
        /// Count requested.
        need: u32,
    },

    /// The event is malformed or contradicts itself.
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// The handler was given an event of another kind.
    #[error("handler for {expected} received a {actual} event")]
    WrongKind {
        /// Kind the handler serves.
        expected: EventKind,
        /// Kind received.
        actual: EventKind,
    },

    /// `Context::create` was called more often than the handler declared.
    #[error("no pre-allocated entity id left")]
    NoReservedId,
}

/// Result type for handler code.
pub type HandlerResult<T> = Result<T, HandlerError>;

/// Errors reported by the engine for one event.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The handler rejected the event.
    #[error(transparent)]
    Handler(#[from] HandlerError),

    /// The kind bypasses the generic pipeline and must not be submitted to it.
    #[error("{0} events are not processed by the generic engine")]
    UnsupportedKind(EventKind),

    /// Nothing is registered for the kind.
    #[error("no handler registered for {0} events")]
    NoHandler(EventKind),

    /// Backing store or id allocator failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Facts could not be appended after a successful commit.
    #[error("firehose error: {0}")]
    Firehose(#[from] FirehoseError),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
