//! # Store Contracts
//!
//! The durable backing store and the id allocator are external
//! collaborators. The engine only sees these traits; [`MemoryStore`] and
//! [`SequentialIds`] implement them in-process.

mod ids;
mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::change::{Change, StreamChange};
use crate::ecs::{EntityId, Version, VersionedEntity};
use crate::error::StoreResult;

pub use ids::SequentialIds;
pub use memory::MemoryStore;

/// Receiving end of a change feed. Each message is one commit, in commit order.
pub type ChangeReceiver = mpsc::UnboundedReceiver<Vec<StreamChange>>;

/// Per-change result of [`BackingStore::apply`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeOutcome {
    /// Written; the entity is now at this version. Guards report the
    /// validated version unchanged.
    Applied(Version),
    /// The store holds a different version than expected.
    Conflict {
        /// Version the change carried.
        expected: Version,
        /// Version the store holds (`0` if absent).
        actual: Version,
    },
    /// Not applied because another change in the same call conflicted.
    Aborted,
}

impl ChangeOutcome {
    /// Returns true for [`ChangeOutcome::Applied`].
    #[inline]
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// Versioned, atomically-writable entity storage.
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Reads one entity with its version.
    async fn get(&self, id: EntityId) -> StoreResult<Option<VersionedEntity>>;

    /// Reads many entities at once; the result is positional.
    async fn get_with_version(&self, ids: &[EntityId]) -> StoreResult<Vec<Option<VersionedEntity>>>;

    /// Applies all changes or none.
    ///
    /// Returns one outcome per change, in order. Either every outcome is
    /// `Applied` or none is.
    async fn apply(&self, changes: Vec<Change>) -> StoreResult<Vec<ChangeOutcome>>;
}

/// Ordered stream of committed changes.
pub trait ChangeFeed: Send + Sync {
    /// Registers a new subscriber. It receives every commit made after this call.
    fn subscribe(&self) -> ChangeReceiver;
}

/// Source of fresh entity ids.
#[async_trait]
pub trait IdAllocator: Send + Sync {
    /// One fresh id.
    async fn next(&self) -> StoreResult<EntityId>;

    /// `count` fresh ids.
    async fn batch(&self, count: usize) -> StoreResult<Vec<EntityId>>;
}

#[async_trait]
impl<S: BackingStore + ?Sized> BackingStore for Arc<S> {
    async fn get(&self, id: EntityId) -> StoreResult<Option<VersionedEntity>> {
        (**self).get(id).await
    }

    async fn get_with_version(&self, ids: &[EntityId]) -> StoreResult<Vec<Option<VersionedEntity>>> {
        (**self).get_with_version(ids).await
    }

    async fn apply(&self, changes: Vec<Change>) -> StoreResult<Vec<ChangeOutcome>> {
        (**self).apply(changes).await
    }
}

impl<F: ChangeFeed + ?Sized> ChangeFeed for Arc<F> {
    fn subscribe(&self) -> ChangeReceiver {
        (**self).subscribe()
    }
}

#[async_trait]
impl<A: IdAllocator + ?Sized> IdAllocator for Arc<A> {
    async fn next(&self) -> StoreResult<EntityId> {
        (**self).next().await
    }

    async fn batch(&self, count: usize) -> StoreResult<Vec<EntityId>> {
        (**self).batch(count).await
    }
}
