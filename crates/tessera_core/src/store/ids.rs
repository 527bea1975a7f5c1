//! Sequential id allocation.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use super::IdAllocator;
use crate::ecs::EntityId;
use crate::error::{StoreError, StoreResult};

/// In-process allocator handing out increasing ids.
#[derive(Debug)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl SequentialIds {
    /// Allocator whose first id is `first`.
    #[must_use]
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    fn reserve(&self, count: u64) -> StoreResult<u64> {
        self.next
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_add(count))
            .map_err(|_| StoreError::Unavailable("id space exhausted".into()))
    }
}

impl Default for SequentialIds {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

#[async_trait]
impl IdAllocator for SequentialIds {
    async fn next(&self) -> StoreResult<EntityId> {
        self.reserve(1).map(EntityId::new)
    }

    async fn batch(&self, count: usize) -> StoreResult<Vec<EntityId>> {
        let count = u64::try_from(count)
            .map_err(|_| StoreError::Unavailable("id batch too large".into()))?;
        let first = self.reserve(count)?;
        Ok((first..first + count).map(EntityId::new).collect())
    }
}
