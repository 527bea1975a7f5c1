//! # Shard Manager
//!
//! Decides whether this worker owns an entity. The entity space is split
//! into `total` buckets by a stable hash; a worker processes an entity iff
//! its bucket is in the worker's held set.
//!
//! Ownership changes are not fenced against in-flight commits: two workers
//! briefly owning the same entity during a rebalance only produces ordinary
//! version conflicts, which the engine already retries.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tessera_core::{CancelToken, EntityId};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{ShardError, ShardResult};
use crate::hash::bucket_of;
use crate::rebalance::Assignments;

/// Buckets held by one worker out of a total.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardAssignment {
    /// Number of buckets the entity space is split into.
    pub total: u32,
    /// Buckets this worker processes.
    pub held: BTreeSet<u32>,
}

impl ShardAssignment {
    /// Creates and validates an assignment.
    pub fn new(total: u32, held: impl IntoIterator<Item = u32>) -> ShardResult<Self> {
        let assignment = Self {
            total,
            held: held.into_iter().collect(),
        };
        assignment.validate()?;
        Ok(assignment)
    }

    /// Holds every bucket.
    #[must_use]
    pub fn all(total: u32) -> Self {
        Self {
            total,
            held: (0..total).collect(),
        }
    }

    /// Holds no bucket.
    #[must_use]
    pub fn none(total: u32) -> Self {
        Self {
            total,
            held: BTreeSet::new(),
        }
    }

    /// Checks that `total > 0` and every held bucket is `< total`.
    pub fn validate(&self) -> ShardResult<()> {
        if self.total == 0 {
            return Err(ShardError::InvalidAssignment("total must be positive".into()));
        }
        if let Some(bad) = self.held.iter().find(|b| **b >= self.total) {
            return Err(ShardError::InvalidAssignment(format!(
                "bucket {bad} out of range for total {}",
                self.total
            )));
        }
        Ok(())
    }

    /// Returns true if `bucket` is held.
    #[inline]
    #[must_use]
    pub fn holds(&self, bucket: u32) -> bool {
        self.held.contains(&bucket)
    }
}

/// Local view of this worker's shard ownership.
#[derive(Debug)]
pub struct ShardManager {
    assignment: RwLock<ShardAssignment>,
    epoch: AtomicU64,
}

impl ShardManager {
    /// Creates a manager with an initial assignment.
    pub fn new(assignment: ShardAssignment) -> ShardResult<Self> {
        assignment.validate()?;
        Ok(Self {
            assignment: RwLock::new(assignment),
            epoch: AtomicU64::new(0),
        })
    }

    /// Returns true if this worker processes `id`.
    #[must_use]
    pub fn owns_entity(&self, id: EntityId) -> bool {
        let a = self.assignment.read();
        a.holds(bucket_of(id, a.total))
    }

    /// Replaces the assignment (rebalance).
    pub fn assign(&self, assignment: ShardAssignment) -> ShardResult<()> {
        assignment.validate()?;
        let mut current = self.assignment.write();
        if *current == assignment {
            return Ok(());
        }
        info!(
            total = assignment.total,
            held = assignment.held.len(),
            previous_total = current.total,
            "shard assignment changed"
        );
        *current = assignment;
        self.epoch.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Current assignment.
    #[must_use]
    pub fn assignment(&self) -> ShardAssignment {
        self.assignment.read().clone()
    }

    /// Number of assignment changes applied so far.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Applies this worker's entry from a published assignment board until
    /// `cancel` fires or the board goes away.
    ///
    /// A board that lists other workers but not this one means this worker
    /// holds nothing. An invalid entry is logged and skipped; the previous
    /// assignment stays in force until a valid one is published.
    pub async fn follow(
        &self,
        worker_id: &str,
        mut board: watch::Receiver<Assignments>,
        cancel: CancelToken,
    ) -> ShardResult<()> {
        loop {
            let next = {
                let assignments = board.borrow_and_update();
                match assignments.get(worker_id) {
                    Some(mine) => Some(mine.clone()),
                    None => assignments
                        .values()
                        .next()
                        .map(|other| ShardAssignment::none(other.total)),
                }
            };
            if let Some(assignment) = next {
                if let Err(e) = self.assign(assignment) {
                    warn!(worker_id, error = %e, "ignoring invalid shard assignment");
                }
            }

            tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                changed = board.changed() => {
                    if changed.is_err() {
                        debug!(worker_id, "assignment board closed");
                        return Ok(());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owns_iff_bucket_held() {
        let manager = ShardManager::new(ShardAssignment::new(4, [0, 2]).unwrap()).unwrap();
        for raw in 0..500u64 {
            let id = EntityId::new(raw);
            let bucket = bucket_of(id, 4);
            assert_eq!(manager.owns_entity(id), bucket == 0 || bucket == 2);
            assert_eq!(manager.owns_entity(id), manager.owns_entity(id));
        }
    }

    #[test]
    fn test_validate_rejects_bad_assignments() {
        assert!(ShardAssignment::new(0, []).is_err());
        assert!(ShardAssignment::new(4, [4]).is_err());
        assert!(ShardAssignment::new(4, [3]).is_ok());
    }

    #[test]
    fn test_assign_bumps_epoch_only_on_change() {
        let manager = ShardManager::new(ShardAssignment::all(4)).unwrap();
        manager.assign(ShardAssignment::all(4)).unwrap();
        assert_eq!(manager.epoch(), 0);

        manager.assign(ShardAssignment::new(8, [1]).unwrap()).unwrap();
        assert_eq!(manager.epoch(), 1);
        assert_eq!(manager.assignment().total, 8);

        let bad = ShardAssignment {
            total: 2,
            held: [5].into_iter().collect(),
        };
        assert!(manager.assign(bad).is_err());
        assert_eq!(manager.assignment().total, 8);
    }

    #[test]
    fn test_full_assignment_owns_everything() {
        let manager = ShardManager::new(ShardAssignment::all(64)).unwrap();
        assert!((0..200u64).all(|raw| manager.owns_entity(EntityId::new(raw))));
    }
}
