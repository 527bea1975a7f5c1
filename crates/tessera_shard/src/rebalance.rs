//! # Rebalancer
//!
//! The elected leader spreads buckets over the live workers and publishes
//! the result on an [`AssignmentBoard`]. Every worker's [`ShardManager`]
//! follows the board.
//!
//! [`ShardManager`]: crate::manager::ShardManager

use std::collections::BTreeMap;
use std::sync::Arc;

use tessera_core::CancelToken;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::election::{LeaderElection, LeaderTask};
use crate::error::{ShardError, ShardResult};
use crate::manager::ShardAssignment;

/// Assignment per worker id.
pub type Assignments = BTreeMap<String, ShardAssignment>;

/// Latest published assignments, observable by every worker.
#[derive(Debug)]
pub struct AssignmentBoard {
    tx: watch::Sender<Assignments>,
}

impl AssignmentBoard {
    /// Creates an empty board.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Assignments::new());
        Self { tx }
    }

    /// Replaces the published assignments.
    pub fn publish(&self, assignments: Assignments) {
        self.tx.send_replace(assignments);
    }

    /// Receiver that observes every publish.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Assignments> {
        self.tx.subscribe()
    }

    /// Currently published assignments.
    #[must_use]
    pub fn current(&self) -> Assignments {
        self.tx.borrow().clone()
    }
}

impl Default for AssignmentBoard {
    fn default() -> Self {
        Self::new()
    }
}

/// Computes and publishes bucket assignments while elected.
pub struct Rebalancer {
    election: Arc<dyn LeaderElection>,
    board: Arc<AssignmentBoard>,
    total: u32,
}

impl Rebalancer {
    /// Creates a rebalancer distributing `total` buckets.
    #[must_use]
    pub fn new(election: Arc<dyn LeaderElection>, board: Arc<AssignmentBoard>, total: u32) -> Self {
        Self {
            election,
            board,
            total,
        }
    }

    /// Deterministic round-robin plan: bucket `b` goes to the `b mod n`-th
    /// worker in sorted id order. Duplicate ids count once.
    pub fn plan(workers: &[String], total: u32) -> ShardResult<Assignments> {
        if total == 0 {
            return Err(ShardError::InvalidAssignment("total must be positive".into()));
        }
        let mut ids: Vec<&String> = workers.iter().collect();
        ids.sort();
        ids.dedup();

        let mut plan: Assignments = ids
            .iter()
            .map(|id| ((*id).clone(), ShardAssignment::none(total)))
            .collect();
        if ids.is_empty() {
            return Ok(plan);
        }
        for bucket in 0..total {
            let owner = ids[bucket as usize % ids.len()];
            if let Some(assignment) = plan.get_mut(owner) {
                assignment.held.insert(bucket);
            }
        }
        Ok(plan)
    }

    /// Campaigns as `worker_id`; once elected, republishes a plan every time
    /// the membership changes until `cancel` fires or leadership ends.
    pub async fn run(
        &self,
        worker_id: &str,
        members: watch::Receiver<Vec<String>>,
        cancel: CancelToken,
    ) -> ShardResult<()> {
        let board = Arc::clone(&self.board);
        let total = self.total;
        let task: LeaderTask = Box::new(move |term: CancelToken| {
            Box::pin(async move {
                let mut members = members;
                loop {
                    let workers = members.borrow_and_update().clone();
                    match Self::plan(&workers, total) {
                        Ok(plan) => {
                            info!(workers = workers.len(), total, "publishing shard plan");
                            board.publish(plan);
                        }
                        Err(e) => debug!(error = %e, "skipping shard plan"),
                    }
                    tokio::select! {
                        () = term.cancelled() => return,
                        changed = members.changed() => {
                            if changed.is_err() {
                                return;
                            }
                        }
                    }
                }
            })
        });
        self.election
            .run_while_elected(worker_id.to_string(), task, cancel)
            .await
    }
}
