//! # Batch Reports
//!
//! One entry per merge group, in first-arrival order, plus the engine's
//! running counters.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::EngineError;
use crate::event::{EventKind, MergeKey};

/// What happened to one merged event.
#[derive(Debug)]
pub enum Outcome {
    /// Committed; this many facts were published.
    Committed {
        /// Facts handed to the firehose.
        facts: usize,
    },
    /// Nothing staged, nothing committed.
    NoOp,
    /// Refused without retry.
    Rejected(EngineError),
    /// Conflicted on every attempt and was dead-lettered.
    DeadLettered,
    /// Not started before the batch was cancelled.
    Cancelled,
}

impl Outcome {
    /// Returns true for [`Outcome::Committed`].
    #[inline]
    #[must_use]
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }
}

/// Result for one merge group.
#[derive(Debug)]
pub struct ReportEntry {
    /// Event kind.
    pub kind: EventKind,
    /// Merge key of the group.
    pub key: MergeKey,
    /// Input events folded into this group.
    pub merged: usize,
    /// Commit attempts made.
    pub attempts: u32,
    /// Final outcome.
    pub outcome: Outcome,
}

/// Result of one batch.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Entries in first-arrival order of their groups.
    pub entries: Vec<ReportEntry>,
}

impl BatchReport {
    /// Number of groups that committed.
    #[must_use]
    pub fn committed(&self) -> usize {
        self.count(Outcome::is_committed)
    }

    /// Number of groups matching a predicate.
    pub fn count(&self, predicate: impl Fn(&Outcome) -> bool) -> usize {
        self.entries.iter().filter(|e| predicate(&e.outcome)).count()
    }

    /// Number of groups, i.e. apply outcomes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the batch was empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Engine counters.
#[derive(Debug, Default)]
pub struct EngineStats {
    /// Batches processed.
    pub batches: AtomicU64,
    /// Events received, before merging.
    pub events_received: AtomicU64,
    /// Events folded into an earlier one by merge.
    pub events_merged: AtomicU64,
    /// Successful commits.
    pub commits: AtomicU64,
    /// Transactions that staged nothing.
    pub noops: AtomicU64,
    /// Events refused without retry.
    pub rejected: AtomicU64,
    /// Version conflicts seen (each triggers a retry).
    pub conflicts: AtomicU64,
    /// Events dead-lettered after exhausting retries.
    pub dead_lettered: AtomicU64,
    /// Dead letters dropped because the queue was full.
    pub dead_letters_dropped: AtomicU64,
    /// Events not started because the batch was cancelled.
    pub cancelled: AtomicU64,
    /// Facts published after commit.
    pub facts_published: AtomicU64,
    /// Post-commit publishes that failed.
    pub publish_failures: AtomicU64,
}

impl EngineStats {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}
