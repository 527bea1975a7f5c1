//! # Transactions
//!
//! Turns one attempt's forks and context into a single all-or-nothing
//! change set. Every fresh read ends up in the set: modified forks as
//! updates or deletes, untouched ones as guards.

use tessera_core::{BackingStore, Change, ChangeOutcome, EntityId, Version};
use tessera_firehose::FactPayload;

use crate::context::Context;
use crate::error::EngineResult;
use crate::involved::Involved;

/// Result of [`Transaction::commit`].
#[derive(Debug)]
pub enum Commit {
    /// Written; these facts may now be published.
    Applied {
        /// Fact payloads queued by `apply`, not yet stamped.
        facts: Vec<FactPayload>,
    },
    /// Nothing was staged; the store was not called.
    NoOp,
    /// A read or write was based on an outdated version.
    Conflict {
        /// First entity found in conflict.
        id: EntityId,
        /// Version the change carried.
        expected: Version,
        /// Version the store holds.
        actual: Version,
    },
}

/// Change set and facts of one apply attempt.
#[derive(Debug)]
pub struct Transaction {
    changes: Vec<Change>,
    mutations: usize,
    facts: Vec<FactPayload>,
}

impl Transaction {
    /// Collects the staged work of an attempt.
    #[must_use]
    pub fn stage(involved: Involved, ctx: Context) -> Self {
        let (created, facts) = ctx.into_parts();
        let mut changes = Vec::new();
        let mut mutations = 0;

        for fork in involved.into_forks() {
            let guard = fork.guard();
            match fork.into_change() {
                Some(change) => {
                    mutations += 1;
                    changes.push(change);
                }
                None => changes.push(guard),
            }
        }
        for fork in created {
            if let Some(change) = fork.into_change() {
                mutations += 1;
                changes.push(change);
            }
        }

        Self {
            changes,
            mutations,
            facts,
        }
    }

    /// Returns true if nothing was mutated and no fact was queued.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.mutations == 0 && self.facts.is_empty()
    }

    /// Changes that would be sent, guards included.
    #[must_use]
    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    /// Number of non-guard changes.
    #[must_use]
    pub fn mutations(&self) -> usize {
        self.mutations
    }

    /// Queued fact payloads.
    #[must_use]
    pub fn facts(&self) -> &[FactPayload] {
        &self.facts
    }

    /// Applies the change set atomically.
    ///
    /// A fact-only transaction commits its guards alone, so facts still
    /// follow a validated read. An empty transaction does not reach the store.
    pub async fn commit(self, store: &dyn BackingStore) -> EngineResult<Commit> {
        if self.is_noop() {
            return Ok(Commit::NoOp);
        }
        let ids: Vec<(EntityId, Version)> =
            self.changes.iter().map(|c| (c.id(), c.expected())).collect();
        let outcomes = store.apply(self.changes).await?;

        if outcomes.iter().all(ChangeOutcome::is_applied) {
            return Ok(Commit::Applied { facts: self.facts });
        }
        let conflict = ids
            .iter()
            .zip(&outcomes)
            .find_map(|((id, _), outcome)| match outcome {
                ChangeOutcome::Conflict { expected, actual } => Some(Commit::Conflict {
                    id: *id,
                    expected: *expected,
                    actual: *actual,
                }),
                _ => None,
            });
        Ok(conflict.unwrap_or_else(|| {
            let (id, expected) = ids.first().copied().unwrap_or_default();
            Commit::Conflict {
                id,
                expected,
                actual: tessera_core::NONEXISTENT,
            }
        }))
    }
}
