//! In-memory backing store.
//!
//! A single lock guards the entity map, so every `apply` is atomic and the
//! change feed sees commits in exactly the order they were applied.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use super::{BackingStore, ChangeFeed, ChangeOutcome, ChangeReceiver};
use crate::change::{Change, StreamChange};
use crate::ecs::{EntityId, Version, VersionedEntity, NONEXISTENT};
use crate::error::StoreResult;

#[derive(Default)]
struct State {
    entities: HashMap<EntityId, VersionedEntity>,
    /// Last version consumed by a delete. Re-creating the id continues from here.
    tombstones: HashMap<EntityId, Version>,
    subscribers: Vec<mpsc::UnboundedSender<Vec<StreamChange>>>,
    commits: u64,
}

impl State {
    fn current_version(&self, id: EntityId) -> Version {
        self.entities.get(&id).map_or(NONEXISTENT, |e| e.version)
    }

    fn validate(&self, changes: &[Change]) -> Option<Vec<ChangeOutcome>> {
        let mut outcomes: Vec<ChangeOutcome> = changes
            .iter()
            .map(|change| {
                let actual = self.current_version(change.id());
                let expected = change.expected();
                if actual == expected {
                    ChangeOutcome::Applied(actual)
                } else {
                    ChangeOutcome::Conflict { expected, actual }
                }
            })
            .collect();

        if outcomes.iter().all(ChangeOutcome::is_applied) {
            return None;
        }
        for outcome in &mut outcomes {
            if outcome.is_applied() {
                *outcome = ChangeOutcome::Aborted;
            }
        }
        Some(outcomes)
    }

    fn write(&mut self, change: Change) -> (ChangeOutcome, Option<StreamChange>) {
        match change {
            Change::Guard { id, .. } => (ChangeOutcome::Applied(self.current_version(id)), None),
            Change::Create { entity } => {
                let version = self.tombstones.remove(&entity.id).unwrap_or(NONEXISTENT) + 1;
                let snapshot = VersionedEntity::new(entity, version);
                self.entities.insert(snapshot.id(), snapshot.clone());
                (ChangeOutcome::Applied(version), Some(snapshot.into()))
            }
            Change::Update { id, patch, .. } => match self.entities.get_mut(&id) {
                Some(stored) => {
                    stored.entity.components.apply_patch(&patch);
                    stored.version += 1;
                    (ChangeOutcome::Applied(stored.version), Some(stored.clone().into()))
                }
                None => (ChangeOutcome::Aborted, None),
            },
            Change::Delete { id, .. } => match self.entities.remove(&id) {
                Some(stored) => {
                    let version = stored.version + 1;
                    self.tombstones.insert(id, version);
                    (ChangeOutcome::Applied(version), Some(StreamChange::Delete { id, version }))
                }
                None => (ChangeOutcome::Aborted, None),
            },
        }
    }

    fn publish(&mut self, batch: Vec<StreamChange>) {
        if batch.is_empty() {
            return;
        }
        self.subscribers.retain(|tx| tx.send(batch.clone()).is_ok());
    }
}

/// Backing store held entirely in memory.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored entity, ordered by id.
    #[must_use]
    pub fn snapshot(&self) -> Vec<VersionedEntity> {
        let state = self.state.lock();
        let mut all: Vec<_> = state.entities.values().cloned().collect();
        all.sort_by_key(VersionedEntity::id);
        all
    }

    /// Number of successful commits so far.
    #[must_use]
    pub fn commits(&self) -> u64 {
        self.state.lock().commits
    }

    /// Number of stored entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().entities.len()
    }

    /// Returns true if no entity is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BackingStore for MemoryStore {
    async fn get(&self, id: EntityId) -> StoreResult<Option<VersionedEntity>> {
        Ok(self.state.lock().entities.get(&id).cloned())
    }

    async fn get_with_version(&self, ids: &[EntityId]) -> StoreResult<Vec<Option<VersionedEntity>>> {
        let state = self.state.lock();
        Ok(ids.iter().map(|id| state.entities.get(id).cloned()).collect())
    }

    async fn apply(&self, changes: Vec<Change>) -> StoreResult<Vec<ChangeOutcome>> {
        let mut state = self.state.lock();
        if let Some(rejected) = state.validate(&changes) {
            debug!(changes = changes.len(), "commit rejected by version check");
            return Ok(rejected);
        }

        let mut outcomes = Vec::with_capacity(changes.len());
        let mut stream = Vec::new();
        for change in changes {
            let (outcome, emitted) = state.write(change);
            outcomes.push(outcome);
            stream.extend(emitted);
        }
        state.commits += 1;
        state.publish(stream);
        Ok(outcomes)
    }
}

impl ChangeFeed for MemoryStore {
    fn subscribe(&self) -> ChangeReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.lock().subscribers.push(tx);
        rx
    }
}
