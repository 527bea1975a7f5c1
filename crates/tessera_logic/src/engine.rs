//! # Transaction Engine
//!
//! Processes batches of events through their handlers:
//!
//! ```text
//! events ─▶ group by (kind, merge key) ─▶ merge ─┬─▶ resolve ─▶ apply ─▶ commit ─▶ publish facts
//!                                                │       ▲                   │
//!                                                │       └──── conflict ─────┘ (bounded retries)
//!                                                └─▶ ... independent groups run concurrently
//! ```
//!
//! A group that keeps conflicting is dead-lettered; a group whose handler
//! refuses the event is rejected. Neither affects the other groups.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use futures::StreamExt;
use tessera_core::{
    BackingStore, CancelToken, EntityId, IdAllocator, StoreError, Terrain, Vec3, VersionedEntity,
};
use tessera_firehose::{Fact, FactPayload, Firehose};
use tessera_replica::ReplicaTable;
use tracing::{debug, error, warn};

use crate::config::EngineConfig;
use crate::context::Context;
use crate::dead_letter::{DeadLetter, DeadLetterQueue};
use crate::error::{EngineError, EngineResult, HandlerError};
use crate::event::{Event, EventKind, MergeKey};
use crate::handler::{EventHandler, HandlerMode, HandlerRegistry};
use crate::handlers::MovementPath;
use crate::involved::{Freshness, Involved, InvolvedQueries, Query};
use crate::report::{BatchReport, EngineStats, Outcome, ReportEntry};
use crate::transaction::{Commit, Transaction};

/// Events sharing a kind and merge key, folded into one.
struct Group {
    kind: EventKind,
    key: MergeKey,
    event: Event,
    merged: usize,
}

/// Optimistic, retrying executor for event handlers.
pub struct Engine {
    store: Arc<dyn BackingStore>,
    ids: Arc<dyn IdAllocator>,
    replica: Option<Arc<ReplicaTable>>,
    firehose: Firehose,
    registry: HandlerRegistry,
    config: EngineConfig,
    stats: Arc<EngineStats>,
    dead_letters: DeadLetterQueue,
}

impl Engine {
    /// Creates an engine with the built-in handlers and no replica.
    #[must_use]
    pub fn new(
        store: Arc<dyn BackingStore>,
        ids: Arc<dyn IdAllocator>,
        firehose: Firehose,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            ids,
            replica: None,
            firehose,
            registry: HandlerRegistry::builtin(&config),
            dead_letters: DeadLetterQueue::new(config.dead_letter_capacity),
            stats: Arc::new(EngineStats::default()),
            config,
        }
    }

    /// Serves stale reads and terrain lookups from `replica`.
    #[must_use]
    pub fn with_replica(mut self, replica: Arc<ReplicaTable>) -> Self {
        self.replica = Some(replica);
        self
    }

    /// Replaces the handler registry.
    #[must_use]
    pub fn with_registry(mut self, registry: HandlerRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Registered handlers.
    #[must_use]
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Counters, shared with [`Engine::movement`].
    #[must_use]
    pub fn stats(&self) -> Arc<EngineStats> {
        Arc::clone(&self.stats)
    }

    /// Events given up on.
    #[must_use]
    pub fn dead_letters(&self) -> &DeadLetterQueue {
        &self.dead_letters
    }

    /// Fast path for short-circuited movement, sharing this engine's store,
    /// counters and dead-letter queue.
    #[must_use]
    pub fn movement(&self) -> MovementPath {
        MovementPath::new(
            Arc::clone(&self.store),
            &self.config,
            Arc::clone(&self.stats),
            self.dead_letters.clone(),
        )
    }

    /// Processes one event on its own.
    pub async fn process(&self, event: Event) -> Outcome {
        self.process_batch(vec![event], &CancelToken::new())
            .await
            .entries
            .pop()
            .map_or(Outcome::NoOp, |entry| entry.outcome)
    }

    /// Processes a batch. Returns one entry per merge group, in the order
    /// each group's first event arrived.
    ///
    /// Groups not started when `cancel` fires are reported as cancelled.
    pub async fn process_batch(&self, events: Vec<Event>, cancel: &CancelToken) -> BatchReport {
        EngineStats::bump(&self.stats.batches);
        let received = events.len();
        let groups = self.group(events);
        debug!(received, groups = groups.len(), "processing batch");

        let mut entries: Vec<(usize, ReportEntry)> = futures::stream::iter(groups.into_iter().enumerate())
            .map(|(index, group)| async move { (index, self.run_group(group, cancel).await) })
            .buffer_unordered(self.config.max_concurrency.max(1))
            .collect()
            .await;
        entries.sort_by_key(|(index, _)| *index);

        BatchReport {
            entries: entries.into_iter().map(|(_, entry)| entry).collect(),
        }
    }

    fn group(&self, events: Vec<Event>) -> Vec<Group> {
        let mut groups: Vec<Group> = Vec::with_capacity(events.len());
        let mut index: HashMap<(EventKind, MergeKey), usize> = HashMap::new();

        for event in events {
            self.stats
                .events_received
                .fetch_add(1, Ordering::Relaxed);
            let kind = event.kind();
            let handler = self.registry.get(kind);
            let key = handler.map_or_else(|| MergeKey::Entity(event.actor()), |h| h.merge_key(&event));

            if let Some(&at) = index.get(&(kind, key)) {
                let group = &mut groups[at];
                let existing = group.event.clone();
                group.event = match handler {
                    Some(h) => h.merge(existing, event),
                    None => event,
                };
                group.merged += 1;
                EngineStats::bump(&self.stats.events_merged);
                continue;
            }
            index.insert((kind, key), groups.len());
            groups.push(Group {
                kind,
                key,
                event,
                merged: 1,
            });
        }
        groups
    }

    async fn run_group(&self, group: Group, cancel: &CancelToken) -> ReportEntry {
        let Group {
            kind,
            key,
            event,
            merged,
        } = group;
        let entry = |attempts: u32, outcome: Outcome| ReportEntry {
            kind,
            key,
            merged,
            attempts,
            outcome,
        };

        if cancel.is_cancelled() {
            EngineStats::bump(&self.stats.cancelled);
            return entry(0, Outcome::Cancelled);
        }
        let Some(handler) = self.registry.get(kind).cloned() else {
            EngineStats::bump(&self.stats.rejected);
            return entry(0, Outcome::Rejected(EngineError::NoHandler(kind)));
        };
        if handler.mode() == HandlerMode::ShortCircuited {
            debug!(%kind, "short-circuited kind refused by the generic engine");
            EngineStats::bump(&self.stats.rejected);
            return entry(0, Outcome::Rejected(EngineError::UnsupportedKind(kind)));
        }

        let reserved = match handler.creates(&event) {
            0 => Vec::new(),
            n => match self.ids.batch(n).await {
                Ok(ids) => ids,
                Err(e) => {
                    error!(%kind, error = %e, "id allocation failed");
                    EngineStats::bump(&self.stats.rejected);
                    return entry(0, Outcome::Rejected(e.into()));
                }
            },
        };

        let max_attempts = self.config.max_attempts.max(1);
        let mut reason = String::new();
        for attempt in 1..=max_attempts {
            match self.attempt(handler.as_ref(), &event, &reserved).await {
                Ok(Commit::Applied { facts }) => {
                    EngineStats::bump(&self.stats.commits);
                    debug!(%kind, attempt, facts = facts.len(), "committed");
                    let published = self.publish(facts).await;
                    return entry(attempt, Outcome::Committed { facts: published });
                }
                Ok(Commit::NoOp) => {
                    EngineStats::bump(&self.stats.noops);
                    return entry(attempt, Outcome::NoOp);
                }
                Ok(Commit::Conflict {
                    id,
                    expected,
                    actual,
                }) => {
                    EngineStats::bump(&self.stats.conflicts);
                    debug!(%kind, %id, expected, actual, attempt, "version conflict, retrying");
                    reason = format!("version conflict on {id}: expected {expected}, found {actual}");
                }
                Err(e) => {
                    if let EngineError::Store(store) = &e {
                        error!(%kind, error = %store, "store failure");
                    } else {
                        debug!(%kind, error = %e, "event rejected");
                    }
                    EngineStats::bump(&self.stats.rejected);
                    return entry(attempt, Outcome::Rejected(e));
                }
            }
            self.backoff().await;
        }

        warn!(%kind, actor = %event.actor(), attempts = max_attempts, %reason, "event dead-lettered");
        EngineStats::bump(&self.stats.dead_lettered);
        let letter = DeadLetter {
            event,
            attempts: max_attempts,
            reason,
        };
        if !self.dead_letters.push(letter) {
            EngineStats::bump(&self.stats.dead_letters_dropped);
        }
        entry(max_attempts, Outcome::DeadLettered)
    }

    async fn attempt(
        &self,
        handler: &dyn EventHandler,
        event: &Event,
        reserved: &[EntityId],
    ) -> EngineResult<Commit> {
        let mut involved = self.resolve(&handler.involves(event)).await?;
        let mut ctx = Context::new(reserved.iter().copied());
        handler.apply(&mut involved, event, &mut ctx)?;
        let limit = self.firehose.config().max_batch_facts;
        if limit > 0 && ctx.facts().len() > limit {
            return Err(HandlerError::InvalidEvent(format!(
                "{} facts exceed the per-commit limit of {limit}",
                ctx.facts().len()
            ))
            .into());
        }
        Transaction::stage(involved, ctx)
            .commit(self.store.as_ref())
            .await
    }

    /// Resolves declared roles against the current state. Roles that find
    /// nothing are left out.
    ///
    /// Fresh entity roles are read together in one versioned store call.
    async fn resolve(&self, queries: &InvolvedQueries) -> EngineResult<Involved> {
        let wanted: Vec<EntityId> = queries
            .iter()
            .filter_map(|&(_, query, freshness)| match (query, freshness) {
                (Query::Entity(id), Freshness::Fresh) => Some(id),
                _ => None,
            })
            .collect();
        let mut fetched = if wanted.is_empty() {
            Vec::new()
        } else {
            self.store.get_with_version(&wanted).await?
        };
        if fetched.len() != wanted.len() {
            return Err(StoreError::Unavailable(format!(
                "asked for {} entities, store answered {}",
                wanted.len(),
                fetched.len()
            ))
            .into());
        }
        fetched.reverse();

        let mut involved = Involved::new();
        let mut fresh_ids: Vec<EntityId> = Vec::with_capacity(wanted.len());
        for &(role, query, freshness) in queries.iter() {
            let found = match (query, freshness) {
                (Query::Entity(_), Freshness::Fresh) => fetched.pop().flatten(),
                (Query::Entity(id), Freshness::Stale) => self.stale_entity(id).await?,
                (Query::TerrainAt(p), _) => self.terrain_at(p, freshness).await?,
            };
            let Some(snapshot) = found else {
                debug!(role, ?query, "role did not resolve");
                continue;
            };
            match freshness {
                Freshness::Fresh => {
                    let id = snapshot.id();
                    if fresh_ids.contains(&id) {
                        return Err(HandlerError::InvalidEvent(format!(
                            "{id} bound to more than one writable role"
                        ))
                        .into());
                    }
                    fresh_ids.push(id);
                    involved = involved.with_fresh(role, &snapshot);
                }
                Freshness::Stale => involved = involved.with_stale(role, snapshot),
            }
        }
        Ok(involved)
    }

    async fn stale_entity(&self, id: EntityId) -> EngineResult<Option<VersionedEntity>> {
        if let Some(cached) = self.replica.as_ref().and_then(|r| r.get(id)) {
            return Ok(Some(cached));
        }
        Ok(self.store.get(id).await?)
    }

    /// Finds the terrain shard covering `p` through the replica's spatial
    /// index; a fresh lookup then re-reads it from the store.
    async fn terrain_at(&self, p: Vec3, freshness: Freshness) -> EngineResult<Option<VersionedEntity>> {
        let covers = |e: &VersionedEntity| {
            e.entity
                .components
                .get::<Terrain>()
                .is_some_and(|t| t.column_index(p).is_some())
        };
        let Some(replica) = &self.replica else {
            return Ok(None);
        };
        let Some(candidate) = replica.scan_point(p).into_iter().find(|e| covers(e)) else {
            return Ok(None);
        };
        match freshness {
            Freshness::Stale => Ok(Some(candidate)),
            Freshness::Fresh => Ok(self.store.get(candidate.id()).await?.filter(|e| covers(e))),
        }
    }

    /// Stamps committed payloads with ids and times, then publishes them as
    /// one batch.
    async fn publish(&self, payloads: Vec<FactPayload>) -> usize {
        if payloads.is_empty() {
            return 0;
        }
        let count = payloads.len();
        let facts: Vec<Fact> = payloads.into_iter().map(Fact::new).collect();
        match self.firehose.publish(facts).await {
            Ok(_) => {
                self.stats
                    .facts_published
                    .fetch_add(count as u64, Ordering::Relaxed);
                count
            }
            Err(e) => {
                error!(error = %e, facts = count, "publishing committed facts failed");
                EngineStats::bump(&self.stats.publish_failures);
                0
            }
        }
    }

    async fn backoff(&self) {
        let pause = self.config.retry_backoff();
        if pause.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(pause).await;
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("registry", &self.registry)
            .field("replica", &self.replica.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
