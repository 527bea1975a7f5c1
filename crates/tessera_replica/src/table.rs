//! # Replica Table
//!
//! A local, filtered mirror of the entity universe fed by the store's
//! ordered change stream. Reads here are eventually consistent; readers that
//! need the committed truth go to the backing store.
//!
//! Per-entity state machine:
//!
//! ```text
//!   absent ──upsert(v), matches──▶ present(v)
//!   present(v) ──upsert(v' > v)──▶ present(v')
//!   present(v) ──delete(v') / upsert(v') no longer matching──▶ absent(tombstone v')
//!   any ──change with version <= held or tombstone──▶ dropped
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tessera_core::{
    Aabb, Bounds, CancelToken, ChangeReceiver, ComponentMask, Entity, EntityId, Position,
    StreamChange, Vec3, Version, VersionedEntity, NONEXISTENT,
};
use tracing::{debug, info};

use crate::config::ReplicaConfig;
use crate::error::{ReplicaError, ReplicaResult};
use crate::spatial::{SpatialIndex, Volume};

/// What [`ReplicaTable::apply`] did with a change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The entity was absent and is now held.
    Inserted,
    /// A held entity moved to a newer version.
    Updated,
    /// A held entity was dropped (deleted or no longer matching).
    Removed,
    /// Newer than anything seen, but the entity is not held (filtered out
    /// or already absent). The version is remembered.
    Ignored,
    /// Not newer than the held or last removed version; discarded.
    Stale,
}

/// Counters for a replica table.
#[derive(Debug, Default)]
pub struct ReplicaStats {
    /// Changes that modified the table.
    pub applied: AtomicU64,
    /// Changes discarded as stale.
    pub stale: AtomicU64,
    /// Changes for entities outside the filter.
    pub ignored: AtomicU64,
    /// Batches consumed from a change feed.
    pub batches: AtomicU64,
}

#[derive(Default)]
struct Rows {
    entities: HashMap<EntityId, VersionedEntity>,
    tombstones: HashMap<EntityId, Version>,
}

impl Rows {
    fn held_version(&self, id: EntityId) -> Version {
        self.entities
            .get(&id)
            .map(|e| e.version)
            .or_else(|| self.tombstones.get(&id).copied())
            .unwrap_or(NONEXISTENT)
    }
}

/// Spatially indexed, filtered mirror of the entity universe.
pub struct ReplicaTable {
    filter: ComponentMask,
    rows: RwLock<Rows>,
    index: RwLock<SpatialIndex>,
    stats: ReplicaStats,
}

fn volume_of(entity: &Entity) -> Option<Volume> {
    let c = &entity.components;
    c.get::<Bounds>()
        .map(|b| Volume::Box(b.0))
        .or_else(|| c.get::<Position>().map(|p| Volume::Point(p.0)))
}

impl ReplicaTable {
    /// Creates a table holding only entities that carry every kind in `filter`.
    #[must_use]
    pub fn new(filter: ComponentMask, config: &ReplicaConfig) -> Self {
        Self {
            filter,
            rows: RwLock::new(Rows::default()),
            index: RwLock::new(SpatialIndex::new(config.cell_size)),
            stats: ReplicaStats::default(),
        }
    }

    /// Required component mask.
    #[inline]
    #[must_use]
    pub fn filter(&self) -> ComponentMask {
        self.filter
    }

    /// Applies one change from the feed.
    pub fn apply(&self, change: StreamChange) -> ApplyOutcome {
        let mut rows = self.rows.write();
        let id = change.id();
        let version = change.version();
        if version <= rows.held_version(id) {
            self.stats.stale.fetch_add(1, Ordering::Relaxed);
            return ApplyOutcome::Stale;
        }

        let was_held = rows.entities.contains_key(&id);
        let keep = match change {
            StreamChange::Upsert { entity, version } if entity.components.has_all(self.filter) => {
                Some(VersionedEntity::new(entity, version))
            }
            StreamChange::Upsert { .. } | StreamChange::Delete { .. } => None,
        };

        let outcome = match keep {
            Some(snapshot) => {
                let volume = volume_of(&snapshot.entity);
                rows.tombstones.remove(&id);
                rows.entities.insert(id, snapshot);
                let mut index = self.index.write();
                match volume {
                    Some(volume) => index.update(id, volume),
                    None => {
                        index.delete(id);
                    }
                }
                if was_held {
                    ApplyOutcome::Updated
                } else {
                    ApplyOutcome::Inserted
                }
            }
            None => {
                rows.entities.remove(&id);
                rows.tombstones.insert(id, version);
                self.index.write().delete(id);
                if was_held {
                    ApplyOutcome::Removed
                } else {
                    ApplyOutcome::Ignored
                }
            }
        };

        let counter = match outcome {
            ApplyOutcome::Ignored => &self.stats.ignored,
            _ => &self.stats.applied,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        outcome
    }

    /// Applies changes in order.
    pub fn apply_batch(&self, changes: impl IntoIterator<Item = StreamChange>) -> Vec<ApplyOutcome> {
        changes.into_iter().map(|c| self.apply(c)).collect()
    }

    /// Seeds the table from a full snapshot of the store.
    pub fn bootstrap(&self, snapshot: impl IntoIterator<Item = VersionedEntity>) -> usize {
        self.apply_batch(snapshot.into_iter().map(StreamChange::from))
            .into_iter()
            .filter(|o| matches!(o, ApplyOutcome::Inserted | ApplyOutcome::Updated))
            .count()
    }

    /// Held state of an entity.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<VersionedEntity> {
        self.rows.read().entities.get(&id).cloned()
    }

    /// Held version of an entity, `0` if absent.
    #[must_use]
    pub fn version(&self, id: EntityId) -> Version {
        self.rows
            .read()
            .entities
            .get(&id)
            .map_or(NONEXISTENT, |e| e.version)
    }

    /// Number of held entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.read().entities.len()
    }

    /// Returns true if nothing is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Held entities covering `p`.
    #[must_use]
    pub fn scan_point(&self, p: Vec3) -> Vec<VersionedEntity> {
        let ids = self.index.read().scan_point(p);
        self.resolve(&ids)
    }

    /// Held entities intersecting `query`.
    #[must_use]
    pub fn scan_box(&self, query: &Aabb) -> Vec<VersionedEntity> {
        let ids = self.index.read().scan_box(query);
        self.resolve(&ids)
    }

    /// Held entities within `radius` of `center`.
    #[must_use]
    pub fn scan_sphere(&self, center: Vec3, radius: f32) -> Vec<VersionedEntity> {
        let ids = self.index.read().scan_sphere(center, radius);
        self.resolve(&ids)
    }

    fn resolve(&self, ids: &[EntityId]) -> Vec<VersionedEntity> {
        let rows = self.rows.read();
        ids.iter().filter_map(|id| rows.entities.get(id).cloned()).collect()
    }

    /// Counters.
    #[inline]
    #[must_use]
    pub fn stats(&self) -> &ReplicaStats {
        &self.stats
    }

    /// Consumes a change feed until it closes or `cancel` fires.
    ///
    /// Batches are applied in arrival order. Returns `Ok` on cancellation and
    /// [`ReplicaError::StreamClosed`] if the feed ends first.
    pub async fn follow(&self, mut feed: ChangeReceiver, cancel: CancelToken) -> ReplicaResult<()> {
        info!(filter = ?self.filter, "replica following change feed");
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!(held = self.len(), "replica follow cancelled");
                    return Ok(());
                }
                batch = feed.recv() => match batch {
                    Some(batch) => {
                        debug!(changes = batch.len(), "replica batch");
                        self.apply_batch(batch);
                        self.stats.batches.fetch_add(1, Ordering::Relaxed);
                    }
                    None => return Err(ReplicaError::StreamClosed),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::{ComponentKind, Components, Health, Label};

    fn upsert(id: u64, version: Version, components: Components) -> StreamChange {
        StreamChange::Upsert {
            entity: Entity::new(EntityId::new(id), components),
            version,
        }
    }

    fn positioned(x: f32) -> Components {
        Components::default().with(Position::new(x, 0.0, 0.0))
    }

    fn table() -> ReplicaTable {
        ReplicaTable::new(
            ComponentMask::of(&[ComponentKind::Position]),
            &ReplicaConfig::default(),
        )
    }

    #[test]
    fn test_versions_only_move_forward() {
        let t = table();
        assert_eq!(t.apply(upsert(1, 2, positioned(1.0))), ApplyOutcome::Inserted);
        assert_eq!(t.apply(upsert(1, 1, positioned(9.0))), ApplyOutcome::Stale);
        assert_eq!(t.apply(upsert(1, 2, positioned(9.0))), ApplyOutcome::Stale);
        assert_eq!(t.apply(upsert(1, 3, positioned(5.0))), ApplyOutcome::Updated);

        assert_eq!(t.version(EntityId::new(1)), 3);
        assert_eq!(t.scan_point(Vec3::new(5.0, 0.0, 0.0)).len(), 1);
        assert!(t.scan_point(Vec3::new(1.0, 0.0, 0.0)).is_empty());
        assert_eq!(t.stats().stale.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_delete_tombstones_older_upserts() {
        let t = table();
        t.apply(upsert(1, 1, positioned(1.0)));
        let out = t.apply(StreamChange::Delete { id: EntityId::new(1), version: 2 });
        assert_eq!(out, ApplyOutcome::Removed);
        assert_eq!(t.apply(upsert(1, 1, positioned(1.0))), ApplyOutcome::Stale);
        assert!(t.get(EntityId::new(1)).is_none());
        assert!(t.scan_point(Vec3::new(1.0, 0.0, 0.0)).is_empty());
    }

    #[test]
    fn test_filter_drops_non_matching() {
        let t = table();
        let unplaced = Components::default().with(Label("ghost".into()));
        assert_eq!(t.apply(upsert(1, 1, unplaced.clone())), ApplyOutcome::Ignored);

        t.apply(upsert(2, 1, positioned(0.0)));
        assert_eq!(t.apply(upsert(2, 2, unplaced)), ApplyOutcome::Removed);
        assert!(t.is_empty());
    }

    #[test]
    fn test_bounds_take_precedence_over_position() {
        let t = table();
        let components = positioned(100.0).with(Bounds(Aabb::new(
            Vec3::ZERO,
            Vec3::new(4.0, 4.0, 4.0),
        )));
        t.apply(upsert(1, 1, components));
        assert_eq!(t.scan_point(Vec3::new(2.0, 2.0, 2.0)).len(), 1);
        assert!(t.scan_point(Vec3::new(100.0, 0.0, 0.0)).is_empty());
    }

    #[test]
    fn test_bootstrap_counts_held() {
        let t = table();
        let snapshot = vec![
            VersionedEntity::new(Entity::new(EntityId::new(1), positioned(0.0)), 4),
            VersionedEntity::new(
                Entity::new(EntityId::new(2), Components::default().with(Health::full(1))),
                1,
            ),
        ];
        assert_eq!(t.bootstrap(snapshot), 1);
        assert_eq!(t.len(), 1);
    }

    #[tokio::test]
    async fn test_follow_applies_until_cancel() {
        let t = std::sync::Arc::new(table());
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let cancel = CancelToken::new();

        let runner = {
            let t = std::sync::Arc::clone(&t);
            let cancel = cancel.clone();
            tokio::spawn(async move { t.follow(rx, cancel).await })
        };

        tx.send(vec![upsert(1, 1, positioned(0.0))]).unwrap();
        tx.send(vec![upsert(1, 2, positioned(3.0))]).unwrap();
        while t.stats().batches.load(Ordering::Relaxed) < 2 {
            tokio::task::yield_now().await;
        }
        cancel.cancel();

        assert!(runner.await.unwrap().is_ok());
        assert_eq!(t.version(EntityId::new(1)), 2);
    }

    #[tokio::test]
    async fn test_follow_reports_closed_stream() {
        let t = table();
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<Vec<StreamChange>>();
        drop(tx);
        assert_eq!(t.follow(rx, CancelToken::new()).await, Err(ReplicaError::StreamClosed));
    }
}
