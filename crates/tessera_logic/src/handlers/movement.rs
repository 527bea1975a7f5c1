//! # Movement
//!
//! Movement is the hottest event kind, so it skips resolution, forks and
//! facts. [`MovementPath`] does a single-entity read-modify-write guarded by
//! the version it read. [`MoveHandler`] only exists so the registry knows
//! the kind is short-circuited.

use std::sync::Arc;
use std::time::Duration;

use tessera_core::{
    Aabb, BackingStore, Bounds, Change, ChangeOutcome, ComponentKind, ComponentMask, Patch,
    Position, Vec3, VersionedEntity,
};
use tracing::{debug, error, warn};

use super::wrong_kind;
use crate::config::EngineConfig;
use crate::context::Context;
use crate::dead_letter::{DeadLetter, DeadLetterQueue};
use crate::error::{EngineError, HandlerError, HandlerResult};
use crate::event::{Event, EventKind, MergeKey};
use crate::handler::{EventHandler, HandlerMode};
use crate::involved::{Involved, InvolvedQueries};
use crate::report::{EngineStats, Outcome};

/// Registry entry for [`Event::Move`]. Never applied generically.
#[derive(Clone, Copy, Debug, Default)]
pub struct MoveHandler;

impl EventHandler for MoveHandler {
    fn kind(&self) -> EventKind {
        EventKind::Move
    }

    fn mode(&self) -> HandlerMode {
        HandlerMode::ShortCircuited
    }

    fn merge_key(&self, event: &Event) -> MergeKey {
        MergeKey::Entity(event.actor())
    }

    fn involves(&self, _event: &Event) -> InvolvedQueries {
        InvolvedQueries::new()
    }

    /// # Panics
    ///
    /// Always. Move events are applied by [`MovementPath`]; reaching this
    /// means an event would be processed twice.
    fn apply(&self, _involved: &mut Involved, _event: &Event, _ctx: &mut Context) -> HandlerResult<()> {
        panic!("move events must go through the movement path, not the generic engine")
    }
}

/// Single-entity fast path for [`Event::Move`].
#[derive(Clone)]
pub struct MovementPath {
    store: Arc<dyn BackingStore>,
    max_attempts: u32,
    backoff: Duration,
    stats: Arc<EngineStats>,
    dead_letters: DeadLetterQueue,
}

impl MovementPath {
    /// Creates a path sharing the engine's counters and dead-letter queue.
    #[must_use]
    pub fn new(
        store: Arc<dyn BackingStore>,
        config: &EngineConfig,
        stats: Arc<EngineStats>,
        dead_letters: DeadLetterQueue,
    ) -> Self {
        Self {
            store,
            max_attempts: config.max_attempts.max(1),
            backoff: config.retry_backoff(),
            stats,
            dead_letters,
        }
    }

    /// Moves the actor, retrying on version conflicts up to the attempt bound.
    pub async fn apply(&self, event: &Event) -> Outcome {
        let Event::Move { actor, to } = event else {
            EngineStats::bump(&self.stats.rejected);
            return Outcome::Rejected(wrong_kind(EventKind::Move, event).into());
        };

        let mut reason = String::new();
        for attempt in 1..=self.max_attempts {
            let snapshot = match self.store.get(*actor).await {
                Ok(Some(snapshot)) => snapshot,
                Ok(None) => {
                    EngineStats::bump(&self.stats.rejected);
                    return Outcome::Rejected(HandlerError::MissingEntity("actor").into());
                }
                Err(e) => {
                    error!(actor = %actor, error = %e, "movement read failed");
                    EngineStats::bump(&self.stats.rejected);
                    return Outcome::Rejected(EngineError::Store(e));
                }
            };
            let Some(change) = moved(&snapshot, *to) else {
                EngineStats::bump(&self.stats.noops);
                return Outcome::NoOp;
            };

            match self.store.apply(vec![change]).await {
                Ok(outcomes) => match outcomes.first() {
                    Some(ChangeOutcome::Applied(version)) => {
                        debug!(actor = %actor, version, attempt, "moved");
                        EngineStats::bump(&self.stats.commits);
                        return Outcome::Committed { facts: 0 };
                    }
                    other => {
                        EngineStats::bump(&self.stats.conflicts);
                        reason = format!("version conflict: {other:?}");
                        debug!(actor = %actor, attempt, "movement conflict, retrying");
                    }
                },
                Err(e) => {
                    error!(actor = %actor, error = %e, "movement commit failed");
                    EngineStats::bump(&self.stats.rejected);
                    return Outcome::Rejected(EngineError::Store(e));
                }
            }
            if self.backoff.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(self.backoff).await;
            }
        }

        warn!(actor = %actor, attempts = self.max_attempts, "movement dead-lettered");
        EngineStats::bump(&self.stats.dead_lettered);
        let letter = DeadLetter {
            event: event.clone(),
            attempts: self.max_attempts,
            reason,
        };
        if !self.dead_letters.push(letter) {
            EngineStats::bump(&self.stats.dead_letters_dropped);
        }
        Outcome::DeadLettered
    }
}

/// Guarded update placing the entity at `to`, carrying its bounds along.
/// `None` if the entity is already there.
fn moved(snapshot: &VersionedEntity, to: Vec3) -> Option<Change> {
    let base = &snapshot.entity.components;
    let mut next = base.clone();
    if let (Some(Position(from)), Some(Bounds(bounds))) = (base.get::<Position>(), base.get::<Bounds>()) {
        let offset = to - *from;
        next.set(Bounds(Aabb::new(bounds.min + offset, bounds.max + offset)));
    }
    next.set(Position(to));

    let patch = Patch::diff(
        base,
        &next,
        ComponentMask::of(&[ComponentKind::Position, ComponentKind::Bounds]),
    );
    (!patch.is_empty()).then(|| Change::Update {
        id: snapshot.id(),
        expected: snapshot.version,
        patch,
    })
}
