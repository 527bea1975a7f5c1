//! # Facts
//!
//! Immutable records of something that happened, published only after the
//! commit that caused them succeeded. Consumers dedupe redeliveries by
//! [`Fact::id`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tessera_core::{EntityId, ItemStack};
use uuid::Uuid;

/// What happened.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FactPayload {
    /// Items moved from one inventory to another.
    ItemTransferred {
        /// Giver.
        from: EntityId,
        /// Receiver.
        to: EntityId,
        /// Items moved.
        stack: ItemStack,
    },
    /// An item drop was picked up.
    ItemCollected {
        /// Collector.
        collector: EntityId,
        /// The drop entity (now deleted).
        drop: EntityId,
        /// Items collected.
        stack: ItemStack,
    },
    /// Items were dropped into the world.
    ItemDropped {
        /// Entity that dropped the items.
        dropper: EntityId,
        /// The new drop entity.
        drop: EntityId,
        /// Items dropped.
        stack: ItemStack,
    },
    /// Health was reduced.
    EntityDamaged {
        /// Attacker.
        attacker: EntityId,
        /// Target.
        target: EntityId,
        /// Damage actually dealt.
        amount: u32,
        /// Hit points left.
        remaining: u32,
    },
    /// Health reached zero and the entity was removed.
    EntityDied {
        /// The dead entity.
        target: EntityId,
        /// Who dealt the final blow.
        killer: EntityId,
    },
    /// A label was set.
    LabelChanged {
        /// Relabelled entity.
        entity: EntityId,
        /// New text.
        label: String,
    },
}

/// A timestamped, uniquely identified fact.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    /// Unique id, stable across redeliveries.
    pub id: Uuid,
    /// When the fact was produced.
    pub at: DateTime<Utc>,
    /// What happened.
    pub payload: FactPayload,
}

impl Fact {
    /// Stamps a payload with a fresh id and the current time.
    #[must_use]
    pub fn new(payload: FactPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            at: Utc::now(),
            payload,
        }
    }
}

impl From<FactPayload> for Fact {
    fn from(payload: FactPayload) -> Self {
        Self::new(payload)
    }
}
