//! # Events
//!
//! Immutable records of an intended action, as they arrive from the RPC
//! layer. Every event names the entity acting; the rest is kind-specific.

use serde::{Deserialize, Serialize};
use tessera_core::{EntityId, ItemStack, Vec3};

/// An intended action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    /// Move an entity to a new position. Handled by the movement path.
    Move {
        /// Entity moving.
        actor: EntityId,
        /// Destination.
        to: Vec3,
    },
    /// Fill the terrain cell at a position with water.
    DumpWater {
        /// Entity pouring.
        actor: EntityId,
        /// World position of the cell.
        position: Vec3,
    },
    /// Set an entity's display label.
    Label {
        /// Entity relabelling itself.
        actor: EntityId,
        /// New text.
        text: String,
    },
    /// Hand items to another entity.
    Give {
        /// Giver.
        actor: EntityId,
        /// Receiver.
        target: EntityId,
        /// Items to move.
        stack: ItemStack,
    },
    /// Pick up an item drop.
    Collect {
        /// Collector.
        actor: EntityId,
        /// Drop entity.
        drop: EntityId,
    },
    /// Drop items into the world at the actor's position.
    DropItem {
        /// Entity dropping.
        actor: EntityId,
        /// Items to drop.
        stack: ItemStack,
    },
    /// Hit another entity.
    Damage {
        /// Attacker (the acting entity).
        attacker: EntityId,
        /// Target.
        target: EntityId,
        /// Raw damage.
        amount: u32,
    },
}

impl Event {
    /// Entity performing the action.
    #[must_use]
    pub fn actor(&self) -> EntityId {
        match self {
            Self::Move { actor, .. }
            | Self::DumpWater { actor, .. }
            | Self::Label { actor, .. }
            | Self::Give { actor, .. }
            | Self::Collect { actor, .. }
            | Self::DropItem { actor, .. } => *actor,
            Self::Damage { attacker, .. } => *attacker,
        }
    }

    /// Discriminator.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Move { .. } => EventKind::Move,
            Self::DumpWater { .. } => EventKind::DumpWater,
            Self::Label { .. } => EventKind::Label,
            Self::Give { .. } => EventKind::Give,
            Self::Collect { .. } => EventKind::Collect,
            Self::DropItem { .. } => EventKind::DropItem,
            Self::Damage { .. } => EventKind::Damage,
        }
    }
}

/// Event discriminator, used to look up handlers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// [`Event::Move`].
    Move,
    /// [`Event::DumpWater`].
    DumpWater,
    /// [`Event::Label`].
    Label,
    /// [`Event::Give`].
    Give,
    /// [`Event::Collect`].
    Collect,
    /// [`Event::DropItem`].
    DropItem,
    /// [`Event::Damage`].
    Damage,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Move => "move",
            Self::DumpWater => "dump_water",
            Self::Label => "label",
            Self::Give => "give",
            Self::Collect => "collect",
            Self::DropItem => "drop_item",
            Self::Damage => "damage",
        };
        f.write_str(name)
    }
}

/// Deduplication key. Events of one kind with equal keys in the same batch
/// are merged into a single apply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MergeKey {
    /// Keyed by one entity.
    Entity(EntityId),
    /// Keyed by an ordered pair of entities.
    Pair(EntityId, EntityId),
    /// Keyed by a world cell (floored coordinates).
    Cell([i32; 3]),
}

impl MergeKey {
    /// Cell key of a world position.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn cell(p: Vec3) -> Self {
        Self::Cell([p.x.floor() as i32, p.y.floor() as i32, p.z.floor() as i32])
    }
}
