//! # Entity Identity
//!
//! Entities are identified by an opaque 64-bit id handed out by the id
//! allocator. Every committed state of an entity carries a version; the
//! version is bumped exactly once per successful commit.

use serde::{Deserialize, Serialize};

use super::component::{ComponentMask, Components};

/// Per-entity commit counter.
///
/// `0` is reserved for "does not exist".
pub type Version = u64;

/// Version of an entity that has never been committed (or was deleted).
pub const NONEXISTENT: Version = 0;

/// Unique identifier for an entity.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
#[repr(transparent)]
pub struct EntityId(u64);

impl EntityId {
    /// Creates an entity id from its raw value.
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Little-endian byte encoding, used for stable hashing.
    #[inline]
    #[must_use]
    pub const fn to_le_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for EntityId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// An entity: an id plus its component slots.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// The unique identifier for this entity.
    pub id: EntityId,
    /// Typed component slots.
    pub components: Components,
}

impl Entity {
    /// Creates an entity with the given components.
    #[must_use]
    pub fn new(id: EntityId, components: Components) -> Self {
        Self { id, components }
    }

    /// Bitmask of attached components.
    #[inline]
    #[must_use]
    pub fn mask(&self) -> ComponentMask {
        self.components.mask()
    }
}

/// A committed entity snapshot together with the version it was read at.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VersionedEntity {
    /// The entity state.
    pub entity: Entity,
    /// Version of this state (always > 0 for a stored entity).
    pub version: Version,
}

impl VersionedEntity {
    /// Creates a versioned snapshot.
    #[must_use]
    pub fn new(entity: Entity, version: Version) -> Self {
        Self { entity, version }
    }

    /// Shortcut for the entity id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> EntityId {
        self.entity.id
    }
}
