//! # Changes
//!
//! [`Change`] is what a commit sends to the backing store; [`StreamChange`]
//! is what the store's change feed emits, in commit order, to replicas.

use serde::{Deserialize, Serialize};

use crate::ecs::{Entity, EntityId, Patch, Version, VersionedEntity};

/// A single guarded write.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Change {
    /// Insert a new entity. Fails if the id already exists.
    Create {
        /// Initial state.
        entity: Entity,
    },
    /// Patch an entity whose current version must equal `expected`.
    Update {
        /// Target entity.
        id: EntityId,
        /// Version the patch was computed against.
        expected: Version,
        /// Minimal diff.
        patch: Patch,
    },
    /// Remove an entity whose current version must equal `expected`.
    Delete {
        /// Target entity.
        id: EntityId,
        /// Version the delete was decided against.
        expected: Version,
    },
    /// Validate a read without writing or bumping the version.
    Guard {
        /// Entity that was read.
        id: EntityId,
        /// Version that was read.
        expected: Version,
    },
}

impl Change {
    /// Entity this change targets.
    #[must_use]
    pub fn id(&self) -> EntityId {
        match self {
            Self::Create { entity } => entity.id,
            Self::Update { id, .. } | Self::Delete { id, .. } | Self::Guard { id, .. } => *id,
        }
    }

    /// Version the store must currently hold for this change to apply.
    #[must_use]
    pub fn expected(&self) -> Version {
        match self {
            Self::Create { .. } => crate::ecs::NONEXISTENT,
            Self::Update { expected, .. }
            | Self::Delete { expected, .. }
            | Self::Guard { expected, .. } => *expected,
        }
    }

    /// Returns true if this change only validates a read.
    #[inline]
    #[must_use]
    pub fn is_guard(&self) -> bool {
        matches!(self, Self::Guard { .. })
    }
}

/// One entry of the store's ordered change feed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum StreamChange {
    /// The entity now has this state at this version.
    Upsert {
        /// New state.
        entity: Entity,
        /// Version after the commit.
        version: Version,
    },
    /// The entity was deleted by the commit producing `version`.
    Delete {
        /// Deleted entity.
        id: EntityId,
        /// Version consumed by the delete.
        version: Version,
    },
}

impl StreamChange {
    /// Entity this change concerns.
    #[must_use]
    pub fn id(&self) -> EntityId {
        match self {
            Self::Upsert { entity, .. } => entity.id,
            Self::Delete { id, .. } => *id,
        }
    }

    /// Version carried by this change.
    #[must_use]
    pub fn version(&self) -> Version {
        match self {
            Self::Upsert { version, .. } | Self::Delete { version, .. } => *version,
        }
    }
}

impl From<VersionedEntity> for StreamChange {
    fn from(snapshot: VersionedEntity) -> Self {
        Self::Upsert {
            entity: snapshot.entity,
            version: snapshot.version,
        }
    }
}
