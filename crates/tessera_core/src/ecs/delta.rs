//! # Delta (Fork)
//!
//! A staged read/write overlay over one entity snapshot. Reads return the
//! staged value if one exists, otherwise the base value. Nothing here touches
//! the backing store: [`Delta::into_change`] turns the staged edits into a
//! single guarded [`Change`] that the caller commits.

use super::component::{Component, ComponentKind, ComponentMask, Components, Patch};
use super::entity::{Entity, EntityId, Version, VersionedEntity, NONEXISTENT};
use crate::change::Change;

/// Staged overlay over an entity snapshot.
#[derive(Clone, Debug)]
pub struct Delta {
    id: EntityId,
    base: Components,
    base_version: Version,
    working: Components,
    dirty: ComponentMask,
    deleted: bool,
}

impl Delta {
    /// Forks an existing entity at the version it was read.
    #[must_use]
    pub fn fork(snapshot: &VersionedEntity) -> Self {
        Self {
            id: snapshot.entity.id,
            base: snapshot.entity.components.clone(),
            base_version: snapshot.version,
            working: snapshot.entity.components.clone(),
            dirty: ComponentMask::EMPTY,
            deleted: false,
        }
    }

    /// Starts a fork for an entity that does not exist yet.
    #[must_use]
    pub fn create(id: EntityId, components: Components) -> Self {
        let dirty = components.mask();
        Self {
            id,
            base: Components::default(),
            base_version: NONEXISTENT,
            working: components,
            dirty,
            deleted: false,
        }
    }

    /// Entity id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Version the fork was taken at (`0` for a new entity).
    #[inline]
    #[must_use]
    pub fn base_version(&self) -> Version {
        self.base_version
    }

    /// Returns true if this fork creates a new entity.
    #[inline]
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.base_version == NONEXISTENT
    }

    /// Returns true if [`Delta::delete`] was called.
    #[inline]
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Returns true if every listed kind is present.
    #[must_use]
    pub fn has(&self, kinds: &[ComponentKind]) -> bool {
        !self.deleted && self.working.has_all(ComponentMask::of(kinds))
    }

    /// Current value of a component, staged or base.
    #[must_use]
    pub fn get<C: Component>(&self) -> Option<&C> {
        if self.deleted {
            return None;
        }
        self.working.get::<C>()
    }

    /// Materializes the component with its default value if absent and
    /// returns it for in-place editing.
    pub fn mutable<C: Component>(&mut self) -> &mut C {
        self.dirty.insert(C::KIND);
        C::slot_mut(&mut self.working).get_or_insert_with(C::default)
    }

    /// Stages a new value for a component.
    pub fn set<C: Component>(&mut self, value: C) {
        self.dirty.insert(C::KIND);
        self.working.set(value);
    }

    /// Stages the removal of a component.
    pub fn clear<C: Component>(&mut self) {
        self.dirty.insert(C::KIND);
        self.working.take::<C>();
    }

    /// Stages deletion of the whole entity.
    pub fn delete(&mut self) {
        self.deleted = true;
    }

    /// Read-set guard for this fork's base version.
    #[must_use]
    pub fn guard(&self) -> Change {
        Change::Guard {
            id: self.id,
            expected: self.base_version,
        }
    }

    /// Finalizes the staged edits into a guarded change.
    ///
    /// Components mutated back to their base value are not written. Returns
    /// `None` when nothing effective was staged (including a new entity that
    /// was deleted before commit).
    #[must_use]
    pub fn into_change(self) -> Option<Change> {
        match (self.is_new(), self.deleted) {
            (true, true) => None,
            (true, false) => Some(Change::Create {
                entity: Entity::new(self.id, self.working),
            }),
            (false, true) => Some(Change::Delete {
                id: self.id,
                expected: self.base_version,
            }),
            (false, false) => {
                let patch = Patch::diff(&self.base, &self.working, self.dirty);
                (!patch.is_empty()).then_some(Change::Update {
                    id: self.id,
                    expected: self.base_version,
                    patch,
                })
            }
        }
    }
}
