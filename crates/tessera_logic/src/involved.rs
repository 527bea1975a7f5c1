//! # Involved Entities
//!
//! A handler declares what it reads as a set of named queries. The engine
//! resolves them into an [`Involved`] map before calling `apply`:
//!
//! - **fresh** roles are read from the backing store with their version,
//!   forked, and guarded at commit even when left unmodified
//! - **stale** roles come from the replica (or the store when the replica
//!   lacks them) and are read-only, unguarded snapshots

use std::collections::BTreeMap;

use tessera_core::{Component, Delta, EntityId, Vec3, VersionedEntity};

use crate::error::{HandlerError, HandlerResult};

/// How current a resolution must be.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Freshness {
    /// Version-checked at commit time.
    Fresh,
    /// Best-effort cached data, read-only.
    Stale,
}

/// What to look up.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Query {
    /// A specific entity.
    Entity(EntityId),
    /// The terrain shard covering a world position.
    TerrainAt(Vec3),
}

/// Named queries declared by a handler for one event.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InvolvedQueries {
    entries: Vec<(&'static str, Query, Freshness)>,
}

impl InvolvedQueries {
    /// Empty query set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a fresh (version-checked, writable) role.
    #[must_use]
    pub fn fresh(mut self, role: &'static str, query: Query) -> Self {
        self.entries.push((role, query, Freshness::Fresh));
        self
    }

    /// Adds a stale-tolerant (read-only) role.
    #[must_use]
    pub fn stale(mut self, role: &'static str, query: Query) -> Self {
        self.entries.push((role, query, Freshness::Stale));
        self
    }

    /// Declared roles in order.
    pub fn iter(&self) -> impl Iterator<Item = &(&'static str, Query, Freshness)> {
        self.entries.iter()
    }

    /// Number of declared roles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resolved roles handed to `apply`.
///
/// A role that did not resolve (entity absent, no terrain there) is simply
/// missing; asking for it yields [`HandlerError::MissingEntity`].
#[derive(Clone, Debug, Default)]
pub struct Involved {
    fresh: BTreeMap<&'static str, Delta>,
    stale: BTreeMap<&'static str, VersionedEntity>,
}

impl Involved {
    /// Empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a fresh role forked from `snapshot`.
    #[must_use]
    pub fn with_fresh(mut self, role: &'static str, snapshot: &VersionedEntity) -> Self {
        self.fresh.insert(role, Delta::fork(snapshot));
        self
    }

    /// Adds a stale role.
    #[must_use]
    pub fn with_stale(mut self, role: &'static str, snapshot: VersionedEntity) -> Self {
        self.stale.insert(role, snapshot);
        self
    }

    /// Returns true if `role` resolved, fresh or stale.
    #[must_use]
    pub fn contains(&self, role: &str) -> bool {
        self.fresh.contains_key(role) || self.stale.contains_key(role)
    }

    /// Read access to a fresh role.
    pub fn read(&self, role: &'static str) -> HandlerResult<&Delta> {
        self.fresh.get(role).ok_or(HandlerError::MissingEntity(role))
    }

    /// Write access to a fresh role.
    pub fn fork(&mut self, role: &'static str) -> HandlerResult<&mut Delta> {
        self.fresh.get_mut(role).ok_or(HandlerError::MissingEntity(role))
    }

    /// A stale role.
    pub fn stale(&self, role: &'static str) -> HandlerResult<&VersionedEntity> {
        self.stale.get(role).ok_or(HandlerError::MissingEntity(role))
    }

    /// A component of a fresh role, required to be present.
    pub fn component<C: Component>(&self, role: &'static str) -> HandlerResult<&C> {
        self.read(role)?
            .get::<C>()
            .ok_or(HandlerError::MissingComponent { role, kind: C::KIND })
    }

    /// A component of a stale role, required to be present.
    pub fn stale_component<C: Component>(&self, role: &'static str) -> HandlerResult<&C> {
        self.stale(role)?
            .entity
            .components
            .get::<C>()
            .ok_or(HandlerError::MissingComponent { role, kind: C::KIND })
    }

    /// Fresh forks, in role-name order.
    pub fn into_forks(self) -> impl Iterator<Item = Delta> {
        self.fresh.into_values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::{Components, Entity, Health, Label};

    fn snapshot(raw: u64) -> VersionedEntity {
        let components = Components::default().with(Health::full(10));
        VersionedEntity::new(Entity::new(EntityId::new(raw), components), 2)
    }

    #[test]
    fn test_missing_roles_and_components() {
        let involved = Involved::new()
            .with_fresh("target", &snapshot(1))
            .with_stale("attacker", snapshot(2));

        assert!(involved.contains("target"));
        assert!(involved.contains("attacker"));
        assert_eq!(involved.read("actor").unwrap_err(), HandlerError::MissingEntity("actor"));
        assert_eq!(involved.component::<Health>("target").unwrap().current, 10);
        assert_eq!(
            involved.component::<Label>("target").unwrap_err(),
            HandlerError::MissingComponent {
                role: "target",
                kind: tessera_core::ComponentKind::Label
            }
        );
        assert!(involved.stale_component::<Health>("attacker").is_ok());
    }

    #[test]
    fn test_forks_carry_base_version() {
        let mut involved = Involved::new().with_fresh("target", &snapshot(1));
        involved.fork("target").unwrap().mutable::<Health>().damage(3);
        let forks: Vec<Delta> = involved.into_forks().collect();
        assert_eq!(forks.len(), 1);
        assert_eq!(forks[0].base_version(), 2);
    }

    #[test]
    fn test_query_builder_keeps_order() {
        let queries = InvolvedQueries::new()
            .fresh("actor", Query::Entity(EntityId::new(1)))
            .stale("other", Query::Entity(EntityId::new(2)));
        let roles: Vec<_> = queries.iter().map(|(role, _, f)| (*role, *f)).collect();
        assert_eq!(roles, vec![("actor", Freshness::Fresh), ("other", Freshness::Stale)]);
    }
}
