//! # Entity Component Model
//!
//! Versioned entities with a fixed, typed component schema, and forks
//! ([`Delta`]) used to stage edits before a guarded commit.
//!
//! ## Design Philosophy
//!
//! - One optional slot per component kind, no runtime-shaped property bags
//! - Versions bump exactly once per successful commit, `0` means absent
//! - Cross-entity references are plain ids

mod component;
mod delta;
mod entity;
mod math;

pub use component::{
    Bounds, Component, ComponentKind, ComponentMask, Components, CreatedBy, Health, Inventory,
    ItemDrop, ItemId, ItemStack, Label, Patch, Position, Terrain, MAX_WATER_LEVEL,
    TERRAIN_SHARD_SIZE,
};
pub use delta::Delta;
pub use entity::{Entity, EntityId, Version, VersionedEntity, NONEXISTENT};
pub use math::{Aabb, Vec3};
