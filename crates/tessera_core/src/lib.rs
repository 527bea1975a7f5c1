//! # TESSERA Core
//!
//! Versioned entity model and the store contracts everything else is built on:
//! - Fixed, typed component schema with a bitmask per entity
//! - Forks ([`Delta`]) that stage edits and finalize into a guarded [`Change`]
//! - Narrow async traits for the backing store, change feed and id allocator
//!
//! ## Architecture Rules
//!
//! 1. **Every write is guarded** - a change carries the version it was computed against
//! 2. **Versions only grow** - one bump per successful commit, `0` means absent
//! 3. **Forks never touch the store** - commit is the caller's job
//!
//! ## Example
//!
//! ```rust,ignore
//! use tessera_core::{Delta, Health};
//!
//! let snapshot = store.get(id).await?.unwrap();
//! let mut fork = Delta::fork(&snapshot);
//! fork.mutable::<Health>().current -= 5;
//! store.apply(fork.into_change().into_iter().collect()).await?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod change;
pub mod ecs;
pub mod error;
pub mod store;
pub mod sync;

pub use change::{Change, StreamChange};
pub use ecs::{
    Aabb, Bounds, Component, ComponentKind, ComponentMask, Components, CreatedBy, Delta, Entity,
    EntityId, Health, Inventory, ItemDrop, ItemId, ItemStack, Label, Patch, Position, Terrain,
    Vec3, Version, VersionedEntity, MAX_WATER_LEVEL, NONEXISTENT, TERRAIN_SHARD_SIZE,
};
pub use error::{StoreError, StoreResult};
pub use store::{
    BackingStore, ChangeFeed, ChangeOutcome, ChangeReceiver, IdAllocator, MemoryStore,
    SequentialIds,
};
pub use sync::CancelToken;
