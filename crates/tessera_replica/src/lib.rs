//! # TESSERA Replica
//!
//! Local materialized views over the entity universe:
//! - [`SpatialIndex`]: hash grid answering point, box and sphere queries
//! - [`ReplicaTable`]: filtered mirror fed by the store's change stream,
//!   converging to the highest version per entity regardless of arrival order
//!
//! Replicas are eventually consistent. Anything that must validate against
//! committed state reads the backing store instead.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod spatial;
pub mod table;

pub use config::ReplicaConfig;
pub use error::{ReplicaError, ReplicaResult};
pub use spatial::{SpatialIndex, Volume, MAX_CELLS_PER_ENTRY, MAX_CELLS_PER_QUERY};
pub use table::{ApplyOutcome, ReplicaStats, ReplicaTable};
