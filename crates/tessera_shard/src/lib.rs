//! # TESSERA Shard
//!
//! Lets many stateless workers share the entity space without processing
//! the same entity twice:
//! - [`ShardManager`]: `hash(id) mod total ∈ held` decides local ownership
//! - [`LeaderElection`]: one leader at a time runs the [`Rebalancer`]
//! - [`AssignmentBoard`]: where the leader publishes per-worker assignments
//!
//! ## Example
//!
//! ```rust,ignore
//! let manager = ShardManager::new(ShardAssignment::new(4, [0, 2])?)?;
//! if manager.owns_entity(event.actor()) {
//!     engine.process_batch(vec![event], &cancel).await;
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod election;
pub mod error;
pub mod hash;
pub mod manager;
pub mod rebalance;

pub use election::{LeaderElection, LeaderTask, LocalElection};
pub use error::{ShardError, ShardResult};
pub use hash::{bucket_of, entity_hash};
pub use manager::{ShardAssignment, ShardManager};
pub use rebalance::{AssignmentBoard, Assignments, Rebalancer};
