//! # TESSERA
//!
//! Authoritative game-state worker, integrating all crates.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          TESSERA WORKER                          │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │   events ──> ┌──────────────┐   owned?   ┌──────────────────┐    │
//! │              │ ShardManager │──────────> │ Engine / Movement│    │
//! │              └──────────────┘            └───┬─────────┬────┘    │
//! │                                   stale reads│         │commits  │
//! │              ┌──────────────┐                │         v         │
//! │              │ ReplicaTable │<───────────────┘   ┌──────────┐    │
//! │              │ + Spatial    │<── change feed ────│  Store   │    │
//! │              └──────────────┘                    └──────────┘    │
//! │                                                        │         │
//! │                                        facts ───> Firehose       │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `config`: TOML worker configuration
//! - `seed`: initial world loaded into an empty store
//! - `worker`: wiring and event routing

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod seed;
pub mod worker;

// Re-export the crates
pub use tessera_core as core;
pub use tessera_firehose as firehose;
pub use tessera_logic as logic;
pub use tessera_replica as replica;
pub use tessera_shard as shard;

pub use config::{ConfigError, ConfigResult, ShardConfig, TesseraConfig};
pub use seed::{apply_seed, load_seed, parse_seed, SeedError, SeedResult};
pub use worker::{SubmitReport, Worker, WorkerError, WorkerResult};
