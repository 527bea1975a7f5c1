//! # TESSERA Logic
//!
//! The event handler framework and the optimistic transaction engine.
//!
//! ## Architecture Rules
//!
//! 1. **Handlers are descriptors** - `merge_key`, `involves`, `apply`; no I/O
//! 2. **Every fresh read is guarded** - commits fail on any stale read, never overwrite
//! 3. **Facts follow commits** - published only after the owning commit succeeds
//! 4. **Failures stay local** - one event's rejection or dead letter never blocks another
//!
//! ## Example
//!
//! ```rust,ignore
//! let engine = Engine::new(store, ids, firehose, EngineConfig::default())
//!     .with_replica(replica);
//!
//! let report = engine.process_batch(events, &cancel).await;
//! for entry in &report.entries {
//!     tracing::debug!(kind = %entry.kind, outcome = ?entry.outcome);
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod context;
pub mod dead_letter;
pub mod engine;
pub mod error;
pub mod event;
pub mod handler;
pub mod handlers;
pub mod involved;
pub mod report;
pub mod transaction;

pub use config::EngineConfig;
pub use context::Context;
pub use dead_letter::{DeadLetter, DeadLetterQueue};
pub use engine::Engine;
pub use error::{EngineError, EngineResult, HandlerError, HandlerResult};
pub use event::{Event, EventKind, MergeKey};
pub use handler::{EventHandler, HandlerMode, HandlerRegistry};
pub use handlers::{
    CollectHandler, DamageHandler, DropItemHandler, DumpWaterHandler, GiveHandler, LabelHandler,
    MoveHandler, MovementPath,
};
pub use involved::{Freshness, Involved, InvolvedQueries, Query};
pub use report::{BatchReport, EngineStats, Outcome, ReportEntry};
pub use transaction::{Commit, Transaction};
