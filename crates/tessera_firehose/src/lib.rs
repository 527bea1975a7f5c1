//! # TESSERA Firehose
//!
//! At-least-once distribution of facts to downstream consumers (chat,
//! quests, terrain simulation, connected clients).
//!
//! ## Guarantees
//!
//! 1. **Ordered**: batches are appended to a single ordered log
//! 2. **At-least-once**: unacknowledged batches are redelivered after the ack TTL
//! 3. **No replays after ack**: an acknowledged batch is never handed out again,
//!    across restarts when the transport is durable
//! 4. **Producers never block** on slow consumers
//!
//! ## Example
//!
//! ```rust,ignore
//! let firehose = Firehose::new(Arc::new(MemoryTransport::new()), FirehoseConfig::default());
//! firehose.publish(vec![fact]).await?;
//!
//! let mut sub = firehose.subscribe("chat", config.ack_ttl(), cancel.clone());
//! while let Some(delivery) = sub.next().await {
//!     let delivery = delivery?;
//!     handle(&delivery.facts);
//!     delivery.ack().await?;
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod fact;
pub mod firehose;
pub mod transport;

pub use config::FirehoseConfig;
pub use error::{FirehoseError, FirehoseResult};
pub use fact::{Fact, FactPayload};
pub use firehose::{AckHandle, Delivery, Firehose, FirehoseStats, Subscription};
pub use transport::{FileTransport, LogTransport, MemoryTransport, Offset};
