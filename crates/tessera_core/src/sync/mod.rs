//! # Synchronization Primitives
//!
//! Every long-running loop (replica follow, firehose subscription,
//! rebalancer, engine batch) takes a [`CancelToken`] and stops producing new
//! work once it fires.

mod cancel;

pub use cancel::CancelToken;
