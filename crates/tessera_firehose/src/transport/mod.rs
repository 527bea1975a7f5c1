//! # Log Transports
//!
//! The durable ordered log under the firehose is an external collaborator.
//! A transport stores opaque records at consecutive offsets starting at 0,
//! and remembers which offsets each consumer group has acknowledged.

mod file;
mod memory;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::FirehoseResult;

pub use file::FileTransport;
pub use memory::MemoryTransport;

/// Position of a record in the log.
pub type Offset = u64;

/// Append-only, ordered record log.
#[async_trait]
pub trait LogTransport: Send + Sync {
    /// Appends one record, returning its offset.
    async fn append(&self, record: Vec<u8>) -> FirehoseResult<Offset>;

    /// Reads up to `max` records starting at `from`.
    async fn read(&self, from: Offset, max: usize) -> FirehoseResult<Vec<(Offset, Vec<u8>)>>;

    /// Offset the next append will receive.
    async fn head(&self) -> FirehoseResult<Offset>;

    /// Durably records that `group` acknowledged the record at `offset`.
    /// Recording the same ack twice is a no-op.
    async fn record_ack(&self, group: &str, offset: Offset) -> FirehoseResult<()>;

    /// Offsets `group` has acknowledged, ascending.
    async fn acked(&self, group: &str) -> FirehoseResult<Vec<Offset>>;
}

#[async_trait]
impl<T: LogTransport + ?Sized> LogTransport for Arc<T> {
    async fn append(&self, record: Vec<u8>) -> FirehoseResult<Offset> {
        (**self).append(record).await
    }

    async fn read(&self, from: Offset, max: usize) -> FirehoseResult<Vec<(Offset, Vec<u8>)>> {
        (**self).read(from, max).await
    }

    async fn head(&self) -> FirehoseResult<Offset> {
        (**self).head().await
    }

    async fn record_ack(&self, group: &str, offset: Offset) -> FirehoseResult<()> {
        (**self).record_ack(group, offset).await
    }

    async fn acked(&self, group: &str) -> FirehoseResult<Vec<Offset>> {
        (**self).acked(group).await
    }
}

fn slice_records(records: &[Vec<u8>], from: Offset, max: usize) -> Vec<(Offset, Vec<u8>)> {
    let start = usize::try_from(from).unwrap_or(usize::MAX);
    records
        .iter()
        .enumerate()
        .skip(start)
        .take(max)
        .map(|(i, r)| (i as Offset, r.clone()))
        .collect()
}
