//! In-memory log transport.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use super::{slice_records, LogTransport, Offset};
use crate::error::FirehoseResult;

/// Log held in memory. Lost on restart.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    records: RwLock<Vec<Vec<u8>>>,
    acks: Mutex<HashMap<String, BTreeSet<Offset>>>,
}

impl MemoryTransport {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LogTransport for MemoryTransport {
    async fn append(&self, record: Vec<u8>) -> FirehoseResult<Offset> {
        let mut records = self.records.write();
        records.push(record);
        Ok((records.len() - 1) as Offset)
    }

    async fn read(&self, from: Offset, max: usize) -> FirehoseResult<Vec<(Offset, Vec<u8>)>> {
        Ok(slice_records(&self.records.read(), from, max))
    }

    async fn head(&self) -> FirehoseResult<Offset> {
        Ok(self.records.read().len() as Offset)
    }

    async fn record_ack(&self, group: &str, offset: Offset) -> FirehoseResult<()> {
        self.acks.lock().entry(group.to_string()).or_default().insert(offset);
        Ok(())
    }

    async fn acked(&self, group: &str) -> FirehoseResult<Vec<Offset>> {
        Ok(self
            .acks
            .lock()
            .get(group)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_read_head() {
        let log = MemoryTransport::new();
        assert_eq!(log.head().await.unwrap(), 0);
        assert_eq!(log.append(b"a".to_vec()).await.unwrap(), 0);
        assert_eq!(log.append(b"b".to_vec()).await.unwrap(), 1);
        assert_eq!(log.head().await.unwrap(), 2);

        let tail = log.read(1, 10).await.unwrap();
        assert_eq!(tail, vec![(1, b"b".to_vec())]);
        assert!(log.read(5, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_acks_are_kept_per_group() {
        let log = MemoryTransport::new();
        log.record_ack("chat", 3).await.unwrap();
        log.record_ack("chat", 1).await.unwrap();
        log.record_ack("chat", 3).await.unwrap();
        assert_eq!(log.acked("chat").await.unwrap(), vec![1, 3]);
        assert!(log.acked("quests").await.unwrap().is_empty());
    }
}
