//! Firehose configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a firehose.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FirehoseConfig {
    /// Unacknowledged batches become eligible for redelivery after this long.
    pub ack_ttl_ms: u64,
    /// Most facts one publish may carry; larger batches are refused.
    /// 0 disables the check.
    pub max_batch_facts: usize,
    /// How often an idle subscription re-checks the log head.
    pub poll_interval_ms: u64,
    /// Log file path. `None` keeps the log in memory.
    pub log_path: Option<String>,
}

impl FirehoseConfig {
    /// Ack TTL as a duration.
    #[must_use]
    pub fn ack_ttl(&self) -> Duration {
        Duration::from_millis(self.ack_ttl_ms)
    }

    /// Poll interval as a duration.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl Default for FirehoseConfig {
    fn default() -> Self {
        Self {
            ack_ttl_ms: 30_000,
            max_batch_facts: 256,
            poll_interval_ms: 100,
            log_path: None,
        }
    }
}
