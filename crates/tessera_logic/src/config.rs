//! Engine tunables.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the transaction engine and movement path.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Commit attempts per event before it is dead-lettered.
    pub max_attempts: u32,
    /// Merge groups processed at the same time within one batch.
    pub max_concurrency: usize,
    /// Farthest two entities may be apart to interact (world units).
    pub interaction_range: f32,
    /// Dead letters kept before new ones are dropped.
    pub dead_letter_capacity: usize,
    /// Pause before re-resolving after a version conflict.
    pub retry_backoff_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            max_concurrency: 16,
            interaction_range: 8.0,
            dead_letter_capacity: 1024,
            retry_backoff_ms: 0,
        }
    }
}

impl EngineConfig {
    /// Retry pause as a duration.
    #[must_use]
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}
