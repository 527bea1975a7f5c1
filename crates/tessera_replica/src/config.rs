//! Replica configuration.

use serde::{Deserialize, Serialize};

/// Configuration for a replica table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicaConfig {
    /// Edge length of a spatial index cell, in world units.
    pub cell_size: f32,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self { cell_size: 32.0 }
    }
}
