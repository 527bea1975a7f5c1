//! # Worker Configuration
//!
//! One TOML file per worker. Every field has a default, so an empty file
//! (or no file at all) yields a working single-process setup.
//!
//! ```toml
//! worker_id = "worker-1"
//! seed_path = "world.jsonl"
//!
//! [engine]
//! max_attempts = 5
//!
//! [shard]
//! total_buckets = 64
//! held = [0, 1, 2]
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tessera_firehose::FirehoseConfig;
use tessera_logic::EngineConfig;
use tessera_replica::ReplicaConfig;
use tessera_shard::ShardAssignment;
use thiserror::Error;

/// Configuration failures.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// File that was read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Values parse but contradict each other.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Shard ownership of this worker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShardConfig {
    /// Buckets the entity space is split into.
    pub total_buckets: u32,
    /// Buckets held at startup. `None` holds all of them.
    pub held: Option<Vec<u32>>,
}

impl Default for ShardConfig {
    fn default() -> Self {
        Self {
            total_buckets: 64,
            held: None,
        }
    }
}

impl ShardConfig {
    /// Initial assignment described by this section.
    pub fn assignment(&self) -> ConfigResult<ShardAssignment> {
        let assignment = match &self.held {
            None => ShardAssignment::all(self.total_buckets),
            Some(held) => ShardAssignment {
                total: self.total_buckets,
                held: held.iter().copied().collect(),
            },
        };
        assignment
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(assignment)
    }
}

/// Complete worker configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TesseraConfig {
    /// Name of this worker in shard assignments and leader election.
    pub worker_id: String,
    /// Transaction engine.
    pub engine: EngineConfig,
    /// Local replica and spatial index.
    pub replica: ReplicaConfig,
    /// Fact log.
    pub firehose: FirehoseConfig,
    /// Shard ownership.
    pub shard: ShardConfig,
    /// JSON-lines entity file created in the store before the worker starts.
    pub seed_path: Option<String>,
}

impl Default for TesseraConfig {
    fn default() -> Self {
        Self {
            worker_id: "worker-0".into(),
            engine: EngineConfig::default(),
            replica: ReplicaConfig::default(),
            firehose: FirehoseConfig::default(),
            shard: ShardConfig::default(),
            seed_path: None,
        }
    }
}

impl TesseraConfig {
    /// Parses and validates TOML text.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.worker_id.trim().is_empty() {
            return Err(ConfigError::Invalid("worker_id must not be empty".into()));
        }
        if self.engine.max_attempts == 0 {
            return Err(ConfigError::Invalid("engine.max_attempts must be at least 1".into()));
        }
        if self.engine.max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "engine.max_concurrency must be at least 1".into(),
            ));
        }
        if !(self.replica.cell_size.is_finite() && self.replica.cell_size > 0.0) {
            return Err(ConfigError::Invalid("replica.cell_size must be positive".into()));
        }
        self.shard.assignment()?;
        Ok(())
    }
}
