//! # Firehose Error Types

use thiserror::Error;

use crate::transport::Offset;

/// Errors raised by the firehose and its transports.
#[derive(Error, Debug)]
pub enum FirehoseError {
    /// Underlying file I/O failed.
    #[error("log I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// A record failed its integrity check or could not be parsed.
    #[error("corrupt log record at offset {offset}: {reason}")]
    Corrupt {
        /// Offset of the bad record.
        offset: Offset,
        /// What was wrong.
        reason: String,
    },

    /// Fact batch (de)serialization failed.
    #[error("fact codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// A publish carried more facts than one record may hold.
    #[error("batch of {facts} facts exceeds the limit of {limit}")]
    BatchTooLarge {
        /// Facts in the refused batch.
        facts: usize,
        /// Configured `max_batch_facts`.
        limit: usize,
    },

    /// The log file header is not ours.
    #[error("invalid log header: {0}")]
    InvalidHeader(String),
}

/// Result type for firehose operations.
pub type FirehoseResult<T> = Result<T, FirehoseError>;
