//! Error types for the imgworker job pipeline.
//!
//! Errors are split by blast radius: [`JobError`] is scoped to a single job
//! and always ends in a failure reply, while [`TransportError`] means the
//! messaging layer itself is gone and the worker has to stop.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for worker operations.
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Messaging layer errors (fatal)
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Job-scoped errors surfaced outside the delivery loop
    #[error("Job error: {0}")]
    Job(#[from] JobError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Errors scoped to one job. None of these stop the delivery loop.
#[derive(Error, Debug)]
pub enum JobError {
    /// Headers or payload failed ingestion checks
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Payload is not a recognized image container, or is truncated/corrupt
    #[error("Decode error: {0}")]
    Decode(String),

    /// Payload decoded, but its format is not one we re-encode
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Encoder rejected the raster or its settings
    #[error("Encode error ({format}): {message}")]
    Encode { format: String, message: String },

    /// Filesystem sink write failed
    #[error("Failed to write {path}: {source}")]
    StorageWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Job exceeded its deadline
    #[error("Job timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The transcode task panicked or was cancelled
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Stable machine-readable tag for a job failure, sent back in replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    BadRequest,
    Decode,
    UnsupportedFormat,
    Encode,
    StorageWrite,
    Timeout,
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadRequest => "bad_request",
            Self::Decode => "decode",
            Self::UnsupportedFormat => "unsupported_format",
            Self::Encode => "encode",
            Self::StorageWrite => "storage_write",
            Self::Timeout => "timeout",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl JobError {
    /// The failure kind reported to the requester.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::BadRequest(_) => FailureKind::BadRequest,
            Self::Decode(_) => FailureKind::Decode,
            Self::UnsupportedFormat(_) => FailureKind::UnsupportedFormat,
            Self::Encode { .. } => FailureKind::Encode,
            Self::StorageWrite { .. } => FailureKind::StorageWrite,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::Internal(_) => FailureKind::Internal,
        }
    }
}

/// Messaging layer errors. Any of these ends the delivery loop.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Could not establish or keep the broker connection
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Consumer stream yielded an error
    #[error("Consume failed: {0}")]
    Consume(String),

    /// Reply could not be published
    #[error("Publish to '{reply_to}' failed: {message}")]
    Publish { reply_to: String, message: String },

    /// Acknowledgment could not be sent
    #[error("Ack of delivery {delivery_tag} failed: {message}")]
    Ack { delivery_tag: u64, message: String },

    /// The other side of an in-process channel went away
    #[error("Broker channel closed")]
    Closed,
}

/// Convenience type alias for worker results.
pub type Result<T> = std::result::Result<T, WorkerError>;

/// Convenience type alias for job-scoped results.
pub type JobResult<T> = std::result::Result<T, JobError>;
