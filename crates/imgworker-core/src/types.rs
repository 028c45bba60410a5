//! Core data types flowing through the worker.
//!
//! An [`Incoming`] delivery is validated into a [`Job`], the pipeline turns
//! the job into a [`PipelineOutcome`], and the outcome becomes exactly one
//! [`Reply`].

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::{FailureKind, JobError};
use crate::pipeline::FormatTag;

/// Header names understood on inbound jobs.
pub const HEADER_FILENAME: &str = "filename";
pub const HEADER_ID: &str = "id";

/// Header names set on outbound replies.
pub const HEADER_STATUS: &str = "status";
pub const HEADER_ERROR: &str = "error";
pub const HEADER_ERROR_MESSAGE: &str = "error_message";
pub const HEADER_FORMAT: &str = "format";
pub const HEADER_WIDTH: &str = "width";
pub const HEADER_HEIGHT: &str = "height";

/// Content type of every reply.
pub const REPLY_CONTENT_TYPE: &str = "text/plain";

/// A loosely-typed header value as it arrives from the broker.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Str(String),
    Int(i64),
    Bytes(Vec<u8>),
    /// Anything else the wire format can carry (tables, arrays, floats, ...)
    Other(String),
}

impl HeaderValue {
    /// Interpret the value as text, accepting UTF-8 byte strings.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Str(s) => Some(s.clone()),
            Self::Bytes(b) => String::from_utf8(b.clone()).ok(),
            _ => None,
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for HeaderValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

/// One raw delivery from the broker, before validation.
#[derive(Debug, Clone, Default)]
pub struct Incoming {
    /// Broker-assigned tag used to acknowledge this delivery
    pub delivery_tag: u64,
    /// Image payload
    pub body: Vec<u8>,
    /// Message headers
    pub headers: BTreeMap<String, HeaderValue>,
    /// Where the reply goes
    pub reply_to: Option<String>,
    /// Opaque token copied onto the reply
    pub correlation_id: Option<String>,
}

impl Incoming {
    /// Build a delivery carrying a `filename` header.
    pub fn new(delivery_tag: u64, body: Vec<u8>, filename: &str) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert(HEADER_FILENAME.to_string(), HeaderValue::from(filename));
        Self {
            delivery_tag,
            body,
            headers,
            reply_to: None,
            correlation_id: None,
        }
    }

    /// Set the reply-to address.
    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    /// Set the correlation token.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Add or replace a header.
    pub fn with_header(mut self, name: &str, value: impl Into<HeaderValue>) -> Self {
        self.headers.insert(name.to_string(), value.into());
        self
    }
}

/// A validated job, ready for the pipeline.
#[derive(Debug, Clone)]
pub struct Job {
    /// Image payload
    pub payload: Vec<u8>,
    /// Output identifier (the `filename` header)
    pub output_id: String,
    /// Optional caller-side id, rendered as text
    pub id: Option<String>,
}

/// The processed result, in exactly one of its two shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Encoded image bytes, returned inline
    Bytes(Vec<u8>),
    /// Location the encoded image was written to
    Path(PathBuf),
}

impl Payload {
    /// Reply body for this payload.
    pub fn into_body(self) -> Vec<u8> {
        match self {
            Self::Bytes(bytes) => bytes,
            Self::Path(path) => path.to_string_lossy().into_owned().into_bytes(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Bytes(bytes) => bytes.is_empty(),
            Self::Path(path) => path.as_os_str().is_empty(),
        }
    }
}

/// A successfully processed job.
#[derive(Debug, Clone)]
pub struct Delivered {
    pub payload: Payload,
    pub format: FormatTag,
    pub width: u32,
    pub height: u32,
}

/// Result of running one job through the pipeline.
#[derive(Debug)]
pub enum PipelineOutcome {
    Delivered(Delivered),
    Failed(JobError),
}

impl PipelineOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered(_))
    }

    /// Failure kind, if the job failed.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Delivered(_) => None,
            Self::Failed(err) => Some(err.kind()),
        }
    }
}

impl From<Result<Delivered, JobError>> for PipelineOutcome {
    fn from(result: Result<Delivered, JobError>) -> Self {
        match result {
            Ok(delivered) => Self::Delivered(delivered),
            Err(err) => Self::Failed(err),
        }
    }
}

/// The single response published for a job.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    /// Copied verbatim from the inbound delivery
    pub correlation_id: Option<String>,
    pub content_type: String,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl Reply {
    /// Build the reply for an outcome. Failures carry an empty body plus
    /// `status`/`error` headers.
    pub fn from_outcome(
        outcome: PipelineOutcome,
        correlation_id: Option<String>,
        job: Option<&Job>,
    ) -> Self {
        let mut headers = BTreeMap::new();
        if let Some(job) = job {
            headers.insert(HEADER_FILENAME.to_string(), job.output_id.clone());
            if let Some(id) = &job.id {
                headers.insert(HEADER_ID.to_string(), id.clone());
            }
        }

        let body = match outcome {
            PipelineOutcome::Delivered(delivered) => {
                headers.insert(HEADER_STATUS.to_string(), "ok".to_string());
                headers.insert(HEADER_FORMAT.to_string(), delivered.format.to_string());
                headers.insert(HEADER_WIDTH.to_string(), delivered.width.to_string());
                headers.insert(HEADER_HEIGHT.to_string(), delivered.height.to_string());
                delivered.payload.into_body()
            }
            PipelineOutcome::Failed(err) => {
                headers.insert(HEADER_STATUS.to_string(), "failed".to_string());
                headers.insert(HEADER_ERROR.to_string(), err.kind().to_string());
                headers.insert(HEADER_ERROR_MESSAGE.to_string(), err.to_string());
                Vec::new()
            }
        };

        Self {
            correlation_id,
            content_type: REPLY_CONTENT_TYPE.to_string(),
            headers,
            body,
        }
    }

    pub fn is_success(&self) -> bool {
        self.headers.get(HEADER_STATUS).map(String::as_str) == Some("ok")
    }

    /// Failure kind tag, if this is a failure reply.
    pub fn error(&self) -> Option<&str> {
        self.headers.get(HEADER_ERROR).map(String::as_str)
    }
}

/// Counters accumulated by the delivery loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Deliveries pulled from the broker
    pub received: u64,
    /// Jobs that produced a result
    pub delivered: u64,
    /// Jobs that ended in a failure reply
    pub failed: u64,
    /// Replies published
    pub replied: u64,
    /// Deliveries acknowledged
    pub acknowledged: u64,
}
