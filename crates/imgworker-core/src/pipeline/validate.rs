//! Ingestion checks that turn a raw delivery into a typed [`Job`].

use crate::config::{LimitsConfig, SinkMode};
use crate::error::JobError;
use crate::types::{HeaderValue, Incoming, Job, HEADER_FILENAME, HEADER_ID};

/// Validates deliveries before processing.
#[derive(Debug, Clone)]
pub struct Validator {
    limits: LimitsConfig,
    sink_mode: SinkMode,
}

impl Validator {
    /// Create a new validator with the given limits.
    pub fn new(limits: LimitsConfig, sink_mode: SinkMode) -> Self {
        Self { limits, sink_mode }
    }

    /// Validate headers and payload size.
    ///
    /// Checks:
    /// - `filename` header is present, textual, non-empty, and has no
    ///   surrounding whitespace
    /// - `id` header, if present, is text or an integer
    /// - in path mode, `filename` is a single safe path component
    /// - payload is non-empty and within the size limit
    ///
    /// The payload is moved into the job, not copied.
    pub fn validate(&self, incoming: Incoming) -> Result<Job, JobError> {
        let output_id = match incoming.headers.get(HEADER_FILENAME) {
            None => {
                return Err(JobError::BadRequest(format!(
                    "missing '{}' header",
                    HEADER_FILENAME
                )))
            }
            Some(value) => value.as_text().ok_or_else(|| {
                JobError::BadRequest(format!("'{}' header must be a string", HEADER_FILENAME))
            })?,
        };
        if output_id.is_empty() {
            return Err(JobError::BadRequest(format!(
                "'{}' header is empty",
                HEADER_FILENAME
            )));
        }
        if output_id.trim() != output_id {
            return Err(JobError::BadRequest(format!(
                "'{}' header has surrounding whitespace: {:?}",
                HEADER_FILENAME, output_id
            )));
        }
        if self.sink_mode == SinkMode::Path && !is_safe_component(&output_id) {
            return Err(JobError::BadRequest(format!(
                "'{}' is not a valid output name",
                output_id
            )));
        }

        let id = match incoming.headers.get(HEADER_ID) {
            None => None,
            Some(HeaderValue::Int(n)) => Some(n.to_string()),
            Some(value) => Some(value.as_text().ok_or_else(|| {
                JobError::BadRequest(format!("'{}' header must be a string or integer", HEADER_ID))
            })?),
        };

        if incoming.body.is_empty() {
            return Err(JobError::BadRequest("empty payload".to_string()));
        }
        let max_bytes = self.limits.max_payload_mb.saturating_mul(1024 * 1024);
        if incoming.body.len() as u64 > max_bytes {
            return Err(JobError::BadRequest(format!(
                "payload too large ({}MB > {}MB)",
                incoming.body.len() as u64 / (1024 * 1024),
                self.limits.max_payload_mb
            )));
        }

        Ok(Job {
            payload: incoming.body,
            output_id,
            id,
        })
    }
}

/// True if `name` joins onto a directory without escaping it.
fn is_safe_component(name: &str) -> bool {
    name != "." && name != ".." && !name.contains(['/', '\\', '\0'])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator(mode: SinkMode) -> Validator {
        Validator::new(LimitsConfig::default(), mode)
    }

    #[test]
    fn test_valid_delivery() {
        let incoming = Incoming::new(1, vec![1, 2, 3], "cat").with_header(HEADER_ID, 42i64);
        let job = validator(SinkMode::Path).validate(incoming).unwrap();
        assert_eq!(job.output_id, "cat");
        assert_eq!(job.id.as_deref(), Some("42"));
        assert_eq!(job.payload, vec![1, 2, 3]);
    }

    #[test]
    fn test_bytes_header_accepted() {
        let incoming = Incoming::new(1, vec![1], "ignored")
            .with_header(HEADER_FILENAME, HeaderValue::Bytes(b"dog".to_vec()))
            .with_header(HEADER_ID, "abc");
        let job = validator(SinkMode::Bytes).validate(incoming).unwrap();
        assert_eq!(job.output_id, "dog");
        assert_eq!(job.id.as_deref(), Some("abc"));
    }

    #[test]
    fn test_missing_filename_is_bad_request() {
        let incoming = Incoming {
            body: vec![1],
            ..Incoming::default()
        };
        let err = validator(SinkMode::Bytes).validate(incoming).unwrap_err();
        assert!(matches!(err, JobError::BadRequest(ref m) if m.contains("missing")));
    }

    #[test]
    fn test_mistyped_filename_is_bad_request() {
        let incoming = Incoming::new(1, vec![1], "x").with_header(HEADER_FILENAME, 5i64);
        let err = validator(SinkMode::Bytes).validate(incoming).unwrap_err();
        assert!(matches!(err, JobError::BadRequest(_)));
    }

    #[test]
    fn test_mistyped_id_is_bad_request() {
        let incoming = Incoming::new(1, vec![1], "x")
            .with_header(HEADER_ID, HeaderValue::Other("table".into()));
        let err = validator(SinkMode::Bytes).validate(incoming).unwrap_err();
        assert!(matches!(err, JobError::BadRequest(_)));
    }

    #[test]
    fn test_traversal_rejected_in_path_mode_only() {
        for name in ["../etc/passwd", "a/b", "..", "a\\b"] {
            let incoming = Incoming::new(1, vec![1], name);
            assert!(validator(SinkMode::Path).validate(incoming.clone()).is_err(), "{}", name);
            assert!(validator(SinkMode::Bytes).validate(incoming).is_ok(), "{}", name);
        }
    }

    #[test]
    fn test_empty_and_oversized_payloads_rejected() {
        let empty = Incoming::new(1, vec![], "x");
        assert!(validator(SinkMode::Bytes).validate(empty).is_err());

        let limits = LimitsConfig {
            max_payload_mb: 1,
            ..LimitsConfig::default()
        };
        let big = Incoming::new(1, vec![0; 1024 * 1024 + 1], "x");
        let err = Validator::new(limits, SinkMode::Bytes)
            .validate(big)
            .unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn test_huge_payload_limit_does_not_overflow() {
        let limits = LimitsConfig {
            max_payload_mb: u64::MAX / 1024,
            ..LimitsConfig::default()
        };
        let incoming = Incoming::new(1, vec![1, 2, 3], "x");
        let job = Validator::new(limits, SinkMode::Bytes)
            .validate(incoming)
            .unwrap();
        assert_eq!(job.payload.len(), 3);
    }

    #[test]
    fn test_filename_whitespace_rejected_not_trimmed() {
        for name in [" cat", "cat ", "\tcat\n", "   "] {
            let incoming = Incoming::new(1, vec![1], name);
            let err = validator(SinkMode::Bytes).validate(incoming).unwrap_err();
            assert!(matches!(err, JobError::BadRequest(_)), "{:?}", name);
        }
    }
}
