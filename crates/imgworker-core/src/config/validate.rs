//! Configuration validation with range checks.

use crate::error::ConfigError;

use super::Config;

/// Largest accepted `limits.max_payload_mb` (1 GiB).
const MAX_PAYLOAD_MB: u64 = 1024;

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broker.queue.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "broker.queue must not be empty".into(),
            ));
        }
        if self.broker.prefetch == 0 {
            return Err(ConfigError::ValidationError(
                "broker.prefetch must be > 0".into(),
            ));
        }
        if self.resize.max_size == 0 {
            return Err(ConfigError::ValidationError(
                "resize.max_size must be > 0".into(),
            ));
        }
        if !(1..=100).contains(&self.encode.jpeg_quality) {
            return Err(ConfigError::ValidationError(
                "encode.jpeg_quality must be between 1 and 100".into(),
            ));
        }
        if self.limits.max_payload_mb == 0 || self.limits.max_payload_mb > MAX_PAYLOAD_MB {
            return Err(ConfigError::ValidationError(format!(
                "limits.max_payload_mb must be between 1 and {}",
                MAX_PAYLOAD_MB
            )));
        }
        if self.limits.max_image_dimension == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_image_dimension must be > 0".into(),
            ));
        }
        if self.limits.job_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "limits.job_timeout_ms must be > 0".into(),
            ));
        }
        Ok(())
    }
}
