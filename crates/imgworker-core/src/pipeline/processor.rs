//! Pipeline orchestration - wires together all processing stages.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tokio::time::timeout;

use crate::config::Config;
use crate::error::JobError;
use crate::types::{Delivered, Incoming, Job, PipelineOutcome};

use super::decode::{DecodedImage, FormatTag, ImageDecoder};
use super::encode::FormatEncoder;
use super::resize::{compute_target_size, resample};
use super::sink::ResultSink;
use super::validate::Validator;

/// Output of the CPU-bound half of a job.
struct Encoded {
    bytes: Vec<u8>,
    format: FormatTag,
    width: u32,
    height: u32,
}

/// Stages shared by every job. Read-only after construction.
struct Stages {
    decoder: ImageDecoder,
    encoder: FormatEncoder,
    max_size: u32,
}

impl Stages {
    /// Decode, resize, and re-encode. Runs on the blocking pool.
    fn transcode(&self, payload: &[u8]) -> Result<Encoded, JobError> {
        let start = Instant::now();

        let decoded = self.decoder.decode(payload)?;
        if !decoded.format.is_supported() {
            return Err(JobError::UnsupportedFormat(decoded.format.to_string()));
        }
        let (orig_w, orig_h) = (decoded.width(), decoded.height());
        tracing::trace!("  Decode: {:?} ({}x{} {})", start.elapsed(), orig_w, orig_h, decoded.format);

        let resize_start = Instant::now();
        let spec = compute_target_size(orig_w, orig_h, self.max_size);
        let resized: DecodedImage = resample(decoded, spec);
        tracing::trace!("  Resize: {:?} -> {}x{}", resize_start.elapsed(), spec.width, spec.height);

        let encode_start = Instant::now();
        let format = resized.format.clone();
        let bytes = self.encoder.encode(&resized, &format)?;
        tracing::trace!("  Encode: {:?} ({} bytes)", encode_start.elapsed(), bytes.len());

        Ok(Encoded {
            bytes,
            format,
            width: spec.width,
            height: spec.height,
        })
    }
}

/// Runs one job through validate → decode → resize → encode → sink.
///
/// The pipeline holds no per-job state, so one instance serves every job.
/// Clones share a single transcode slot: at most one transcode runs at a
/// time, including one that has outlived its deadline.
#[derive(Clone)]
pub struct JobPipeline {
    stages: Arc<Stages>,
    transcode_slot: Arc<Semaphore>,
    validator: Validator,
    sink: ResultSink,
    job_timeout: Duration,
}

impl JobPipeline {
    /// Create a new pipeline with the given configuration.
    pub fn new(config: &Config) -> Self {
        Self {
            stages: Arc::new(Stages {
                decoder: ImageDecoder::new(config.limits.clone()),
                encoder: FormatEncoder::new(config.encode.clone()),
                max_size: config.resize.max_size,
            }),
            transcode_slot: Arc::new(Semaphore::new(1)),
            validator: Validator::new(config.limits.clone(), config.sink.mode),
            sink: ResultSink::from_config(config),
            job_timeout: Duration::from_millis(config.limits.job_timeout_ms),
        }
    }

    /// Replace the result sink.
    pub fn with_sink(mut self, sink: ResultSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn sink(&self) -> &ResultSink {
        &self.sink
    }

    /// Validate a raw delivery into a job.
    pub fn ingest(&self, incoming: Incoming) -> Result<Job, JobError> {
        self.validator.validate(incoming)
    }

    /// Process a validated job. Never panics past this boundary; every
    /// failure comes back as `PipelineOutcome::Failed`.
    ///
    /// The payload is moved out of `job`; its identity fields are left for
    /// the reply.
    pub async fn process(&self, job: &mut Job) -> PipelineOutcome {
        let start = Instant::now();
        let payload = std::mem::take(&mut job.payload);
        tracing::debug!("Processing: {} ({} bytes)", job.output_id, payload.len());

        let result = match self.transcode(payload).await {
            Ok(encoded) => self.store(&job.output_id, encoded).await,
            Err(e) => Err(e),
        };

        tracing::debug!("Finished {} in {:?}", job.output_id, start.elapsed());
        result.into()
    }

    /// Run the CPU stages on the blocking pool under the job deadline.
    async fn transcode(&self, payload: Vec<u8>) -> Result<Encoded, JobError> {
        // Waits here while an expired transcode is still running.
        let permit = Arc::clone(&self.transcode_slot)
            .acquire_owned()
            .await
            .map_err(|e| JobError::Internal(format!("transcode slot closed: {}", e)))?;

        let stages = Arc::clone(&self.stages);
        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            stages.transcode(&payload)
        });

        match timeout(self.job_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(join_failure(e)),
            Err(_) => {
                tracing::warn!(
                    "Transcode exceeded {:?}; the next job waits for it to finish",
                    self.job_timeout
                );
                Err(JobError::Timeout {
                    timeout_ms: self.job_timeout.as_millis() as u64,
                })
            }
        }
    }

    async fn store(&self, output_id: &str, encoded: Encoded) -> Result<Delivered, JobError> {
        let payload = self
            .sink
            .store(output_id, &encoded.format, encoded.bytes)
            .await?;
        debug_assert!(!payload.is_empty());

        Ok(Delivered {
            payload,
            format: encoded.format,
            width: encoded.width,
            height: encoded.height,
        })
    }
}

fn join_failure(err: JoinError) -> JobError {
    if err.is_panic() {
        JobError::Internal("transcode task panicked".to_string())
    } else {
        JobError::Internal("transcode task was cancelled".to_string())
    }
}
