//! imgworker core - queue-driven image resize and recompress pipeline.
//!
//! A worker pulls image jobs from a message broker, shrinks each image so its
//! longer edge matches a configured bound, re-encodes it in its original
//! format, and publishes exactly one correlated reply per job before
//! acknowledging it.
//!
//! # Architecture
//!
//! ```text
//! Broker → Validate → Decode → Resize (Catmull-Rom) → Encode → Sink → Reply → Ack
//! ```
//!
//! The broker is abstracted behind [`transport::Broker`]; an in-process
//! [`transport::MemoryBroker`] ships with the library.
//!
//! # Usage
//!
//! ```rust,ignore
//! use imgworker_core::{shutdown, Config, ImgWorker, MemoryBroker};
//!
//! #[tokio::main]
//! async fn main() -> imgworker_core::Result<()> {
//!     let worker = ImgWorker::new(Config::load()?)?;
//!     let (broker, handle) = MemoryBroker::new(16);
//!     let (trigger, listener) = shutdown::channel();
//!
//!     let stats = worker.worker(broker, listener).run().await?;
//!     println!("Processed {} jobs", stats.received);
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod config;
pub mod error;
pub mod pipeline;
pub mod shutdown;
pub mod transport;
pub mod types;
pub mod worker;

// Re-exports for convenient access
pub use config::Config;
pub use error::{ConfigError, FailureKind, JobError, JobResult, Result, TransportError, WorkerError};
pub use pipeline::{FormatTag, JobPipeline, ResultSink};
pub use transport::{Broker, MemoryBroker, MemoryBrokerHandle};
pub use types::{Incoming, Job, Payload, PipelineOutcome, Reply, WorkerStats};
pub use worker::Worker;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Entry point tying a validated configuration to a job pipeline.
pub struct ImgWorker {
    config: Config,
    pipeline: JobPipeline,
}

impl ImgWorker {
    /// Create a new instance, validating the configuration first.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        tracing::debug!("Initializing imgworker v{}", VERSION);
        let pipeline = JobPipeline::new(&config);
        Ok(Self { config, pipeline })
    }

    /// Get a reference to the current configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the job pipeline.
    pub fn pipeline(&self) -> &JobPipeline {
        &self.pipeline
    }

    /// Build a delivery loop over `broker`.
    pub fn worker<B: Broker>(&self, broker: B, shutdown: shutdown::Shutdown) -> Worker<B> {
        Worker::new(broker, self.pipeline.clone(), shutdown)
    }

    /// Run a single payload through the pipeline, outside any broker.
    pub async fn process_bytes(&self, payload: Vec<u8>, output_id: &str) -> PipelineOutcome {
        let incoming = Incoming::new(0, payload, output_id);
        match self.pipeline.ingest(incoming) {
            Ok(mut job) => self.pipeline.process(&mut job).await,
            Err(e) => PipelineOutcome::Failed(e),
        }
    }
}
