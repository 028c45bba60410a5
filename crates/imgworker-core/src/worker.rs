//! The delivery loop: receive → process → reply → acknowledge.
//!
//! Jobs are handled one at a time, each to completion. Job-scoped failures
//! become failure replies; only transport errors stop the loop.

use crate::error::TransportError;
use crate::pipeline::JobPipeline;
use crate::shutdown::Shutdown;
use crate::transport::Broker;
use crate::types::{Incoming, PipelineOutcome, Reply, WorkerStats};

/// Sequential single-consumer worker.
pub struct Worker<B: Broker> {
    broker: B,
    pipeline: JobPipeline,
    shutdown: Shutdown,
    stats: WorkerStats,
}

impl<B: Broker> Worker<B> {
    pub fn new(broker: B, pipeline: JobPipeline, shutdown: Shutdown) -> Self {
        Self {
            broker,
            pipeline,
            shutdown,
            stats: WorkerStats::default(),
        }
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Drain the broker until it closes or shutdown is raised.
    ///
    /// Shutdown only interrupts the wait for the next delivery; a job that
    /// has been received always runs through reply and ack. The broker is
    /// closed on every exit path.
    pub async fn run(mut self) -> Result<WorkerStats, TransportError> {
        tracing::info!(
            "Worker started (broker: {}, sink: {:?})",
            self.broker.name(),
            self.pipeline.sink().mode()
        );

        let result = self.drain().await;

        if let Err(e) = self.broker.close().await {
            tracing::warn!("Failed to close broker cleanly: {}", e);
        }

        match &result {
            Ok(()) => tracing::info!(
                "Worker stopped: {} received, {} delivered, {} failed",
                self.stats.received,
                self.stats.delivered,
                self.stats.failed
            ),
            Err(e) => tracing::error!("Worker aborted on transport error: {}", e),
        }
        result.map(|()| self.stats)
    }

    async fn drain(&mut self) -> Result<(), TransportError> {
        loop {
            if self.shutdown.is_triggered() {
                tracing::info!("Shutdown requested, no longer accepting jobs");
                return Ok(());
            }

            let next = tokio::select! {
                biased;
                _ = self.shutdown.wait() => {
                    tracing::info!("Shutdown requested, no longer accepting jobs");
                    return Ok(());
                }
                next = self.broker.next_delivery() => next,
            };

            match next {
                None => {
                    tracing::info!("Delivery stream closed");
                    return Ok(());
                }
                Some(Err(e)) => return Err(e),
                Some(Ok(incoming)) => self.handle(incoming).await?,
            }
        }
    }

    /// Process one delivery: exactly one reply (when there is an address)
    /// and exactly one ack.
    pub async fn handle(&mut self, mut incoming: Incoming) -> Result<(), TransportError> {
        self.stats.received += 1;
        let delivery_tag = incoming.delivery_tag;
        let reply_to = incoming.reply_to.take();
        let correlation_id = incoming.correlation_id.take();

        let (job, outcome) = match self.pipeline.ingest(incoming) {
            Ok(mut job) => {
                tracing::debug!(
                    "Received file: {} (id: {}, delivery {})",
                    job.output_id,
                    job.id.as_deref().unwrap_or("-"),
                    delivery_tag
                );
                let outcome = self.pipeline.process(&mut job).await;
                (Some(job), outcome)
            }
            Err(e) => (None, PipelineOutcome::Failed(e)),
        };

        let name = job.as_ref().map(|j| j.output_id.as_str()).unwrap_or("<unnamed>");
        match &outcome {
            PipelineOutcome::Delivered(d) => {
                self.stats.delivered += 1;
                tracing::info!(
                    "Compressed and resized {} to {}x{} {}",
                    name,
                    d.width,
                    d.height,
                    d.format
                );
            }
            PipelineOutcome::Failed(e) => {
                self.stats.failed += 1;
                tracing::warn!("Job {} failed [{}]: {}", name, e.kind(), e);
            }
        }

        let reply = Reply::from_outcome(outcome, correlation_id, job.as_ref());
        match reply_to.as_deref().filter(|r| !r.is_empty()) {
            Some(reply_to) => {
                self.broker.publish(reply_to, &reply).await?;
                self.stats.replied += 1;
            }
            None => tracing::warn!(
                "Delivery {} has no reply-to address, dropping reply",
                delivery_tag
            ),
        }

        self.broker.ack(delivery_tag).await?;
        self.stats.acknowledged += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, SinkMode};
    use crate::pipeline::test_images;
    use crate::shutdown;
    use crate::shutdown::ShutdownTrigger;
    use crate::transport::{MemoryBroker, MemoryBrokerHandle};
    use async_trait::async_trait;
    use crate::types::HEADER_ID;
    use std::path::PathBuf;
    use std::time::Duration;

    fn worker(config: &Config) -> (Worker<MemoryBroker>, MemoryBrokerHandle) {
        let (broker, handle) = MemoryBroker::new(16);
        let worker = Worker::new(broker, JobPipeline::new(config), Shutdown::never());
        (worker, handle)
    }

    fn job(tag: u64, body: Vec<u8>, name: &str) -> Incoming {
        Incoming::new(tag, body, name)
            .with_reply_to("amq.gen-reply")
            .with_correlation_id(format!("corr-{}", tag))
    }

    #[tokio::test]
    async fn test_every_delivery_gets_one_reply_and_one_ack() {
        let (worker, handle) = worker(&Config::default());

        handle.submit(job(1, test_images::gradient_png(40, 20), "ok")).await.unwrap();
        handle.submit(job(2, b"garbage".to_vec(), "bad")).await.unwrap();
        let gif = test_images::encode(&test_images::gradient(8, 8), image::ImageFormat::Gif);
        handle.submit(job(3, gif, "anim")).await.unwrap();
        let mut missing_header = job(4, vec![1, 2, 3], "x");
        missing_header.headers.clear();
        handle.submit(missing_header).await.unwrap();
        let ledger = handle.finish();

        let stats = worker.run().await.unwrap();
        assert_eq!(stats.received, 4);
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.failed, 3);
        assert_eq!(stats.replied, 4);
        assert_eq!(stats.acknowledged, 4);

        let published = ledger.published();
        assert_eq!(published.len(), 4);
        assert_eq!(ledger.acked(), vec![1, 2, 3, 4]);

        let kinds: Vec<Option<&str>> = published.iter().map(|p| p.reply.error()).collect();
        assert_eq!(
            kinds,
            vec![None, Some("decode"), Some("unsupported_format"), Some("bad_request")]
        );
        for (i, p) in published.iter().enumerate() {
            assert_eq!(p.reply_to, "amq.gen-reply");
            assert_eq!(p.reply.correlation_id, Some(format!("corr-{}", i + 1)));
            assert_eq!(p.reply.content_type, "text/plain");
        }
        assert!(published[0].reply.is_success());
        assert!(!published[0].reply.body.is_empty());
        assert!(published[1].reply.body.is_empty());
    }

    #[tokio::test]
    async fn test_path_mode_reply_carries_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.resize.max_size = 200;
        config.sink.mode = SinkMode::Path;
        config.sink.base_dir = dir.path().to_path_buf();
        let (worker, handle) = worker(&config);

        let incoming =
            job(9, test_images::gradient_jpeg(400, 300), "holiday").with_header(HEADER_ID, 17i64);
        handle.submit(incoming).await.unwrap();
        let ledger = handle.finish();

        worker.run().await.unwrap();

        let reply = &ledger.published()[0].reply;
        let path = PathBuf::from(String::from_utf8(reply.body.clone()).unwrap());
        assert_eq!(path, dir.path().join("holiday.jpg"));
        assert!(path.exists());
        assert_eq!(reply.headers["id"], "17");
        assert_eq!(reply.headers["width"], "200");
        assert_eq!(reply.headers["height"], "150");
    }

    #[tokio::test]
    async fn test_missing_reply_to_still_acks() {
        let (worker, handle) = worker(&Config::default());
        handle
            .submit(Incoming::new(5, test_images::gradient_png(10, 10), "orphan"))
            .await
            .unwrap();
        let ledger = handle.finish();

        let stats = worker.run().await.unwrap();
        assert_eq!(stats.replied, 0);
        assert!(ledger.published().is_empty());
        assert_eq!(ledger.acked(), vec![5]);
    }

    #[tokio::test]
    async fn test_publish_failure_is_fatal_and_leaves_delivery_unacked() {
        let (worker, handle) = worker(&Config::default());
        let ledger = handle.ledger();
        ledger.fail_publishes();
        handle.submit(job(1, b"junk".to_vec(), "x")).await.unwrap();
        handle.submit(job(2, b"junk".to_vec(), "y")).await.unwrap();

        let err = worker.run().await.unwrap_err();
        assert!(matches!(err, TransportError::Publish { .. }));
        assert!(ledger.acked().is_empty());
    }

    #[tokio::test]
    async fn test_ack_failure_is_fatal() {
        let (worker, handle) = worker(&Config::default());
        let ledger = handle.ledger();
        ledger.fail_acks();
        handle.submit(job(1, b"junk".to_vec(), "x")).await.unwrap();

        let err = worker.run().await.unwrap_err();
        assert!(matches!(err, TransportError::Ack { delivery_tag: 1, .. }));
        assert_eq!(ledger.published().len(), 1);
    }

    /// Raises shutdown as soon as the first delivery is handed out, so the
    /// signal lands while that job is in flight.
    struct ShutdownOnFirstDelivery {
        inner: MemoryBroker,
        trigger: Option<ShutdownTrigger>,
    }

    #[async_trait]
    impl Broker for ShutdownOnFirstDelivery {
        fn name(&self) -> &str {
            "shutdown-on-first"
        }

        async fn next_delivery(&mut self) -> Option<Result<Incoming, TransportError>> {
            let next = self.inner.next_delivery().await;
            if let Some(trigger) = self.trigger.take() {
                trigger.trigger();
            }
            next
        }

        async fn publish(&mut self, reply_to: &str, reply: &Reply) -> Result<(), TransportError> {
            self.inner.publish(reply_to, reply).await
        }

        async fn ack(&mut self, delivery_tag: u64) -> Result<(), TransportError> {
            self.inner.ack(delivery_tag).await
        }
    }

    #[tokio::test]
    async fn test_shutdown_mid_job_finishes_it_and_takes_no_more() {
        let (inner, handle) = MemoryBroker::new(4);
        let (trigger, listener) = shutdown::channel();
        handle
            .submit(job(1, test_images::gradient_png(1200, 900), "large"))
            .await
            .unwrap();
        handle.submit(job(2, test_images::gradient_png(10, 10), "queued")).await.unwrap();
        let ledger = handle.ledger();

        let broker = ShutdownOnFirstDelivery {
            inner,
            trigger: Some(trigger),
        };
        let worker = Worker::new(broker, JobPipeline::new(&Config::default()), listener);
        assert_eq!(worker.stats(), &WorkerStats::default());

        let stats = tokio::time::timeout(Duration::from_secs(60), worker.run())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(stats.received, 1);
        assert_eq!(stats.replied, 1);
        assert_eq!(stats.acknowledged, 1);
        assert_eq!(ledger.acked(), vec![1]);
        let published = ledger.published();
        assert_eq!(published.len(), 1);
        assert!(published[0].reply.is_success());
        assert_eq!(published[0].reply.correlation_id.as_deref(), Some("corr-1"));
        drop(handle);
    }

    #[tokio::test]
    async fn test_shutdown_stops_idle_worker() {
        let (broker, handle) = MemoryBroker::new(4);
        let (trigger, listener) = shutdown::channel();
        let worker = Worker::new(broker, JobPipeline::new(&Config::default()), listener);

        let task = tokio::spawn(worker.run());
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.trigger();

        let stats = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(stats, WorkerStats::default());
        // The handle was alive throughout, so only shutdown could end the run.
        drop(handle);
    }

    #[tokio::test]
    async fn test_triggered_shutdown_takes_no_new_jobs() {
        let (broker, handle) = MemoryBroker::new(4);
        let (trigger, listener) = shutdown::channel();
        handle.submit(job(1, b"junk".to_vec(), "x")).await.unwrap();
        trigger.trigger();

        let stats = Worker::new(broker, JobPipeline::new(&Config::default()), listener)
            .run()
            .await
            .unwrap();
        assert_eq!(stats.received, 0);
        assert!(handle.ledger().acked().is_empty());
    }
}
