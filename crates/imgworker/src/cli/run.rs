//! The `imgworker run` command: consume jobs until a shutdown signal arrives.

use anyhow::Context;
use clap::Args;
use imgworker_core::shutdown::{self, ShutdownTrigger};
use imgworker_core::{Config, ImgWorker};

use super::PipelineOverrides;
use crate::amqp::AmqpBroker;

/// Arguments for the `run` command.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// AMQP connection URI
    #[arg(long, env = "IMGWORKER_AMQP_ADDRESS")]
    pub address: Option<String>,

    /// Queue to consume jobs from
    #[arg(long)]
    pub queue: Option<String>,

    /// Unacknowledged deliveries to prefetch
    #[arg(long)]
    pub prefetch: Option<u16>,

    #[command(flatten)]
    pub overrides: PipelineOverrides,
}

impl RunArgs {
    fn apply(&self, mut config: Config) -> anyhow::Result<Config> {
        if let Some(address) = &self.address {
            config.broker.address = address.clone();
        }
        if let Some(queue) = &self.queue {
            config.broker.queue = queue.clone();
        }
        if let Some(prefetch) = self.prefetch {
            config.broker.prefetch = prefetch;
        }
        self.overrides.apply(config)
    }
}

/// Execute the run command.
pub async fn execute(args: RunArgs, config: Config) -> anyhow::Result<()> {
    let config = args.apply(config)?;
    let app = ImgWorker::new(config)?;

    tracing::info!(
        queue = %app.config().broker.queue,
        max_size = app.config().resize.max_size,
        sink = ?app.config().sink.mode,
        "Starting imgworker"
    );

    let broker = AmqpBroker::connect(&app.config().broker)
        .await
        .context("Failed to connect to broker")?;

    let (trigger, listener) = shutdown::channel();
    tokio::spawn(forward_signals(trigger));

    let stats = app
        .worker(broker, listener)
        .run()
        .await
        .context("Worker stopped on a transport error")?;

    tracing::info!(
        received = stats.received,
        delivered = stats.delivered,
        failed = stats.failed,
        "Worker stopped"
    );
    Ok(())
}

/// Trip the shutdown signal on Ctrl-C or SIGTERM.
async fn forward_signals(trigger: ShutdownTrigger) {
    wait_for_signal().await;
    tracing::info!("Shutdown requested, finishing in-flight job");
    trigger.trigger();
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            tracing::warn!("Cannot listen for SIGTERM: {e}");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
