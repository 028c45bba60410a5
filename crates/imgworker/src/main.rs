//! imgworker CLI - queue-driven image resize and recompress worker.
//!
//! The worker consumes image jobs from an AMQP queue, shrinks each image so
//! its longer edge matches the configured bound, re-encodes it as JPEG or
//! PNG, and replies to the job's `reply_to` queue.
//!
//! # Usage
//!
//! ```bash
//! # Consume from the configured queue until Ctrl-C
//! imgworker run
//!
//! # Process a single local file
//! imgworker resize photo.jpg --output small.jpg
//!
//! # View configuration
//! imgworker config show
//! ```

use clap::{Parser, Subcommand};
use imgworker_core::Config;
use std::path::PathBuf;

mod amqp;
mod cli;
mod logging;

/// imgworker - queue-driven image resize and recompress worker.
#[derive(Parser, Debug)]
#[command(name = "imgworker")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    /// Config file to use instead of the default location
    #[arg(short, long, global = true, env = "IMGWORKER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Consume jobs from the broker until interrupted
    Run(cli::run::RunArgs),

    /// Resize and recompress a single local image
    Resize(cli::resize::ResizeArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging isn't initialized yet, so use eprintln for config warnings.
    let config = match &cli.config {
        // An explicitly requested file must load
        Some(path) => Config::load_from(path)?,
        None => match Config::load() {
            Ok(config) => config,
            Err(e) => {
                eprintln!(
                    "Warning: Failed to load config: {e}\n  \
                     Using default configuration. Check your config file with `imgworker config path`."
                );
                Config::default()
            }
        },
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("imgworker v{}", imgworker_core::VERSION);

    match cli.command {
        Commands::Run(args) => cli::run::execute(args, config).await,
        Commands::Resize(args) => cli::resize::execute(args, config).await,
        Commands::Config(args) => cli::config::execute(args, config, cli.config).await,
    }
}
