//! Subcommand implementations and shared flag handling.

pub mod config;
pub mod resize;
pub mod run;

use clap::{Args, ValueEnum};
use imgworker_core::config::SinkMode;
use imgworker_core::Config;
use std::path::PathBuf;

/// Result delivery mode, as accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SinkArg {
    /// Return encoded bytes in the reply body
    Bytes,
    /// Write to the output directory and return the path
    Path,
}

impl From<SinkArg> for SinkMode {
    fn from(arg: SinkArg) -> Self {
        match arg {
            SinkArg::Bytes => SinkMode::Bytes,
            SinkArg::Path => SinkMode::Path,
        }
    }
}

/// Flags that override pipeline settings from the config file.
#[derive(Args, Debug, Default, Clone)]
pub struct PipelineOverrides {
    /// Longer edge of the output image in pixels
    #[arg(long)]
    pub max_size: Option<u32>,

    /// How results are delivered
    #[arg(long, value_enum)]
    pub sink: Option<SinkArg>,

    /// Output directory for the path sink (supports ~)
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// JPEG quality (1-100)
    #[arg(long)]
    pub jpeg_quality: Option<u8>,
}

impl PipelineOverrides {
    /// Apply the flags on top of `config` and re-validate.
    pub fn apply(&self, mut config: Config) -> anyhow::Result<Config> {
        if let Some(max_size) = self.max_size {
            config.resize.max_size = max_size;
        }
        if let Some(sink) = self.sink {
            config.sink.mode = sink.into();
        }
        if let Some(dir) = &self.output_dir {
            config.sink.base_dir = dir.clone();
        }
        if let Some(quality) = self.jpeg_quality {
            config.encode.jpeg_quality = quality;
        }
        config.validate()?;
        Ok(config)
    }
}
