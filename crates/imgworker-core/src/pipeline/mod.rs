//! Image processing pipeline components.
//!
//! This module contains all the stages a job passes through:
//! - **validate**: Turn a raw delivery into a typed job
//! - **decode**: Sniff the container format and decode to RGBA
//! - **resize**: Compute target bounds and resample
//! - **encode**: Re-encode with per-format settings
//! - **sink**: Return bytes inline or write them to disk
//! - **processor**: Orchestrates the full pipeline

pub mod decode;
pub mod encode;
pub mod processor;
pub mod resize;
pub mod sink;
pub mod validate;

// Re-exports for convenient access
pub use decode::{DecodedImage, FormatTag, ImageDecoder};
pub use encode::FormatEncoder;
pub use processor::JobPipeline;
pub use resize::{compute_target_size, resample, ResizeSpec};
pub use sink::ResultSink;
pub use validate::Validator;
