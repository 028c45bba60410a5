//! Format-specific re-encoding.

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{DynamicImage, ExtendedColorType, ImageEncoder};

use crate::config::{EncodeConfig, PngCompression};
use crate::error::JobError;

use super::decode::{DecodedImage, FormatTag};

/// Encodes rasters with the configured per-format settings.
#[derive(Debug, Clone)]
pub struct FormatEncoder {
    config: EncodeConfig,
}

impl FormatEncoder {
    /// Create a new encoder with the given settings.
    pub fn new(config: EncodeConfig) -> Self {
        Self { config }
    }

    /// Encode `image` as `format`.
    pub fn encode(&self, image: &DecodedImage, format: &FormatTag) -> Result<Vec<u8>, JobError> {
        match format {
            FormatTag::Jpeg => self.encode_jpeg(image),
            FormatTag::Png => self.encode_png(image),
            FormatTag::Unsupported(name) => Err(JobError::UnsupportedFormat(name.clone())),
        }
    }

    fn encode_jpeg(&self, image: &DecodedImage) -> Result<Vec<u8>, JobError> {
        // JPEG has no alpha channel; it is dropped.
        let rgb = DynamicImage::ImageRgba8(image.raster.clone()).to_rgb8();
        let (width, height) = rgb.dimensions();

        let mut buffer = Vec::new();
        JpegEncoder::new_with_quality(&mut buffer, self.config.jpeg_quality)
            .write_image(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
            .map_err(|e| JobError::Encode {
                format: "jpeg".to_string(),
                message: e.to_string(),
            })?;
        Ok(buffer)
    }

    fn encode_png(&self, image: &DecodedImage) -> Result<Vec<u8>, JobError> {
        let compression = match self.config.png_compression {
            PngCompression::Fast => CompressionType::Fast,
            PngCompression::Default => CompressionType::Default,
            PngCompression::Best => CompressionType::Best,
        };
        let (width, height) = image.raster.dimensions();

        let mut buffer = Vec::new();
        PngEncoder::new_with_quality(&mut buffer, compression, FilterType::Adaptive)
            .write_image(image.raster.as_raw(), width, height, ExtendedColorType::Rgba8)
            .map_err(|e| JobError::Encode {
                format: "png".to_string(),
                message: e.to_string(),
            })?;
        Ok(buffer)
    }
}
