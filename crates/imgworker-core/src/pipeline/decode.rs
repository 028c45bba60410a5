//! Image decoding with content-based format detection and size limits.

use image::{DynamicImage, GenericImageView, ImageFormat, RgbaImage};
use std::fmt;
use std::io::Cursor;

use crate::config::LimitsConfig;
use crate::error::JobError;

/// Format of a decoded payload, as far as the encoder is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatTag {
    Jpeg,
    Png,
    /// A recognized container we do not re-encode (name of the format)
    Unsupported(String),
}

impl FormatTag {
    /// File extension used by the filesystem sink.
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            Self::Jpeg => Some("jpg"),
            Self::Png => Some("png"),
            Self::Unsupported(_) => None,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported(_))
    }
}

impl From<ImageFormat> for FormatTag {
    fn from(format: ImageFormat) -> Self {
        match format {
            ImageFormat::Jpeg => Self::Jpeg,
            ImageFormat::Png => Self::Png,
            other => Self::Unsupported(format_to_string(other)),
        }
    }
}

impl fmt::Display for FormatTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Jpeg => f.write_str("jpeg"),
            Self::Png => f.write_str("png"),
            Self::Unsupported(name) => f.write_str(name),
        }
    }
}

/// An RGBA raster plus the format it was decoded from.
pub struct DecodedImage {
    /// Pixel data, always 8-bit RGBA
    pub raster: RgbaImage,
    /// Detected container format
    pub format: FormatTag,
}

impl DecodedImage {
    pub fn width(&self) -> u32 {
        self.raster.width()
    }

    pub fn height(&self) -> u32 {
        self.raster.height()
    }
}

/// Decodes payloads into RGBA rasters.
#[derive(Debug, Clone)]
pub struct ImageDecoder {
    limits: LimitsConfig,
}

impl ImageDecoder {
    /// Create a new decoder with the given limits.
    pub fn new(limits: LimitsConfig) -> Self {
        Self { limits }
    }

    /// Decode a payload. The format is sniffed from the content, never trusted
    /// from the caller.
    pub fn decode(&self, bytes: &[u8]) -> Result<DecodedImage, JobError> {
        let mut reader = image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| JobError::Decode(format!("Cannot detect image format: {}", e)))?;

        let format = reader
            .format()
            .ok_or_else(|| JobError::Decode("Unrecognized image container".to_string()))?;

        let mut limits = image::Limits::default();
        limits.max_image_width = Some(self.limits.max_image_dimension);
        limits.max_image_height = Some(self.limits.max_image_dimension);
        reader.limits(limits);

        let image = reader
            .decode()
            .map_err(|e| JobError::Decode(e.to_string()))?;

        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(JobError::Decode(format!(
                "Image has empty bounds ({}x{})",
                width, height
            )));
        }

        Ok(DecodedImage {
            raster: into_rgba(image),
            format: FormatTag::from(format),
        })
    }
}

fn into_rgba(image: DynamicImage) -> RgbaImage {
    match image {
        DynamicImage::ImageRgba8(raster) => raster,
        other => other.to_rgba8(),
    }
}

/// Convert an ImageFormat to a string representation.
pub fn format_to_string(format: ImageFormat) -> String {
    match format {
        ImageFormat::Jpeg => "jpeg".to_string(),
        ImageFormat::Png => "png".to_string(),
        ImageFormat::WebP => "webp".to_string(),
        ImageFormat::Gif => "gif".to_string(),
        ImageFormat::Tiff => "tiff".to_string(),
        ImageFormat::Bmp => "bmp".to_string(),
        ImageFormat::Ico => "ico".to_string(),
        ImageFormat::Pnm => "pnm".to_string(),
        ImageFormat::Avif => "avif".to_string(),
        _ => "unknown".to_string(),
    }
}
