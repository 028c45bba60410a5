//! Aspect-preserving target size computation and Catmull-Rom resampling.

use image::imageops::{self, FilterType};
use image::RgbaImage;

use super::decode::DecodedImage;

/// Target dimensions for one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeSpec {
    pub width: u32,
    pub height: u32,
}

/// Scale the longer edge to `max_size` and the shorter one proportionally.
///
/// When `width == height` the height is treated as the longer edge, which for
/// a square still lands on `(max_size, max_size)`. Images smaller than
/// `max_size` are scaled up. Computed edges are floored at 1 pixel so extreme
/// aspect ratios never yield an empty raster.
pub fn compute_target_size(width: u32, height: u32, max_size: u32) -> ResizeSpec {
    let (w, h, max) = (width as u64, height as u64, max_size as u64);
    let (target_w, target_h) = if w > h {
        (max, h * max / w)
    } else {
        (w * max / h.max(1), max)
    };
    ResizeSpec {
        width: target_w.max(1) as u32,
        height: target_h.max(1) as u32,
    }
}

/// Resample onto a fresh `spec`-sized canvas. The source raster is consumed.
///
/// The canvas starts fully transparent, so compositing the resampled pixels
/// "over" it is the same as taking them as-is, alpha included.
pub fn resample(image: DecodedImage, spec: ResizeSpec) -> DecodedImage {
    let DecodedImage { raster, format } = image;
    let raster: RgbaImage = if raster.dimensions() == (spec.width, spec.height) {
        raster
    } else {
        imageops::resize(&raster, spec.width, spec.height, FilterType::CatmullRom)
    };
    DecodedImage { raster, format }
}
