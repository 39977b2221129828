//! Resampling to a bounded working resolution.
//!
//! Source photos are reduced so the longest axis matches the configured
//! `working_resolution` before the crop rectangle is exposed. The erase
//! and stroke stages recover a silhouette from the result, so only
//! smoothing filters are offered: nearest-neighbor would alias the
//! subject's edge.
//!
//! Images already at or below the target are returned unchanged.

use std::fmt;

use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, RgbaImage};

/// Resampling filter used when downsampling or fitting layers.
///
/// Ordered from fastest to slowest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DownsampleFilter {
    /// Bilinear interpolation: fast, decent quality.
    Triangle,
    /// Bicubic (Catmull-Rom): moderate speed, keeps edges crisp.
    #[default]
    CatmullRom,
    /// Gaussian: moderate speed, smooth output.
    Gaussian,
    /// Lanczos with 3 lobes: slowest, sharpest for photos.
    Lanczos3,
}

impl DownsampleFilter {
    /// Convert to the `image` crate's `FilterType`.
    #[must_use]
    pub const fn to_image_filter(self) -> FilterType {
        match self {
            Self::Triangle => FilterType::Triangle,
            Self::CatmullRom => FilterType::CatmullRom,
            Self::Gaussian => FilterType::Gaussian,
            Self::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

impl fmt::Display for DownsampleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Triangle => f.write_str("Triangle"),
            Self::CatmullRom => f.write_str("CatmullRom"),
            Self::Gaussian => f.write_str("Gaussian"),
            Self::Lanczos3 => f.write_str("Lanczos3"),
        }
    }
}

/// Downsample so the longest axis is at most `max_dimension` pixels.
///
/// Returns the (possibly unchanged) image and whether resampling was
/// applied. Aspect ratio is preserved.
#[must_use]
pub fn downsample(
    image: RgbaImage,
    max_dimension: u32,
    filter: DownsampleFilter,
) -> (RgbaImage, bool) {
    let bounds = Dimensions::new(max_dimension, max_dimension);
    let Some(target) = fit_within(Dimensions::of(&image), bounds) else {
        return (image, false);
    };
    let resized = image::imageops::resize(
        &image,
        target.width,
        target.height,
        filter.to_image_filter(),
    );
    (resized, true)
}

/// Resample to exact dimensions.
#[must_use]
pub fn resize_exact(image: &RgbaImage, target: Dimensions, filter: DownsampleFilter) -> RgbaImage {
    image::imageops::resize(image, target.width, target.height, filter.to_image_filter())
}

/// Largest size with the same aspect ratio as `size` that fits inside
/// `bounds`, or `None` if `size` already fits.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn fit_within(size: Dimensions, bounds: Dimensions) -> Option<Dimensions> {
    if size.width <= bounds.width && size.height <= bounds.height {
        return None;
    }
    let scale = (f64::from(bounds.width) / f64::from(size.width))
        .min(f64::from(bounds.height) / f64::from(size.height));
    let axis = |v: u32| ((f64::from(v) * scale).round() as u32).max(1);
    Some(Dimensions::new(axis(size.width), axis(size.height)))
}
