//! Blurred silhouette shadows.
//!
//! Emulates a canvas `shadowBlur` pass: the source's alpha channel is
//! blurred with [`imageproc::filter::gaussian_blur_f32`] and painted in a
//! single flat color. A canvas shadow blur of `b` corresponds to a
//! Gaussian with standard deviation `b / 2`.

use image::{GrayImage, Luma, Rgba};

use crate::types::{Color, RgbaImage};

/// Blur a single-channel image.
///
/// Non-positive sigma values return the image unchanged, since
/// `imageproc` panics on `sigma <= 0.0`.
#[must_use = "returns the blurred image"]
pub fn gaussian_blur(image: &GrayImage, sigma: f32) -> GrayImage {
    if sigma <= 0.0 {
        return image.clone();
    }
    imageproc::filter::gaussian_blur_f32(image, sigma)
}

/// Extract the alpha channel.
#[must_use]
pub fn alpha_channel(image: &RgbaImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        Luma([image.get_pixel(x, y)[3]])
    })
}

/// Render the shadow `image` would cast with the given color and blur
/// radius (canvas `shadowBlur` units).
///
/// The result has the same size as `image`; the shadow's alpha is the
/// blurred source alpha scaled by the color's alpha, its RGB is the flat
/// shadow color.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn drop_shadow(image: &RgbaImage, color: Color, blur_radius: u32) -> RgbaImage {
    let sigma = blur_radius as f32 / 2.0;
    let blurred = gaussian_blur(&alpha_channel(image), sigma);
    let [r, g, b, a] = color.0;
    let tint = u32::from(a);
    RgbaImage::from_fn(image.width(), image.height(), |x, y| {
        let alpha = u32::from(blurred.get_pixel(x, y)[0]);
        Rgba([r, g, b, ((alpha * tint + 127) / 255) as u8])
    })
}
