//! Sticker outline: turns a blurred halo into a crisp, opaque stroke.
//!
//! The subject is drawn onto a slightly larger working canvas over a
//! near-white blurred shadow of itself. That shadow fades from the
//! subject's edge outward; forcing every pixel with any coverage to full
//! opacity turns the fade into a hard-edged outline that follows the
//! blurred silhouette. A second, gray shadow pass underneath the now
//! opaque shape gives the sticker a soft drop shadow.
//!
//! The alpha rule is strict: alpha `> 0` becomes 255, alpha `0` stays 0.
//! Anti-aliasing fringes therefore become part of the outline, and
//! nothing outside the halo gains opacity.

use crate::blend;
use crate::blur::drop_shadow;
use crate::types::{Color, RgbaImage, StrokeOptions};

/// Force every pixel with non-zero alpha to full opacity, in place.
///
/// `buf` is a contiguous RGBA byte buffer; RGB channels are not touched.
/// A trailing partial pixel (length not divisible by four) is ignored.
pub fn opacify_alpha(buf: &mut [u8]) {
    for px in buf.chunks_exact_mut(4) {
        if px[3] > 0 {
            px[3] = 255;
        }
    }
}

/// Outline `image` with an opaque halo and a soft drop shadow.
///
/// The returned raster is `stroke_width_px` larger than `image` on each
/// axis, with `image` drawn at offset `stroke_width_px / 2`.
#[must_use]
pub fn add_stroke(
    image: &RgbaImage,
    options: &StrokeOptions,
    halo_color: Color,
    shadow_color: Color,
) -> RgbaImage {
    let stroke = options.stroke_width_px;
    let offset = i64::from(stroke / 2);

    // 1. Working canvas with room for the outline.
    let mut placed = RgbaImage::new(image.width() + stroke, image.height() + stroke);
    image::imageops::replace(&mut placed, image, offset, offset);

    // 2. Subject over its light halo.
    let mut working = drop_shadow(&placed, halo_color, stroke);
    blend::over(&mut working, &placed, 0, 0);

    // 3. Harden every touched pixel.
    opacify_alpha(&mut working);

    // 4. Gray shadow under the opaque outline.
    let mut out = drop_shadow(&working, shadow_color, stroke);
    blend::over(&mut out, &working, 0, 0);
    out
}
