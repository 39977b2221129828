//! Source-over compositing on straight-alpha RGBA rasters.
//!
//! All layer stacking in the pipeline (shadow under subject, subject onto
//! canvas, text onto canvas) goes through [`over`]. The integer math is
//! exact at the ends of the alpha range: an opaque source replaces the
//! destination pixel unchanged and a fully transparent source leaves it
//! untouched.

use image::Rgba;

use crate::types::RgbaImage;

/// Composite one straight-alpha pixel over another.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn over_pixel(src: Rgba<u8>, dst: Rgba<u8>) -> Rgba<u8> {
    let sa = u32::from(src[3]);
    if sa == 255 {
        return src;
    }
    if sa == 0 {
        return dst;
    }
    let da = u32::from(dst[3]);
    // Alpha contributions scaled by 255.
    let src_w = sa * 255;
    let dst_w = da * (255 - sa);
    let total = src_w + dst_w;
    if total == 0 {
        return Rgba([0, 0, 0, 0]);
    }
    let channel = |s: u8, d: u8| {
        let num = u32::from(s) * src_w + u32::from(d) * dst_w;
        ((num + total / 2) / total) as u8
    };
    Rgba([
        channel(src[0], dst[0]),
        channel(src[1], dst[1]),
        channel(src[2], dst[2]),
        ((total + 127) / 255) as u8,
    ])
}

/// Composite `src` over `dst` with its top-left corner at `(x, y)`.
///
/// Parts of `src` that fall outside `dst` are clipped.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn over(dst: &mut RgbaImage, src: &RgbaImage, x: i64, y: i64) {
    let (dw, dh) = (i64::from(dst.width()), i64::from(dst.height()));
    let (sw, sh) = (i64::from(src.width()), i64::from(src.height()));

    let x0 = x.max(0);
    let y0 = y.max(0);
    let x1 = (x + sw).min(dw);
    let y1 = (y + sh).min(dh);

    for dy in y0..y1 {
        for dx in x0..x1 {
            let s = *src.get_pixel((dx - x) as u32, (dy - y) as u32);
            let d = dst.get_pixel_mut(dx as u32, dy as u32);
            *d = over_pixel(s, *d);
        }
    }
}
