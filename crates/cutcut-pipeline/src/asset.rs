//! Image assets and their transferable encodings.
//!
//! An [`ImageAsset`] is the raster the orchestrator hands from stage to
//! stage. Outside the pipeline, images travel as encoded bytes, base64
//! strings, or `data:` URLs; this module converts between those forms
//! and in-memory RGBA rasters.

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::ImageEncoder as _;
use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, PipelineError, RgbaImage};

/// Which stage produced an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Decoded and normalized source photo.
    Source,
    /// Output of the crop stage.
    Cropped,
    /// Output of the erase stage (remote or manual).
    Erased,
    /// Rendered sticker canvas.
    Composited,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Source => "source",
            Self::Cropped => "cropped",
            Self::Erased => "erased",
            Self::Composited => "composited",
        })
    }
}

/// An owned raster plus the tag of the stage that produced it.
///
/// Assets are never mutated once built; a stage that changes pixels
/// produces a new asset.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageAsset {
    raster: RgbaImage,
    provenance: Provenance,
}

impl ImageAsset {
    /// Wrap a raster.
    #[must_use]
    pub const fn new(raster: RgbaImage, provenance: Provenance) -> Self {
        Self { raster, provenance }
    }

    /// The pixels.
    #[must_use]
    pub const fn raster(&self) -> &RgbaImage {
        &self.raster
    }

    /// The producing stage.
    #[must_use]
    pub const fn provenance(&self) -> Provenance {
        self.provenance
    }

    /// Pixel dimensions.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::of(&self.raster)
    }

    /// Release the raster.
    #[must_use]
    pub fn into_raster(self) -> RgbaImage {
        self.raster
    }

    /// Encode as a PNG `data:` URL.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ImageEncode`] if PNG encoding fails.
    pub fn to_data_url(&self) -> Result<String, PipelineError> {
        encode_data_url(&self.raster)
    }
}

/// Decode raw image bytes (PNG, JPEG, BMP, WebP) into RGBA.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the format is unrecognized
/// or the data is corrupt.
pub fn decode(bytes: &[u8]) -> Result<RgbaImage, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }
    let img = image::load_from_memory(bytes)?;
    Ok(img.to_rgba8())
}

/// Decode a base64 payload. Accepts either a bare base64 string or a
/// base64 `data:` URL.
///
/// # Errors
///
/// Returns an asset-decode class error if the payload is not valid
/// base64 or does not hold a decodable image.
pub fn decode_base64(payload: &str) -> Result<RgbaImage, PipelineError> {
    let bytes = if is_data_url(payload) {
        data_url_bytes(payload)?
    } else {
        STANDARD.decode(strip_whitespace(payload))?
    };
    decode(&bytes)
}

/// Encode a raster as PNG bytes.
///
/// # Errors
///
/// Returns [`PipelineError::ImageEncode`] if the encoder fails.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, PipelineError> {
    let mut buf = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(&mut buf);
    encoder
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::Rgba8,
        )
        .map_err(|e| PipelineError::ImageEncode(e.to_string()))?;
    Ok(buf)
}

/// Encode a raster as a base64 PNG string (no `data:` prefix).
///
/// # Errors
///
/// Returns [`PipelineError::ImageEncode`] if PNG encoding fails.
pub fn encode_base64_png(image: &RgbaImage) -> Result<String, PipelineError> {
    Ok(STANDARD.encode(encode_png(image)?))
}

/// Encode a raster as a `data:image/png;base64,` URL.
///
/// # Errors
///
/// Returns [`PipelineError::ImageEncode`] if PNG encoding fails.
pub fn encode_data_url(image: &RgbaImage) -> Result<String, PipelineError> {
    Ok(png_data_url(&encode_png(image)?))
}

/// Wrap already-encoded PNG bytes in a `data:` URL.
#[must_use]
pub fn png_data_url(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(png))
}

/// Whether `url` uses the `data:` scheme.
#[must_use]
pub fn is_data_url(url: &str) -> bool {
    url.trim_start()
        .get(..5)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("data:"))
}

/// Extract the bytes of a base64 `data:` URL.
///
/// Whitespace inside the payload is ignored, so `data:image/png;base64, AAAA`
/// decodes like its unspaced form.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidDataUrl`] if the URL has no payload
/// separator or is not base64-encoded, and [`PipelineError::Base64`] if
/// the payload is not valid base64.
pub fn data_url_bytes(url: &str) -> Result<Vec<u8>, PipelineError> {
    let url = url.trim();
    if !is_data_url(url) {
        return Err(PipelineError::InvalidDataUrl("missing data: scheme".into()));
    }
    let (header, payload) = url[5..]
        .split_once(',')
        .ok_or_else(|| PipelineError::InvalidDataUrl("missing ',' separator".into()))?;
    if !header
        .rsplit(';')
        .next()
        .is_some_and(|param| param.trim().eq_ignore_ascii_case("base64"))
    {
        return Err(PipelineError::InvalidDataUrl(format!(
            "only base64 data URLs are supported, got header {header:?}"
        )));
    }
    Ok(STANDARD.decode(strip_whitespace(payload))?)
}

fn strip_whitespace(s: &str) -> String {
    s.chars().filter(|c| !c.is_ascii_whitespace()).collect()
}
