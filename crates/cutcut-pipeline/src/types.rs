//! Shared types for the cutcut sticker pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::downsample::DownsampleFilter;

/// Re-export `RgbaImage` so downstream crates can hold rasters without
/// depending on `image` directly.
pub use image::RgbaImage;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Create a new dimension pair.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Dimensions of an existing raster.
    #[must_use]
    pub fn of(image: &RgbaImage) -> Self {
        Self::new(image.width(), image.height())
    }

    /// Scale both axes by `factor`, rounding to the nearest pixel and
    /// never going below one pixel.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn scaled(self, factor: f32) -> Self {
        let scale = |v: u32| ((v as f32 * factor).round() as u32).max(1);
        Self::new(scale(self.width), scale(self.height))
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Straight (non-premultiplied) RGBA color.
///
/// Serialized as a CSS hex string (`"#rrggbb"` or `"#rrggbbaa"`; the
/// short `"#rgb"` form is accepted on input).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color(pub [u8; 4]);

impl Color {
    /// Opaque white.
    pub const WHITE: Self = Self([255, 255, 255, 255]);
    /// Opaque black.
    pub const BLACK: Self = Self([0, 0, 0, 255]);
    /// The light gray used for the drop shadow under the outline.
    pub const SHADOW_GRAY: Self = Self([0xaa, 0xaa, 0xaa, 255]);

    /// Create an opaque color.
    #[must_use]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b, 255])
    }

    /// Alpha channel.
    #[must_use]
    pub const fn alpha(self) -> u8 {
        self.0[3]
    }

    /// Convert to an `image` pixel.
    #[must_use]
    pub const fn to_rgba(self) -> image::Rgba<u8> {
        image::Rgba(self.0)
    }

    /// Parse a CSS hex color (`#rgb`, `#rrggbb`, or `#rrggbbaa`).
    ///
    /// # Errors
    ///
    /// Returns a message describing the problem when the string is not a
    /// hex color of a supported length.
    pub fn parse_hex(s: &str) -> Result<Self, String> {
        let s = s.trim();
        let hex = s
            .strip_prefix('#')
            .ok_or_else(|| format!("not a hex color: {s:?}"))?;
        let byte = |i: usize| {
            hex.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| format!("invalid hex color: {s:?}"))
        };
        match hex.len() {
            3 => {
                let mut rgb = [0u8; 3];
                for (slot, ch) in rgb.iter_mut().zip(hex.chars()) {
                    let n = ch
                        .to_digit(16)
                        .ok_or_else(|| format!("invalid hex char: {ch}"))?;
                    #[expect(clippy::cast_possible_truncation)]
                    {
                        *slot = (n * 17) as u8;
                    }
                }
                Ok(Self::rgb(rgb[0], rgb[1], rgb[2]))
            }
            6 => Ok(Self::rgb(byte(0)?, byte(2)?, byte(4)?)),
            8 => Ok(Self([byte(0)?, byte(2)?, byte(4)?, byte(6)?])),
            _ => Err(format!("unexpected hex length: {s:?}")),
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b, a] = self.0;
        if a == 255 {
            write!(f, "#{r:02x}{g:02x}{b:02x}")
        } else {
            write!(f, "#{r:02x}{g:02x}{b:02x}{a:02x}")
        }
    }
}

impl Serialize for Color {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Outline settings for the stroke-compositing step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrokeOptions {
    /// Outline thickness in pixels. Also the blur radius of the halo and
    /// the amount the working canvas grows by on each axis.
    pub stroke_width_px: u32,
}

impl StrokeOptions {
    /// Default outline thickness.
    pub const DEFAULT_STROKE_WIDTH_PX: u32 = 3;
}

impl Default for StrokeOptions {
    fn default() -> Self {
        Self {
            stroke_width_px: Self::DEFAULT_STROKE_WIDTH_PX,
        }
    }
}

/// Eraser brush geometry for the manual erase surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrushOptions {
    /// Radius of the dot stamped at every pointer position.
    pub dot_radius: f32,
    /// Width of the segment joining consecutive pointer positions.
    pub line_width: f32,
}

impl BrushOptions {
    /// Default dot radius in pixels.
    pub const DEFAULT_DOT_RADIUS: f32 = 10.0;
    /// Default connecting-segment width in pixels.
    pub const DEFAULT_LINE_WIDTH: f32 = 20.0;
}

impl Default for BrushOptions {
    fn default() -> Self {
        Self {
            dot_radius: Self::DEFAULT_DOT_RADIUS,
            line_width: Self::DEFAULT_LINE_WIDTH,
        }
    }
}

/// How text overlays are drawn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextStyle {
    /// Glyph height in logical pixels.
    pub size_px: f32,
    /// Outline color drawn around every glyph.
    pub stroke_color: Color,
    /// Outline thickness in logical pixels.
    pub stroke_width_px: u32,
    /// Glyph fill color.
    pub fill_color: Color,
    /// Gap between the canvas bottom edge and the lowest line, and
    /// between stacked lines.
    pub margin_px: u32,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            size_px: 48.0,
            stroke_color: Color::WHITE,
            stroke_width_px: 3,
            fill_color: Color::BLACK,
            margin_px: 8,
        }
    }
}

/// One line of text composited above the sticker image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextOverlay {
    /// The text to draw.
    pub content: String,
    /// Name of the font the text is drawn with.
    pub font: String,
    /// Outline color.
    pub stroke_color: Color,
    /// Fill color.
    pub fill_color: Color,
    /// Glyph height in logical pixels.
    pub size_px: f32,
}

/// Configuration for a sticker editing session.
///
/// All parameters have defaults; the CLI overrides individual fields or
/// replaces the whole struct from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    /// Longest axis, in pixels, a source image is downsampled to before
    /// cropping.
    pub working_resolution: u32,

    /// Resampling filter used for the working-resolution downsample and
    /// for fitting layers onto the canvas.
    pub downsample_filter: DownsampleFilter,

    /// Logical edge length of the square sticker canvas.
    pub canvas_size: u32,

    /// Display pixel density. The canvas backing store is
    /// `canvas_size * pixel_ratio` pixels on each axis.
    pub pixel_ratio: f32,

    /// Outline settings.
    pub stroke: StrokeOptions,

    /// Color of the opaque outline halo.
    pub halo_color: Color,

    /// Color of the soft drop shadow under the outline.
    pub shadow_color: Color,

    /// Eraser brush geometry.
    pub brush: BrushOptions,

    /// Text overlay style.
    pub text: TextStyle,

    /// Emoji attached to uploaded stickers.
    pub sticker_emoji: String,
}

impl PipelineConfig {
    /// Default working resolution (longest axis, pixels).
    pub const DEFAULT_WORKING_RESOLUTION: u32 = 1024;
    /// Default downsample filter.
    pub const DEFAULT_DOWNSAMPLE_FILTER: DownsampleFilter = DownsampleFilter::CatmullRom;
    /// Default logical canvas edge (the sticker size Telegram expects).
    pub const DEFAULT_CANVAS_SIZE: u32 = 512;
    /// Default display pixel density.
    pub const DEFAULT_PIXEL_RATIO: f32 = 1.0;
    /// Default emoji attached to uploads.
    pub const DEFAULT_STICKER_EMOJI: &'static str = "\u{1f642}";

    /// Check field invariants.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] naming the first field
    /// that is out of range.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.working_resolution == 0 {
            return Err(PipelineError::InvalidConfig(
                "workingResolution must be at least 1".into(),
            ));
        }
        if self.canvas_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "canvasSize must be at least 1".into(),
            ));
        }
        if !(self.pixel_ratio.is_finite() && self.pixel_ratio > 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "pixelRatio must be positive, got {}",
                self.pixel_ratio
            )));
        }
        if !(self.brush.dot_radius > 0.0 && self.brush.line_width > 0.0) {
            return Err(PipelineError::InvalidConfig(
                "brush dotRadius and lineWidth must be positive".into(),
            ));
        }
        if !(self.text.size_px.is_finite() && self.text.size_px > 0.0) {
            return Err(PipelineError::InvalidConfig(
                "text sizePx must be positive".into(),
            ));
        }
        if self.sticker_emoji.trim().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "stickerEmoji must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Logical canvas dimensions.
    #[must_use]
    pub const fn canvas_dimensions(&self) -> Dimensions {
        Dimensions::new(self.canvas_size, self.canvas_size)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            working_resolution: Self::DEFAULT_WORKING_RESOLUTION,
            downsample_filter: Self::DEFAULT_DOWNSAMPLE_FILTER,
            canvas_size: Self::DEFAULT_CANVAS_SIZE,
            pixel_ratio: Self::DEFAULT_PIXEL_RATIO,
            stroke: StrokeOptions::default(),
            halo_color: Color::WHITE,
            shadow_color: Color::SHADOW_GRAY,
            brush: BrushOptions::default(),
            text: TextStyle::default(),
            sticker_emoji: Self::DEFAULT_STICKER_EMOJI.to_owned(),
        }
    }
}

/// Error categories reported to the shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed or undecodable image input; the operator must supply new
    /// input.
    AssetDecodeError,
    /// A message arrived that the current stage cannot accept.
    StageContractViolation,
    /// The removal or upload service failed; the operator may retry.
    RemoteServiceError,
    /// A required setting (API key, bot token, font) is missing.
    MissingConfigurationError,
    /// The session can no longer continue and must be reset.
    Fatal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AssetDecodeError => "AssetDecodeError",
            Self::StageContractViolation => "StageContractViolation",
            Self::RemoteServiceError => "RemoteServiceError",
            Self::MissingConfigurationError => "MissingConfigurationError",
            Self::Fatal => "Fatal",
        };
        f.write_str(name)
    }
}

/// Errors raised by pipeline stages.
///
/// Stage errors never escape the orchestrator: they are converted into
/// an outbound `ErrorReported` message. Only [`ErrorKind::Fatal`] errors
/// move the session into the halted state.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// A base64 payload could not be decoded.
    #[error("invalid base64 image payload: {0}")]
    Base64(#[from] base64::DecodeError),

    /// A `data:` URL was malformed or not base64-encoded.
    #[error("invalid data URL: {0}")]
    InvalidDataUrl(String),

    /// The source image could not be fetched.
    #[error("source image unavailable: {0}")]
    SourceUnavailable(String),

    /// Failed to encode a raster.
    #[error("failed to encode image: {0}")]
    ImageEncode(String),

    /// Pipeline configuration is invalid.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    /// A message is not accepted by the current stage.
    #[error("{message} is not accepted while {stage}")]
    StageContract {
        /// Name of the rejected message.
        message: &'static str,
        /// Stage that rejected it.
        stage: crate::stage::Stage,
    },

    /// A message payload is out of range for the current stage.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A setting required for the requested operation is absent.
    #[error("missing configuration: {0}")]
    MissingConfiguration(&'static str),

    /// The removal or upload service reported a failure.
    #[error("remote service failed: {0}")]
    RemoteService(String),

    /// An internal invariant does not hold.
    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Category reported to the shell.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyInput
            | Self::ImageDecode(_)
            | Self::Base64(_)
            | Self::InvalidDataUrl(_)
            | Self::SourceUnavailable(_) => ErrorKind::AssetDecodeError,
            Self::StageContract { .. } | Self::InvalidInput(_) => {
                ErrorKind::StageContractViolation
            }
            Self::MissingConfiguration(_) => ErrorKind::MissingConfigurationError,
            Self::RemoteService(_) => ErrorKind::RemoteServiceError,
            Self::ImageEncode(_) | Self::InvalidConfig(_) | Self::Internal(_) => ErrorKind::Fatal,
        }
    }

    /// Whether the error halts the session.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Fatal)
    }
}
