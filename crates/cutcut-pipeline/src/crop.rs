//! Crop rectangle selection.
//!
//! The rectangle is kept in working-resolution pixel coordinates and is
//! always clamped to the image. Committing it copies the pixels inside
//! without resampling.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::asset::{ImageAsset, Provenance};
use crate::message::{Inbound, Outbound};
use crate::stage::{Handled, Next, Stage, StageContext, StageHandler, StageInput};
use crate::types::{Dimensions, PipelineError};

/// An axis-aligned rectangle in image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRect {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width, at least 1.
    pub width: u32,
    /// Height, at least 1.
    pub height: u32,
}

impl CropRect {
    /// The whole image.
    #[must_use]
    pub const fn full(size: Dimensions) -> Self {
        Self {
            x: 0,
            y: 0,
            width: size.width,
            height: size.height,
        }
    }

    /// Clamp to `bounds`, keeping at least one pixel on each axis.
    #[must_use]
    pub fn clamped(self, bounds: Dimensions) -> Self {
        let x = self.x.min(bounds.width.saturating_sub(1));
        let y = self.y.min(bounds.height.saturating_sub(1));
        Self {
            x,
            y,
            width: self.width.clamp(1, (bounds.width - x).max(1)),
            height: self.height.clamp(1, (bounds.height - y).max(1)),
        }
    }

    /// The largest rectangle of aspect `ratio` (width / height) inside
    /// `self`, centered on it.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn fit_aspect(self, ratio: f32) -> Self {
        let (w, h) = (self.width as f32, self.height as f32);
        let (width, height) = if w / h > ratio {
            (((h * ratio).round() as u32).clamp(1, self.width), self.height)
        } else {
            (self.width, ((w / ratio).round() as u32).clamp(1, self.height))
        };
        Self {
            x: self.x + (self.width - width) / 2,
            y: self.y + (self.height - height) / 2,
            width,
            height,
        }
    }

    /// Size of the rectangle.
    #[must_use]
    pub const fn dimensions(self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }
}

/// Handler for [`Stage::Cropping`].
#[derive(Debug, Clone)]
pub struct CropStage {
    bounds: Dimensions,
    rect: CropRect,
    aspect: Option<f32>,
}

impl CropStage {
    /// A stage over an image of `bounds`, selecting all of it.
    #[must_use]
    pub const fn new(bounds: Dimensions) -> Self {
        Self {
            bounds,
            rect: CropRect::full(bounds),
            aspect: None,
        }
    }

    /// The current selection.
    #[must_use]
    pub const fn rect(&self) -> CropRect {
        self.rect
    }

    /// The aspect-ratio lock, if any.
    #[must_use]
    pub const fn aspect(&self) -> Option<f32> {
        self.aspect
    }

    /// Replace the selection. The rectangle is clamped to the image and
    /// fitted to the aspect lock.
    pub fn set_rect(&mut self, rect: CropRect) {
        let clamped = rect.clamped(self.bounds);
        self.rect = match self.aspect {
            Some(ratio) => clamped.fit_aspect(ratio),
            None => clamped,
        };
        debug!(?self.rect, "crop rectangle");
    }

    /// Lock the selection to `ratio` (width / height), or unlock it.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidInput`] for a non-positive or
    /// non-finite ratio.
    pub fn set_aspect(&mut self, ratio: Option<f32>) -> Result<(), PipelineError> {
        if let Some(r) = ratio
            && !(r.is_finite() && r > 0.0)
        {
            return Err(PipelineError::InvalidInput(format!(
                "aspect ratio must be positive, got {r}"
            )));
        }
        self.aspect = ratio;
        self.set_rect(self.rect);
        Ok(())
    }

    fn commit(&self, ctx: &StageContext<'_>) -> Result<Handled, PipelineError> {
        let source = ctx.require_asset(Stage::Cropping)?;
        if source.dimensions() != self.bounds {
            return Err(PipelineError::Internal(format!(
                "crop bounds {} do not match source {}",
                self.bounds,
                source.dimensions()
            )));
        }
        let CropRect {
            x,
            y,
            width,
            height,
        } = self.rect;
        let cropped = image::imageops::crop_imm(source.raster(), x, y, width, height).to_image();
        let asset = ImageAsset::new(cropped, Provenance::Cropped);
        let data_url = asset.to_data_url()?;
        debug!(size = %asset.dimensions(), "crop committed");
        Ok(Handled::none()
            .emit(Outbound::ImageCropped { data_url })
            .with_asset(asset)
            .advance(Next::Erasing))
    }
}

impl StageHandler for CropStage {
    fn stage(&self) -> Stage {
        Stage::Cropping
    }

    fn handle(
        &mut self,
        input: StageInput,
        ctx: &mut StageContext<'_>,
    ) -> Result<Handled, PipelineError> {
        match input {
            StageInput::Shell(Inbound::SetCropRect {
                x,
                y,
                width,
                height,
            }) => {
                self.set_rect(CropRect {
                    x,
                    y,
                    width,
                    height,
                });
                Ok(Handled::none())
            }
            StageInput::Shell(Inbound::SetAspectRatio { ratio }) => {
                self.set_aspect(ratio)?;
                Ok(Handled::none())
            }
            StageInput::Shell(Inbound::CropImage) => self.commit(ctx),
            other => Err(other.rejected(Stage::Cropping)),
        }
    }
}
