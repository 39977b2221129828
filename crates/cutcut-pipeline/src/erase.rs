//! Background removal: remote service or manual eraser brush.
//!
//! Both paths end on an [`EraseSurface`]. A remote result is loaded onto
//! the surface so the operator can touch it up by hand before committing
//! with `AddImgFinish`.

use image::Rgba;
use tiny_skia::{
    BlendMode, ColorU8, FillRule, LineCap, LineJoin, Paint, PathBuilder, Pixmap, Stroke,
    Transform,
};
use tracing::{debug, info};

use crate::asset::{self, ImageAsset, Provenance};
use crate::message::{Completion, Effect, Inbound, Outbound};
use crate::stage::{Handled, Next, Stage, StageContext, StageHandler, StageInput};
use crate::types::{BrushOptions, PipelineError, RgbaImage};

/// A raster the eraser brush paints transparency into.
///
/// Backed by a premultiplied `tiny-skia` pixmap; the brush composites
/// with destination-out so covered pixels lose alpha in proportion to
/// the brush coverage. Fully covered pixels end at alpha 0.
#[derive(Debug, Clone)]
pub struct EraseSurface {
    pixmap: Pixmap,
    brush: BrushOptions,
    pressed: bool,
    last: Option<(f32, f32)>,
}

impl EraseSurface {
    /// Load `image` onto a new surface.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EmptyInput`] if `image` has a zero-sized
    /// axis.
    pub fn from_image(image: &RgbaImage, brush: BrushOptions) -> Result<Self, PipelineError> {
        let mut pixmap =
            Pixmap::new(image.width(), image.height()).ok_or(PipelineError::EmptyInput)?;
        for (dst, src) in pixmap.pixels_mut().iter_mut().zip(image.pixels()) {
            let [r, g, b, a] = src.0;
            *dst = ColorU8::from_rgba(r, g, b, a).premultiply();
        }
        Ok(Self {
            pixmap,
            brush,
            pressed: false,
            last: None,
        })
    }

    /// Whether the brush is down.
    #[must_use]
    pub const fn is_pressed(&self) -> bool {
        self.pressed
    }

    /// Press the brush and clear a dot under it.
    pub fn pointer_down(&mut self, x: f32, y: f32) {
        self.pressed = true;
        self.dot(x, y);
        self.last = Some((x, y));
    }

    /// Move the brush. While pressed, clears a dot at the new position
    /// and a segment back to the previous one. Returns whether anything
    /// was painted.
    pub fn pointer_move(&mut self, x: f32, y: f32) -> bool {
        if !self.pressed {
            return false;
        }
        self.dot(x, y);
        if let Some((lx, ly)) = self.last {
            self.segment((lx, ly), (x, y));
        }
        self.last = Some((x, y));
        true
    }

    /// Lift the brush.
    pub const fn pointer_up(&mut self) {
        self.pressed = false;
        self.last = None;
    }

    /// Copy the surface out as a straight-alpha raster.
    #[must_use]
    pub fn snapshot(&self) -> RgbaImage {
        let mut out = RgbaImage::new(self.pixmap.width(), self.pixmap.height());
        for (dst, src) in out.pixels_mut().zip(self.pixmap.pixels()) {
            let c = src.demultiply();
            *dst = Rgba([c.red(), c.green(), c.blue(), c.alpha()]);
        }
        out
    }

    fn eraser() -> Paint<'static> {
        let mut paint = Paint::default();
        paint.set_color_rgba8(0, 0, 0, 255);
        paint.blend_mode = BlendMode::DestinationOut;
        paint.anti_alias = true;
        paint
    }

    fn dot(&mut self, x: f32, y: f32) {
        let Some(path) = PathBuilder::from_circle(x, y, self.brush.dot_radius) else {
            return;
        };
        self.pixmap.fill_path(
            &path,
            &Self::eraser(),
            FillRule::Winding,
            Transform::identity(),
            None,
        );
    }

    fn segment(&mut self, from: (f32, f32), to: (f32, f32)) {
        let mut pb = PathBuilder::new();
        pb.move_to(from.0, from.1);
        pb.line_to(to.0, to.1);
        // Zero-length moves produce no path; the dot already covers them.
        let Some(path) = pb.finish() else {
            return;
        };
        let stroke = Stroke {
            width: self.brush.line_width,
            line_cap: LineCap::Round,
            line_join: LineJoin::Round,
            ..Stroke::default()
        };
        self.pixmap.stroke_path(
            &path,
            &Self::eraser(),
            &stroke,
            Transform::identity(),
            None,
        );
    }
}

#[derive(Debug)]
enum Mode {
    /// Waiting for `PrepareForErase`.
    AwaitingMode,
    /// A removal request is in flight.
    Remote,
    /// The brush is available.
    Manual(EraseSurface),
}

/// Handler for [`Stage::Erasing`].
#[derive(Debug)]
pub struct EraseStage {
    mode: Mode,
}

impl Default for EraseStage {
    fn default() -> Self {
        Self::new()
    }
}

impl EraseStage {
    /// A stage waiting for the operator to pick remote or manual erase.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            mode: Mode::AwaitingMode,
        }
    }

    /// Whether a removal request is in flight.
    #[must_use]
    pub const fn is_awaiting_remote(&self) -> bool {
        matches!(self.mode, Mode::Remote)
    }

    fn prepare(
        &mut self,
        remove_bg: bool,
        base64img: &str,
        ctx: &StageContext<'_>,
    ) -> Result<Handled, PipelineError> {
        let raster = if base64img.trim().is_empty() {
            ctx.require_asset(Stage::Erasing)?.raster().clone()
        } else {
            asset::decode_base64(base64img)?
        };

        if remove_bg {
            let api_key = ctx
                .settings
                .and_then(|s| s.remove_bg_api_key())
                .ok_or(PipelineError::MissingConfiguration("removeBgApiKey"))?;
            let image_base64 = asset::encode_base64_png(&raster)?;
            self.mode = Mode::Remote;
            info!(token = %ctx.token, "requesting remote background removal");
            return Ok(Handled::none().effect(Effect::RemoveBackground {
                token: ctx.token,
                api_key: api_key.to_owned(),
                image_base64,
            }));
        }

        self.manual(&raster, ctx, None)
    }

    fn manual(
        &mut self,
        raster: &RgbaImage,
        ctx: &StageContext<'_>,
        adopted: Option<ImageAsset>,
    ) -> Result<Handled, PipelineError> {
        let surface = EraseSurface::from_image(raster, ctx.config.brush)?;
        let data_url = asset::encode_data_url(raster)?;
        self.mode = Mode::Manual(surface);
        let handled = Handled::none().emit(Outbound::EraseSurfaceReady { data_url });
        Ok(match adopted {
            Some(asset) => handled.with_asset(asset),
            None => handled,
        })
    }

    fn surface_mut(&mut self, input: &StageInput) -> Result<&mut EraseSurface, PipelineError> {
        match &mut self.mode {
            Mode::Manual(surface) => Ok(surface),
            Mode::AwaitingMode | Mode::Remote => Err(input.rejected(Stage::Erasing)),
        }
    }
}

impl StageHandler for EraseStage {
    fn stage(&self) -> Stage {
        Stage::Erasing
    }

    fn handle(
        &mut self,
        input: StageInput,
        ctx: &mut StageContext<'_>,
    ) -> Result<Handled, PipelineError> {
        match input {
            StageInput::Shell(Inbound::PrepareForErase {
                remove_bg,
                base64img,
            }) => self.prepare(remove_bg, &base64img, ctx),

            StageInput::Shell(Inbound::PointerDown { x, y }) => {
                self.surface_mut(&input)?.pointer_down(x, y);
                Ok(Handled::none())
            }
            StageInput::Shell(Inbound::PointerMove { x, y }) => {
                self.surface_mut(&input)?.pointer_move(x, y);
                Ok(Handled::none())
            }
            StageInput::Shell(Inbound::PointerUp) => {
                self.surface_mut(&input)?.pointer_up();
                Ok(Handled::none())
            }

            StageInput::Shell(Inbound::AddImgFinish) => {
                let raster = self.surface_mut(&input)?.snapshot();
                debug!(size = %crate::Dimensions::of(&raster), "erase committed");
                Ok(Handled::none()
                    .with_asset(ImageAsset::new(raster, Provenance::Erased))
                    .advance(Next::Compositing))
            }

            StageInput::Completion(Completion::BackgroundRemoved { result, .. })
                if self.is_awaiting_remote() =>
            {
                self.mode = Mode::AwaitingMode;
                let image_base64 = result.map_err(|f| PipelineError::RemoteService(f.to_string()))?;
                let raster = asset::decode_base64(&image_base64)?;
                info!("remote background removal adopted");
                let adopted = ImageAsset::new(raster.clone(), Provenance::Erased);
                self.manual(&raster, ctx, Some(adopted))
            }

            other => Err(other.rejected(Stage::Erasing)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::composite::Composition;
    use crate::message::{RemoteFailure, SessionToken};
    use crate::settings::Settings;
    use crate::types::PipelineConfig;

    fn opaque(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([30, 140, 60, 255]))
    }

    fn brush() -> BrushOptions {
        BrushOptions::default()
    }

    #[test]
    fn untouched_surface_round_trips() {
        let img = opaque(16, 9);
        let surface = EraseSurface::from_image(&img, brush()).unwrap();
        assert_eq!(surface.snapshot(), img);
    }

    #[test]
    fn pointer_down_clears_dot() {
        let mut surface = EraseSurface::from_image(&opaque(64, 64), brush()).unwrap();
        surface.pointer_down(32.0, 32.0);
        let out = surface.snapshot();
        assert_eq!(out.get_pixel(32, 32)[3], 0);
        assert_eq!(out.get_pixel(36, 30)[3], 0);
        assert_eq!(out.get_pixel(0, 0)[3], 255);
        assert_eq!(out.get_pixel(32, 50)[3], 255);
    }

    #[test]
    fn drag_clears_connecting_segment() {
        let mut surface = EraseSurface::from_image(&opaque(100, 40), brush()).unwrap();
        surface.pointer_down(10.0, 20.0);
        surface.pointer_move(90.0, 20.0);
        surface.pointer_up();
        let out = surface.snapshot();
        for x in [10, 30, 50, 70, 90] {
            assert_eq!(out.get_pixel(x, 20)[3], 0, "x={x}");
        }
        assert_eq!(out.get_pixel(50, 38)[3], 255);
    }

    #[test]
    fn move_without_press_paints_nothing() {
        let img = opaque(32, 32);
        let mut surface = EraseSurface::from_image(&img, brush()).unwrap();
        assert!(!surface.pointer_move(16.0, 16.0));
        assert_eq!(surface.snapshot(), img);
    }

    #[test]
    fn empty_image_is_rejected() {
        let err = EraseSurface::from_image(&RgbaImage::new(0, 4), brush()).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyInput));
    }

    struct Fixture {
        config: PipelineConfig,
        asset: ImageAsset,
        settings: Option<Settings>,
        composition: Composition,
    }

    impl Fixture {
        fn new(settings: Option<Settings>) -> Self {
            let config = PipelineConfig::default();
            let composition = Composition::new(&config);
            Self {
                config,
                asset: ImageAsset::new(opaque(40, 40), Provenance::Cropped),
                settings,
                composition,
            }
        }

        fn ctx(&mut self) -> StageContext<'_> {
            StageContext {
                config: &self.config,
                asset: Some(&self.asset),
                token: SessionToken(5),
                settings: self.settings.as_ref(),
                composition: &mut self.composition,
            }
        }
    }

    fn prepare(remove_bg: bool) -> StageInput {
        StageInput::Shell(Inbound::PrepareForErase {
            remove_bg,
            base64img: String::new(),
        })
    }

    #[test]
    fn remote_without_key_is_missing_configuration() {
        let mut fx = Fixture::new(None);
        let mut stage = EraseStage::new();
        let err = stage.handle(prepare(true), &mut fx.ctx()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::MissingConfiguration("removeBgApiKey")
        ));
        assert!(!stage.is_awaiting_remote());
    }

    #[test]
    fn remote_emits_effect_with_token() {
        let mut fx = Fixture::new(Some(Settings {
            remove_bg_api_key: Some("k".into()),
            ..Settings::default()
        }));
        let mut stage = EraseStage::new();
        let handled = stage.handle(prepare(true), &mut fx.ctx()).unwrap();
        assert!(matches!(
            handled.effects.as_slice(),
            [Effect::RemoveBackground { token: SessionToken(5), api_key, .. }] if api_key == "k"
        ));
        assert!(stage.is_awaiting_remote());
    }

    #[test]
    fn remote_failure_returns_to_awaiting_mode() {
        let mut fx = Fixture::new(Some(Settings {
            remove_bg_api_key: Some("k".into()),
            ..Settings::default()
        }));
        let mut stage = EraseStage::new();
        stage.handle(prepare(true), &mut fx.ctx()).unwrap();
        let failed = StageInput::Completion(Completion::BackgroundRemoved {
            token: SessionToken(5),
            result: Err(RemoteFailure::new("402")),
        });
        let err = stage.handle(failed, &mut fx.ctx()).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::RemoteServiceError);
        assert!(!stage.is_awaiting_remote());
    }

    #[test]
    fn remote_success_adopts_result_for_touch_up() {
        let mut fx = Fixture::new(Some(Settings {
            remove_bg_api_key: Some("k".into()),
            ..Settings::default()
        }));
        let mut stage = EraseStage::new();
        stage.handle(prepare(true), &mut fx.ctx()).unwrap();
        let cutout = RgbaImage::from_pixel(40, 40, Rgba([1, 2, 3, 0]));
        let done = StageInput::Completion(Completion::BackgroundRemoved {
            token: SessionToken(5),
            result: Ok(asset::encode_base64_png(&cutout).unwrap()),
        });
        let handled = stage.handle(done, &mut fx.ctx()).unwrap();
        let adopted = handled.asset.unwrap();
        assert_eq!(adopted.provenance(), Provenance::Erased);
        assert!(matches!(
            handled.outbound.as_slice(),
            [Outbound::EraseSurfaceReady { .. }]
        ));
        // Touch-up brush is live.
        let down = StageInput::Shell(Inbound::PointerDown { x: 1.0, y: 1.0 });
        stage.handle(down, &mut fx.ctx()).unwrap();
    }

    #[test]
    fn pointer_before_mode_is_rejected() {
        let mut fx = Fixture::new(None);
        let mut stage = EraseStage::new();
        let down = StageInput::Shell(Inbound::PointerDown { x: 1.0, y: 1.0 });
        let err = stage.handle(down, &mut fx.ctx()).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::StageContractViolation);
    }

    #[test]
    fn finish_commits_surface_and_advances() {
        let mut fx = Fixture::new(None);
        let mut stage = EraseStage::new();
        stage.handle(prepare(false), &mut fx.ctx()).unwrap();
        let down = StageInput::Shell(Inbound::PointerDown { x: 20.0, y: 20.0 });
        stage.handle(down, &mut fx.ctx()).unwrap();
        let handled = stage
            .handle(StageInput::Shell(Inbound::AddImgFinish), &mut fx.ctx())
            .unwrap();
        assert_eq!(handled.next, Some(Next::Compositing));
        let asset = handled.asset.unwrap();
        assert_eq!(asset.provenance(), Provenance::Erased);
        assert_eq!(asset.raster().get_pixel(20, 20)[3], 0);
        assert_eq!(asset.raster().get_pixel(0, 0)[3], 255);
    }

    #[test]
    fn explicit_base64_overrides_asset() {
        let mut fx = Fixture::new(None);
        let mut stage = EraseStage::new();
        let other = opaque(8, 6);
        let input = StageInput::Shell(Inbound::PrepareForErase {
            remove_bg: false,
            base64img: asset::encode_data_url(&other).unwrap(),
        });
        stage.handle(input, &mut fx.ctx()).unwrap();
        let handled = stage
            .handle(StageInput::Shell(Inbound::AddImgFinish), &mut fx.ctx())
            .unwrap();
        assert_eq!(handled.asset.unwrap().raster().dimensions(), (8, 6));
    }
}
