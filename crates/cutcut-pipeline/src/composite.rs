//! The sticker canvas and the compositing stage.
//!
//! A [`Composition`] is a fixed-size logical canvas holding an ordered
//! list of layers: outlined cutouts and text lines. Layers are only ever
//! appended, so adding a second subject keeps the first. Rendering
//! happens at any scale; previews and exports use the display pixel
//! ratio.

use std::fmt;

use ab_glyph::{FontArc, PxScale};
use image::{GrayImage, Luma, Rgba};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use tracing::{debug, info};

use crate::asset::{self, ImageAsset, Provenance};
use crate::blend;
use crate::downsample::{DownsampleFilter, fit_within, resize_exact};
use crate::export::ExportKind;
use crate::message::{Inbound, Outbound};
use crate::settings::UploadTarget;
use crate::stage::{Handled, Next, Stage, StageContext, StageHandler, StageInput};
use crate::stroke::add_stroke;
use crate::types::{
    Color, Dimensions, PipelineConfig, PipelineError, RgbaImage, TextOverlay, TextStyle,
};

/// Selection outline color.
const SELECTION_COLOR: Rgba<u8> = Rgba([30, 144, 255, 255]);

/// Edge of the square grips drawn at a selected layer's corners, in
/// logical pixels.
const GRIP_SIZE: u32 = 8;

/// A parsed font plus the name it was loaded under.
#[derive(Clone)]
pub struct LoadedFont {
    name: String,
    font: FontArc,
}

impl LoadedFont {
    /// Parse TrueType/OpenType font data.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if the data is not a font.
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Result<Self, PipelineError> {
        let name = name.into();
        let font = FontArc::try_from_vec(bytes)
            .map_err(|e| PipelineError::InvalidConfig(format!("font {name}: {e}")))?;
        Ok(Self { name, font })
    }

    /// Name the font was loaded under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for LoadedFont {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedFont")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// One canvas layer, positioned in logical pixels.
#[derive(Debug, Clone)]
pub enum Layer {
    /// An outlined cutout.
    Image {
        /// Pixels at logical size.
        raster: RgbaImage,
        /// Left edge.
        x: i64,
        /// Top edge.
        y: i64,
    },
    /// A rendered line of text.
    Text {
        /// What was drawn.
        overlay: TextOverlay,
        /// Pixels at logical size.
        raster: RgbaImage,
        /// Left edge.
        x: i64,
        /// Top edge.
        y: i64,
    },
}

impl Layer {
    /// Pixels of the layer.
    #[must_use]
    pub const fn raster(&self) -> &RgbaImage {
        match self {
            Self::Image { raster, .. } | Self::Text { raster, .. } => raster,
        }
    }

    /// Top-left corner.
    #[must_use]
    pub const fn origin(&self) -> (i64, i64) {
        match self {
            Self::Image { x, y, .. } | Self::Text { x, y, .. } => (*x, *y),
        }
    }

    /// Whether this is a text layer.
    #[must_use]
    pub const fn is_text(&self) -> bool {
        matches!(self, Self::Text { .. })
    }
}

/// The sticker canvas.
#[derive(Debug, Clone)]
pub struct Composition {
    size: Dimensions,
    pixel_ratio: f32,
    filter: DownsampleFilter,
    text_style: TextStyle,
    font: Option<LoadedFont>,
    layers: Vec<Layer>,
    selection: Option<usize>,
}

impl Composition {
    /// An empty canvas sized from `config`.
    #[must_use]
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            size: config.canvas_dimensions(),
            pixel_ratio: config.pixel_ratio,
            filter: config.downsample_filter,
            text_style: config.text.clone(),
            font: None,
            layers: Vec::new(),
            selection: None,
        }
    }

    /// Install (or remove) the font text overlays are drawn with.
    pub fn set_font(&mut self, font: Option<LoadedFont>) {
        self.font = font;
    }

    /// The font text overlays are drawn with.
    #[must_use]
    pub const fn font(&self) -> Option<&LoadedFont> {
        self.font.as_ref()
    }

    /// Logical canvas size.
    #[must_use]
    pub const fn logical_size(&self) -> Dimensions {
        self.size
    }

    /// Backing-store size at the display pixel ratio.
    #[must_use]
    pub fn physical_size(&self) -> Dimensions {
        self.size.scaled(self.pixel_ratio)
    }

    /// Layers from bottom to top.
    #[must_use]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Number of layers.
    #[must_use]
    pub const fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Text overlays in stacking order.
    #[must_use]
    pub fn text_overlays(&self) -> Vec<TextOverlay> {
        self.layers
            .iter()
            .filter_map(|layer| match layer {
                Layer::Text { overlay, .. } => Some(overlay.clone()),
                Layer::Image { .. } => None,
            })
            .collect()
    }

    /// Selected layer index.
    #[must_use]
    pub const fn selection(&self) -> Option<usize> {
        self.selection
    }

    /// Select a layer, or clear the selection.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidInput`] for an index past the top
    /// layer.
    pub fn select(&mut self, index: Option<usize>) -> Result<(), PipelineError> {
        if let Some(i) = index
            && i >= self.layers.len()
        {
            return Err(PipelineError::InvalidInput(format!(
                "layer {i} does not exist ({} layers)",
                self.layers.len()
            )));
        }
        self.selection = index;
        Ok(())
    }

    /// Drop every layer and the selection.
    pub fn clear(&mut self) {
        self.layers.clear();
        self.selection = None;
    }

    /// Drop layers above the first `len`.
    pub fn truncate(&mut self, len: usize) {
        self.layers.truncate(len);
        if self.selection.is_some_and(|i| i >= len) {
            self.selection = None;
        }
    }

    /// Add an image as the new top layer, shrunk to fit the canvas if
    /// needed and centered. Returns the layer index.
    pub fn add_image(&mut self, raster: RgbaImage) -> usize {
        let raster = match fit_within(Dimensions::of(&raster), self.size) {
            Some(target) => resize_exact(&raster, target, self.filter),
            None => raster,
        };
        let x = centered(self.size.width, raster.width());
        let y = centered(self.size.height, raster.height());
        self.layers.push(Layer::Image { raster, x, y });
        self.layers.len() - 1
    }

    /// Add a line of text above every existing layer. Text is centered
    /// horizontally and stacked upward from the bottom margin. Returns
    /// the layer index.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidInput`] for blank text and
    /// [`PipelineError::MissingConfiguration`] when no font is loaded.
    pub fn add_text(&mut self, content: &str) -> Result<usize, PipelineError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(PipelineError::InvalidInput("text is empty".into()));
        }
        let font = self
            .font
            .as_ref()
            .ok_or(PipelineError::MissingConfiguration("font"))?;
        let style = &self.text_style;
        let raster = render_text(content, &font.font, style);

        let margin = i64::from(style.margin_px);
        let below: i64 = self
            .layers
            .iter()
            .filter(|layer| layer.is_text())
            .map(|layer| i64::from(layer.raster().height()) + margin)
            .sum();
        let y = i64::from(self.size.height) - margin - below - i64::from(raster.height());
        let x = centered(self.size.width, raster.width());

        let overlay = TextOverlay {
            content: content.to_owned(),
            font: font.name.clone(),
            stroke_color: style.stroke_color,
            fill_color: style.fill_color,
            size_px: style.size_px,
        };
        self.layers.push(Layer::Text {
            overlay,
            raster,
            x,
            y,
        });
        Ok(self.layers.len() - 1)
    }

    /// Render at `scale` times the logical size.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn render(&self, scale: f32, with_selection: bool) -> RgbaImage {
        let size = self.size.scaled(scale);
        let unscaled = (scale - 1.0).abs() < f32::EPSILON;
        let to_physical = |v: i64| (v as f32 * scale).round() as i64;
        let mut canvas = RgbaImage::new(size.width, size.height);

        for layer in &self.layers {
            let (x, y) = layer.origin();
            if unscaled {
                blend::over(&mut canvas, layer.raster(), x, y);
            } else {
                let target = Dimensions::of(layer.raster()).scaled(scale);
                let scaled = resize_exact(layer.raster(), target, self.filter);
                blend::over(&mut canvas, &scaled, to_physical(x), to_physical(y));
            }
        }

        if with_selection && let Some(layer) = self.selection.and_then(|i| self.layers.get(i)) {
            let (x, y) = layer.origin();
            let bounds = Dimensions::of(layer.raster()).scaled(scale);
            let grip = (GRIP_SIZE as f32 * scale).round().max(1.0) as u32;
            draw_selection(&mut canvas, to_physical(x), to_physical(y), bounds, grip);
        }
        canvas
    }

    /// Display preview: physical size, selection visible.
    #[must_use]
    pub fn render_preview(&self) -> RgbaImage {
        self.render(self.pixel_ratio, true)
    }

    /// Export readback: physical size, selection discarded.
    #[must_use]
    pub fn render_export(&self) -> RgbaImage {
        self.render(self.pixel_ratio, false)
    }
}

#[allow(clippy::cast_possible_wrap)]
fn centered(outer: u32, inner: u32) -> i64 {
    (i64::from(outer) - i64::from(inner)) / 2
}

/// Draw `text` with a `style.stroke_width_px` outline.
///
/// The outline is the glyph mask stamped at every offset within a disc of
/// the stroke width; the fill is drawn on top.
#[allow(clippy::cast_possible_wrap)]
fn render_text(text: &str, font: &FontArc, style: &TextStyle) -> RgbaImage {
    let scale = PxScale::from(style.size_px);
    let (tw, th) = text_size(scale, font, text);
    let pad = style.stroke_width_px;
    let (w, h) = (tw + 2 * pad, th + 2 * pad);
    let origin = pad as i32;

    let mut outline = GrayImage::new(w, h);
    let r = pad as i32;
    for dy in -r..=r {
        for dx in -r..=r {
            if dx * dx + dy * dy <= r * r {
                draw_text_mut(
                    &mut outline,
                    Luma([255]),
                    origin + dx,
                    origin + dy,
                    scale,
                    font,
                    text,
                );
            }
        }
    }
    let mut fill = GrayImage::new(w, h);
    draw_text_mut(&mut fill, Luma([255]), origin, origin, scale, font, text);

    let mut out = tint(&outline, style.stroke_color);
    blend::over(&mut out, &tint(&fill, style.fill_color), 0, 0);
    out
}

/// Color a coverage mask.
#[allow(clippy::cast_possible_truncation)]
fn tint(mask: &GrayImage, color: Color) -> RgbaImage {
    let [r, g, b, a] = color.0;
    RgbaImage::from_fn(mask.width(), mask.height(), |x, y| {
        let coverage = u32::from(mask.get_pixel(x, y)[0]);
        Rgba([r, g, b, ((coverage * u32::from(a) + 127) / 255) as u8])
    })
}

#[allow(clippy::cast_possible_truncation)]
fn draw_selection(canvas: &mut RgbaImage, x: i64, y: i64, size: Dimensions, grip: u32) {
    let (x, y) = (x as i32, y as i32);
    draw_hollow_rect_mut(
        canvas,
        Rect::at(x, y).of_size(size.width, size.height),
        SELECTION_COLOR,
    );
    let half = (grip / 2) as i32;
    let right = x + size.width as i32 - 1;
    let bottom = y + size.height as i32 - 1;
    for (cx, cy) in [(x, y), (right, y), (x, bottom), (right, bottom)] {
        draw_filled_rect_mut(
            canvas,
            Rect::at(cx - half, cy - half).of_size(grip, grip),
            SELECTION_COLOR,
        );
    }
}

/// Handler for [`Stage::Compositing`].
///
/// On entry with a freshly erased asset the cutout is outlined and added
/// as a new layer. Re-entry from an abandoned export only re-renders.
#[derive(Debug, Default)]
pub struct CompositeStage;

impl CompositeStage {
    /// A new handler.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn refresh(ctx: &StageContext<'_>) -> Result<Handled, PipelineError> {
        let data_url = asset::encode_data_url(&ctx.composition.render_preview())?;
        let asset = ImageAsset::new(ctx.composition.render(1.0, false), Provenance::Composited);
        Ok(Handled::none()
            .emit(Outbound::ImageSaved { data_url })
            .with_asset(asset))
    }
}

impl StageHandler for CompositeStage {
    fn stage(&self) -> Stage {
        Stage::Compositing
    }

    fn enter(&mut self, ctx: &mut StageContext<'_>) -> Result<Handled, PipelineError> {
        let cutout = ctx.require_asset(Stage::Compositing)?;
        if cutout.provenance() != Provenance::Erased {
            return Self::refresh(ctx);
        }

        let stroked = add_stroke(
            cutout.raster(),
            &ctx.config.stroke,
            ctx.config.halo_color,
            ctx.config.shadow_color,
        );
        let before = ctx.composition.layer_count();
        let index = ctx.composition.add_image(stroked);
        info!(
            layer = index,
            stroke_width_px = ctx.config.stroke.stroke_width_px,
            "outlined cutout added to canvas"
        );
        let refreshed = Self::refresh(ctx);
        if refreshed.is_err() {
            ctx.composition.truncate(before);
        }
        refreshed
    }

    fn handle(
        &mut self,
        input: StageInput,
        ctx: &mut StageContext<'_>,
    ) -> Result<Handled, PipelineError> {
        match input {
            StageInput::Shell(Inbound::AddText { content }) => {
                let index = ctx.composition.add_text(&content)?;
                debug!(layer = index, "text layer added");
                Self::refresh(ctx)
            }
            StageInput::Shell(Inbound::SelectLayer { index }) => {
                ctx.composition.select(index)?;
                Self::refresh(ctx)
            }
            StageInput::Shell(Inbound::DownloadSticker) => {
                Ok(Handled::none().advance(Next::Exporting(ExportKind::Download)))
            }
            StageInput::Shell(Inbound::RequestUploadToPack) => {
                let target =
                    UploadTarget::from_settings(ctx.settings, &ctx.config.sticker_emoji)?;
                Ok(Handled::none().advance(Next::Exporting(ExportKind::Upload(target))))
            }
            other => Err(other.rejected(Stage::Compositing)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::message::SessionToken;
    use crate::settings::Settings;

    fn solid(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([200, 10, 10, 255]))
    }

    fn config_with_ratio(pixel_ratio: f32) -> PipelineConfig {
        PipelineConfig {
            pixel_ratio,
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn small_image_is_centered() {
        let mut comp = Composition::new(&PipelineConfig::default());
        comp.add_image(solid(100, 50));
        assert_eq!(comp.layers()[0].origin(), (206, 231));
        let out = comp.render(1.0, false);
        assert_eq!(out.dimensions(), (512, 512));
        assert_eq!(out.get_pixel(206, 231)[3], 255);
        assert_eq!(out.get_pixel(205, 231)[3], 0);
    }

    #[test]
    fn large_image_is_fitted_to_canvas() {
        let mut comp = Composition::new(&PipelineConfig::default());
        comp.add_image(solid(1024, 512));
        let layer = &comp.layers()[0];
        assert_eq!(layer.raster().dimensions(), (512, 256));
        assert_eq!(layer.origin(), (0, 128));
    }

    #[test]
    fn adding_layers_keeps_earlier_ones() {
        let mut comp = Composition::new(&PipelineConfig::default());
        assert_eq!(comp.add_image(solid(10, 10)), 0);
        assert_eq!(comp.add_image(solid(20, 20)), 1);
        assert_eq!(comp.layer_count(), 2);
    }

    #[test]
    fn physical_render_uses_pixel_ratio() {
        let mut comp = Composition::new(&config_with_ratio(2.0));
        comp.add_image(solid(100, 100));
        let out = comp.render_export();
        assert_eq!(out.dimensions(), (1024, 1024));
        // Logical (206, 206) maps to physical (412, 412).
        assert_eq!(out.get_pixel(500, 500)[3], 255);
        assert_eq!(out.get_pixel(400, 400)[3], 0);
    }

    #[test]
    fn selection_only_in_preview() {
        let mut comp = Composition::new(&PipelineConfig::default());
        comp.add_image(solid(100, 100));
        comp.select(Some(0)).unwrap();
        let preview = comp.render_preview();
        let export = comp.render_export();
        // Corner grip extends outside the layer.
        assert_eq!(*preview.get_pixel(203, 203), SELECTION_COLOR);
        assert_eq!(export.get_pixel(203, 203)[3], 0);
    }

    #[test]
    fn select_out_of_range_is_invalid() {
        let mut comp = Composition::new(&PipelineConfig::default());
        let err = comp.select(Some(0)).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
        comp.select(None).unwrap();
    }

    #[test]
    fn truncate_drops_dangling_selection() {
        let mut comp = Composition::new(&PipelineConfig::default());
        comp.add_image(solid(4, 4));
        comp.add_image(solid(4, 4));
        comp.select(Some(1)).unwrap();
        comp.truncate(1);
        assert_eq!(comp.layer_count(), 1);
        assert_eq!(comp.selection(), None);
    }

    #[test]
    fn text_without_font_is_missing_configuration() {
        let mut comp = Composition::new(&PipelineConfig::default());
        let err = comp.add_text("hello").unwrap_err();
        assert!(matches!(err, PipelineError::MissingConfiguration("font")));
        assert!(comp.text_overlays().is_empty());
    }

    #[test]
    fn blank_text_is_invalid_input() {
        let mut comp = Composition::new(&PipelineConfig::default());
        let err = comp.add_text("   ").unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
    }

    #[test]
    fn garbage_font_is_rejected() {
        let err = LoadedFont::from_bytes("junk", vec![0, 1, 2, 3]).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn tint_scales_alpha_by_coverage() {
        let mut mask = GrayImage::new(2, 1);
        mask.put_pixel(1, 0, Luma([128]));
        let out = tint(&mask, Color::BLACK);
        assert_eq!(out.get_pixel(0, 0).0, [0, 0, 0, 0]);
        assert_eq!(out.get_pixel(1, 0).0, [0, 0, 0, 128]);
    }

    const WHITE: [u8; 4] = [255, 255, 255, 255];
    const BLACK: [u8; 4] = [0, 0, 0, 255];

    fn dejavu() -> LoadedFont {
        let bytes = include_bytes!("../tests/fonts/DejaVuSans-Bold.ttf").to_vec();
        LoadedFont::from_bytes("DejaVuSans-Bold", bytes).unwrap()
    }

    fn with_font() -> Composition {
        let mut comp = Composition::new(&PipelineConfig::default());
        comp.set_font(Some(dejavu()));
        comp
    }

    #[test]
    fn text_is_filled_inside_a_stroke_ring() {
        let mut comp = with_font();
        let index = comp.add_text("HI").unwrap();
        let raster = comp.layers()[index].raster();
        let pixels: Vec<[u8; 4]> = raster.pixels().map(|p| p.0).collect();
        assert!(pixels.contains(&WHITE));
        assert!(pixels.contains(&BLACK));
        assert!(pixels.iter().all(|p| p[3] == 0 || (p[0] == p[1] && p[1] == p[2])));

        // Across the middle of the cap height the outline comes first and
        // last, with the fill strictly inside it.
        let row = raster.height() / 2;
        let opaque: Vec<(u32, [u8; 4])> = (0..raster.width())
            .map(|x| (x, raster.get_pixel(x, row).0))
            .filter(|(_, p)| p[3] == 255)
            .collect();
        let (first_x, first) = *opaque.first().unwrap();
        let (last_x, last) = *opaque.last().unwrap();
        assert_eq!(first, WHITE);
        assert_eq!(last, WHITE);
        let black: Vec<u32> = opaque
            .iter()
            .filter(|(_, p)| *p == BLACK)
            .map(|(x, _)| *x)
            .collect();
        assert!(!black.is_empty());
        assert!(black.iter().all(|x| (first_x + 1..last_x).contains(x)));
    }

    #[test]
    fn text_lines_stack_upward_from_the_bottom_margin() {
        let mut comp = with_font();
        let margin = i64::from(TextStyle::default().margin_px);
        let canvas = i64::from(comp.logical_size().height);

        let first = comp.add_text("first").unwrap();
        let second = comp.add_text("second").unwrap();
        let height = |i: usize| i64::from(comp.layers()[i].raster().height());
        let (_, y1) = comp.layers()[first].origin();
        let (_, y2) = comp.layers()[second].origin();

        assert_eq!(y1 + height(first) + margin, canvas);
        assert_eq!(y2 + height(second) + margin, y1);
        assert!(y2 < y1);
    }

    #[test]
    fn text_is_drawn_over_the_subject() {
        let mut comp = with_font();
        let image = comp.add_image(solid(512, 512));
        let text = comp.add_text("HI").unwrap();
        assert!(text > image);

        let layer = &comp.layers()[text];
        let (x, y) = layer.origin();
        let (fx, fy) = layer
            .raster()
            .enumerate_pixels()
            .find(|(_, _, p)| p.0 == BLACK)
            .map(|(px, py, _)| (px, py))
            .unwrap();
        let out = comp.render(1.0, false);
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let at = out.get_pixel(x as u32 + fx, y as u32 + fy);
        assert_eq!(at.0, BLACK);
        assert_eq!(out.get_pixel(0, 0).0, [200, 10, 10, 255]);
    }

    #[test]
    fn text_overlays_follow_stacking_order() {
        let mut comp = with_font();
        comp.add_text("one").unwrap();
        comp.add_image(solid(10, 10));
        comp.add_text("  two ").unwrap();
        let overlays = comp.text_overlays();
        let contents: Vec<&str> = overlays.iter().map(|o| o.content.as_str()).collect();
        assert_eq!(contents, ["one", "two"]);
        assert!(overlays.iter().all(|o| o.font == "DejaVuSans-Bold"));
        assert_eq!(overlays[0].stroke_color, Color::WHITE);
        assert_eq!(overlays[0].fill_color, Color::BLACK);
    }

    fn erased(w: u32, h: u32) -> ImageAsset {
        ImageAsset::new(solid(w, h), Provenance::Erased)
    }

    #[test]
    fn enter_outlines_erased_asset() {
        let config = PipelineConfig::default();
        let mut comp = Composition::new(&config);
        let cutout = erased(100, 100);
        let mut ctx = StageContext {
            config: &config,
            asset: Some(&cutout),
            token: SessionToken::default(),
            settings: None,
            composition: &mut comp,
        };
        let handled = CompositeStage::new().enter(&mut ctx).unwrap();
        assert_eq!(
            handled.asset.as_ref().map(ImageAsset::provenance),
            Some(Provenance::Composited)
        );
        assert!(matches!(
            handled.outbound.as_slice(),
            [Outbound::ImageSaved { .. }]
        ));
        let layer = &comp.layers()[0];
        assert_eq!(layer.raster().dimensions(), (103, 103));
    }

    #[test]
    fn reentry_with_composited_asset_adds_nothing() {
        let config = PipelineConfig::default();
        let mut comp = Composition::new(&config);
        comp.add_image(solid(5, 5));
        let canvas = ImageAsset::new(comp.render(1.0, false), Provenance::Composited);
        let mut ctx = StageContext {
            config: &config,
            asset: Some(&canvas),
            token: SessionToken::default(),
            settings: None,
            composition: &mut comp,
        };
        CompositeStage::new().enter(&mut ctx).unwrap();
        assert_eq!(comp.layer_count(), 1);
    }

    #[test]
    fn upload_without_settings_fails_before_export() {
        let config = PipelineConfig::default();
        let mut comp = Composition::new(&config);
        let mut ctx = StageContext {
            config: &config,
            asset: None,
            token: SessionToken::default(),
            settings: None,
            composition: &mut comp,
        };
        let err = CompositeStage::new()
            .handle(StageInput::Shell(Inbound::RequestUploadToPack), &mut ctx)
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::MissingConfigurationError);
    }

    #[test]
    fn upload_with_settings_advances() {
        let config = PipelineConfig::default();
        let mut comp = Composition::new(&config);
        let settings = Settings {
            telegram_bot_token: Some("t".into()),
            telegram_bot_id: Some("1".into()),
            ..Settings::default()
        };
        let mut ctx = StageContext {
            config: &config,
            asset: None,
            token: SessionToken::default(),
            settings: Some(&settings),
            composition: &mut comp,
        };
        let handled = CompositeStage::new()
            .handle(StageInput::Shell(Inbound::RequestUploadToPack), &mut ctx)
            .unwrap();
        assert!(matches!(
            handled.next,
            Some(Next::Exporting(ExportKind::Upload(_)))
        ));
    }
}
