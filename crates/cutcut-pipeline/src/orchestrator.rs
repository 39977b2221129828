//! The pipeline orchestrator.
//!
//! [`Orchestrator`] owns the [`PipelineSession`] and is the only place
//! that knows how stages follow each other. Every shell message goes
//! through [`Orchestrator::handle`] and every effect result through
//! [`Orchestrator::complete`]; both return a [`Dispatch`] for the shell
//! and never perform I/O.
//!
//! Transitions are atomic: a handler's replacement asset is only kept if
//! the next stage's `enter` succeeds. Otherwise the previous asset is
//! restored, the handler's output is dropped, and the error is reported.
//!
//! The session token is bumped on every transition, on `Reset`, when a
//! source load is started, and when a repeated `PrepareForErase` is
//! accepted. A message that fails leaves the token alone, so a removal
//! still in flight stays current. Completions carrying an older token are
//! dropped without touching the session.

use tracing::{debug, error, info, warn};

use crate::asset::{self, ImageAsset, Provenance};
use crate::composite::{CompositeStage, Composition, LoadedFont};
use crate::crop::CropStage;
use crate::downsample::downsample;
use crate::erase::EraseStage;
use crate::export::ExportStage;
use crate::message::{Completion, Dispatch, Effect, Inbound, Outbound, SessionToken};
use crate::settings::Settings;
use crate::stage::{Handled, Next, Stage, StageContext, StageHandler, StageInput};
use crate::types::{Dimensions, ErrorKind, PipelineConfig, PipelineError, StrokeOptions, TextOverlay};

/// The active stage together with its handler state.
#[derive(Debug)]
pub enum ActiveStage {
    /// No image loaded.
    Idle,
    /// Selecting the crop.
    Cropping(CropStage),
    /// Removing the background.
    Erasing(EraseStage),
    /// Arranging the canvas.
    Compositing(CompositeStage),
    /// Exporting.
    Exporting(ExportStage),
    /// Finished.
    Done,
    /// Stopped by a fatal error.
    Halted,
}

impl ActiveStage {
    /// The stage tag.
    #[must_use]
    pub const fn stage(&self) -> Stage {
        match self {
            Self::Idle => Stage::Idle,
            Self::Cropping(_) => Stage::Cropping,
            Self::Erasing(_) => Stage::Erasing,
            Self::Compositing(_) => Stage::Compositing,
            Self::Exporting(_) => Stage::Exporting,
            Self::Done => Stage::Done,
            Self::Halted => Stage::Halted,
        }
    }

    fn handler_mut(&mut self) -> Option<&mut dyn StageHandler> {
        match self {
            Self::Cropping(h) => Some(h),
            Self::Erasing(h) => Some(h),
            Self::Compositing(h) => Some(h),
            Self::Exporting(h) => Some(h),
            Self::Idle | Self::Done | Self::Halted => None,
        }
    }

    fn for_next(next: Next) -> Self {
        match next {
            Next::Erasing => Self::Erasing(EraseStage::new()),
            Next::Compositing => Self::Compositing(CompositeStage::new()),
            Next::Exporting(kind) => Self::Exporting(ExportStage::new(kind)),
            Next::Done => Self::Done,
        }
    }
}

/// Everything one editing session holds.
#[derive(Debug)]
pub struct PipelineSession {
    active: ActiveStage,
    asset: Option<ImageAsset>,
    stroke: StrokeOptions,
    composition: Composition,
    settings: Option<Settings>,
    token: SessionToken,
}

impl PipelineSession {
    fn new(config: &PipelineConfig) -> Self {
        Self {
            active: ActiveStage::Idle,
            asset: None,
            stroke: config.stroke,
            composition: Composition::new(config),
            settings: None,
            token: SessionToken::default(),
        }
    }

    /// Current stage.
    #[must_use]
    pub const fn stage(&self) -> Stage {
        self.active.stage()
    }

    /// The in-flight asset. `None` only while idle (or halted before any
    /// image was loaded).
    #[must_use]
    pub const fn asset(&self) -> Option<&ImageAsset> {
        self.asset.as_ref()
    }

    /// Outline settings.
    #[must_use]
    pub const fn stroke_options(&self) -> StrokeOptions {
        self.stroke
    }

    /// Text overlays on the canvas, in stacking order.
    #[must_use]
    pub fn text_overlays(&self) -> Vec<TextOverlay> {
        self.composition.text_overlays()
    }

    /// The sticker canvas.
    #[must_use]
    pub const fn composition(&self) -> &Composition {
        &self.composition
    }

    /// Latest settings record.
    #[must_use]
    pub const fn settings(&self) -> Option<&Settings> {
        self.settings.as_ref()
    }

    /// Current generation.
    #[must_use]
    pub const fn token(&self) -> SessionToken {
        self.token
    }
}

/// Sequences the sticker stages.
#[derive(Debug)]
pub struct Orchestrator {
    config: PipelineConfig,
    session: PipelineSession,
}

impl Orchestrator {
    /// An idle orchestrator.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if `config` fails
    /// validation.
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let session = PipelineSession::new(&config);
        Ok(Self { config, session })
    }

    /// Install the font text overlays are drawn with.
    #[must_use]
    pub fn with_font(mut self, font: LoadedFont) -> Self {
        info!(font = font.name(), "text font loaded");
        self.session.composition.set_font(Some(font));
        self
    }

    /// The configuration.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The session.
    #[must_use]
    pub const fn session(&self) -> &PipelineSession {
        &self.session
    }

    /// Current stage.
    #[must_use]
    pub const fn stage(&self) -> Stage {
        self.session.stage()
    }

    /// Process one shell message.
    pub fn handle(&mut self, message: Inbound) -> Dispatch {
        let mut out = Dispatch::default();
        if let Err(err) = self.handle_message(message, &mut out) {
            self.report(&err, &mut out);
        }
        out
    }

    /// Process one effect result. Stale results are dropped.
    pub fn complete(&mut self, completion: Completion) -> Dispatch {
        let mut out = Dispatch::default();
        let token = completion.token();
        if token != self.session.token {
            debug!(
                completion = completion.name(),
                %token,
                current = %self.session.token,
                "discarding stale completion"
            );
            return out;
        }
        let result = match completion {
            Completion::SourceLoaded { result, .. } => match result {
                Ok(bytes) => self.begin_crop(&bytes, &mut out),
                Err(failure) => Err(PipelineError::SourceUnavailable(failure.to_string())),
            },
            other => self.route(StageInput::Completion(other), token, &mut out),
        };
        if let Err(err) = result {
            self.report(&err, &mut out);
        }
        out
    }

    fn handle_message(&mut self, message: Inbound, out: &mut Dispatch) -> Result<(), PipelineError> {
        let stage = self.stage();
        debug!(message = message.name(), %stage, "inbound");
        match message {
            Inbound::Reset => {
                self.reset(out);
                Ok(())
            }
            Inbound::SettingsChanged { settings } => {
                self.session.settings = settings.filter(|s| !s.is_empty());
                debug!(present = self.session.settings.is_some(), "settings updated");
                Ok(())
            }
            other if stage.is_terminal() => Err(PipelineError::StageContract {
                message: other.name(),
                stage,
            }),
            Inbound::CropImageInit { img_url } => self.crop_image_init(&img_url, out),
            other => {
                // A new erase request supersedes the outstanding removal,
                // but only once the stage has accepted it.
                let token = if stage == Stage::Erasing
                    && matches!(other, Inbound::PrepareForErase { .. })
                {
                    self.session.token.next()
                } else {
                    self.session.token
                };
                self.route(StageInput::Shell(other), token, out)
            }
        }
    }

    fn reset(&mut self, out: &mut Dispatch) {
        let from = self.stage();
        self.session.token = self.session.token.next();
        self.session.asset = None;
        self.session.composition.clear();
        self.session.active = ActiveStage::Idle;
        info!(%from, token = %self.session.token, "session reset");
        out.outbound.push(Outbound::StageChanged { stage: Stage::Idle });
    }

    fn crop_image_init(&mut self, url: &str, out: &mut Dispatch) -> Result<(), PipelineError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(PipelineError::EmptyInput);
        }
        if asset::is_data_url(url) {
            let bytes = asset::data_url_bytes(url)?;
            return self.begin_crop(&bytes, out);
        }
        self.session.token = self.session.token.next();
        info!(url, token = %self.session.token, "loading source image");
        out.effects.push(Effect::LoadSource {
            token: self.session.token,
            url: url.to_owned(),
        });
        Ok(())
    }

    /// Decode and normalize a source image and start cropping it.
    fn begin_crop(&mut self, bytes: &[u8], out: &mut Dispatch) -> Result<(), PipelineError> {
        let from = self.stage();
        if !from.can_transition_to(Stage::Cropping) {
            return Err(PipelineError::StageContract {
                message: "CropImageInit",
                stage: from,
            });
        }
        let raster = asset::decode(bytes)?;
        let original = Dimensions::of(&raster);
        let (raster, resampled) = downsample(
            raster,
            self.config.working_resolution,
            self.config.downsample_filter,
        );
        let working = Dimensions::of(&raster);

        self.session.asset = Some(ImageAsset::new(raster, Provenance::Source));
        self.session.active = ActiveStage::Cropping(CropStage::new(working));
        self.session.token = self.session.token.next();
        info!(
            %from,
            %original,
            %working,
            resampled,
            token = %self.session.token,
            "stage transition: cropping"
        );
        out.outbound.push(Outbound::StageChanged {
            stage: Stage::Cropping,
        });
        Ok(())
    }

    /// Hand `input` to the active stage. `token` is the generation the
    /// stage tags its effects with; it becomes the session token only if
    /// the stage accepts the input.
    fn route(
        &mut self,
        input: StageInput,
        token: SessionToken,
        out: &mut Dispatch,
    ) -> Result<(), PipelineError> {
        let stage = self.stage();
        let Some(handler) = self.session.active.handler_mut() else {
            return Err(input.rejected(stage));
        };
        let mut ctx = StageContext {
            config: &self.config,
            asset: self.session.asset.as_ref(),
            token,
            settings: self.session.settings.as_ref(),
            composition: &mut self.session.composition,
        };
        let handled = handler.handle(input, &mut ctx)?;
        self.session.token = token;
        self.apply(handled, out)
    }

    /// Commit a handler's answer, following transitions until a stage
    /// settles.
    fn apply(&mut self, mut handled: Handled, out: &mut Dispatch) -> Result<(), PipelineError> {
        loop {
            let Handled {
                next,
                asset,
                outbound,
                effects,
            } = handled;
            let Some(next) = next else {
                if let Some(asset) = asset {
                    self.session.asset = Some(asset);
                }
                out.outbound.extend(outbound);
                out.effects.extend(effects);
                return Ok(());
            };
            handled = self.transition(next, asset, Dispatch { outbound, effects }, out)?;
        }
    }

    fn transition(
        &mut self,
        next: Next,
        asset: Option<ImageAsset>,
        emitted: Dispatch,
        out: &mut Dispatch,
    ) -> Result<Handled, PipelineError> {
        let from = self.stage();
        let to = next.stage();
        if !from.can_transition_to(to) {
            return Err(PipelineError::Internal(format!(
                "no transition from {from} to {to}"
            )));
        }

        let mut active = ActiveStage::for_next(next);
        let token = self.session.token.next();
        let previous = asset.map(|candidate| self.session.asset.replace(candidate));

        let entered = match active.handler_mut() {
            Some(handler) => {
                let mut ctx = StageContext {
                    config: &self.config,
                    asset: self.session.asset.as_ref(),
                    token,
                    settings: self.session.settings.as_ref(),
                    composition: &mut self.session.composition,
                };
                handler.enter(&mut ctx)
            }
            None => Ok(Handled::none()),
        };

        match entered {
            Ok(handled) => {
                self.session.active = active;
                self.session.token = token;
                info!(%from, %to, %token, "stage transition");
                out.extend(emitted);
                out.outbound.push(Outbound::StageChanged { stage: to });
                Ok(handled)
            }
            Err(err) => {
                if let Some(previous) = previous {
                    self.session.asset = previous;
                }
                debug!(%from, %to, error = %err, "transition aborted");
                Err(err)
            }
        }
    }

    fn report(&mut self, err: &PipelineError, out: &mut Dispatch) {
        let kind = err.kind();
        let stage = self.stage();
        match kind {
            ErrorKind::StageContractViolation => debug!(%stage, error = %err, "message ignored"),
            ErrorKind::Fatal => error!(%stage, error = %err, "fatal pipeline error"),
            _ => warn!(%stage, %kind, error = %err, "stage error"),
        }
        out.outbound.push(Outbound::ErrorReported {
            kind,
            message: err.to_string(),
        });
        if err.is_fatal() && stage != Stage::Halted {
            self.session.active = ActiveStage::Halted;
            self.session.token = self.session.token.next();
            out.outbound.push(Outbound::StageChanged {
                stage: Stage::Halted,
            });
        }
    }
}
