//! Session stages and the handler contract every stage implements.
//!
//! The orchestrator owns exactly one active handler. A handler sees a
//! [`StageContext`] with read access to the current asset and settings
//! and mutable access to the sticker canvas; it answers each input with
//! a [`Handled`] value naming the next stage (if any), a replacement
//! asset (if any), and the outbound messages and effects to emit. The
//! handler never switches stages itself.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::asset::ImageAsset;
use crate::composite::Composition;
use crate::export::ExportKind;
use crate::message::{Completion, Effect, Inbound, Outbound, SessionToken};
use crate::settings::Settings;
use crate::types::{PipelineConfig, PipelineError};

/// Where a session is in the sticker workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// No image loaded.
    Idle,
    /// Selecting a region of the source image.
    Cropping,
    /// Removing the background.
    Erasing,
    /// Outlining the cutout and arranging the canvas.
    Compositing,
    /// Producing the download or upload.
    Exporting,
    /// The sticker was exported.
    Done,
    /// A fatal error stopped the session.
    Halted,
}

impl Stage {
    /// Stages reachable from `self` in one transition.
    ///
    /// `Idle` (via `Reset`) and `Halted` (via a fatal error) are reachable
    /// from everywhere.
    #[must_use]
    pub const fn allowed_transitions(self) -> &'static [Self] {
        match self {
            Self::Idle => &[Self::Cropping, Self::Idle, Self::Halted],
            Self::Cropping => &[Self::Cropping, Self::Erasing, Self::Idle, Self::Halted],
            Self::Erasing => &[Self::Cropping, Self::Compositing, Self::Idle, Self::Halted],
            Self::Compositing => &[
                Self::Cropping,
                Self::Exporting,
                Self::Idle,
                Self::Halted,
            ],
            Self::Exporting => &[
                Self::Cropping,
                Self::Compositing,
                Self::Done,
                Self::Idle,
                Self::Halted,
            ],
            Self::Done | Self::Halted => &[Self::Idle, Self::Halted],
        }
    }

    /// Whether `next` is reachable from `self` in one transition.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        self.allowed_transitions().contains(&next)
    }

    /// `Done` and `Halted` accept nothing but `Reset` and
    /// `SettingsChanged`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Halted)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Cropping => "cropping",
            Self::Erasing => "erasing",
            Self::Compositing => "compositing",
            Self::Exporting => "exporting",
            Self::Done => "done",
            Self::Halted => "halted",
        })
    }
}

/// Input delivered to the active handler.
#[derive(Debug)]
pub enum StageInput {
    /// A shell message.
    Shell(Inbound),
    /// An effect result whose token is current.
    Completion(Completion),
}

impl StageInput {
    /// Name of the underlying message.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Shell(msg) => msg.name(),
            Self::Completion(done) => done.name(),
        }
    }

    /// Error for an input the stage does not accept.
    #[must_use]
    pub const fn rejected(&self, stage: Stage) -> PipelineError {
        PipelineError::StageContract {
            message: self.name(),
            stage,
        }
    }
}

/// Stage a handler asks to move to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Next {
    /// Start erasing the committed crop.
    Erasing,
    /// Outline and place the committed cutout.
    Compositing,
    /// Export the canvas.
    Exporting(ExportKind),
    /// Finish the session.
    Done,
}

impl Next {
    /// Stage this request leads to.
    #[must_use]
    pub const fn stage(&self) -> Stage {
        match self {
            Self::Erasing => Stage::Erasing,
            Self::Compositing => Stage::Compositing,
            Self::Exporting(_) => Stage::Exporting,
            Self::Done => Stage::Done,
        }
    }
}

/// A handler's answer to one input.
#[derive(Debug, Default)]
pub struct Handled {
    /// Requested transition.
    pub next: Option<Next>,
    /// Replacement for the session asset.
    pub asset: Option<ImageAsset>,
    /// Messages for the shell.
    pub outbound: Vec<Outbound>,
    /// Work for the shell.
    pub effects: Vec<Effect>,
}

impl Handled {
    /// Nothing to report.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Request a transition.
    #[must_use]
    pub fn advance(mut self, next: Next) -> Self {
        self.next = Some(next);
        self
    }

    /// Replace the session asset.
    #[must_use]
    pub fn with_asset(mut self, asset: ImageAsset) -> Self {
        self.asset = Some(asset);
        self
    }

    /// Queue a shell message.
    #[must_use]
    pub fn emit(mut self, message: Outbound) -> Self {
        self.outbound.push(message);
        self
    }

    /// Queue an effect.
    #[must_use]
    pub fn effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Session state a handler may consult.
pub struct StageContext<'a> {
    /// Session configuration.
    pub config: &'a PipelineConfig,
    /// Current asset, if any.
    pub asset: Option<&'a ImageAsset>,
    /// Token effects issued now must carry.
    pub token: SessionToken,
    /// Latest settings record.
    pub settings: Option<&'a Settings>,
    /// The sticker canvas.
    pub composition: &'a mut Composition,
}

impl<'a> StageContext<'a> {
    /// The current asset, or a contract error naming `stage`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Internal`] when no asset is loaded.
    pub fn require_asset(&self, stage: Stage) -> Result<&'a ImageAsset, PipelineError> {
        self.asset
            .ok_or_else(|| PipelineError::Internal(format!("no asset while {stage}")))
    }
}

/// Behavior shared by every active stage.
pub trait StageHandler {
    /// Which stage this handler implements.
    fn stage(&self) -> Stage;

    /// Called once when the stage becomes active. A failure aborts the
    /// transition and leaves the previous stage in place.
    ///
    /// # Errors
    ///
    /// Returns the stage's error when it cannot start with the current
    /// asset.
    fn enter(&mut self, ctx: &mut StageContext<'_>) -> Result<Handled, PipelineError> {
        let _ = ctx;
        Ok(Handled::none())
    }

    /// React to one input.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::StageContract`] for inputs the stage does
    /// not accept, or the stage's own failure.
    fn handle(
        &mut self,
        input: StageInput,
        ctx: &mut StageContext<'_>,
    ) -> Result<Handled, PipelineError>;
}
