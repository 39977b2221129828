//! Typed messages exchanged between the shell and the orchestrator.
//!
//! Shell messages travel as `{ "action": ..., "payload": ... }` JSON
//! objects. Work the pipeline cannot do itself (fetching, HTTP, writing
//! files) leaves as an [`Effect`]; its result returns as a
//! [`Completion`] tagged with the [`SessionToken`] that was current when
//! the effect was issued.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::settings::{Settings, UploadTarget};
use crate::stage::Stage;
use crate::types::ErrorKind;

/// Messages from the shell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "payload", rename_all_fields = "camelCase")]
pub enum Inbound {
    /// Start over with a new source image (`data:` URL, file path, or
    /// http(s) URL).
    CropImageInit {
        /// Where the image comes from.
        img_url: String,
    },
    /// Commit the current crop rectangle.
    CropImage,
    /// Begin erasing, remotely or by hand.
    PrepareForErase {
        /// Use the remote background-removal service.
        remove_bg: bool,
        /// Image to erase (base64 or `data:` URL). Empty means the cropped
        /// asset.
        #[serde(default)]
        base64img: String,
    },
    /// Commit the erase surface.
    AddImgFinish,
    /// Add a line of text above the sticker.
    AddText {
        /// The text.
        content: String,
    },
    /// Export the canvas as a PNG file.
    DownloadSticker,
    /// Upload the canvas to the sticker pack.
    RequestUploadToPack,
    /// Move or resize the crop rectangle.
    SetCropRect {
        /// Left edge.
        x: u32,
        /// Top edge.
        y: u32,
        /// Width.
        width: u32,
        /// Height.
        height: u32,
    },
    /// Lock the crop rectangle to `width / height`, or unlock it.
    SetAspectRatio {
        /// Width divided by height.
        #[serde(default)]
        ratio: Option<f32>,
    },
    /// Brush pressed.
    PointerDown {
        /// Surface x.
        x: f32,
        /// Surface y.
        y: f32,
    },
    /// Brush moved.
    PointerMove {
        /// Surface x.
        x: f32,
        /// Surface y.
        y: f32,
    },
    /// Brush released.
    PointerUp,
    /// Select a canvas layer, or clear the selection.
    SelectLayer {
        /// Layer index from the bottom.
        #[serde(default)]
        index: Option<usize>,
    },
    /// The persisted settings changed.
    SettingsChanged {
        /// New settings, or `None` when cleared.
        #[serde(default)]
        settings: Option<Settings>,
    },
    /// Drop everything and return to idle.
    Reset,
}

impl Inbound {
    /// Action name, as it appears on the wire.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::CropImageInit { .. } => "CropImageInit",
            Self::CropImage => "CropImage",
            Self::PrepareForErase { .. } => "PrepareForErase",
            Self::AddImgFinish => "AddImgFinish",
            Self::AddText { .. } => "AddText",
            Self::DownloadSticker => "DownloadSticker",
            Self::RequestUploadToPack => "RequestUploadToPack",
            Self::SetCropRect { .. } => "SetCropRect",
            Self::SetAspectRatio { .. } => "SetAspectRatio",
            Self::PointerDown { .. } => "PointerDown",
            Self::PointerMove { .. } => "PointerMove",
            Self::PointerUp => "PointerUp",
            Self::SelectLayer { .. } => "SelectLayer",
            Self::SettingsChanged { .. } => "SettingsChanged",
            Self::Reset => "Reset",
        }
    }
}

/// Messages to the shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "payload", rename_all_fields = "camelCase")]
pub enum Outbound {
    /// Result of `CropImage`.
    ImageCropped {
        /// PNG `data:` URL of the cropped raster.
        data_url: String,
    },
    /// The canvas was re-rendered.
    ImageSaved {
        /// PNG `data:` URL of the canvas preview.
        data_url: String,
    },
    /// The sticker service accepted the upload.
    StickerUploadedSuccess,
    /// The sticker service rejected the upload.
    StickerUploadedFailure {
        /// Service error code, if any.
        code: Option<i64>,
        /// Service description, if any.
        description: Option<String>,
    },
    /// The session moved to another stage.
    StageChanged {
        /// The new stage.
        stage: Stage,
    },
    /// A message or completion failed.
    ErrorReported {
        /// Error category.
        kind: ErrorKind,
        /// Human-readable detail.
        message: String,
    },
    /// The download file was handed off for writing.
    StickerDownloaded {
        /// File name.
        filename: String,
    },
    /// The erase surface holds a new image (after remote removal).
    EraseSurfaceReady {
        /// PNG `data:` URL of the surface.
        data_url: String,
    },
}

/// Generation counter guarding asynchronous results.
///
/// Bumped on every stage transition, on `CropImageInit`, and on `Reset`.
/// A completion whose token differs from the session's is stale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionToken(pub u64);

impl SessionToken {
    /// The following generation.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Work the shell must perform on the orchestrator's behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Fetch the bytes of a source image.
    LoadSource {
        /// Session generation at issue time.
        token: SessionToken,
        /// File path or http(s) URL.
        url: String,
    },
    /// Run remote background removal.
    RemoveBackground {
        /// Session generation at issue time.
        token: SessionToken,
        /// Service API key.
        api_key: String,
        /// Base64 PNG (no `data:` prefix).
        image_base64: String,
    },
    /// Write a file for the operator.
    SaveFile {
        /// Suggested file name.
        filename: String,
        /// PNG bytes.
        png: Vec<u8>,
    },
    /// Add a sticker to the pack.
    UploadSticker {
        /// Session generation at issue time.
        token: SessionToken,
        /// Destination.
        target: UploadTarget,
        /// PNG bytes at logical size.
        png: Vec<u8>,
    },
}

impl Effect {
    /// Short name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::LoadSource { .. } => "LoadSource",
            Self::RemoveBackground { .. } => "RemoveBackground",
            Self::SaveFile { .. } => "SaveFile",
            Self::UploadSticker { .. } => "UploadSticker",
        }
    }
}

/// Failure of an effect, as reported by the shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFailure {
    /// HTTP status, when the failure came from a response.
    pub status: Option<u16>,
    /// What went wrong.
    pub message: String,
}

impl RemoteFailure {
    /// A failure without a status code.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for RemoteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "HTTP {status}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for RemoteFailure {}

/// Body of a sticker-upload response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReply {
    /// Whether the sticker was added.
    pub ok: bool,
    /// Error code on rejection.
    #[serde(default)]
    pub error_code: Option<i64>,
    /// Error description on rejection.
    #[serde(default)]
    pub description: Option<String>,
}

/// Results of effects, fed back into the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Source bytes arrived.
    SourceLoaded {
        /// Token from the `LoadSource` effect.
        token: SessionToken,
        /// Raw image bytes.
        result: Result<Vec<u8>, RemoteFailure>,
    },
    /// Remote background removal finished.
    BackgroundRemoved {
        /// Token from the `RemoveBackground` effect.
        token: SessionToken,
        /// Base64 PNG of the cutout.
        result: Result<String, RemoteFailure>,
    },
    /// The upload request finished.
    StickerUploaded {
        /// Token from the `UploadSticker` effect.
        token: SessionToken,
        /// Parsed response body.
        result: Result<UploadReply, RemoteFailure>,
    },
}

impl Completion {
    /// The generation this completion belongs to.
    #[must_use]
    pub const fn token(&self) -> SessionToken {
        match self {
            Self::SourceLoaded { token, .. }
            | Self::BackgroundRemoved { token, .. }
            | Self::StickerUploaded { token, .. } => *token,
        }
    }

    /// Short name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SourceLoaded { .. } => "SourceLoaded",
            Self::BackgroundRemoved { .. } => "BackgroundRemoved",
            Self::StickerUploaded { .. } => "StickerUploaded",
        }
    }
}

/// What one inbound message or completion produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dispatch {
    /// Messages for the shell, in order.
    pub outbound: Vec<Outbound>,
    /// Work for the shell, in order.
    pub effects: Vec<Effect>,
}

impl Dispatch {
    /// Whether nothing was produced.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outbound.is_empty() && self.effects.is_empty()
    }

    /// Append another dispatch.
    pub fn extend(&mut self, other: Self) {
        self.outbound.extend(other.outbound);
        self.effects.extend(other.effects);
    }
}
