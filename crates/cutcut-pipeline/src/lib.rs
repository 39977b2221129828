//! cutcut-pipeline: Sticker pipeline state machine and raster stages
//! (sans-IO).
//!
//! Turns a photo into an outlined sticker through:
//! crop -> erase (remote or manual) -> stroke and compose -> export.
//!
//! The [`Orchestrator`] consumes typed [`Inbound`] messages and effect
//! [`Completion`]s and answers with a [`Dispatch`] of [`Outbound`]
//! messages and [`Effect`]s. This crate has **no I/O dependencies**:
//! fetching images, calling remote services, and writing files are
//! effects the shell performs. All network and filesystem interaction
//! lives in `cutcut-io`.

pub mod asset;
pub mod blend;
pub mod blur;
pub mod composite;
pub mod crop;
pub mod downsample;
pub mod erase;
pub mod export;
pub mod message;
pub mod orchestrator;
pub mod settings;
pub mod stage;
pub mod stroke;
pub mod types;

pub use asset::{ImageAsset, Provenance};
pub use composite::{Composition, Layer, LoadedFont};
pub use crop::CropRect;
pub use downsample::DownsampleFilter;
pub use erase::EraseSurface;
pub use export::{DOWNLOAD_FILENAME, ExportKind};
pub use message::{
    Completion, Dispatch, Effect, Inbound, Outbound, RemoteFailure, SessionToken, UploadReply,
};
pub use orchestrator::{Orchestrator, PipelineSession};
pub use settings::{SETTINGS_KEY, STICKER_PACK_PREFIX, Settings, UploadTarget};
pub use stage::Stage;
pub use stroke::{add_stroke, opacify_alpha};
pub use types::{
    BrushOptions, Color, Dimensions, ErrorKind, PipelineConfig, PipelineError, RgbaImage,
    StrokeOptions, TextOverlay, TextStyle,
};
