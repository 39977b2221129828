//! Serializing the finished canvas.
//!
//! Both outputs read the canvas back at the display pixel ratio with the
//! selection cleared. A download writes that readback as-is; an upload
//! scales it back to the logical size the sticker service expects.

use tracing::{info, warn};

use crate::asset;
use crate::downsample::resize_exact;
use crate::message::{Completion, Effect, Outbound, UploadReply};
use crate::settings::UploadTarget;
use crate::stage::{Handled, Next, Stage, StageContext, StageHandler, StageInput};
use crate::types::{Dimensions, ErrorKind, PipelineError};

/// File name of downloaded stickers.
pub const DOWNLOAD_FILENAME: &str = "cutcut-sticker.png";

/// Which export was requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportKind {
    /// Save a PNG file.
    Download,
    /// Add to the sticker pack.
    Upload(UploadTarget),
}

/// Handler for [`Stage::Exporting`].
#[derive(Debug)]
pub struct ExportStage {
    kind: ExportKind,
}

impl ExportStage {
    /// A handler for one export.
    #[must_use]
    pub const fn new(kind: ExportKind) -> Self {
        Self { kind }
    }

    /// The requested export.
    #[must_use]
    pub const fn kind(&self) -> &ExportKind {
        &self.kind
    }

    fn upload_result(reply: UploadReply) -> Handled {
        if reply.ok {
            info!("sticker added to pack");
            return Handled::none()
                .emit(Outbound::StickerUploadedSuccess)
                .advance(Next::Done);
        }
        warn!(
            code = ?reply.error_code,
            description = ?reply.description,
            "sticker service rejected upload"
        );
        Handled::none()
            .emit(Outbound::StickerUploadedFailure {
                code: reply.error_code,
                description: reply.description,
            })
            .advance(Next::Compositing)
    }
}

impl StageHandler for ExportStage {
    fn stage(&self) -> Stage {
        Stage::Exporting
    }

    fn enter(&mut self, ctx: &mut StageContext<'_>) -> Result<Handled, PipelineError> {
        ctx.composition.select(None)?;
        let readback = ctx.composition.render_export();

        match &self.kind {
            ExportKind::Download => {
                let png = asset::encode_png(&readback)?;
                info!(
                    size = %Dimensions::of(&readback),
                    bytes = png.len(),
                    "sticker ready for download"
                );
                Ok(Handled::none()
                    .effect(Effect::SaveFile {
                        filename: DOWNLOAD_FILENAME.to_owned(),
                        png,
                    })
                    .emit(Outbound::StickerDownloaded {
                        filename: DOWNLOAD_FILENAME.to_owned(),
                    })
                    .advance(Next::Done))
            }
            ExportKind::Upload(target) => {
                let logical = ctx.composition.logical_size();
                let sticker = if Dimensions::of(&readback) == logical {
                    readback
                } else {
                    resize_exact(&readback, logical, ctx.config.downsample_filter)
                };
                let png = asset::encode_png(&sticker)?;
                info!(pack = %target.pack_name, bytes = png.len(), "uploading sticker");
                Ok(Handled::none().effect(Effect::UploadSticker {
                    token: ctx.token,
                    target: target.clone(),
                    png,
                }))
            }
        }
    }

    fn handle(
        &mut self,
        input: StageInput,
        _ctx: &mut StageContext<'_>,
    ) -> Result<Handled, PipelineError> {
        match (input, &self.kind) {
            (
                StageInput::Completion(Completion::StickerUploaded { result, .. }),
                ExportKind::Upload(_),
            ) => match result {
                Ok(reply) => Ok(Self::upload_result(reply)),
                Err(failure) => {
                    warn!(error = %failure, "sticker upload failed");
                    Ok(Handled::none()
                        .emit(Outbound::ErrorReported {
                            kind: ErrorKind::RemoteServiceError,
                            message: failure.to_string(),
                        })
                        .emit(Outbound::StickerUploadedFailure {
                            code: failure.status.map(i64::from),
                            description: Some(failure.message),
                        })
                        .advance(Next::Compositing))
                }
            },
            (other, _) => Err(other.rejected(Stage::Exporting)),
        }
    }
}
