//! Effect execution for an [`Orchestrator`].
//!
//! The [`Driver`] owns the orchestrator and performs the effects it asks
//! for. File saves run inline; network effects run as tasks on the
//! current tokio runtime and their completions are fed back one at a time
//! through [`Driver::next_completion`]. The orchestrator discards any
//! completion whose session token has moved on, so the driver never
//! cancels in-flight work.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use cutcut_pipeline::{
    Completion, Dispatch, Effect, ErrorKind, Inbound, Orchestrator, Outbound, RemoteFailure,
};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::config::ServiceConfig;
use crate::download::save_download;
use crate::error::IoError;
use crate::loader::{HttpSourceLoader, SourceLoader};
use crate::removebg::{BackgroundRemover, RemoveBgClient};
use crate::telegram::{StickerUploader, TelegramClient};

/// The remote collaborators effects are executed against.
#[derive(Clone)]
pub struct Services {
    /// Resolves `LoadSource` URLs.
    pub loader: Arc<dyn SourceLoader>,
    /// Executes `RemoveBackground`.
    pub remover: Arc<dyn BackgroundRemover>,
    /// Executes `UploadSticker`.
    pub uploader: Arc<dyn StickerUploader>,
}

impl Services {
    /// The production services sharing one HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::Http`] if the HTTP client cannot be built.
    pub fn http(config: &ServiceConfig) -> Result<Self, IoError> {
        let client = config.http_client()?;
        Ok(Self {
            loader: Arc::new(HttpSourceLoader::new(client.clone())),
            remover: Arc::new(RemoveBgClient::new(
                client.clone(),
                config.remove_bg_url.clone(),
            )),
            uploader: Arc::new(TelegramClient::new(
                client,
                config.telegram_api_base.clone(),
            )),
        })
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}

/// Runs an [`Orchestrator`] against real effects.
#[derive(Debug)]
pub struct Driver {
    orchestrator: Orchestrator,
    services: Services,
    download_dir: PathBuf,
    in_flight: JoinSet<Completion>,
}

impl Driver {
    /// A driver saving downloads into `download_dir`.
    #[must_use]
    pub fn new(orchestrator: Orchestrator, services: Services, download_dir: PathBuf) -> Self {
        Self {
            orchestrator,
            services,
            download_dir,
            in_flight: JoinSet::new(),
        }
    }

    /// The driven orchestrator.
    #[must_use]
    pub const fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Number of effects still awaiting completion.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Feed one shell message and execute the resulting effects.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn handle(&mut self, message: Inbound) -> Vec<Outbound> {
        let dispatch = self.orchestrator.handle(message);
        self.execute(dispatch).await
    }

    /// Wait for the next effect to finish and feed its completion.
    ///
    /// Returns `None` once nothing is in flight.
    pub async fn next_completion(&mut self) -> Option<Vec<Outbound>> {
        loop {
            match self.in_flight.join_next().await? {
                Ok(completion) => {
                    debug!(completion = completion.name(), token = %completion.token(), "effect finished");
                    let dispatch = self.orchestrator.complete(completion);
                    return Some(self.execute(dispatch).await);
                }
                Err(e) => warn!(error = %e, "effect task did not finish"),
            }
        }
    }

    /// Feed completions until nothing is in flight.
    pub async fn settle(&mut self) -> Vec<Outbound> {
        let mut outbound = Vec::new();
        while let Some(more) = self.next_completion().await {
            outbound.extend(more);
        }
        outbound
    }

    async fn execute(&mut self, dispatch: Dispatch) -> Vec<Outbound> {
        let Dispatch {
            mut outbound,
            effects,
        } = dispatch;
        for effect in effects {
            debug!(effect = effect.name(), "executing effect");
            match effect {
                Effect::SaveFile { filename, png } => {
                    if let Err(e) = save_download(&self.download_dir, &filename, &png).await {
                        warn!(error = %e, "saving sticker failed");
                        outbound.push(Outbound::ErrorReported {
                            kind: ErrorKind::RemoteServiceError,
                            message: e.to_string(),
                        });
                    }
                }
                Effect::LoadSource { token, url } => {
                    let loader = Arc::clone(&self.services.loader);
                    self.spawn(async move {
                        Completion::SourceLoaded {
                            token,
                            result: loader.load(&url).await.map_err(RemoteFailure::from),
                        }
                    });
                }
                Effect::RemoveBackground {
                    token,
                    api_key,
                    image_base64,
                } => {
                    let remover = Arc::clone(&self.services.remover);
                    self.spawn(async move {
                        Completion::BackgroundRemoved {
                            token,
                            result: remover
                                .remove_background(&api_key, &image_base64)
                                .await
                                .map_err(RemoteFailure::from),
                        }
                    });
                }
                Effect::UploadSticker { token, target, png } => {
                    let uploader = Arc::clone(&self.services.uploader);
                    self.spawn(async move {
                        Completion::StickerUploaded {
                            token,
                            result: uploader
                                .add_sticker(&target, png)
                                .await
                                .map_err(RemoteFailure::from),
                        }
                    });
                }
            }
        }
        outbound
    }

    fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = Completion> + Send + 'static,
    {
        self.in_flight.spawn(task);
    }
}
