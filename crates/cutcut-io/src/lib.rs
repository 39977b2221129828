//! cutcut-io: The I/O edge of the sticker pipeline.
//!
//! Everything `cutcut-pipeline` leaves to its shell lives here: the
//! on-disk settings store, the image source loader, the remove.bg and
//! Telegram clients, and the [`Driver`] that executes orchestrator effects
//! on a tokio runtime.
//!
//! The remote services sit behind the [`SourceLoader`],
//! [`BackgroundRemover`], and [`StickerUploader`] traits so drivers can be
//! exercised without a network.

pub mod config;
pub mod download;
pub mod driver;
pub mod error;
pub mod loader;
pub mod removebg;
pub mod settings;
pub mod telegram;

pub use config::ServiceConfig;
pub use download::save_download;
pub use driver::{Driver, Services};
pub use error::IoError;
pub use loader::{HttpSourceLoader, SourceLoader, SourceLocation};
pub use removebg::{BackgroundRemover, RemoveBgClient};
pub use settings::{SETTINGS_FILE, SettingsStore};
pub use telegram::{StickerUploader, TelegramClient};
