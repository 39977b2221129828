//! Persistent settings store.
//!
//! Settings live in a small JSON object on disk, with the record stored
//! under [`SETTINGS_KEY`]. Other keys in the same file are preserved on
//! write. A missing file, a missing key, a JSON `null`, or a record with
//! every field blank all read back as `None`.

use std::path::{Path, PathBuf};

use cutcut_pipeline::{SETTINGS_KEY, Settings};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::IoError;

/// File name of the settings store inside the config directory.
pub const SETTINGS_FILE: &str = "settings.json";

/// A settings file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    /// A store backed by `path`. Nothing is read until [`load`](Self::load).
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The store at `$XDG_CONFIG_HOME/cutcut/settings.json`, falling back
    /// to `$HOME/.config/cutcut/settings.json`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::NoConfigDir`] if neither variable is set.
    pub fn default_location() -> Result<Self, IoError> {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var_os("HOME")
                    .filter(|v| !v.is_empty())
                    .map(|home| PathBuf::from(home).join(".config"))
            })
            .ok_or(IoError::NoConfigDir)?;
        Ok(Self::new(base.join("cutcut").join(SETTINGS_FILE)))
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored settings.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::File`] if the file exists but cannot be read, or
    /// [`IoError::Json`] if it is not a JSON object or the record is
    /// malformed.
    pub fn load(&self) -> Result<Option<Settings>, IoError> {
        let Some(mut map) = self.read_map()? else {
            debug!(path = %self.path.display(), "no settings file");
            return Ok(None);
        };
        let record = match map.remove(SETTINGS_KEY) {
            None | Some(Value::Null) => return Ok(None),
            Some(record) => record,
        };
        let settings: Settings =
            serde_json::from_value(record).map_err(|source| self.json_error(source))?;
        Ok((!settings.is_empty()).then_some(settings))
    }

    /// Write `settings`, replacing any previous record.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::File`] if the directory or file cannot be
    /// written, or [`IoError::Json`] if an existing file is corrupt.
    pub fn save(&self, settings: &Settings) -> Result<(), IoError> {
        let mut map = self.read_map()?.unwrap_or_default();
        let record = serde_json::to_value(settings).map_err(|source| self.json_error(source))?;
        map.insert(SETTINGS_KEY.to_owned(), record);
        self.write_map(&map)
    }

    /// Remove the record. Other keys in the file are kept.
    ///
    /// # Errors
    ///
    /// Same as [`save`](Self::save).
    pub fn clear(&self) -> Result<(), IoError> {
        let Some(mut map) = self.read_map()? else {
            return Ok(());
        };
        if map.remove(SETTINGS_KEY).is_some() {
            self.write_map(&map)?;
        }
        Ok(())
    }

    fn read_map(&self) -> Result<Option<Map<String, Value>>, IoError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(IoError::File {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        if text.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| self.json_error(source))
    }

    fn write_map(&self, map: &Map<String, Value>) -> Result<(), IoError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| IoError::File {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let mut text =
            serde_json::to_string_pretty(map).map_err(|source| self.json_error(source))?;
        text.push('\n');
        std::fs::write(&self.path, text).map_err(|source| IoError::File {
            path: self.path.clone(),
            source,
        })
    }

    fn json_error(&self, source: serde_json::Error) -> IoError {
        IoError::Json {
            path: self.path.clone(),
            source,
        }
    }
}
