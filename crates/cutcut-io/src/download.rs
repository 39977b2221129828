//! Writing downloaded stickers to disk.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::IoError;

/// Write `data` as `filename` inside `dir`, creating `dir` if needed.
///
/// Only the final component of `filename` is used, so a name can never
/// escape `dir`. An existing file is overwritten.
///
/// # Errors
///
/// Returns [`IoError::File`] if `filename` has no file-name component,
/// the directory cannot be created, or the file cannot be written.
pub async fn save_download(dir: &Path, filename: &str, data: &[u8]) -> Result<PathBuf, IoError> {
    let name = Path::new(filename)
        .file_name()
        .ok_or_else(|| IoError::File {
            path: dir.join(filename),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "no file name"),
        })?;
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| IoError::File {
            path: dir.to_path_buf(),
            source,
        })?;

    let path = dir.join(name);
    tokio::fs::write(&path, data)
        .await
        .map_err(|source| IoError::File {
            path: path.clone(),
            source,
        })?;
    info!(path = %path.display(), bytes = data.len(), "sticker saved");
    Ok(path)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "current_thread")]
    async fn writes_into_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let path = save_download(&out, "cutcut-sticker.png", b"png")
            .await
            .unwrap();
        assert_eq!(path, out.join("cutcut-sticker.png"));
        assert_eq!(std::fs::read(path).unwrap(), b"png");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn strips_directory_components() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_download(dir.path(), "../../escape.png", b"x")
            .await
            .unwrap();
        assert_eq!(path, dir.path().join("escape.png"));
    }
}
