//! Fetching source image bytes for `LoadSource` effects.

use std::path::PathBuf;

use async_trait::async_trait;
use cutcut_pipeline::asset;
use tracing::debug;

use crate::error::{IoError, excerpt};

/// Resolves an image URL to its raw bytes.
#[async_trait]
pub trait SourceLoader: Send + Sync {
    /// Load the bytes behind `url`.
    async fn load(&self, url: &str) -> Result<Vec<u8>, IoError>;
}

/// Where a source URL points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    /// An inline `data:` URL.
    Inline,
    /// An `http` or `https` URL.
    Remote,
    /// A local file, given as a bare path or a `file://` URL.
    File(PathBuf),
}

impl SourceLocation {
    /// Classify `url`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::UnsupportedSource`] for any other scheme.
    pub fn parse(url: &str) -> Result<Self, IoError> {
        if asset::is_data_url(url) {
            return Ok(Self::Inline);
        }
        if let Some(path) = url.strip_prefix("file://") {
            return Ok(Self::File(PathBuf::from(path)));
        }
        match url.split_once("://") {
            Some((scheme, _))
                if scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https") =>
            {
                Ok(Self::Remote)
            }
            Some(_) => Err(IoError::UnsupportedSource(url.to_owned())),
            None => Ok(Self::File(PathBuf::from(url))),
        }
    }
}

/// [`SourceLoader`] for local files and http(s) URLs.
#[derive(Debug, Clone)]
pub struct HttpSourceLoader {
    client: reqwest::Client,
}

impl HttpSourceLoader {
    const SERVICE: &'static str = "image source";

    /// A loader sharing `client`.
    #[must_use]
    pub const fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, IoError> {
        let http = |source| IoError::Http {
            service: Self::SERVICE,
            source,
        };
        let response = self.client.get(url).send().await.map_err(http)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IoError::Status {
                service: Self::SERVICE,
                status: status.as_u16(),
                body: excerpt(&body),
            });
        }
        let bytes = response.bytes().await.map_err(http)?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl SourceLoader for HttpSourceLoader {
    async fn load(&self, url: &str) -> Result<Vec<u8>, IoError> {
        let bytes = match SourceLocation::parse(url)? {
            SourceLocation::Inline => {
                asset::data_url_bytes(url).map_err(|e| IoError::Malformed {
                    service: Self::SERVICE,
                    message: e.to_string(),
                })?
            }
            SourceLocation::Remote => self.fetch(url).await?,
            SourceLocation::File(path) => tokio::fs::read(&path)
                .await
                .map_err(|source| IoError::File { path, source })?,
        };
        debug!(bytes = bytes.len(), "source loaded");
        Ok(bytes)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn classifies_urls() {
        assert_eq!(
            SourceLocation::parse("data:image/png;base64,AAAA").unwrap(),
            SourceLocation::Inline
        );
        assert_eq!(
            SourceLocation::parse("HTTPS://example.com/a.jpg").unwrap(),
            SourceLocation::Remote
        );
        assert_eq!(
            SourceLocation::parse("file:///tmp/a.png").unwrap(),
            SourceLocation::File(PathBuf::from("/tmp/a.png"))
        );
        assert_eq!(
            SourceLocation::parse("photos/a.png").unwrap(),
            SourceLocation::File(PathBuf::from("photos/a.png"))
        );
        assert!(matches!(
            SourceLocation::parse("ftp://example.com/a.png"),
            Err(IoError::UnsupportedSource(_))
        ));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn reads_local_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.bin");
        std::fs::write(&path, [1u8, 2, 3]).unwrap();

        let loader = HttpSourceLoader::new(reqwest::Client::new());
        let bytes = loader.load(path.to_str().unwrap()).await.unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn missing_file_reports_path() {
        let loader = HttpSourceLoader::new(reqwest::Client::new());
        let err = loader.load("/definitely/not/here.png").await.unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.png"));
    }
}
