//! Errors raised at the I/O edge.

use std::path::PathBuf;

use cutcut_pipeline::RemoteFailure;

/// Errors that can occur while talking to the filesystem or a remote
/// service.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// The HTTP request could not be sent or its body could not be read.
    #[error("{service} request failed: {source}")]
    Http {
        /// Which service was being called.
        service: &'static str,
        /// Underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The service answered with a non-success status.
    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        /// Which service was being called.
        service: &'static str,
        /// HTTP status code.
        status: u16,
        /// First part of the response body.
        body: String,
    },

    /// The service answered with a body we could not interpret.
    #[error("{service} sent an unexpected response: {message}")]
    Malformed {
        /// Which service was being called.
        service: &'static str,
        /// What was wrong with it.
        message: String,
    },

    /// The image source URL uses a scheme we cannot load.
    #[error("unsupported image source: {0}")]
    UnsupportedSource(String),

    /// Reading or writing a local file failed.
    #[error("{}: {source}", path.display())]
    File {
        /// The file involved.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A local JSON file could not be parsed or written.
    #[error("{}: invalid JSON: {source}", path.display())]
    Json {
        /// The file involved.
        path: PathBuf,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },

    /// Neither `XDG_CONFIG_HOME` nor `HOME` is set.
    #[error("cannot locate a configuration directory (set XDG_CONFIG_HOME or HOME)")]
    NoConfigDir,
}

impl IoError {
    /// HTTP status associated with this error, if the service answered.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl From<IoError> for RemoteFailure {
    fn from(err: IoError) -> Self {
        Self {
            status: err.status(),
            message: err.to_string(),
        }
    }
}

/// Longest response-body excerpt carried in an error.
pub(crate) const BODY_EXCERPT_CHARS: usize = 200;

pub(crate) fn excerpt(body: &str) -> String {
    body.chars().take(BODY_EXCERPT_CHARS).collect()
}
