//! Remote service endpoints and HTTP client construction.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::IoError;

/// Where the remote services live and how long to wait for them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceConfig {
    /// Background-removal endpoint.
    pub remove_bg_url: String,

    /// Base URL of the Telegram Bot API (without the `/bot<token>` part).
    pub telegram_api_base: String,

    /// Per-request timeout, in seconds.
    pub timeout_secs: u64,
}

impl ServiceConfig {
    /// Default background-removal endpoint.
    pub const DEFAULT_REMOVE_BG_URL: &'static str = "https://api.remove.bg/v1.0/removebg";
    /// Default Telegram Bot API base.
    pub const DEFAULT_TELEGRAM_API_BASE: &'static str = "https://api.telegram.org";
    /// Default request timeout in seconds.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// Per-request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Build the shared HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::Http`] if the TLS backend cannot be initialised.
    pub fn http_client(&self) -> Result<reqwest::Client, IoError> {
        reqwest::Client::builder()
            .timeout(self.timeout())
            .user_agent(concat!("cutcut/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| IoError::Http {
                service: "http client",
                source,
            })
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            remove_bg_url: Self::DEFAULT_REMOVE_BG_URL.to_owned(),
            telegram_api_base: Self::DEFAULT_TELEGRAM_API_BASE.to_owned(),
            timeout_secs: Self::DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: ServiceConfig =
            serde_json::from_str(r#"{"removeBgUrl":"http://localhost:9000/removebg"}"#).unwrap();
        assert_eq!(config.remove_bg_url, "http://localhost:9000/removebg");
        assert_eq!(config.telegram_api_base, ServiceConfig::DEFAULT_TELEGRAM_API_BASE);
        assert_eq!(config.timeout(), Duration::from_secs(30));
    }
}
