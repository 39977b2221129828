//! Client for the remove.bg background-removal API.

use async_trait::async_trait;
use reqwest::multipart::Form;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{IoError, excerpt};

/// Removes the background from an image.
#[async_trait]
pub trait BackgroundRemover: Send + Sync {
    /// Send `image_base64` (PNG, no `data:` prefix) and return the cut-out
    /// image as base64.
    async fn remove_background(&self, api_key: &str, image_base64: &str)
    -> Result<String, IoError>;
}

#[derive(Debug, Deserialize)]
struct SuccessBody {
    data: SuccessData,
}

#[derive(Debug, Deserialize)]
struct SuccessData {
    result_b64: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<ServiceError>,
}

#[derive(Debug, Deserialize)]
struct ServiceError {
    title: String,
}

/// [`BackgroundRemover`] backed by remove.bg.
#[derive(Debug, Clone)]
pub struct RemoveBgClient {
    http: reqwest::Client,
    url: String,
}

impl RemoveBgClient {
    const SERVICE: &'static str = "remove.bg";

    /// A client posting to `url` through `http`.
    #[must_use]
    pub fn new(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }

    fn transport(source: reqwest::Error) -> IoError {
        IoError::Http {
            service: Self::SERVICE,
            source,
        }
    }
}

/// Extract the error titles from a remove.bg failure body, or fall back to
/// the raw text.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) if !parsed.errors.is_empty() => parsed
            .errors
            .into_iter()
            .map(|e| e.title)
            .collect::<Vec<_>>()
            .join("; "),
        _ => excerpt(body),
    }
}

fn parse_success(body: &str) -> Result<String, IoError> {
    serde_json::from_str::<SuccessBody>(body)
        .map(|parsed| parsed.data.result_b64)
        .map_err(|e| IoError::Malformed {
            service: RemoveBgClient::SERVICE,
            message: e.to_string(),
        })
}

#[async_trait]
impl BackgroundRemover for RemoveBgClient {
    async fn remove_background(
        &self,
        api_key: &str,
        image_base64: &str,
    ) -> Result<String, IoError> {
        let form = Form::new()
            .text("image_file_b64", image_base64.to_owned())
            .text("size", "auto");

        debug!(url = %self.url, bytes = image_base64.len(), "posting image to remove.bg");
        let response = self
            .http
            .post(&self.url)
            .header("X-Api-Key", api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .multipart(form)
            .send()
            .await
            .map_err(Self::transport)?;

        let status = response.status();
        let body = response.text().await.map_err(Self::transport)?;
        if !status.is_success() {
            return Err(IoError::Status {
                service: Self::SERVICE,
                status: status.as_u16(),
                body: error_message(&body),
            });
        }

        let result = parse_success(&body)?;
        info!(bytes = result.len(), "background removed");
        Ok(result)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn success_body_yields_result() {
        let body = r#"{"data":{"result_b64":"iVBORw0KGgo=","foreground_top":0}}"#;
        assert_eq!(parse_success(body).unwrap(), "iVBORw0KGgo=");
    }

    #[test]
    fn unexpected_body_is_malformed() {
        assert!(matches!(
            parse_success(r#"{"data":{}}"#),
            Err(IoError::Malformed { .. })
        ));
    }

    #[test]
    fn error_titles_are_joined() {
        let body = r#"{"errors":[{"title":"Insufficient credits"},{"title":"Try later"}]}"#;
        assert_eq!(error_message(body), "Insufficient credits; Try later");
    }

    #[test]
    fn non_json_error_falls_back_to_text() {
        assert_eq!(error_message("Bad Gateway"), "Bad Gateway");
    }
}
