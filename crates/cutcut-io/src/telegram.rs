//! Telegram Bot API sticker upload.

use async_trait::async_trait;
use cutcut_pipeline::{UploadReply, UploadTarget};
use reqwest::multipart::{Form, Part};
use tracing::debug;

use crate::error::{IoError, excerpt};

/// Adds a sticker to a pack.
#[async_trait]
pub trait StickerUploader: Send + Sync {
    /// Upload `png` to the pack described by `target`.
    ///
    /// A reply with `ok: false` is a successful round trip; only transport
    /// failures and unreadable replies are errors.
    async fn add_sticker(&self, target: &UploadTarget, png: Vec<u8>)
    -> Result<UploadReply, IoError>;
}

/// [`StickerUploader`] calling `addStickerToSet`.
#[derive(Debug, Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    api_base: String,
}

impl TelegramClient {
    const SERVICE: &'static str = "telegram";
    const STICKER_FILENAME: &'static str = "sticker.png";

    /// A client for the Bot API at `api_base`.
    #[must_use]
    pub fn new(http: reqwest::Client, api_base: impl Into<String>) -> Self {
        Self {
            http,
            api_base: api_base.into(),
        }
    }

    fn endpoint(&self, bot_token: &str) -> String {
        format!(
            "{}/bot{bot_token}/addStickerToSet",
            self.api_base.trim_end_matches('/')
        )
    }

    fn transport(source: reqwest::Error) -> IoError {
        IoError::Http {
            service: Self::SERVICE,
            source,
        }
    }
}

fn parse_reply(status: reqwest::StatusCode, body: &str) -> Result<UploadReply, IoError> {
    match serde_json::from_str::<UploadReply>(body) {
        Ok(reply) => Ok(reply),
        Err(_) if !status.is_success() => Err(IoError::Status {
            service: TelegramClient::SERVICE,
            status: status.as_u16(),
            body: excerpt(body),
        }),
        Err(e) => Err(IoError::Malformed {
            service: TelegramClient::SERVICE,
            message: e.to_string(),
        }),
    }
}

#[async_trait]
impl StickerUploader for TelegramClient {
    async fn add_sticker(
        &self,
        target: &UploadTarget,
        png: Vec<u8>,
    ) -> Result<UploadReply, IoError> {
        let sticker = Part::bytes(png)
            .file_name(Self::STICKER_FILENAME)
            .mime_str("image/png")
            .map_err(Self::transport)?;
        let form = Form::new()
            .text("user_id", target.bot_id.clone())
            .text("name", target.pack_name.clone())
            .part("png_sticker", sticker)
            .text("emojis", target.emoji.clone());

        debug!(pack = %target.pack_name, "calling addStickerToSet");
        let response = self
            .http
            .post(self.endpoint(&target.bot_token))
            .multipart(form)
            .send()
            .await
            .map_err(|e| Self::transport(e.without_url()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Self::transport(e.without_url()))?;
        parse_reply(status, &body)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use reqwest::StatusCode;

    use super::*;

    #[test]
    fn endpoint_embeds_token() {
        let client = TelegramClient::new(reqwest::Client::new(), "https://api.telegram.org/");
        assert_eq!(
            client.endpoint("123:abc"),
            "https://api.telegram.org/bot123:abc/addStickerToSet"
        );
    }

    #[test]
    fn rejection_body_is_a_reply() {
        let reply = parse_reply(
            StatusCode::BAD_REQUEST,
            r#"{"ok":false,"error_code":400,"description":"Bad Request: STICKERSET_INVALID"}"#,
        )
        .unwrap();
        assert!(!reply.ok);
        assert_eq!(reply.error_code, Some(400));
    }

    #[test]
    fn success_body_is_a_reply() {
        let reply = parse_reply(StatusCode::OK, r#"{"ok":true,"result":true}"#).unwrap();
        assert!(reply.ok);
    }

    #[test]
    fn html_error_page_is_status_error() {
        let err = parse_reply(StatusCode::BAD_GATEWAY, "<html>502</html>").unwrap_err();
        assert_eq!(err.status(), Some(502));
    }
}
