//! Operator settings and the upload target derived from them.
//!
//! The settings record is the only state that outlives a session. The
//! pipeline never reads it from storage itself: the shell delivers it
//! through `SettingsChanged` and the orchestrator keeps the latest copy
//! in the session context. Absence is `None` at every level; blank
//! strings count as absent.

use serde::{Deserialize, Serialize};

use crate::types::PipelineError;

/// Key under which the settings record is persisted.
pub const SETTINGS_KEY: &str = "cutcut.settings";

/// Prefix of the sticker pack name.
pub const STICKER_PACK_PREFIX: &str = "cutcut";

/// Persisted operator settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Telegram bot API token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram_bot_token: Option<String>,

    /// Telegram user id that owns the sticker pack.
    #[serde(
        default,
        alias = "telegramUserId",
        skip_serializing_if = "Option::is_none"
    )]
    pub telegram_bot_id: Option<String>,

    /// Username of the bot, used to derive the pack name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram_bot_username: Option<String>,

    /// remove.bg API key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_bg_api_key: Option<String>,
}

fn present(value: Option<&String>) -> Option<&str> {
    value.map(|s| s.trim()).filter(|s| !s.is_empty())
}

impl Settings {
    /// Bot token, if set and non-blank.
    #[must_use]
    pub fn bot_token(&self) -> Option<&str> {
        present(self.telegram_bot_token.as_ref())
    }

    /// Owning user id, if set and non-blank.
    #[must_use]
    pub fn bot_id(&self) -> Option<&str> {
        present(self.telegram_bot_id.as_ref())
    }

    /// Bot username, if set and non-blank.
    #[must_use]
    pub fn bot_username(&self) -> Option<&str> {
        present(self.telegram_bot_username.as_ref())
    }

    /// Background-removal API key, if set and non-blank.
    #[must_use]
    pub fn remove_bg_api_key(&self) -> Option<&str> {
        present(self.remove_bg_api_key.as_ref())
    }

    /// Whether no field carries a value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bot_token().is_none()
            && self.bot_id().is_none()
            && self.bot_username().is_none()
            && self.remove_bg_api_key().is_none()
    }
}

/// Where an upload goes. Built for one upload attempt and then dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    /// Bot API token.
    pub bot_token: String,
    /// Owning user id (`user_id` form field).
    pub bot_id: String,
    /// Emoji attached to the sticker (`emojis` form field).
    pub emoji: String,
    /// Sticker set name (`name` form field).
    pub pack_name: String,
}

impl UploadTarget {
    /// Build a target from the current settings.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::MissingConfiguration`] when the settings
    /// are absent or lack a bot token or user id.
    pub fn from_settings(settings: Option<&Settings>, emoji: &str) -> Result<Self, PipelineError> {
        let settings = settings.ok_or(PipelineError::MissingConfiguration("settings"))?;
        let bot_token = settings
            .bot_token()
            .ok_or(PipelineError::MissingConfiguration("telegramBotToken"))?;
        let bot_id = settings
            .bot_id()
            .ok_or(PipelineError::MissingConfiguration("telegramBotId"))?;
        Ok(Self {
            bot_token: bot_token.to_owned(),
            bot_id: bot_id.to_owned(),
            emoji: emoji.to_owned(),
            pack_name: pack_name(settings.bot_username()),
        })
    }
}

/// Sticker set name for a bot.
///
/// Telegram requires sets created by a bot to end in `_by_<username>`.
#[must_use]
pub fn pack_name(bot_username: Option<&str>) -> String {
    bot_username.map_or_else(
        || STICKER_PACK_PREFIX.to_owned(),
        |user| format!("{STICKER_PACK_PREFIX}_by_{}", user.trim_start_matches('@')),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn full() -> Settings {
        Settings {
            telegram_bot_token: Some("123:abc".into()),
            telegram_bot_id: Some("42".into()),
            telegram_bot_username: Some("@cut_bot".into()),
            remove_bg_api_key: Some("key".into()),
        }
    }

    #[test]
    fn target_from_complete_settings() {
        let target = UploadTarget::from_settings(Some(&full()), "\u{1f642}").unwrap();
        assert_eq!(target.bot_token, "123:abc");
        assert_eq!(target.bot_id, "42");
        assert_eq!(target.pack_name, "cutcut_by_cut_bot");
    }

    #[test]
    fn absent_settings_are_missing_configuration() {
        let err = UploadTarget::from_settings(None, "x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingConfigurationError);
    }

    #[test]
    fn blank_token_counts_as_missing() {
        let settings = Settings {
            telegram_bot_token: Some("   ".into()),
            ..full()
        };
        let err = UploadTarget::from_settings(Some(&settings), "x").unwrap_err();
        assert!(matches!(
            err,
            PipelineError::MissingConfiguration("telegramBotToken")
        ));
    }

    #[test]
    fn missing_bot_id_is_reported() {
        let settings = Settings {
            telegram_bot_id: None,
            ..full()
        };
        let err = UploadTarget::from_settings(Some(&settings), "x").unwrap_err();
        assert!(matches!(err, PipelineError::MissingConfiguration("telegramBotId")));
    }

    #[test]
    fn pack_name_without_username_is_prefix() {
        assert_eq!(pack_name(None), "cutcut");
    }

    #[test]
    fn user_id_alias_is_accepted() {
        let settings: Settings =
            serde_json::from_str(r#"{"telegramBotToken":"t","telegramUserId":"7"}"#).unwrap();
        assert_eq!(settings.bot_id(), Some("7"));
        assert!(settings.remove_bg_api_key().is_none());
    }

    #[test]
    fn serialization_skips_absent_fields() {
        let json = serde_json::to_string(&Settings::default()).unwrap();
        assert_eq!(json, "{}");
        assert!(Settings::default().is_empty());
    }
}
