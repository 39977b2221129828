//! `cutcut settings` subcommands.

use clap::Subcommand;
use cutcut_io::SettingsStore;
use cutcut_pipeline::Settings;

#[derive(Subcommand)]
pub enum SettingsCommand {
    /// Print the stored settings as JSON, secrets masked.
    Show {
        /// Print secrets in full.
        #[arg(long)]
        reveal: bool,
    },
    /// Update individual fields. Fields not given are kept; an empty value
    /// removes the field.
    Set {
        /// Telegram bot API token.
        #[arg(long)]
        bot_token: Option<String>,
        /// Telegram user id that owns the sticker pack.
        #[arg(long)]
        bot_id: Option<String>,
        /// Bot username, used to name the sticker pack.
        #[arg(long)]
        bot_username: Option<String>,
        /// remove.bg API key.
        #[arg(long)]
        remove_bg_key: Option<String>,
    },
    /// Delete the stored settings.
    Clear,
}

/// Keep the last four characters of a secret.
fn mask(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    let visible = chars.len().saturating_sub(4);
    chars
        .iter()
        .enumerate()
        .map(|(i, c)| if i < visible { '*' } else { *c })
        .collect()
}

fn masked(settings: &Settings) -> Settings {
    Settings {
        telegram_bot_token: settings.telegram_bot_token.as_deref().map(mask),
        remove_bg_api_key: settings.remove_bg_api_key.as_deref().map(mask),
        ..settings.clone()
    }
}

fn apply(field: &mut Option<String>, update: Option<String>) {
    if let Some(value) = update {
        *field = Some(value).filter(|v| !v.trim().is_empty());
    }
}

pub fn run(command: SettingsCommand, store: &SettingsStore) -> Result<(), String> {
    match command {
        SettingsCommand::Show { reveal } => {
            let Some(settings) = store.load().map_err(|e| e.to_string())? else {
                eprintln!("No settings stored at {}", store.path().display());
                return Ok(());
            };
            let shown = if reveal { settings } else { masked(&settings) };
            let json = serde_json::to_string_pretty(&shown)
                .map_err(|e| format!("Error serializing settings: {e}"))?;
            println!("{json}");
            Ok(())
        }
        SettingsCommand::Set {
            bot_token,
            bot_id,
            bot_username,
            remove_bg_key,
        } => {
            let mut settings = store
                .load()
                .map_err(|e| e.to_string())?
                .unwrap_or_default();
            apply(&mut settings.telegram_bot_token, bot_token);
            apply(&mut settings.telegram_bot_id, bot_id);
            apply(&mut settings.telegram_bot_username, bot_username);
            apply(&mut settings.remove_bg_api_key, remove_bg_key);

            if settings.is_empty() {
                store.clear().map_err(|e| e.to_string())?;
            } else {
                store.save(&settings).map_err(|e| e.to_string())?;
            }
            eprintln!("Settings written to {}", store.path().display());
            Ok(())
        }
        SettingsCommand::Clear => {
            store.clear().map_err(|e| e.to_string())?;
            eprintln!("Settings cleared");
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn mask_keeps_tail() {
        assert_eq!(mask("123456:abcdef"), "*********cdef");
        assert_eq!(mask("abc"), "abc");
    }

    #[test]
    fn set_merges_and_empty_removes() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json"));

        run(
            SettingsCommand::Set {
                bot_token: Some("123:abc".into()),
                bot_id: Some("42".into()),
                bot_username: None,
                remove_bg_key: None,
            },
            &store,
        )
        .unwrap();
        run(
            SettingsCommand::Set {
                bot_token: None,
                bot_id: Some(String::new()),
                bot_username: Some("cut_bot".into()),
                remove_bg_key: None,
            },
            &store,
        )
        .unwrap();

        let settings = store.load().unwrap().unwrap();
        assert_eq!(settings.bot_token(), Some("123:abc"));
        assert_eq!(settings.bot_id(), None);
        assert_eq!(settings.bot_username(), Some("cut_bot"));
    }
}
