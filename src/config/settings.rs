//! Process settings read from the environment.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::owner::OwnerId;

/// Telegram API credentials for the user-account client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Telegram API ID (obtain from <https://my.telegram.org>).
    pub api_id: i32,

    /// Telegram API hash (obtain from <https://my.telegram.org>).
    pub api_hash: String,

    /// Directory holding the live protocol session files.
    #[serde(default = "default_session_dir")]
    pub session_dir: PathBuf,
}

fn default_session_dir() -> PathBuf {
    std::env::temp_dir().join("profile_login_bot")
}

impl TelegramConfig {
    /// Creates a new Telegram configuration.
    #[must_use]
    pub fn new(api_id: i32, api_hash: String) -> Self {
        Self {
            api_id,
            api_hash,
            session_dir: default_session_dir(),
        }
    }
}

/// Complete bot configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Bot API token of the operator chat bot.
    pub bot_token: String,

    /// The only identity allowed to drive the bot.
    pub owner_id: OwnerId,

    /// User-account client credentials.
    pub telegram: TelegramConfig,

    /// Path to the JSON session store.
    #[serde(default = "default_session_store")]
    pub session_store: PathBuf,

    /// Pause between consecutive profile photo uploads, in seconds.
    #[serde(default = "default_photo_delay")]
    pub photo_delay_secs: u64,
}

fn default_session_store() -> PathBuf {
    PathBuf::from("./sessions.json")
}

fn default_photo_delay() -> u64 {
    5
}

impl BotConfig {
    /// Creates configuration from environment variables.
    ///
    /// Expects `BOT_TOKEN`, `API_ID`, `API_HASH` and `OWNER_ID` to be set.
    /// `SESSION_STORE`, `SESSION_DIR` and `PHOTO_DELAY_SECS` are optional.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a number is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| {
            lookup(key)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::MissingEnvVar(key))
        };

        let bot_token = required("BOT_TOKEN")?;

        let api_id: i32 = required("API_ID")?
            .parse()
            .ok()
            .filter(|id| *id > 0)
            .ok_or(ConfigError::InvalidApiId)?;

        let api_hash = required("API_HASH")?;

        let owner_id: u64 = required("OWNER_ID")?
            .parse()
            .ok()
            .filter(|id| *id > 0)
            .ok_or(ConfigError::InvalidOwnerId)?;

        let session_dir = lookup("SESSION_DIR").map_or_else(default_session_dir, PathBuf::from);

        let session_store =
            lookup("SESSION_STORE").map_or_else(default_session_store, PathBuf::from);

        let photo_delay_secs = lookup("PHOTO_DELAY_SECS")
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(default_photo_delay);

        Ok(Self {
            bot_token,
            owner_id: OwnerId::new(owner_id),
            telegram: TelegramConfig {
                api_id,
                api_hash,
                session_dir,
            },
            session_store,
            photo_delay_secs,
        })
    }

    /// Delay applied between profile photo uploads.
    #[must_use]
    pub const fn photo_delay(&self) -> Duration {
        Duration::from_secs(self.photo_delay_secs)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Invalid API_ID format (must be a positive integer)")]
    InvalidApiId,

    #[error("Invalid OWNER_ID format (must be a positive integer)")]
    InvalidOwnerId,
}
