//! Configuration module for the login bot.
//!
//! Handles loading and validation of the process settings: bot token,
//! Telegram API credentials, the authorized owner and storage paths.

mod settings;

pub use settings::{BotConfig, ConfigError, TelegramConfig};
