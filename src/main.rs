//! Profile Login Bot - Main Entry Point
//!
//! An owner-only Telegram bot that signs a user account in through the
//! chat and then edits that account's name and profile photo.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use profile_login_bot::bot::OperatorBot;
use profile_login_bot::commands::ConversationHandler;
use profile_login_bot::config::BotConfig;
use profile_login_bot::login::LoginStateMachine;
use profile_login_bot::owner::OwnerGuard;
use profile_login_bot::profile::ProfileService;
use profile_login_bot::session::{SessionManager, SessionStore};
use profile_login_bot::telegram::TelegramConnector;

/// Owner-only bot that logs a Telegram user account in and edits its profile.
#[derive(Parser, Debug)]
#[command(name = "profile_login_bot")]
#[command(about = "Sign a Telegram user account in through a bot and edit its profile")]
#[command(version)]
struct Args {
    /// Path to the .env file for environment variables.
    #[arg(long, default_value = ".env")]
    env_file: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    if let Err(e) = dotenvy::from_filename(&args.env_file) {
        debug!("Could not load .env file ({}): {}", args.env_file, e);
    }

    let config = BotConfig::from_env().context(
        "Invalid configuration. Set BOT_TOKEN, API_ID, API_HASH and OWNER_ID in the environment",
    )?;

    let store = SessionStore::new(&config.session_store);
    info!(
        "Session store: {} ({} saved session(s))",
        store.path().display(),
        store.load().len()
    );

    let connector = Arc::new(TelegramConnector::new(config.telegram.clone()));
    let sessions = Arc::new(SessionManager::new(connector, store));
    let guard = OwnerGuard::new(config.owner_id);

    let handler = Arc::new(ConversationHandler::new(
        guard,
        Arc::clone(&sessions),
        LoginStateMachine::new(guard, Arc::clone(&sessions)),
        ProfileService::new(guard, Arc::clone(&sessions), config.photo_delay()),
    ));

    let bot = Arc::new(OperatorBot::new(&config.bot_token, handler));

    info!("Bot is running for owner {}. Use Ctrl+C to stop.", config.owner_id);
    bot.run(shutdown_signal()).await;

    info!("Disconnecting user sessions...");
    sessions.shutdown().await;
    info!("Shutdown complete");

    Ok(())
}

/// Initializes the logging subsystem.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C, shutting down..."),
                    _ = term.recv() => info!("Received SIGTERM, shutting down..."),
                }
                return;
            }
            Err(e) => warn!("Could not install SIGTERM handler: {}", e),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl+C, shutting down...");
}
