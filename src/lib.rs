//! Profile Login Bot Library
//!
//! An owner-only Telegram bot that signs a user account in and edits it.
//!
//! This crate provides the core functionality for:
//! - Signing a user account in by phone, login code and 2FA password
//! - Persisting exported sessions and caching live connections
//! - Renaming the account and replacing its profile photo
//! - Talking to the owner through a Bot API chat with inline buttons

pub mod bot;
pub mod commands;
pub mod config;
pub mod login;
pub mod owner;
pub mod profile;
pub mod session;
pub mod telegram;
