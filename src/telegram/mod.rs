//! Telegram user-account client module.
//!
//! Defines the contract the login flow and profile operations drive,
//! and its grammers-backed implementation.

mod account;
mod client;
#[cfg(test)]
pub(crate) mod mock;

pub use account::{
    AccountClient, AccountConnector, AccountError, ProfileUpdate, SelfProfile, SessionCredential,
    SignInOutcome,
};
pub use client::{TelegramAccount, TelegramConnector};
pub(crate) use client::mask_phone;
