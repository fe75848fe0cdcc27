//! Command handling module.
//!
//! Processes what the owner sends to the bot: menu buttons, slash
//! commands, free text and photos.

mod handler;
mod types;

pub use handler::ConversationHandler;
pub use types::{Inbound, Keyboard, MenuAction, Reply};
