//! User-account login module.
//!
//! A small state machine that signs the owner's account in through the
//! operator chat: phone number, login code, then the 2FA password if
//! the account has one.

mod machine;
mod state;

pub use machine::{LoginError, LoginStateMachine, LoginStep};
pub use state::{LoginStage, LoginState, PendingLogin};
