//! Owner identity and the single-operator authorization guard.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Numeric Telegram user id of an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(u64);

impl OwnerId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Parses the stringified form used as session store key.
    #[must_use]
    pub fn parse(key: &str) -> Option<Self> {
        key.parse().ok().filter(|id| *id > 0).map(Self)
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Raised when anyone but the owner tries to drive the bot.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("user {0} is not authorized to use this bot")]
pub struct Unauthorized(pub OwnerId);

/// Accepts exactly one identity.
#[derive(Debug, Clone, Copy)]
pub struct OwnerGuard {
    owner: OwnerId,
}

impl OwnerGuard {
    #[must_use]
    pub const fn new(owner: OwnerId) -> Self {
        Self { owner }
    }

    #[must_use]
    pub const fn owner(&self) -> OwnerId {
        self.owner
    }

    /// Lets only the owner through.
    ///
    /// # Errors
    ///
    /// Returns [`Unauthorized`] for any other sender.
    pub fn authorize(&self, sender: OwnerId) -> Result<(), Unauthorized> {
        if sender == self.owner {
            Ok(())
        } else {
            warn!("Rejected request from unauthorized user {}", sender);
            Err(Unauthorized(sender))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_accepts_only_owner() {
        let guard = OwnerGuard::new(OwnerId::new(42));
        assert!(guard.authorize(OwnerId::new(42)).is_ok());
        assert_eq!(
            guard.authorize(OwnerId::new(43)),
            Err(Unauthorized(OwnerId::new(43)))
        );
    }

    #[test]
    fn test_parse_key() {
        assert_eq!(OwnerId::parse("42"), Some(OwnerId::new(42)));
        assert_eq!(OwnerId::parse("0"), None);
        assert_eq!(OwnerId::parse("-5"), None);
        assert_eq!(OwnerId::parse("abc"), None);
        assert_eq!(OwnerId::new(42).to_string(), "42");
    }
}
