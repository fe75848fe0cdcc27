//! Login conversation states.

use std::fmt;
use std::sync::Arc;

use crate::telegram::AccountClient;

/// A login attempt in progress: a connected, not yet authorized client.
pub struct PendingLogin {
    pub client: Arc<dyn AccountClient>,
    pub phone: String,
}

impl fmt::Debug for PendingLogin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingLogin")
            .field("phone", &crate::telegram::mask_phone(&self.phone))
            .finish_non_exhaustive()
    }
}

/// Where the login conversation currently stands.
#[derive(Debug, Default)]
pub enum LoginState {
    #[default]
    Idle,
    AwaitPhone,
    AwaitCode(PendingLogin),
    AwaitPassword(PendingLogin),
}

impl LoginState {
    #[must_use]
    pub const fn stage(&self) -> LoginStage {
        match self {
            Self::Idle => LoginStage::Idle,
            Self::AwaitPhone => LoginStage::AwaitPhone,
            Self::AwaitCode(_) => LoginStage::AwaitCode,
            Self::AwaitPassword(_) => LoginStage::AwaitPassword,
        }
    }

    /// Takes the pending login out, leaving `Idle` behind.
    pub fn take_pending(&mut self) -> Option<PendingLogin> {
        match std::mem::take(self) {
            Self::AwaitCode(pending) | Self::AwaitPassword(pending) => Some(pending),
            Self::Idle | Self::AwaitPhone => None,
        }
    }
}

/// Data-free view of [`LoginState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStage {
    Idle,
    AwaitPhone,
    AwaitCode,
    AwaitPassword,
}

impl LoginStage {
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Idle)
    }
}
