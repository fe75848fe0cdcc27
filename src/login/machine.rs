//! Phone → code → (password) login flow.
//!
//! Every terminal outcome leaves the machine `Idle`. Failures close the
//! pending connection; success hands it to the session cache.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::state::{LoginStage, LoginState, PendingLogin};
use crate::owner::{OwnerGuard, OwnerId, Unauthorized};
use crate::session::SessionManager;
use crate::telegram::{AccountError, SelfProfile, SignInOutcome, mask_phone};

/// Non-terminal and successful results of a login step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginStep {
    /// Waiting for the phone number.
    PhoneRequested,
    /// A code was sent; waiting for it.
    CodeSent,
    /// The account has 2FA enabled; waiting for the password.
    PasswordRequired { hint: Option<String> },
    /// Signed in and stored.
    LoggedIn(SelfProfile),
}

/// Reasons a login step was rejected or the flow aborted.
#[derive(Debug, Error)]
pub enum LoginError {
    #[error(transparent)]
    Unauthorized(#[from] Unauthorized),

    #[error("No login in progress")]
    NotInProgress,

    #[error("Empty input")]
    EmptyInput,

    #[error("Failed to send the login code: {0}")]
    Transient(AccountError),

    #[error("The login code is invalid")]
    InvalidCode,

    #[error("Password sign-in failed: {0}")]
    InvalidPassword(AccountError),

    #[error("Sign-in failed: {0}")]
    SignInFailed(String),

    #[error("Signed in, but finishing the session failed: {0}")]
    Finalize(AccountError),
}

impl LoginError {
    /// Whether the flow was aborted (as opposed to an input being refused).
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Unauthorized(_) | Self::EmptyInput)
    }
}

/// Drives the owner's login conversation.
pub struct LoginStateMachine {
    guard: OwnerGuard,
    sessions: Arc<SessionManager>,
    state: Mutex<LoginState>,
}

impl LoginStateMachine {
    #[must_use]
    pub fn new(guard: OwnerGuard, sessions: Arc<SessionManager>) -> Self {
        Self {
            guard,
            sessions,
            state: Mutex::new(LoginState::Idle),
        }
    }

    pub async fn stage(&self) -> LoginStage {
        self.state.lock().await.stage()
    }

    /// Starts (or restarts) a login, closing any attempt still pending.
    ///
    /// # Errors
    ///
    /// Returns [`LoginError::Unauthorized`] for anyone but the owner.
    pub async fn start(&self, sender: OwnerId) -> Result<LoginStep, LoginError> {
        self.guard.authorize(sender)?;

        let mut state = self.state.lock().await;
        if let Some(previous) = state.take_pending() {
            info!("Discarding previous login attempt for {}", mask_phone(&previous.phone));
            previous.client.disconnect().await;
        }
        *state = LoginState::AwaitPhone;
        Ok(LoginStep::PhoneRequested)
    }

    /// Abandons the current attempt. Returns whether anything was pending.
    ///
    /// # Errors
    ///
    /// Returns [`LoginError::Unauthorized`] for anyone but the owner.
    pub async fn abandon(&self, sender: OwnerId) -> Result<bool, LoginError> {
        self.guard.authorize(sender)?;

        let mut state = self.state.lock().await;
        let was_active = state.stage().is_active();
        if let Some(pending) = state.take_pending() {
            pending.client.disconnect().await;
        }
        *state = LoginState::Idle;
        Ok(was_active)
    }

    /// Routes free text to whichever step is waiting for it.
    ///
    /// # Errors
    ///
    /// Returns [`LoginError::NotInProgress`] when no login is running, or
    /// whatever the waiting step rejects the input with.
    pub async fn submit(&self, sender: OwnerId, text: &str) -> Result<LoginStep, LoginError> {
        match self.stage().await {
            LoginStage::AwaitPhone => self.submit_phone(sender, text).await,
            LoginStage::AwaitCode => self.submit_code(sender, text).await,
            LoginStage::AwaitPassword => self.submit_password(sender, text).await,
            LoginStage::Idle => {
                self.guard.authorize(sender)?;
                Err(LoginError::NotInProgress)
            }
        }
    }

    /// Connects a fresh client and asks Telegram to send a login code.
    ///
    /// # Errors
    ///
    /// Returns [`LoginError::Transient`] if connecting or requesting the code
    /// fails; the attempt is then over.
    pub async fn submit_phone(
        &self,
        sender: OwnerId,
        phone: &str,
    ) -> Result<LoginStep, LoginError> {
        self.guard.authorize(sender)?;

        let phone = phone.trim();
        let mut state = self.state.lock().await;
        if !matches!(*state, LoginState::AwaitPhone) {
            return Err(LoginError::NotInProgress);
        }
        if phone.is_empty() {
            return Err(LoginError::EmptyInput);
        }
        *state = LoginState::Idle;

        let client = match self.sessions.connector().connect(None).await {
            Ok(client) => client,
            Err(e) => {
                warn!("Could not connect for login: {}", e);
                return Err(LoginError::Transient(e));
            }
        };

        if let Err(e) = client.request_code(phone).await {
            warn!("Login code request for {} failed: {}", mask_phone(phone), e);
            client.disconnect().await;
            return Err(LoginError::Transient(e));
        }

        *state = LoginState::AwaitCode(PendingLogin {
            client,
            phone: phone.to_owned(),
        });
        Ok(LoginStep::CodeSent)
    }

    /// Signs in with the received code.
    ///
    /// # Errors
    ///
    /// Returns [`LoginError::InvalidCode`] or [`LoginError::SignInFailed`]
    /// and closes the pending connection.
    pub async fn submit_code(&self, sender: OwnerId, code: &str) -> Result<LoginStep, LoginError> {
        self.guard.authorize(sender)?;

        let code = code.trim();
        let mut state = self.state.lock().await;
        if !matches!(*state, LoginState::AwaitCode(_)) {
            return Err(LoginError::NotInProgress);
        }
        if code.is_empty() {
            return Err(LoginError::EmptyInput);
        }
        let Some(pending) = state.take_pending() else {
            return Err(LoginError::NotInProgress);
        };

        match pending.client.sign_in_with_code(&pending.phone, code).await {
            SignInOutcome::Success => self.finish(sender, pending).await,
            SignInOutcome::PasswordRequired { hint } => {
                *state = LoginState::AwaitPassword(pending);
                Ok(LoginStep::PasswordRequired { hint })
            }
            SignInOutcome::InvalidCode => {
                pending.client.disconnect().await;
                Err(LoginError::InvalidCode)
            }
            SignInOutcome::TransientFailure(reason) => {
                pending.client.disconnect().await;
                Err(LoginError::SignInFailed(reason))
            }
        }
    }

    /// Completes a 2FA sign-in.
    ///
    /// # Errors
    ///
    /// Returns [`LoginError::InvalidPassword`] and closes the pending
    /// connection when the password is rejected.
    pub async fn submit_password(
        &self,
        sender: OwnerId,
        password: &str,
    ) -> Result<LoginStep, LoginError> {
        self.guard.authorize(sender)?;

        let password = password.trim();
        let mut state = self.state.lock().await;
        if !matches!(*state, LoginState::AwaitPassword(_)) {
            return Err(LoginError::NotInProgress);
        }
        if password.is_empty() {
            return Err(LoginError::EmptyInput);
        }
        let Some(pending) = state.take_pending() else {
            return Err(LoginError::NotInProgress);
        };

        match pending.client.sign_in_with_password(password).await {
            Ok(()) => self.finish(sender, pending).await,
            Err(e) => {
                pending.client.disconnect().await;
                Err(LoginError::InvalidPassword(e))
            }
        }
    }

    /// Confirms identity and hands the connection over to the session cache.
    async fn finish(&self, owner: OwnerId, pending: PendingLogin) -> Result<LoginStep, LoginError> {
        let profile = match pending.client.fetch_self().await {
            Ok(profile) => profile,
            Err(e) => {
                pending.client.disconnect().await;
                return Err(LoginError::Finalize(e));
            }
        };

        if let Err(e) = self
            .sessions
            .install(owner, Arc::clone(&pending.client), profile.clone())
            .await
        {
            pending.client.disconnect().await;
            return Err(LoginError::Finalize(e));
        }

        info!("Logged in as {} (id {})", profile.display_name(), profile.id);
        Ok(LoginStep::LoggedIn(profile))
    }
}

impl std::fmt::Debug for LoginStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginStateMachine")
            .field("guard", &self.guard)
            .finish_non_exhaustive()
    }
}
