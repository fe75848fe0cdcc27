//! Contract over the remote user-account protocol client.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by the account-protocol adapter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AccountError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Invalid phone number")]
    InvalidPhone,

    #[error("Too many requests, retry in {0} seconds")]
    RateLimited(u32),

    #[error("Invalid 2FA password")]
    InvalidPassword,

    #[error("Not authorized. Please sign in first.")]
    NotAuthorized,

    #[error("No login code was requested on this connection")]
    NoLoginInProgress,

    #[error("Failed to update profile: {0}")]
    RemoteUpdate(String),

    #[error("Failed to upload file: {0}")]
    Upload(String),

    #[error("Session error: {0}")]
    Session(String),
}

/// Result of submitting a login code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignInOutcome {
    /// The connection is now authorized.
    Success,
    /// The account has a cloud password; the connection stays open for it.
    PasswordRequired { hint: Option<String> },
    /// The code was rejected.
    InvalidCode,
    /// Anything else went wrong.
    TransientFailure(String),
}

/// Opaque exported session, reusable to reconnect without signing in again.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCredential(String);

impl SessionCredential {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionCredential(<{} bytes>)", self.0.len())
    }
}

/// The signed-in account, as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfProfile {
    pub id: i64,
    pub first_name: String,
    pub username: Option<String>,
}

impl SelfProfile {
    /// Username when set, first name otherwise.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.username
            .as_deref()
            .filter(|u| !u.is_empty())
            .unwrap_or(&self.first_name)
    }
}

/// Profile name change. `None` fields are left untouched remotely.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// A connected user-account client.
///
/// Every call may suspend on network I/O; callers sequence them one at a time.
#[async_trait]
pub trait AccountClient: Send + Sync {
    /// Sends a one-time login code to `phone`.
    async fn request_code(&self, phone: &str) -> Result<(), AccountError>;

    /// Completes sign-in with the code delivered after [`Self::request_code`].
    async fn sign_in_with_code(&self, phone: &str, code: &str) -> SignInOutcome;

    /// Completes sign-in after [`SignInOutcome::PasswordRequired`].
    async fn sign_in_with_password(&self, password: &str) -> Result<(), AccountError>;

    async fn fetch_self(&self) -> Result<SelfProfile, AccountError>;

    /// Only valid once the connection is authorized.
    async fn export_session_credential(&self) -> Result<SessionCredential, AccountError>;

    async fn update_profile(&self, update: &ProfileUpdate) -> Result<(), AccountError>;

    /// Uploads the image at `path` and makes it the current profile photo.
    async fn upload_and_set_photo(&self, path: &Path) -> Result<(), AccountError>;

    /// Closes the connection. Safe to call more than once.
    async fn disconnect(&self);

    async fn is_connected(&self) -> bool;
}

/// Builds connected [`AccountClient`]s.
#[async_trait]
pub trait AccountConnector: Send + Sync {
    /// Connects a fresh client, restoring `credential` when given.
    async fn connect(
        &self,
        credential: Option<&SessionCredential>,
    ) -> Result<Arc<dyn AccountClient>, AccountError>;
}
