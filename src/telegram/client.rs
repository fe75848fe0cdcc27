//! grammers-backed implementation of the account client.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use grammers_client::client::{LoginToken, PasswordToken};
use grammers_client::{Client, SenderPool, SignInError, sender};
use grammers_session::storages::SqliteSession;
use grammers_tl_types as tl;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::account::{
    AccountClient, AccountConnector, AccountError, ProfileUpdate, SelfProfile, SessionCredential,
    SignInOutcome,
};
use crate::config::TelegramConfig;

/// Opens [`TelegramAccount`]s with the configured API credentials.
#[derive(Debug, Clone)]
pub struct TelegramConnector {
    config: TelegramConfig,
    counter: Arc<AtomicU64>,
}

impl TelegramConnector {
    #[must_use]
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            config,
            counter: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Fresh session file path, unique within this process.
    fn next_session_path(&self, kind: &str) -> PathBuf {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let stamp = chrono::Utc::now().format("%Y%m%d%H%M%S");
        self.config
            .session_dir
            .join(format!("{kind}-{stamp}-{}-{n}.session", std::process::id()))
    }
}

#[async_trait]
impl AccountConnector for TelegramConnector {
    async fn connect(
        &self,
        credential: Option<&SessionCredential>,
    ) -> Result<Arc<dyn AccountClient>, AccountError> {
        tokio::fs::create_dir_all(&self.config.session_dir)
            .await
            .map_err(|e| AccountError::Session(e.to_string()))?;

        let path = match credential {
            Some(credential) => {
                let bytes = STANDARD
                    .decode(credential.as_str())
                    .map_err(|e| AccountError::Session(format!("corrupt credential: {e}")))?;
                let path = self.next_session_path("live");
                tokio::fs::write(&path, bytes)
                    .await
                    .map_err(|e| AccountError::Session(e.to_string()))?;
                path
            }
            None => self.next_session_path("login"),
        };

        let account = match TelegramAccount::open(path.clone(), &self.config).await {
            Ok(account) => account,
            Err(e) => {
                remove_session_file(&path).await;
                return Err(e);
            }
        };

        if credential.is_some() && !account.authorized.load(Ordering::SeqCst) {
            account.disconnect().await;
            return Err(AccountError::NotAuthorized);
        }

        Ok(Arc::new(account))
    }
}

/// One MTProto connection backed by its own SQLite session file.
pub struct TelegramAccount {
    /// The underlying grammers client.
    client: Client,

    /// Handle to the sender pool for disconnection.
    handle: sender::SenderPoolHandle,

    api_hash: String,

    session_path: PathBuf,

    login_token: Mutex<Option<LoginToken>>,

    password_token: Mutex<Option<PasswordToken>>,

    authorized: AtomicBool,

    connected: AtomicBool,

    /// Background task running the sender pool.
    pool_task: JoinHandle<()>,
}

impl TelegramAccount {
    async fn open(session_path: PathBuf, config: &TelegramConfig) -> Result<Self, AccountError> {
        info!("Connecting to Telegram...");

        let session = Arc::new(
            SqliteSession::open(&session_path)
                .await
                .map_err(|e| AccountError::Session(e.to_string()))?,
        );

        let SenderPool {
            runner,
            updates: _updates,
            handle,
        } = SenderPool::new(Arc::clone(&session), config.api_id);

        let client = Client::new(handle.clone());

        let pool_task = tokio::spawn(async move {
            runner.run().await;
        });

        let account = Self {
            client,
            handle: handle.thin,
            api_hash: config.api_hash.clone(),
            session_path,
            login_token: Mutex::new(None),
            password_token: Mutex::new(None),
            authorized: AtomicBool::new(false),
            connected: AtomicBool::new(true),
            pool_task,
        };

        match account.client.is_authorized().await {
            Ok(is_authorized) => {
                info!("Connected to Telegram. Authorized: {}", is_authorized);
                account.authorized.store(is_authorized, Ordering::SeqCst);
                Ok(account)
            }
            Err(e) => {
                account.disconnect().await;
                Err(AccountError::Connection(e.to_string()))
            }
        }
    }

    fn ensure_authorized(&self) -> Result<(), AccountError> {
        if self.authorized.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AccountError::NotAuthorized)
        }
    }
}

#[async_trait]
impl AccountClient for TelegramAccount {
    async fn request_code(&self, phone: &str) -> Result<(), AccountError> {
        info!("Requesting login code for phone: {}...", mask_phone(phone));

        let token = self
            .client
            .request_login_code(phone, &self.api_hash)
            .await
            .map_err(|e| classify_request_code_error(&e.to_string()))?;

        *self.login_token.lock().await = Some(token);
        Ok(())
    }

    async fn sign_in_with_code(&self, phone: &str, code: &str) -> SignInOutcome {
        info!("Signing in {} with login code...", mask_phone(phone));

        let guard = self.login_token.lock().await;
        let Some(token) = guard.as_ref() else {
            return SignInOutcome::TransientFailure(AccountError::NoLoginInProgress.to_string());
        };

        match self.client.sign_in(token, code).await {
            Ok(_user) => {
                info!("Successfully signed in!");
                self.authorized.store(true, Ordering::SeqCst);
                SignInOutcome::Success
            }
            Err(SignInError::PasswordRequired(password_token)) => {
                debug!("2FA password required, hint: {:?}", password_token.hint());
                let hint = password_token.hint().map(ToOwned::to_owned);
                *self.password_token.lock().await = Some(password_token);
                SignInOutcome::PasswordRequired { hint }
            }
            Err(SignInError::InvalidCode) => SignInOutcome::InvalidCode,
            Err(e) => SignInOutcome::TransientFailure(e.to_string()),
        }
    }

    async fn sign_in_with_password(&self, password: &str) -> Result<(), AccountError> {
        info!("Checking 2FA password...");

        let token = self
            .password_token
            .lock()
            .await
            .take()
            .ok_or(AccountError::NoLoginInProgress)?;

        match self.client.check_password(token, password).await {
            Ok(_user) => {
                info!("Successfully authenticated with 2FA!");
                self.authorized.store(true, Ordering::SeqCst);
                Ok(())
            }
            Err(SignInError::InvalidPassword(_)) => Err(AccountError::InvalidPassword),
            Err(e) => Err(AccountError::Connection(e.to_string())),
        }
    }

    async fn fetch_self(&self) -> Result<SelfProfile, AccountError> {
        self.ensure_authorized()?;

        let request = tl::functions::users::GetUsers {
            id: vec![tl::enums::InputUser::UserSelf],
        };

        let users = self
            .client
            .invoke(&request)
            .await
            .map_err(|e| classify_remote_error(&e.to_string(), AccountError::Connection))?;

        match users.into_iter().next() {
            Some(tl::enums::User::User(user)) => Ok(SelfProfile {
                id: user.id,
                first_name: user.first_name.unwrap_or_default(),
                username: user.username,
            }),
            _ => Err(AccountError::Connection("server returned no self user".to_owned())),
        }
    }

    async fn export_session_credential(&self) -> Result<SessionCredential, AccountError> {
        self.ensure_authorized()?;

        let bytes = tokio::fs::read(&self.session_path)
            .await
            .map_err(|e| AccountError::Session(e.to_string()))?;

        Ok(SessionCredential::new(STANDARD.encode(bytes)))
    }

    async fn update_profile(&self, update: &ProfileUpdate) -> Result<(), AccountError> {
        self.ensure_authorized()?;

        let request = tl::functions::account::UpdateProfile {
            first_name: update.first_name.clone(),
            last_name: update.last_name.clone(),
            about: None,
        };

        self.client
            .invoke(&request)
            .await
            .map(|_user| ())
            .map_err(|e| classify_remote_error(&e.to_string(), AccountError::RemoteUpdate))
    }

    async fn upload_and_set_photo(&self, path: &Path) -> Result<(), AccountError> {
        self.ensure_authorized()?;

        debug!("Uploading {}", path.display());
        let uploaded = self
            .client
            .upload_file(path)
            .await
            .map_err(|e| AccountError::Upload(e.to_string()))?;

        let request = tl::functions::photos::UploadProfilePhoto {
            fallback: false,
            bot: None,
            file: Some(uploaded.raw),
            video: None,
            video_start_ts: None,
            video_emoji_markup: None,
        };

        self.client
            .invoke(&request)
            .await
            .map(|_photo| ())
            .map_err(|e| classify_remote_error(&e.to_string(), AccountError::RemoteUpdate))
    }

    async fn disconnect(&self) {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }

        info!("Disconnecting from Telegram...");
        self.handle.quit();

        remove_session_file(&self.session_path).await;
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.pool_task.is_finished()
    }
}

impl std::fmt::Debug for TelegramAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramAccount")
            .field("session_path", &self.session_path)
            .field("authorized", &self.authorized)
            .field("connected", &self.connected)
            .finish_non_exhaustive()
    }
}

fn classify_request_code_error(err: &str) -> AccountError {
    if err.contains("PHONE_NUMBER_INVALID") || err.contains("PHONE_NUMBER_BANNED") {
        return AccountError::InvalidPhone;
    }
    classify_remote_error(err, AccountError::Connection)
}

async fn remove_session_file(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        debug!("Could not remove {}: {}", path.display(), e);
    }
}

/// Maps flood waits to [`AccountError::RateLimited`], everything else through `fallback`.
fn classify_remote_error(err: &str, fallback: fn(String) -> AccountError) -> AccountError {
    if (err.contains("FLOOD_WAIT") || err.to_lowercase().contains("flood"))
        && let Some(seconds) = extract_flood_wait_seconds(err)
    {
        warn!("Flood wait triggered: {} seconds", seconds);
        return AccountError::RateLimited(seconds);
    }
    fallback(err.to_owned())
}

/// Extracts flood wait seconds from an error message.
fn extract_flood_wait_seconds(err_msg: &str) -> Option<u32> {
    let patterns = ["FLOOD_WAIT_", "flood wait "];
    let lower = err_msg.to_lowercase();

    for pattern in patterns {
        if let Some(idx) = lower.find(&pattern.to_lowercase()) {
            let start = idx + pattern.len();
            let num_str: String = lower[start..]
                .chars()
                .take_while(char::is_ascii_digit)
                .collect();
            if let Ok(seconds) = num_str.parse() {
                return Some(seconds);
            }
        }
    }
    None
}

/// Masks a phone number for logging (shows last 4 digits).
pub(crate) fn mask_phone(phone: &str) -> String {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    if digits.len() > 4 {
        format!("***{}", &digits[digits.len() - 4..])
    } else {
        "****".to_owned()
    }
}
