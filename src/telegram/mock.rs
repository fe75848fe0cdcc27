//! Scriptable in-memory account client used by the unit tests.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::time::Instant;

use super::{
    AccountClient, AccountConnector, AccountError, ProfileUpdate, SelfProfile, SessionCredential,
    SignInOutcome,
};

/// Everything a [`MockClient`] was asked to do, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Connect { client: usize, restored: bool },
    RequestCode(String),
    SignInWithCode(String, String),
    SignInWithPassword(String),
    FetchSelf,
    Export,
    UpdateProfile(ProfileUpdate),
    UploadPhoto { path: PathBuf, at: Instant },
    Disconnect { client: usize },
}

/// Canned responses.
#[derive(Debug, Clone)]
pub struct Script {
    pub connect: Result<(), AccountError>,
    pub request_code: Result<(), AccountError>,
    pub sign_in: SignInOutcome,
    pub password: Result<(), AccountError>,
    pub update_profile: Result<(), AccountError>,
    /// 1-based upload numbers that fail.
    pub failing_uploads: Vec<usize>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            connect: Ok(()),
            request_code: Ok(()),
            sign_in: SignInOutcome::Success,
            password: Ok(()),
            update_profile: Ok(()),
            failing_uploads: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    script: Script,
    calls: Vec<Call>,
    clients: Vec<Arc<MockClient>>,
    uploads: usize,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    shared: Arc<Mutex<Shared>>,
}

impl MockConnector {
    pub fn new(script: Script) -> Self {
        let connector = Self::default();
        lock(&connector.shared).script = script;
        connector
    }

    pub fn calls(&self) -> Vec<Call> {
        lock(&self.shared).calls.clone()
    }

    pub fn client(&self, index: usize) -> Arc<MockClient> {
        Arc::clone(&lock(&self.shared).clients[index])
    }

    pub fn client_count(&self) -> usize {
        lock(&self.shared).clients.len()
    }

    pub fn uploads(&self) -> Vec<(PathBuf, Instant)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::UploadPhoto { path, at } => Some((path, at)),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }
}

#[async_trait]
impl AccountConnector for MockConnector {
    async fn connect(
        &self,
        credential: Option<&SessionCredential>,
    ) -> Result<Arc<dyn AccountClient>, AccountError> {
        let mut shared = lock(&self.shared);
        let id = shared.clients.len();
        shared.calls.push(Call::Connect {
            client: id,
            restored: credential.is_some(),
        });
        shared.script.connect.clone()?;

        let client = Arc::new(MockClient {
            id,
            shared: Arc::clone(&self.shared),
            connected: AtomicBool::new(true),
            link_lost: AtomicBool::new(false),
            authorized: AtomicBool::new(credential.is_some()),
        });
        shared.clients.push(Arc::clone(&client));
        Ok(client)
    }
}

#[derive(Debug)]
pub struct MockClient {
    id: usize,
    shared: Arc<Mutex<Shared>>,
    connected: AtomicBool,
    link_lost: AtomicBool,
    authorized: AtomicBool,
}

impl MockClient {
    pub fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Makes `is_connected` report false without closing anything.
    pub fn lose_link(&self) {
        self.link_lost.store(true, Ordering::SeqCst);
    }

    fn record(&self, call: Call) -> MutexGuard<'_, Shared> {
        let mut shared = lock(&self.shared);
        shared.calls.push(call);
        shared
    }
}

#[async_trait]
impl AccountClient for MockClient {
    async fn request_code(&self, phone: &str) -> Result<(), AccountError> {
        self.record(Call::RequestCode(phone.to_owned()))
            .script
            .request_code
            .clone()
    }

    async fn sign_in_with_code(&self, phone: &str, code: &str) -> SignInOutcome {
        let outcome = self
            .record(Call::SignInWithCode(phone.to_owned(), code.to_owned()))
            .script
            .sign_in
            .clone();
        if outcome == SignInOutcome::Success {
            self.authorized.store(true, Ordering::SeqCst);
        }
        outcome
    }

    async fn sign_in_with_password(&self, password: &str) -> Result<(), AccountError> {
        let result = self
            .record(Call::SignInWithPassword(password.to_owned()))
            .script
            .password
            .clone();
        if result.is_ok() {
            self.authorized.store(true, Ordering::SeqCst);
        }
        result
    }

    async fn fetch_self(&self) -> Result<SelfProfile, AccountError> {
        drop(self.record(Call::FetchSelf));
        Ok(SelfProfile {
            id: 1000,
            first_name: "Ali".to_owned(),
            username: Some("ali".to_owned()),
        })
    }

    async fn export_session_credential(&self) -> Result<SessionCredential, AccountError> {
        drop(self.record(Call::Export));
        if self.authorized.load(Ordering::SeqCst) {
            Ok(SessionCredential::new(format!("cred-{}", self.id)))
        } else {
            Err(AccountError::NotAuthorized)
        }
    }

    async fn update_profile(&self, update: &ProfileUpdate) -> Result<(), AccountError> {
        self.record(Call::UpdateProfile(update.clone()))
            .script
            .update_profile
            .clone()
    }

    async fn upload_and_set_photo(&self, path: &Path) -> Result<(), AccountError> {
        let mut shared = self.record(Call::UploadPhoto {
            path: path.to_owned(),
            at: Instant::now(),
        });
        shared.uploads += 1;
        if shared.script.failing_uploads.contains(&shared.uploads) {
            Err(AccountError::Upload("PHOTO_INVALID".to_owned()))
        } else {
            Ok(())
        }
    }

    async fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            drop(self.record(Call::Disconnect { client: self.id }));
        }
    }

    async fn is_connected(&self) -> bool {
        self.connected() && !self.link_lost.load(Ordering::SeqCst)
    }
}
