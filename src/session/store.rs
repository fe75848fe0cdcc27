//! Flat JSON file mapping owner ids to exported session credentials.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::owner::OwnerId;

/// One persisted login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Opaque exported session credential.
    pub session: String,
}

impl SessionRecord {
    #[must_use]
    pub fn new(session: impl Into<String>) -> Self {
        Self {
            session: session.into(),
        }
    }
}

/// Whole store contents, keyed by stringified owner id.
pub type SessionMap = BTreeMap<String, SessionRecord>;

/// Failure to persist the store. Logged, never surfaced to the operator.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Failed to write session store: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize session store: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Session store on a single JSON file, rewritten wholesale on every change.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every valid entry. Missing or corrupt files read as empty.
    pub fn load(&self) -> SessionMap {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                debug!("No session store at {} ({})", self.path.display(), e);
                return SessionMap::new();
            }
        };

        let raw: BTreeMap<String, serde_json::Value> = match serde_json::from_str(&content) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Ignoring corrupt session store {}: {}", self.path.display(), e);
                return SessionMap::new();
            }
        };

        raw.into_iter()
            .filter_map(|(key, value)| {
                if OwnerId::parse(&key).is_none() {
                    warn!("Skipping session entry with invalid owner key {:?}", key);
                    return None;
                }
                match serde_json::from_value::<SessionRecord>(value) {
                    Ok(record) if !record.session.is_empty() => Some((key, record)),
                    Ok(_) => {
                        warn!("Skipping empty session entry for {}", key);
                        None
                    }
                    Err(e) => {
                        warn!("Skipping malformed session entry for {}: {}", key, e);
                        None
                    }
                }
            })
            .collect()
    }

    /// Overwrites the file with `sessions`. Failures are logged and swallowed.
    pub fn save(&self, sessions: &SessionMap) {
        match self.try_save(sessions) {
            Ok(()) => debug!("Saved {} session(s) to {}", sessions.len(), self.path.display()),
            Err(e) => warn!("{}", e),
        }
    }

    fn try_save(&self, sessions: &SessionMap) -> Result<(), PersistenceError> {
        let json = serde_json::to_string_pretty(sessions)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    #[must_use]
    pub fn get(&self, owner: OwnerId) -> Option<SessionRecord> {
        self.load().remove(&owner.to_string())
    }

    /// Read-modify-write of one owner's record.
    pub fn put(&self, owner: OwnerId, record: SessionRecord) {
        let mut sessions = self.load();
        sessions.insert(owner.to_string(), record);
        self.save(&sessions);
        info!("Stored session for {}", owner);
    }

    /// Deletes one owner's record, returning whether it existed.
    pub fn remove(&self, owner: OwnerId) -> bool {
        let mut sessions = self.load();
        if sessions.remove(&owner.to_string()).is_none() {
            return false;
        }
        self.save(&sessions);
        info!("Removed stored session for {}", owner);
        true
    }
}
