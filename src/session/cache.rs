//! Process-wide registry of live, connected account clients.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::owner::OwnerId;
use crate::telegram::{AccountClient, SelfProfile, SessionCredential};

/// How long a single close may take during shutdown.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// An authenticated connection held in memory.
#[derive(Clone)]
pub struct LiveSession {
    pub owner: OwnerId,
    pub client: Arc<dyn AccountClient>,
    pub credential: SessionCredential,
    pub profile: Option<SelfProfile>,
    pub connected_at: DateTime<Utc>,
}

impl LiveSession {
    #[must_use]
    pub fn new(
        owner: OwnerId,
        client: Arc<dyn AccountClient>,
        credential: SessionCredential,
        profile: Option<SelfProfile>,
    ) -> Self {
        Self {
            owner,
            client,
            credential,
            profile,
            connected_at: Utc::now(),
        }
    }
}

impl std::fmt::Debug for LiveSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveSession")
            .field("owner", &self.owner)
            .field("profile", &self.profile)
            .field("connected_at", &self.connected_at)
            .finish_non_exhaustive()
    }
}

/// In-memory map from owner to live session.
///
/// The cache owns every connection it holds. `put` and `remove` never close
/// anything: callers close a replaced or evicted connection themselves.
#[derive(Debug, Default)]
pub struct SessionCache {
    entries: RwLock<HashMap<OwnerId, LiveSession>>,
}

impl SessionCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, owner: OwnerId) -> Option<LiveSession> {
        self.entries.read().await.get(&owner).cloned()
    }

    /// Inserts `session`, returning the entry it replaced (still open).
    pub async fn put(&self, owner: OwnerId, session: LiveSession) -> Option<LiveSession> {
        debug!("Caching live session for {}", owner);
        self.entries.write().await.insert(owner, session)
    }

    /// Evicts without closing.
    pub async fn remove(&self, owner: OwnerId) -> Option<LiveSession> {
        self.entries.write().await.remove(&owner)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Closes every cached connection and empties the cache.
    ///
    /// A close that hangs is abandoned after a timeout; the rest still run.
    pub async fn shutdown_all(&self) {
        let drained: Vec<LiveSession> = {
            let mut entries = self.entries.write().await;
            entries.drain().map(|(_, session)| session).collect()
        };

        if drained.is_empty() {
            return;
        }

        info!("Closing {} cached session(s)...", drained.len());
        for session in drained {
            debug!(
                "Closing session for {} (connected since {})",
                session.owner,
                session.connected_at.to_rfc3339()
            );
            if tokio::time::timeout(CLOSE_TIMEOUT, session.client.disconnect())
                .await
                .is_err()
            {
                warn!("Timed out closing session for {}", session.owner);
            }
        }
        info!("All cached sessions closed");
    }
}
