//! Session lifecycle: persist, cache, rehydrate and log out.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{LiveSession, SessionCache, SessionRecord, SessionStore};
use crate::owner::OwnerId;
use crate::telegram::{
    AccountClient, AccountConnector, AccountError, SelfProfile, SessionCredential,
};

/// Ties the durable store, the live cache and the client factory together.
pub struct SessionManager {
    connector: Arc<dyn AccountConnector>,
    store: SessionStore,
    cache: SessionCache,
}

impl SessionManager {
    #[must_use]
    pub fn new(connector: Arc<dyn AccountConnector>, store: SessionStore) -> Self {
        Self {
            connector,
            store,
            cache: SessionCache::new(),
        }
    }

    #[must_use]
    pub fn connector(&self) -> &Arc<dyn AccountConnector> {
        &self.connector
    }

    #[must_use]
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    #[must_use]
    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    /// Returns a connected client for `owner`: the cached one, or one
    /// rehydrated from the store. `Ok(None)` when nothing is stored.
    ///
    /// A cached entry whose connection dropped is closed and replaced. Its
    /// credential is reused when the store has no record for `owner`.
    ///
    /// # Errors
    ///
    /// Returns an error if reconnecting with the stored credential fails.
    pub async fn resolve(
        &self,
        owner: OwnerId,
    ) -> Result<Option<Arc<dyn AccountClient>>, AccountError> {
        let mut fallback = None;
        if let Some(live) = self.cache.get(owner).await {
            if live.client.is_connected().await {
                return Ok(Some(live.client));
            }
            debug!("Cached session for {} went away, rehydrating", owner);
            if let Some(stale) = self.cache.remove(owner).await {
                stale.client.disconnect().await;
                fallback = Some(stale.credential);
            }
        }

        let credential = match self.store.get(owner) {
            Some(record) => SessionCredential::new(record.session),
            None => match fallback {
                Some(credential) => {
                    warn!("No stored session for {}, reusing the cached credential", owner);
                    credential
                }
                None => return Ok(None),
            },
        };

        info!("Rehydrating session for {}", owner);
        let client = self.connector.connect(Some(&credential)).await?;

        let live = LiveSession::new(owner, Arc::clone(&client), credential, None);
        if let Some(previous) = self.cache.put(owner, live).await {
            close_unless_same(&previous.client, &client).await;
        }
        Ok(Some(client))
    }

    /// Persists a freshly authorized client and makes it the cached session.
    ///
    /// A failed store write is logged and the client is cached regardless.
    ///
    /// # Errors
    ///
    /// Returns an error if the session credential cannot be exported.
    pub async fn install(
        &self,
        owner: OwnerId,
        client: Arc<dyn AccountClient>,
        profile: SelfProfile,
    ) -> Result<(), AccountError> {
        let credential = client.export_session_credential().await?;
        self.store.put(owner, SessionRecord::new(credential.as_str()));

        let live = LiveSession::new(owner, Arc::clone(&client), credential, Some(profile));
        if let Some(previous) = self.cache.put(owner, live).await {
            close_unless_same(&previous.client, &client).await;
        }
        Ok(())
    }

    /// Closes and forgets everything held for `owner`.
    ///
    /// Returns whether a stored session existed.
    pub async fn logout(&self, owner: OwnerId) -> bool {
        if let Some(live) = self.cache.remove(owner).await {
            live.client.disconnect().await;
        }
        self.store.remove(owner)
    }

    /// Closes every cached connection. Safe to call repeatedly.
    pub async fn shutdown(&self) {
        self.cache.shutdown_all().await;
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("store", &self.store)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

async fn close_unless_same(previous: &Arc<dyn AccountClient>, current: &Arc<dyn AccountClient>) {
    let same = std::ptr::addr_eq(Arc::as_ptr(previous), Arc::as_ptr(current));
    if !same {
        previous.disconnect().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telegram::mock::{Call, MockConnector, Script};

    fn manager(dir: &tempfile::TempDir, connector: &MockConnector) -> SessionManager {
        SessionManager::new(
            Arc::new(connector.clone()),
            SessionStore::new(dir.path().join("sessions.json")),
        )
    }

    const OWNER: OwnerId = OwnerId::new(42);

    #[tokio::test]
    async fn test_resolve_without_record_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let connector = MockConnector::default();
        let sessions = manager(&dir, &connector);

        assert!(sessions.resolve(OWNER).await.unwrap().is_none());
        assert_eq!(connector.client_count(), 0);
    }

    #[tokio::test]
    async fn test_resolve_rehydrates_once_then_uses_cache() {
        let dir = tempfile::tempdir().unwrap();
        let connector = MockConnector::default();
        let sessions = manager(&dir, &connector);
        sessions.store().put(OWNER, SessionRecord::new("stored"));

        assert!(sessions.resolve(OWNER).await.unwrap().is_some());
        assert!(sessions.resolve(OWNER).await.unwrap().is_some());

        assert_eq!(
            connector.count(|c| matches!(c, Call::Connect { restored: true, .. })),
            1
        );
        assert!(sessions.cache().get(OWNER).await.is_some());
    }

    #[tokio::test]
    async fn test_resolve_replaces_disconnected_cache_entry() {
        let dir = tempfile::tempdir().unwrap();
        let connector = MockConnector::default();
        let sessions = manager(&dir, &connector);
        sessions.store().put(OWNER, SessionRecord::new("stored"));

        sessions.resolve(OWNER).await.unwrap();
        connector.client(0).disconnect().await;
        sessions.resolve(OWNER).await.unwrap();

        assert_eq!(connector.client_count(), 2);
        assert!(connector.client(1).connected());
    }

    #[tokio::test]
    async fn test_resolve_propagates_connect_failure() {
        let dir = tempfile::tempdir().unwrap();
        let connector = MockConnector::new(Script {
            connect: Err(AccountError::Connection("down".to_owned())),
            ..Script::default()
        });
        let sessions = manager(&dir, &connector);
        sessions.store().put(OWNER, SessionRecord::new("stored"));

        assert!(sessions.resolve(OWNER).await.is_err());
        assert!(sessions.cache().get(OWNER).await.is_none());
    }

    #[tokio::test]
    async fn test_install_closes_previous_cached_client() {
        let dir = tempfile::tempdir().unwrap();
        let connector = MockConnector::default();
        let sessions = manager(&dir, &connector);
        let profile = SelfProfile {
            id: 1,
            first_name: "Ali".to_owned(),
            username: None,
        };

        let first = connector.connect(Some(&SessionCredential::new("a"))).await.unwrap();
        sessions.install(OWNER, first, profile.clone()).await.unwrap();
        let second = connector.connect(Some(&SessionCredential::new("b"))).await.unwrap();
        sessions.install(OWNER, second, profile).await.unwrap();

        assert!(!connector.client(0).connected());
        assert!(connector.client(1).connected());
        assert_eq!(sessions.store().get(OWNER), Some(SessionRecord::new("cred-1")));
    }

    #[tokio::test]
    async fn test_logout_then_resolve_finds_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let connector = MockConnector::default();
        let sessions = manager(&dir, &connector);
        sessions.store().put(OWNER, SessionRecord::new("stored"));
        sessions.resolve(OWNER).await.unwrap();

        assert!(sessions.logout(OWNER).await);
        assert!(!connector.client(0).connected());
        assert!(sessions.cache().get(OWNER).await.is_none());
        assert!(sessions.store().get(OWNER).is_none());
        assert!(sessions.resolve(OWNER).await.unwrap().is_none());

        assert!(!sessions.logout(OWNER).await);
    }

    #[tokio::test]
    async fn test_logout_closes_client_whose_link_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let connector = MockConnector::default();
        let sessions = manager(&dir, &connector);
        sessions.store().put(OWNER, SessionRecord::new("stored"));
        sessions.resolve(OWNER).await.unwrap();

        connector.client(0).lose_link();
        assert!(!connector.client(0).is_connected().await);

        assert!(sessions.logout(OWNER).await);
        assert!(connector.calls().contains(&Call::Disconnect { client: 0 }));
        assert!(!connector.client(0).connected());
    }

    #[tokio::test]
    async fn test_resolve_reuses_cached_credential_without_record() {
        let dir = tempfile::tempdir().unwrap();
        let connector = MockConnector::default();
        let sessions = manager(&dir, &connector);
        let client = connector.connect(None).await.unwrap();
        sessions
            .cache()
            .put(
                OWNER,
                LiveSession::new(OWNER, client, SessionCredential::new("in-memory"), None),
            )
            .await;

        connector.client(0).lose_link();
        assert!(sessions.resolve(OWNER).await.unwrap().is_some());

        assert!(connector.calls().contains(&Call::Disconnect { client: 0 }));
        assert_eq!(
            connector.count(|c| matches!(c, Call::Connect { restored: true, .. })),
            1
        );
        let live = sessions.cache().get(OWNER).await.unwrap();
        assert_eq!(live.credential, SessionCredential::new("in-memory"));
    }
}
