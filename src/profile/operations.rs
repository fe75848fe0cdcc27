//! Single-step profile edits on the owner's signed-in account.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use super::name::parse_name;
use super::photo::PhotoPayload;
use crate::owner::{OwnerGuard, OwnerId, Unauthorized};
use crate::session::SessionManager;
use crate::telegram::{AccountClient, AccountError, ProfileUpdate};

/// Profile operation failures.
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error(transparent)]
    Unauthorized(#[from] Unauthorized),

    #[error("No account is signed in")]
    NotLoggedIn,

    #[error("Could not reconnect the stored session: {0}")]
    Reconnect(AccountError),

    #[error("The first name cannot be empty")]
    EmptyName,

    #[error("No photos to upload")]
    NoPhotos,

    #[error(transparent)]
    Remote(AccountError),
}

/// Per-photo outcome of a multi-photo update, in submission order.
#[derive(Debug, Default)]
pub struct PhotoReport {
    pub results: Vec<Result<(), AccountError>>,
}

impl PhotoReport {
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_ok()).count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    /// 1-based positions and errors of the failed photos.
    pub fn failures(&self) -> impl Iterator<Item = (usize, &AccountError)> {
        self.results
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.as_ref().err().map(|e| (i + 1, e)))
    }
}

/// Rename and profile photo operations.
pub struct ProfileService {
    guard: OwnerGuard,
    sessions: Arc<SessionManager>,
    photo_delay: Duration,
}

impl ProfileService {
    #[must_use]
    pub fn new(guard: OwnerGuard, sessions: Arc<SessionManager>, photo_delay: Duration) -> Self {
        Self {
            guard,
            sessions,
            photo_delay,
        }
    }

    async fn client(&self, owner: OwnerId) -> Result<Arc<dyn AccountClient>, ProfileError> {
        self.sessions
            .resolve(owner)
            .await
            .map_err(ProfileError::Reconnect)?
            .ok_or(ProfileError::NotLoggedIn)
    }

    /// Applies `"first|last"` (or just `"first"`) as the account name.
    ///
    /// # Errors
    ///
    /// Returns an error if the sender is not the owner, the first name is
    /// empty, no session is available, or Telegram rejects the update.
    pub async fn rename(&self, sender: OwnerId, raw: &str) -> Result<ProfileUpdate, ProfileError> {
        self.guard.authorize(sender)?;

        let update = parse_name(raw).ok_or(ProfileError::EmptyName)?;
        let client = self.client(sender).await?;

        client
            .update_profile(&update)
            .await
            .map_err(ProfileError::Remote)?;

        info!("Profile name updated");
        Ok(update)
    }

    /// Uploads `photos` one by one, pausing between them.
    ///
    /// A failed photo is recorded and the rest still go out. Each temporary
    /// copy is deleted as soon as it has been processed.
    ///
    /// # Errors
    ///
    /// Returns an error if the sender is not the owner, `photos` is empty or
    /// no session is available. Per-photo failures land in the report.
    pub async fn set_photos(
        &self,
        sender: OwnerId,
        photos: Vec<PhotoPayload>,
    ) -> Result<PhotoReport, ProfileError> {
        self.guard.authorize(sender)?;

        if photos.is_empty() {
            return Err(ProfileError::NoPhotos);
        }
        let client = self.client(sender).await?;

        let total = photos.len();
        let mut report = PhotoReport::default();

        for (index, photo) in photos.into_iter().enumerate() {
            let result = client.upload_and_set_photo(photo.path()).await;
            drop(photo);

            match &result {
                Ok(()) => info!("Profile photo {}/{} set", index + 1, total),
                Err(e) => warn!("Profile photo {}/{} failed: {}", index + 1, total, e),
            }
            report.results.push(result);

            if index + 1 < total {
                tokio::time::sleep(self.photo_delay).await;
            }
        }

        Ok(report)
    }
}

impl std::fmt::Debug for ProfileService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileService")
            .field("photo_delay", &self.photo_delay)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{SessionRecord, SessionStore};
    use crate::telegram::mock::{Call, MockConnector, Script};

    const OWNER: OwnerId = OwnerId::new(42);
    const DELAY: Duration = Duration::from_secs(5);

    fn service(dir: &tempfile::TempDir, connector: &MockConnector) -> ProfileService {
        let sessions = Arc::new(SessionManager::new(
            Arc::new(connector.clone()),
            SessionStore::new(dir.path().join("sessions.json")),
        ));
        sessions.store().put(OWNER, SessionRecord::new("stored"));
        ProfileService::new(OwnerGuard::new(OWNER), sessions, DELAY)
    }

    fn photos(n: usize) -> Vec<PhotoPayload> {
        (0..n)
            .map(|i| PhotoPayload::from_bytes(&[u8::try_from(i).unwrap()]).unwrap())
            .collect()
    }

    fn updates(connector: &MockConnector) -> Vec<ProfileUpdate> {
        connector
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::UpdateProfile(u) => Some(u),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_rename_with_last_name() {
        let dir = tempfile::tempdir().unwrap();
        let connector = MockConnector::default();
        let profile = service(&dir, &connector);

        profile.rename(OWNER, "Ali|Hassan").await.unwrap();

        assert_eq!(
            updates(&connector),
            vec![ProfileUpdate {
                first_name: Some("Ali".to_owned()),
                last_name: Some("Hassan".to_owned()),
            }]
        );
    }

    #[tokio::test]
    async fn test_rename_first_only_omits_last_name() {
        let dir = tempfile::tempdir().unwrap();
        let connector = MockConnector::default();
        let profile = service(&dir, &connector);

        profile.rename(OWNER, "Ali").await.unwrap();

        assert_eq!(
            updates(&connector),
            vec![ProfileUpdate {
                first_name: Some("Ali".to_owned()),
                last_name: None,
            }]
        );
    }

    #[tokio::test]
    async fn test_rename_rehydrates_from_store() {
        let dir = tempfile::tempdir().unwrap();
        let connector = MockConnector::default();
        let profile = service(&dir, &connector);

        profile.rename(OWNER, "Ali").await.unwrap();
        profile.rename(OWNER, "Omar").await.unwrap();

        assert_eq!(
            connector.count(|c| matches!(c, Call::Connect { restored: true, .. })),
            1
        );
    }

    #[tokio::test]
    async fn test_rename_reports_remote_error() {
        let dir = tempfile::tempdir().unwrap();
        let connector = MockConnector::new(Script {
            update_profile: Err(AccountError::RemoteUpdate("FIRSTNAME_INVALID".to_owned())),
            ..Script::default()
        });
        let profile = service(&dir, &connector);

        let err = profile.rename(OWNER, "Ali").await.unwrap_err();
        assert!(matches!(err, ProfileError::Remote(AccountError::RemoteUpdate(_))));
    }

    #[tokio::test]
    async fn test_rename_without_session() {
        let dir = tempfile::tempdir().unwrap();
        let connector = MockConnector::default();
        let profile = service(&dir, &connector);
        profile.sessions.store().remove(OWNER);

        assert!(matches!(
            profile.rename(OWNER, "Ali").await,
            Err(ProfileError::NotLoggedIn)
        ));
    }

    #[tokio::test]
    async fn test_stranger_cannot_rename_or_set_photos() {
        let dir = tempfile::tempdir().unwrap();
        let connector = MockConnector::default();
        let profile = service(&dir, &connector);
        let stranger = OwnerId::new(7);

        assert!(matches!(
            profile.rename(stranger, "Ali").await,
            Err(ProfileError::Unauthorized(_))
        ));
        assert!(matches!(
            profile.set_photos(stranger, photos(1)).await,
            Err(ProfileError::Unauthorized(_))
        ));
        assert!(connector.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_photos_in_order_with_delay_and_failure_isolation() {
        let dir = tempfile::tempdir().unwrap();
        let connector = MockConnector::new(Script {
            failing_uploads: vec![2],
            ..Script::default()
        });
        let profile = service(&dir, &connector);

        let batch = photos(3);
        let paths: Vec<_> = batch.iter().map(|p| p.path().to_owned()).collect();

        let report = profile.set_photos(OWNER, batch).await.unwrap();

        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.failures().map(|(i, _)| i).collect::<Vec<_>>(), vec![2]);

        let uploads = connector.uploads();
        assert_eq!(uploads.len(), 3);
        for (i, (path, _)) in uploads.iter().enumerate() {
            assert_eq!(path, &paths[i]);
        }
        assert!(uploads[1].1 - uploads[0].1 >= DELAY);
        assert!(uploads[2].1 - uploads[1].1 >= DELAY);

        for path in &paths {
            assert!(!path.exists());
        }
    }

    #[tokio::test]
    async fn test_photos_removed_when_not_logged_in() {
        let dir = tempfile::tempdir().unwrap();
        let connector = MockConnector::default();
        let profile = service(&dir, &connector);
        profile.sessions.store().remove(OWNER);

        let batch = photos(2);
        let paths: Vec<_> = batch.iter().map(|p| p.path().to_owned()).collect();

        assert!(matches!(
            profile.set_photos(OWNER, batch).await,
            Err(ProfileError::NotLoggedIn)
        ));
        for path in &paths {
            assert!(!path.exists());
        }
    }

    #[tokio::test]
    async fn test_no_photos() {
        let dir = tempfile::tempdir().unwrap();
        let connector = MockConnector::default();
        let profile = service(&dir, &connector);

        assert!(matches!(
            profile.set_photos(OWNER, Vec::new()).await,
            Err(ProfileError::NoPhotos)
        ));
    }
}
