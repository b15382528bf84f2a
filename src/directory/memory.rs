use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{normalize_email, DirectoryError, UserDirectory};
use crate::models::User;

#[derive(Debug, Default)]
struct DirectoryState {
    users: HashMap<Uuid, User>,
    email_index: HashMap<String, Uuid>,
}

impl DirectoryState {
    fn from_users(users: Vec<User>) -> Result<Self, DirectoryError> {
        let mut state = Self::default();
        for user in users {
            if state.users.contains_key(&user.id) {
                return Err(DirectoryError::Storage(format!(
                    "snapshot lists user {} more than once",
                    user.id
                )));
            }
            let key = normalize_email(&user.email);
            if state.email_index.insert(key, user.id).is_some() {
                return Err(DirectoryError::DuplicateEmail(user.email));
            }
            state.users.insert(user.id, user);
        }
        Ok(state)
    }
}

/// In-process user directory with an optional JSON snapshot on disk
///
/// All writes go through one write guard, so the email uniqueness check and
/// the insert are atomic with respect to concurrent saves.
#[derive(Debug, Default)]
pub struct MemoryUserDirectory {
    state: RwLock<DirectoryState>,
    snapshot_path: Option<PathBuf>,
}

impl MemoryUserDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a directory backed by a snapshot file, loading it if it exists
    ///
    /// # Errors
    ///
    /// Returns `DirectoryError::Storage` if the file exists but cannot be read or parsed
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, DirectoryError> {
        let path = path.into();
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let users: Vec<User> = serde_json::from_slice(&bytes).map_err(|e| {
                    DirectoryError::Storage(format!("invalid snapshot {}: {e}", path.display()))
                })?;
                info!("Loaded {} users from {}", users.len(), path.display());
                DirectoryState::from_users(users)?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No user snapshot at {}, starting empty", path.display());
                DirectoryState::default()
            }
            Err(e) => {
                return Err(DirectoryError::Storage(format!(
                    "failed to read {}: {e}",
                    path.display()
                )))
            }
        };

        Ok(Self {
            state: RwLock::new(state),
            snapshot_path: Some(path),
        })
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.users.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn persist(path: &Path, state: &DirectoryState) -> Result<(), DirectoryError> {
        let mut users: Vec<&User> = state.users.values().collect();
        users.sort_by_key(|user| (user.created_at, user.id));

        let json = serde_json::to_vec_pretty(&users)
            .map_err(|e| DirectoryError::Storage(format!("failed to serialize users: {e}")))?;

        let tmp_path = path.with_extension("tmp");
        tokio::fs::write(&tmp_path, json).await.map_err(|e| {
            DirectoryError::Storage(format!("failed to write {}: {e}", tmp_path.display()))
        })?;
        tokio::fs::rename(&tmp_path, path).await.map_err(|e| {
            DirectoryError::Storage(format!("failed to replace {}: {e}", path.display()))
        })
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, DirectoryError> {
        let state = self.state.read().await;
        Ok(state
            .email_index
            .get(&normalize_email(email))
            .and_then(|id| state.users.get(id))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, DirectoryError> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn save(&self, mut user: User) -> Result<User, DirectoryError> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let key = normalize_email(&user.email);

        if user.id.is_nil() {
            user.id = Uuid::new_v4();
        }

        let existing = state.users.get(&user.id).map(|stored| {
            (
                stored.provider,
                stored.provider_id.clone(),
                stored.created_at,
            )
        });

        if let Some(owner) = state.email_index.get(&key) {
            if *owner != user.id {
                return Err(DirectoryError::DuplicateEmail(user.email));
            }
        }

        match existing {
            Some((provider, provider_id, created_at)) => {
                if provider != user.provider || provider_id != user.provider_id {
                    return Err(DirectoryError::ImmutableIdentity(user.id));
                }
                user.created_at = created_at;
                user.updated_at = now;
                debug!("Updating user {}", user.id);
            }
            None => {
                user.created_at = now;
                user.updated_at = now;
                debug!("Inserting user {} ({})", user.id, user.provider);
            }
        }

        let previous = state.users.insert(user.id, user.clone());
        let previous_key = previous.as_ref().map(|stored| normalize_email(&stored.email));
        if let Some(old_key) = previous_key.as_ref().filter(|old_key| **old_key != key) {
            state.email_index.remove(old_key);
        }
        state.email_index.insert(key.clone(), user.id);

        if let Some(path) = &self.snapshot_path {
            if let Err(e) = Self::persist(path, &state).await {
                // Nothing stays visible that the snapshot does not hold
                state.email_index.remove(&key);
                match (previous, previous_key) {
                    (Some(stored), Some(old_key)) => {
                        state.email_index.insert(old_key, stored.id);
                        state.users.insert(stored.id, stored);
                    }
                    _ => {
                        state.users.remove(&user.id);
                    }
                }
                return Err(e);
            }
        }

        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuthProvider, ProviderProfile, Role};

    fn new_user(email: &str, subject: &str) -> User {
        User::from_profile(
            email,
            &ProviderProfile {
                provider: AuthProvider::Google,
                subject: subject.to_string(),
                email: Some(email.to_string()),
                name: Some("Test User".to_string()),
                picture: None,
            },
        )
    }

    #[tokio::test]
    async fn test_save_assigns_id_and_timestamps() {
        let directory = MemoryUserDirectory::new();
        let saved = directory.save(new_user("a@x.com", "g-1")).await.unwrap();

        assert!(!saved.id.is_nil());
        assert_eq!(saved.created_at, saved.updated_at);
        assert_eq!(saved.role, Role::User);
        assert_eq!(directory.len().await, 1);
    }

    #[tokio::test]
    async fn test_email_lookup_is_case_insensitive() {
        let directory = MemoryUserDirectory::new();
        let saved = directory.save(new_user("Alice@Example.com", "g-1")).await.unwrap();

        let found = directory.find_by_email("alice@example.COM").await.unwrap().unwrap();
        assert_eq!(found.id, saved.id);
        assert_eq!(found.email, "Alice@Example.com");
        assert!(directory.find_by_email("bob@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let directory = MemoryUserDirectory::new();
        directory.save(new_user("a@x.com", "g-1")).await.unwrap();

        let result = directory.save(new_user("A@X.com", "g-2")).await;
        assert!(matches!(result, Err(DirectoryError::DuplicateEmail(_))));
        assert_eq!(directory.len().await, 1);
    }

    #[tokio::test]
    async fn test_update_keeps_created_at() {
        let directory = MemoryUserDirectory::new();
        let saved = directory.save(new_user("a@x.com", "g-1")).await.unwrap();

        let mut changed = saved.clone();
        changed.name = Some("Renamed".to_string());
        let updated = directory.save(changed).await.unwrap();

        assert_eq!(updated.id, saved.id);
        assert_eq!(updated.created_at, saved.created_at);
        assert!(updated.updated_at >= saved.updated_at);
        assert_eq!(
            directory.find_by_id(saved.id).await.unwrap().unwrap().name.as_deref(),
            Some("Renamed")
        );
    }

    #[tokio::test]
    async fn test_provider_identity_is_immutable() {
        let directory = MemoryUserDirectory::new();
        let saved = directory.save(new_user("a@x.com", "g-1")).await.unwrap();

        let mut relinked = saved.clone();
        relinked.provider = AuthProvider::Github;
        assert!(matches!(
            directory.save(relinked).await,
            Err(DirectoryError::ImmutableIdentity(_))
        ));

        let mut resubject = saved;
        resubject.provider_id = "g-2".to_string();
        assert!(matches!(
            directory.save(resubject).await,
            Err(DirectoryError::ImmutableIdentity(_))
        ));
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");

        let directory = MemoryUserDirectory::open(&path).await.unwrap();
        assert!(directory.is_empty().await);
        let saved = directory.save(new_user("a@x.com", "g-1")).await.unwrap();
        assert!(path.exists());

        let reopened = MemoryUserDirectory::open(&path).await.unwrap();
        let found = reopened.find_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(found, saved);
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        std::fs::write(&path, b"not json").unwrap();

        assert!(matches!(
            MemoryUserDirectory::open(&path).await,
            Err(DirectoryError::Storage(_))
        ));
    }

    #[tokio::test]
    async fn test_snapshot_with_repeated_id_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");

        let mut first = new_user("a@x.com", "g-1");
        first.id = Uuid::new_v4();
        let mut second = new_user("b@x.com", "g-2");
        second.id = first.id;
        std::fs::write(&path, serde_json::to_vec(&[first, second]).unwrap()).unwrap();

        assert!(matches!(
            MemoryUserDirectory::open(&path).await,
            Err(DirectoryError::Storage(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_snapshot_write_leaves_no_new_user() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-subdir").join("users.json");

        let directory = MemoryUserDirectory::open(&path).await.unwrap();
        let result = directory.save(new_user("a@x.com", "g-1")).await;

        assert!(matches!(result, Err(DirectoryError::Storage(_))));
        assert!(directory.find_by_email("a@x.com").await.unwrap().is_none());
        assert!(directory.is_empty().await);
    }

    #[tokio::test]
    async fn test_failed_snapshot_write_restores_previous_record() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot_dir = dir.path().join("snapshots");
        std::fs::create_dir(&snapshot_dir).unwrap();

        let directory = MemoryUserDirectory::open(snapshot_dir.join("users.json"))
            .await
            .unwrap();
        let saved = directory.save(new_user("a@x.com", "g-1")).await.unwrap();
        std::fs::remove_dir_all(&snapshot_dir).unwrap();

        let mut changed = saved.clone();
        changed.email = "renamed@x.com".to_string();
        changed.name = Some("Renamed".to_string());
        assert!(matches!(
            directory.save(changed).await,
            Err(DirectoryError::Storage(_))
        ));

        assert_eq!(directory.find_by_id(saved.id).await.unwrap(), Some(saved.clone()));
        assert_eq!(
            directory.find_by_email("a@x.com").await.unwrap().map(|user| user.id),
            Some(saved.id)
        );
        assert!(directory.find_by_email("renamed@x.com").await.unwrap().is_none());
    }
}
