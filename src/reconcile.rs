//! Maps a provider profile onto a local user record

use std::sync::Arc;

use log::{debug, info, warn};
use thiserror::Error;

use crate::directory::{DirectoryError, UserDirectory};
use crate::models::{AuthProvider, ProviderProfile, User};

/// Attempts made when a concurrent login inserts the same email first
const MAX_ATTEMPTS: usize = 3;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("profile from {0} has no email attribute")]
    ProviderProfileIncomplete(AuthProvider),
    #[error("email is registered through {registered}, login attempted through {attempted}")]
    ProviderMismatch {
        registered: AuthProvider,
        attempted: AuthProvider,
    },
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

/// How an existing account found by email may be used by another provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPolicy {
    /// Only the provider that created the account may log into it
    RequireProviderMatch,
    /// Any provider asserting the same email logs into the account
    LinkByEmail,
}

impl LinkPolicy {
    #[must_use]
    pub const fn from_require_match(require_provider_match: bool) -> Self {
        if require_provider_match {
            Self::RequireProviderMatch
        } else {
            Self::LinkByEmail
        }
    }
}

#[derive(Clone)]
pub struct IdentityReconciler {
    directory: Arc<dyn UserDirectory>,
    policy: LinkPolicy,
}

impl IdentityReconciler {
    #[must_use]
    pub fn new(directory: Arc<dyn UserDirectory>, policy: LinkPolicy) -> Self {
        Self { directory, policy }
    }

    #[must_use]
    pub const fn policy(&self) -> LinkPolicy {
        self.policy
    }

    /// Find or create the user for `profile`, refreshing mutable fields
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The profile carries no email
    /// - The email belongs to an account created through another provider
    ///   and the policy requires a provider match
    /// - The directory fails, or keeps reporting a duplicate after retries
    pub async fn reconcile(&self, profile: &ProviderProfile) -> Result<User, ReconcileError> {
        let email = profile
            .email()
            .ok_or(ReconcileError::ProviderProfileIncomplete(profile.provider))?;

        let mut attempt = 1;
        loop {
            let outcome = match self.directory.find_by_email(email).await? {
                Some(existing) => self.update_existing(existing, profile).await,
                None => self.register_new(email, profile).await,
            };

            match outcome {
                Err(ReconcileError::Directory(DirectoryError::DuplicateEmail(_)))
                    if attempt < MAX_ATTEMPTS =>
                {
                    debug!("Concurrent registration for {email}, retrying (attempt {attempt})");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn update_existing(
        &self,
        mut user: User,
        profile: &ProviderProfile,
    ) -> Result<User, ReconcileError> {
        if user.provider != profile.provider && self.policy == LinkPolicy::RequireProviderMatch {
            warn!(
                "Rejected {} login for user {} registered through {}",
                profile.provider, user.id, user.provider
            );
            return Err(ReconcileError::ProviderMismatch {
                registered: user.provider,
                attempted: profile.provider,
            });
        }

        if let Some(name) = &profile.name {
            user.name = Some(name.clone());
        }
        if let Some(picture) = &profile.picture {
            user.image_url = Some(picture.clone());
        }

        let saved = self.directory.save(user).await?;
        debug!("Refreshed profile of user {}", saved.id);
        Ok(saved)
    }

    async fn register_new(
        &self,
        email: &str,
        profile: &ProviderProfile,
    ) -> Result<User, ReconcileError> {
        let saved = self
            .directory
            .save(User::from_profile(email, profile))
            .await?;
        info!("Registered user {} through {}", saved.id, saved.provider);
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Barrier;
    use uuid::Uuid;

    use super::*;
    use crate::directory::MemoryUserDirectory;
    use crate::models::Role;

    fn profile(email: Option<&str>, name: &str, picture: &str) -> ProviderProfile {
        ProviderProfile {
            provider: AuthProvider::Google,
            subject: "google-sub-1".to_string(),
            email: email.map(ToString::to_string),
            name: Some(name.to_string()),
            picture: Some(picture.to_string()),
        }
    }

    fn reconciler(directory: Arc<dyn UserDirectory>) -> IdentityReconciler {
        IdentityReconciler::new(directory, LinkPolicy::RequireProviderMatch)
    }

    /// Holds the first two email lookups until both have happened, forcing the insert race
    struct RacingDirectory {
        inner: MemoryUserDirectory,
        barrier: Barrier,
        lookups: AtomicUsize,
    }

    #[async_trait]
    impl UserDirectory for RacingDirectory {
        async fn find_by_email(&self, email: &str) -> Result<Option<User>, DirectoryError> {
            let result = self.inner.find_by_email(email).await;
            if self.lookups.fetch_add(1, Ordering::SeqCst) < 2 {
                self.barrier.wait().await;
            }
            result
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, DirectoryError> {
            self.inner.find_by_id(id).await
        }

        async fn save(&self, user: User) -> Result<User, DirectoryError> {
            self.inner.save(user).await
        }
    }

    #[tokio::test]
    async fn test_novel_email_creates_user() {
        let directory = Arc::new(MemoryUserDirectory::new());
        let user = reconciler(directory.clone())
            .reconcile(&profile(Some("new@x.com"), "New", "p"))
            .await
            .unwrap();

        assert_eq!(user.role, Role::User);
        assert_eq!(user.provider, AuthProvider::Google);
        assert_eq!(user.provider_id, "google-sub-1");
        assert_eq!(directory.len().await, 1);
    }

    #[tokio::test]
    async fn test_existing_email_updates_name_and_picture() {
        let directory = Arc::new(MemoryUserDirectory::new());
        let reconciler = reconciler(directory.clone());

        let first = reconciler
            .reconcile(&profile(Some("a@x.com"), "A", "p1"))
            .await
            .unwrap();
        let second = reconciler
            .reconcile(&profile(Some("A@x.com"), "A Renamed", "p2"))
            .await
            .unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.provider, first.provider);
        assert_eq!(second.provider_id, first.provider_id);
        assert_eq!(second.email, "a@x.com");
        assert_eq!(second.name.as_deref(), Some("A Renamed"));
        assert_eq!(second.image_url.as_deref(), Some("p2"));
        assert_eq!(directory.len().await, 1);
    }

    #[tokio::test]
    async fn test_same_profile_twice_is_stable() {
        let directory = Arc::new(MemoryUserDirectory::new());
        let reconciler = reconciler(directory.clone());
        let p = profile(Some("a@x.com"), "A", "p1");

        let first = reconciler.reconcile(&p).await.unwrap();
        let second = reconciler.reconcile(&p).await.unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.image_url.as_deref(), Some("p1"));
        assert_eq!(directory.len().await, 1);
    }

    #[tokio::test]
    async fn test_missing_email_creates_nothing() {
        let directory = Arc::new(MemoryUserDirectory::new());
        let result = reconciler(directory.clone())
            .reconcile(&profile(None, "Nobody", "p"))
            .await;

        assert!(matches!(
            result,
            Err(ReconcileError::ProviderProfileIncomplete(AuthProvider::Google))
        ));
        assert!(directory.is_empty().await);
    }

    #[tokio::test]
    async fn test_provider_mismatch_policy() {
        let directory = Arc::new(MemoryUserDirectory::new());
        let strict = reconciler(directory.clone());
        let created = strict
            .reconcile(&profile(Some("a@x.com"), "A", "p1"))
            .await
            .unwrap();

        let mut github = profile(Some("a@x.com"), "A from GitHub", "gh");
        github.provider = AuthProvider::Github;
        github.subject = "9001".to_string();

        assert!(matches!(
            strict.reconcile(&github).await,
            Err(ReconcileError::ProviderMismatch {
                registered: AuthProvider::Google,
                attempted: AuthProvider::Github,
            })
        ));

        let linking = IdentityReconciler::new(directory.clone(), LinkPolicy::LinkByEmail);
        let linked = linking.reconcile(&github).await.unwrap();
        assert_eq!(linked.id, created.id);
        assert_eq!(linked.provider, AuthProvider::Google);
        assert_eq!(linked.provider_id, "google-sub-1");
        assert_eq!(linked.name.as_deref(), Some("A from GitHub"));
    }

    #[tokio::test]
    async fn test_concurrent_first_login_creates_one_user() {
        let directory = Arc::new(RacingDirectory {
            inner: MemoryUserDirectory::new(),
            barrier: Barrier::new(2),
            lookups: AtomicUsize::new(0),
        });
        let reconciler = reconciler(directory.clone());
        let p = profile(Some("race@x.com"), "Racer", "p");

        let (left, right) = tokio::join!(reconciler.reconcile(&p), reconciler.reconcile(&p));
        let (left, right) = (left.unwrap(), right.unwrap());

        assert_eq!(left.id, right.id);
        assert_eq!(directory.inner.len().await, 1);
    }
}
