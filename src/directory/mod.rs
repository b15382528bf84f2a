//! User directory: lookup and upsert of local user records

mod memory;

pub use memory::MemoryUserDirectory;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::User;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("a user with email {0} already exists")]
    DuplicateEmail(String),
    #[error("provider identity of user {0} cannot change")]
    ImmutableIdentity(Uuid),
    #[error("user directory storage failure: {0}")]
    Storage(String),
}

/// Storage seam for user records
///
/// Email lookups are case-insensitive. `save` is an upsert keyed by id and
/// must enforce email uniqueness atomically with the write.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, DirectoryError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, DirectoryError>;

    /// Insert or update a user and return the stored record
    ///
    /// A nil id marks a new record; the directory assigns the id and both
    /// timestamps.
    async fn save(&self, user: User) -> Result<User, DirectoryError>;
}

/// Key used for case-insensitive email comparison
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
