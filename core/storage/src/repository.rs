//! Repository trait definitions.
//!
//! The core is written against these abstractions only. Implementations
//! must not filter or sort by decrypted content; they see ciphertext and
//! raw flags.

use async_trait::async_trait;
use chrono::Duration;

use crate::models::{SecretRecord, SignInHistoryItem, User};
use strongroom_common::{Result, UserId};

/// User account persistence.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Look up a user by username.
    async fn find_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Look up a user by id.
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>>;

    /// Add a new user.
    ///
    /// # Errors
    /// - `AlreadyExists` if the username or id is taken
    async fn add(&self, user: User) -> Result<()>;

    /// Persist changes to an existing user.
    ///
    /// # Errors
    /// - `OperationFailed` if no stored user matched the id
    async fn update(&self, user: &User) -> Result<()>;
}

/// Append-only sign-in audit log.
#[async_trait]
pub trait SignInHistoryRepository: Send + Sync {
    /// Append one attempt record. Records are never mutated or deleted.
    async fn add(&self, item: SignInHistoryItem) -> Result<()>;

    /// Failed attempts for a username within the trailing window,
    /// across all recorded history.
    async fn recent_failures(
        &self,
        username: &str,
        window: Duration,
    ) -> Result<Vec<SignInHistoryItem>>;
}

/// Encrypted secret persistence.
#[async_trait]
pub trait SecretRepository: Send + Sync {
    /// Add a new secret record.
    async fn add(&self, secret: SecretRecord) -> Result<()>;

    /// All secret records for one user.
    async fn find_by_user(&self, user_id: &UserId) -> Result<Vec<SecretRecord>>;

    /// Persist changes to an existing secret.
    ///
    /// # Errors
    /// - `OperationFailed` if no stored secret matched the id
    async fn update(&self, secret: &SecretRecord) -> Result<()>;

    /// Remove a secret by id.
    ///
    /// # Errors
    /// - `NotFound` if no stored secret matched the id
    async fn remove(&self, id: &str) -> Result<()>;
}
