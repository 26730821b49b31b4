//! In-memory store for testing.
//!
//! Implements all three repository traits over a shared `RwLock`ed state.
//! All data is lost on drop.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::models::{SecretRecord, SignInHistoryItem, User};
use crate::repository::{SecretRepository, SignInHistoryRepository, UserRepository};
use strongroom_common::{Error, Result, UserId};

#[derive(Default)]
struct State {
    users: HashMap<String, User>,
    history: Vec<SignInHistoryItem>,
    secrets: HashMap<String, SecretRecord>,
}

/// In-memory implementation of every repository trait.
///
/// Useful for tests and development. Share one instance behind an `Arc`
/// and hand clones of that `Arc` to each consumer.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded sign-in attempts (all outcomes).
    pub fn history_len(&self) -> usize {
        self.state.read().unwrap().history.len()
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let state = self.state.read().unwrap();
        Ok(state
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>> {
        let state = self.state.read().unwrap();
        Ok(state.users.get(id.as_str()).cloned())
    }

    async fn add(&self, user: User) -> Result<()> {
        let mut state = self.state.write().unwrap();
        if state.users.contains_key(user.id.as_str())
            || state.users.values().any(|u| u.username == user.username)
        {
            return Err(Error::AlreadyExists(format!(
                "User '{}' already exists",
                user.username
            )));
        }
        state.users.insert(user.id.as_str().to_string(), user);
        Ok(())
    }

    async fn update(&self, user: &User) -> Result<()> {
        let mut state = self.state.write().unwrap();
        match state.users.get_mut(user.id.as_str()) {
            Some(stored) => {
                *stored = user.clone();
                Ok(())
            }
            None => Err(Error::OperationFailed(
                "User update affected zero rows".to_string(),
            )),
        }
    }
}

#[async_trait]
impl SignInHistoryRepository for MemoryStore {
    async fn add(&self, item: SignInHistoryItem) -> Result<()> {
        self.state.write().unwrap().history.push(item);
        Ok(())
    }

    async fn recent_failures(
        &self,
        username: &str,
        window: Duration,
    ) -> Result<Vec<SignInHistoryItem>> {
        let cutoff = Utc::now() - window;
        let state = self.state.read().unwrap();
        Ok(state
            .history
            .iter()
            .filter(|item| !item.success && item.username == username && item.timestamp >= cutoff)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SecretRepository for MemoryStore {
    async fn add(&self, secret: SecretRecord) -> Result<()> {
        let mut state = self.state.write().unwrap();
        if state.secrets.contains_key(&secret.id) {
            return Err(Error::AlreadyExists(format!(
                "Secret '{}' already exists",
                secret.id
            )));
        }
        state.secrets.insert(secret.id.clone(), secret);
        Ok(())
    }

    async fn find_by_user(&self, user_id: &UserId) -> Result<Vec<SecretRecord>> {
        let state = self.state.read().unwrap();
        let mut records: Vec<SecretRecord> = state
            .secrets
            .values()
            .filter(|s| &s.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }

    async fn update(&self, secret: &SecretRecord) -> Result<()> {
        let mut state = self.state.write().unwrap();
        match state.secrets.get_mut(&secret.id) {
            Some(stored) => {
                *stored = secret.clone();
                Ok(())
            }
            None => Err(Error::OperationFailed(
                "Secret update affected zero rows".to_string(),
            )),
        }
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let mut state = self.state.write().unwrap();
        match state.secrets.remove(id) {
            Some(_) => Ok(()),
            None => Err(Error::NotFound(format!("Secret '{}' not found", id))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClientInfo;
    use strongroom_crypto::Salt;

    fn test_user(id: &str, username: &str) -> User {
        User {
            id: UserId::new(id).unwrap(),
            username: username.to_string(),
            display_name: username.to_string(),
            password_hash: "aGFzaA".to_string(),
            password_salt: Salt::from_bytes([1u8; 32]),
            encrypted_master_key: "ZW52".to_string(),
            pdk_salt: Salt::from_bytes([2u8; 32]),
            is_active: true,
            is_locked: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn failure(username: &str, age: Duration) -> SignInHistoryItem {
        SignInHistoryItem {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: None,
            username: username.to_string(),
            timestamp: Utc::now() - age,
            client: ClientInfo::default(),
            success: false,
            failure_reason: Some("Invalid credentials".to_string()),
        }
    }

    #[tokio::test]
    async fn test_user_add_and_find() {
        let store = MemoryStore::new();
        UserRepository::add(&store, test_user("u-1", "alice"))
            .await
            .unwrap();

        let found = store.find_by_username("alice").await.unwrap().unwrap();
        assert_eq!(found.id.as_str(), "u-1");
        assert!(store.find_by_username("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let store = MemoryStore::new();
        UserRepository::add(&store, test_user("u-1", "alice"))
            .await
            .unwrap();

        let result = UserRepository::add(&store, test_user("u-2", "alice")).await;
        assert!(matches!(result, Err(Error::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_update_missing_user_is_operation_failed() {
        let store = MemoryStore::new();
        let user = test_user("u-404", "nobody");

        let result = UserRepository::update(&store, &user).await;
        assert!(matches!(result, Err(Error::OperationFailed(_))));
    }

    #[tokio::test]
    async fn test_recent_failures_respects_window() {
        let store = MemoryStore::new();
        SignInHistoryRepository::add(&store, failure("alice", Duration::minutes(5)))
            .await
            .unwrap();
        SignInHistoryRepository::add(&store, failure("alice", Duration::minutes(45)))
            .await
            .unwrap();
        SignInHistoryRepository::add(&store, failure("bob", Duration::minutes(5)))
            .await
            .unwrap();

        let recent = store
            .recent_failures("alice", Duration::minutes(30))
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
    }

    #[tokio::test]
    async fn test_secret_remove_missing_is_not_found() {
        let store = MemoryStore::new();
        let result = store.remove("nope").await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }
}
