//! Local JSON-file store.
//!
//! Single-file persistence for the administrative CLI. The whole state is
//! loaded at open and rewritten after every mutation; fine for the small
//! data volumes an admin tool sees, not a server-grade backend.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::debug;

use crate::models::{SecretRecord, SignInHistoryItem, User};
use crate::repository::{SecretRepository, SignInHistoryRepository, UserRepository};
use strongroom_common::{Error, Result, UserId};

#[derive(Default, Serialize, Deserialize)]
struct FileState {
    users: Vec<User>,
    history: Vec<SignInHistoryItem>,
    secrets: Vec<SecretRecord>,
}

/// JSON-file implementation of every repository trait.
///
/// All fields it persists are ciphertext, digests, salts, and flags; the
/// file never contains plaintext secret material.
pub struct JsonFileStore {
    path: PathBuf,
    state: RwLock<FileState>,
}

impl JsonFileStore {
    /// Open a store file, creating an empty state if it does not exist.
    ///
    /// # Errors
    /// - I/O failure reading the file
    /// - Malformed store content
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let state = if path.exists() {
            let bytes = fs::read(&path)?;
            serde_json::from_slice(&bytes)
                .map_err(|e| Error::Serialization(format!("Malformed store file: {}", e)))?
        } else {
            FileState::default()
        };

        debug!(path = %path.display(), "Opened store file");

        Ok(Self {
            path,
            state: RwLock::new(state),
        })
    }

    /// Rewrite the store file from the given state.
    fn persist(&self, state: &FileState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(state)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        fs::write(&self.path, bytes)?;
        Ok(())
    }
}

#[async_trait]
impl UserRepository for JsonFileStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let state = self.state.read().unwrap();
        Ok(state.users.iter().find(|u| u.username == username).cloned())
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>> {
        let state = self.state.read().unwrap();
        Ok(state.users.iter().find(|u| &u.id == id).cloned())
    }

    async fn add(&self, user: User) -> Result<()> {
        let mut state = self.state.write().unwrap();
        if state
            .users
            .iter()
            .any(|u| u.id == user.id || u.username == user.username)
        {
            return Err(Error::AlreadyExists(format!(
                "User '{}' already exists",
                user.username
            )));
        }
        state.users.push(user);
        self.persist(&state)
    }

    async fn update(&self, user: &User) -> Result<()> {
        let mut state = self.state.write().unwrap();
        match state.users.iter_mut().find(|u| u.id == user.id) {
            Some(stored) => {
                *stored = user.clone();
                self.persist(&state)
            }
            None => Err(Error::OperationFailed(
                "User update affected zero rows".to_string(),
            )),
        }
    }
}

#[async_trait]
impl SignInHistoryRepository for JsonFileStore {
    async fn add(&self, item: SignInHistoryItem) -> Result<()> {
        let mut state = self.state.write().unwrap();
        state.history.push(item);
        self.persist(&state)
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
impl SecretRepository for JsonFileStore {
    async fn add(&self, secret: SecretRecord) -> Result<()> {
        let mut state = self.state.write().unwrap();
        if state.secrets.iter().any(|s| s.id == secret.id) {
            return Err(Error::AlreadyExists(format!(
                "Secret '{}' already exists",
                secret.id
            )));
        }
        state.secrets.push(secret);
        self.persist(&state)
    }

    async fn find_by_user(&self, user_id: &UserId) -> Result<Vec<SecretRecord>> {
        let state = self.state.read().unwrap();
        Ok(state
            .secrets
            .iter()
            .filter(|s| &s.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn update(&self, secret: &SecretRecord) -> Result<()> {
        let mut state = self.state.write().unwrap();
        match state.secrets.iter_mut().find(|s| s.id == secret.id) {
            Some(stored) => {
                *stored = secret.clone();
                self.persist(&state)
            }
            None => Err(Error::OperationFailed(
                "Secret update affected zero rows".to_string(),
            )),
        }
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let mut state = self.state.write().unwrap();
        let before = state.secrets.len();
        state.secrets.retain(|s| s.id != id);
        if state.secrets.len() == before {
            return Err(Error::NotFound(format!("Secret '{}' not found", id)));
        }
        self.persist(&state)
    }
}
