//! Session state and the master key cache.
//!
//! A session is opaque server-side state keyed by a `SessionId`. Identity
//! and the cached master key live under distinct slots so identity can be
//! read without ever touching the key, and the key can be dropped without
//! tearing down the session record first.
//!
//! Keys are cached for the session's lifetime and destroyed on sign-out or
//! expiry; the store never logs or echoes key material.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::info;
use uuid::Uuid;
use zeroize::Zeroize;

use crate::signin::{SignInHandler, SignInRequest, SignInSuccess};
use strongroom_common::{Error, Result, UserId};
use strongroom_crypto::MasterKey;
use strongroom_storage::{ClientInfo, User, UserRepository};

/// Session slot holding the authenticated user id.
const IDENTITY_SLOT: &str = "identity";

/// Session slot holding the cached master key.
const MEK_SLOT: &str = "mek";

/// Opaque session identifier handed to the client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a new unique session id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wrap an existing session token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Get the token string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Session store configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Idle expiry; entries unread for this long are gone.
    pub idle_expiry: Duration,
    /// Maximum payload size per slot in bytes.
    pub max_entry_bytes: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_expiry: Duration::days(30),
            max_entry_bytes: 4096,
        }
    }
}

/// Key-value session abstraction addressed by an opaque per-client token.
///
/// Implementations must store slots independently within one session and
/// enforce the configured payload bound. Serialization of concurrent
/// mutations to the same session is the store's responsibility.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Write one slot. Creates the session entry if absent.
    ///
    /// # Errors
    /// - `InvalidInput` if the payload exceeds the configured bound
    async fn put(&self, session: &SessionId, slot: &str, value: &[u8]) -> Result<()>;

    /// Read one slot; absent slot or expired session reads as `None`.
    async fn get(&self, session: &SessionId, slot: &str) -> Result<Option<Vec<u8>>>;

    /// Remove one slot; removing an absent slot is not an error.
    async fn remove(&self, session: &SessionId, slot: &str) -> Result<()>;

    /// Invalidate the whole session.
    async fn destroy(&self, session: &SessionId) -> Result<()>;
}

struct SessionEntry {
    slots: HashMap<String, Vec<u8>>,
    last_access: DateTime<Utc>,
}

impl Drop for SessionEntry {
    fn drop(&mut self) {
        for value in self.slots.values_mut() {
            value.zeroize();
        }
    }
}

/// In-memory session store with idle expiry and a payload bound.
///
/// Useful for tests and single-process deployments; production transports
/// bring their own store behind the same trait.
pub struct MemorySessionStore {
    config: SessionConfig,
    sessions: RwLock<HashMap<String, SessionEntry>>,
}

impl MemorySessionStore {
    /// Create a store with the given configuration.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    fn expired(&self, entry: &SessionEntry) -> bool {
        Utc::now() - entry.last_access > self.config.idle_expiry
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn put(&self, session: &SessionId, slot: &str, value: &[u8]) -> Result<()> {
        if value.len() > self.config.max_entry_bytes {
            return Err(Error::InvalidInput(format!(
                "Session payload of {} bytes exceeds the {}-byte bound",
                value.len(),
                self.config.max_entry_bytes
            )));
        }

        let mut sessions = self.sessions.write().unwrap();
        let now = Utc::now();
        let entry = sessions
            .entry(session.as_str().to_string())
            .or_insert_with(|| SessionEntry {
                slots: HashMap::new(),
                last_access: now,
            });
        entry.last_access = now;
        if let Some(mut old) = entry.slots.insert(slot.to_string(), value.to_vec()) {
            old.zeroize();
        }
        Ok(())
    }

    async fn get(&self, session: &SessionId, slot: &str) -> Result<Option<Vec<u8>>> {
        let mut sessions = self.sessions.write().unwrap();
        let expired = match sessions.get(session.as_str()) {
            None => return Ok(None),
            Some(entry) => self.expired(entry),
        };
        if expired {
            sessions.remove(session.as_str());
            return Ok(None);
        }
        match sessions.get_mut(session.as_str()) {
            Some(entry) => {
                entry.last_access = Utc::now();
                Ok(entry.slots.get(slot).cloned())
            }
            None => Ok(None),
        }
    }

    async fn remove(&self, session: &SessionId, slot: &str) -> Result<()> {
        let mut sessions = self.sessions.write().unwrap();
        if let Some(entry) = sessions.get_mut(session.as_str()) {
            if let Some(mut value) = entry.slots.remove(slot) {
                value.zeroize();
            }
        }
        Ok(())
    }

    async fn destroy(&self, session: &SessionId) -> Result<()> {
        self.sessions.write().unwrap().remove(session.as_str());
        Ok(())
    }
}

/// Master key cache contract.
///
/// Implementations never log or echo the key value.
#[async_trait]
pub trait MekStore: Send + Sync {
    /// Cache the master key for a session.
    async fn store(&self, session: &SessionId, mek: &MasterKey) -> Result<()>;

    /// Retrieve the cached key, or `None` if absent.
    async fn retrieve(&self, session: &SessionId) -> Result<Option<MasterKey>>;

    /// Drop the cached key.
    async fn delete(&self, session: &SessionId) -> Result<()>;
}

/// `MekStore` over a `SessionStore`, using a dedicated slot.
pub struct SessionMekStore {
    sessions: Arc<dyn SessionStore>,
}

impl SessionMekStore {
    pub fn new(sessions: Arc<dyn SessionStore>) -> Self {
        Self { sessions }
    }
}

#[async_trait]
impl MekStore for SessionMekStore {
    async fn store(&self, session: &SessionId, mek: &MasterKey) -> Result<()> {
        self.sessions.put(session, MEK_SLOT, mek.as_bytes()).await
    }

    async fn retrieve(&self, session: &SessionId) -> Result<Option<MasterKey>> {
        let Some(mut bytes) = self.sessions.get(session, MEK_SLOT).await? else {
            return Ok(None);
        };
        let mek = MasterKey::from_slice(&bytes)
            .map_err(|_| Error::Crypto("Cached master key is malformed".to_string()));
        bytes.zeroize();
        mek.map(Some)
    }

    async fn delete(&self, session: &SessionId) -> Result<()> {
        self.sessions.remove(session, MEK_SLOT).await
    }
}

/// Binds an authenticated principal to a persisted session and caches the
/// unwrapped master key for the session's lifetime.
pub struct SessionSignInManager {
    handler: Arc<SignInHandler>,
    sessions: Arc<dyn SessionStore>,
    meks: Arc<dyn MekStore>,
    users: Arc<dyn UserRepository>,
}

impl SessionSignInManager {
    pub fn new(
        handler: Arc<SignInHandler>,
        sessions: Arc<dyn SessionStore>,
        meks: Arc<dyn MekStore>,
        users: Arc<dyn UserRepository>,
    ) -> Self {
        Self {
            handler,
            sessions,
            meks,
            users,
        }
    }

    /// Sign in and establish the session.
    ///
    /// Credential logic is fully delegated to the `SignInHandler`; on
    /// success the identity and the master key are written to their own
    /// slots independently.
    pub async fn sign_in(
        &self,
        session: &SessionId,
        request: &SignInRequest,
        client: &ClientInfo,
    ) -> Result<User> {
        let SignInSuccess { user, mek } = self.handler.handle_sign_in(request, client).await?;

        self.sessions
            .put(session, IDENTITY_SLOT, user.id.as_str().as_bytes())
            .await?;
        self.meks.store(session, &mek).await?;

        info!(username = %user.username, "Session established");
        Ok(user)
    }

    /// Tear down the session.
    ///
    /// The master key slot is deleted first, then the session itself, so a
    /// partially-failed sign-out never leaves a retrievable key behind.
    pub async fn sign_out(&self, session: &SessionId) -> Result<()> {
        self.meks.delete(session).await?;
        self.sessions.destroy(session).await?;
        Ok(())
    }

    /// Identity lookup for the session.
    ///
    /// Works without the master key slot being present; a signed-out or
    /// expired session reads as `None` without error.
    pub async fn current_user(&self, session: &SessionId) -> Result<Option<User>> {
        let Some(bytes) = self.sessions.get(session, IDENTITY_SLOT).await? else {
            return Ok(None);
        };
        let id = String::from_utf8(bytes)
            .map_err(|_| Error::Internal("Malformed session identity".to_string()))?;
        self.users.find_by_id(&UserId::new(id)?).await
    }
}
