//! Field-level protection for crypto-agnostic managers.
//!
//! `DataProtector` is the seam between key custody and everything that
//! merely wants a field encrypted: consumers call `protect`/`unprotect`
//! and stay indifferent to how the key was obtained.
//!
//! Two credential-acquisition strategies share the contract:
//! - session-scoped: reads the cached MEK; cheap, one per request
//! - password-scoped: re-derives the MEK from a held password on every
//!   call; a full KDF run each time, for non-interactive contexts only

use async_trait::async_trait;
use std::sync::Arc;

use crate::security::SecurityService;
use crate::session::{MekStore, SessionId};
use strongroom_common::{Error, Result, SensitiveString, UserId};
use strongroom_crypto::{decrypt_field, encrypt_field, MasterKey};
use strongroom_storage::UserRepository;

/// Protect/unprotect contract for encrypted fields.
///
/// # Errors
/// Both operations fail with `KeyUnavailable` when no key can be obtained
/// and with `Crypto` on cipher or integrity failure.
#[async_trait]
pub trait DataProtector: Send + Sync {
    /// Encrypt a field to its storage envelope.
    async fn protect(&self, plaintext: &str) -> Result<String>;

    /// Decrypt a storage envelope back to the field.
    async fn unprotect(&self, ciphertext: &str) -> Result<String>;
}

/// Session-scoped protector: reads the cached MEK per call.
///
/// Intended to be constructed fresh per request and discarded; it holds
/// only the session handle, never the key.
pub struct SessionDataProtector {
    session: SessionId,
    meks: Arc<dyn MekStore>,
}

impl SessionDataProtector {
    pub fn new(session: SessionId, meks: Arc<dyn MekStore>) -> Self {
        Self { session, meks }
    }

    async fn obtain_mek(&self) -> Result<MasterKey> {
        self.meks
            .retrieve(&self.session)
            .await?
            .ok_or_else(|| {
                Error::KeyUnavailable("No master key is cached for this session".to_string())
            })
    }
}

#[async_trait]
impl DataProtector for SessionDataProtector {
    async fn protect(&self, plaintext: &str) -> Result<String> {
        let mek = self.obtain_mek().await?;
        encrypt_field(mek.as_bytes(), plaintext)
    }

    async fn unprotect(&self, ciphertext: &str) -> Result<String> {
        let mek = self.obtain_mek().await?;
        decrypt_field(mek.as_bytes(), ciphertext)
    }
}

/// Password-scoped protector: re-derives the MEK on every call.
///
/// Holds the user id and password (never the MEK), so it works without any
/// session store; administrative tools authenticate once per invocation
/// and pay the KDF cost per call by design. Not meant for high call volume.
pub struct PasswordDataProtector {
    user_id: UserId,
    password: SensitiveString,
    users: Arc<dyn UserRepository>,
    security: Arc<SecurityService>,
}

impl PasswordDataProtector {
    pub fn new(
        user_id: UserId,
        password: SensitiveString,
        users: Arc<dyn UserRepository>,
        security: Arc<SecurityService>,
    ) -> Self {
        Self {
            user_id,
            password,
            users,
            security,
        }
    }

    async fn obtain_mek(&self) -> Result<MasterKey> {
        let user = self
            .users
            .find_by_id(&self.user_id)
            .await?
            .ok_or_else(|| Error::KeyUnavailable("User no longer exists".to_string()))?;

        match self.security.uncover_mek(&user, self.password.as_str())? {
            Some(mek) => Ok(mek),
            None => Err(Error::KeyUnavailable(
                "Password no longer unlocks the master key".to_string(),
            )),
        }
    }
}

#[async_trait]
impl DataProtector for PasswordDataProtector {
    async fn protect(&self, plaintext: &str) -> Result<String> {
        let mek = self.obtain_mek().await?;
        encrypt_field(mek.as_bytes(), plaintext)
    }

    async fn unprotect(&self, ciphertext: &str) -> Result<String> {
        let mek = self.obtain_mek().await?;
        decrypt_field(mek.as_bytes(), ciphertext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MemorySessionStore, SessionMekStore, SessionStore};
    use strongroom_crypto::KdfParams;
    use strongroom_storage::MemoryStore;

    struct Fixture {
        users: Arc<dyn UserRepository>,
        security: Arc<SecurityService>,
        meks: Arc<dyn MekStore>,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let users: Arc<dyn UserRepository> = store.clone();
        let security = Arc::new(SecurityService::new(users.clone(), KdfParams::moderate()));
        security
            .create_user("alice", "Alice", "correct horse")
            .await
            .unwrap();

        let sessions: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::default());
        let meks: Arc<dyn MekStore> = Arc::new(SessionMekStore::new(sessions));

        Fixture {
            users,
            security,
            meks,
        }
    }

    async fn alice_id(f: &Fixture) -> UserId {
        f.users
            .find_by_username("alice")
            .await
            .unwrap()
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_session_protector_roundtrip() {
        let f = fixture().await;
        let session = SessionId::generate();
        let user = f.users.find_by_username("alice").await.unwrap().unwrap();
        let mek = f
            .security
            .uncover_mek(&user, "correct horse")
            .unwrap()
            .unwrap();
        f.meks.store(&session, &mek).await.unwrap();

        let protector = SessionDataProtector::new(session, f.meks.clone());
        let envelope = protector.protect("top secret").await.unwrap();
        assert_ne!(envelope, "top secret");
        assert_eq!(protector.unprotect(&envelope).await.unwrap(), "top secret");
    }

    #[tokio::test]
    async fn test_session_protector_without_key_is_key_unavailable() {
        let f = fixture().await;
        let protector = SessionDataProtector::new(SessionId::generate(), f.meks.clone());

        let result = protector.protect("anything").await;
        assert!(matches!(result, Err(Error::KeyUnavailable(_))));
    }

    #[tokio::test]
    async fn test_password_protector_roundtrip() {
        let f = fixture().await;
        let protector = PasswordDataProtector::new(
            alice_id(&f).await,
            SensitiveString::new("correct horse"),
            f.users.clone(),
            f.security.clone(),
        );

        let envelope = protector.protect("top secret").await.unwrap();
        assert_eq!(protector.unprotect(&envelope).await.unwrap(), "top secret");
    }

    #[tokio::test]
    async fn test_password_protector_wrong_password_is_key_unavailable() {
        let f = fixture().await;
        let protector = PasswordDataProtector::new(
            alice_id(&f).await,
            SensitiveString::new("wrong"),
            f.users.clone(),
            f.security.clone(),
        );

        let result = protector.protect("anything").await;
        assert!(matches!(result, Err(Error::KeyUnavailable(_))));
    }

    #[tokio::test]
    async fn test_variants_are_interchangeable() {
        let f = fixture().await;
        let session = SessionId::generate();
        let user = f.users.find_by_username("alice").await.unwrap().unwrap();
        let mek = f
            .security
            .uncover_mek(&user, "correct horse")
            .unwrap()
            .unwrap();
        f.meks.store(&session, &mek).await.unwrap();

        let session_scoped = SessionDataProtector::new(session, f.meks.clone());
        let password_scoped = PasswordDataProtector::new(
            user.id.clone(),
            SensitiveString::new("correct horse"),
            f.users.clone(),
            f.security.clone(),
        );

        // Same key underneath: envelopes cross-decrypt.
        let envelope = session_scoped.protect("shared").await.unwrap();
        assert_eq!(password_scoped.unprotect(&envelope).await.unwrap(), "shared");
    }

    #[tokio::test]
    async fn test_tampered_envelope_is_crypto_error() {
        let f = fixture().await;
        let protector = PasswordDataProtector::new(
            alice_id(&f).await,
            SensitiveString::new("correct horse"),
            f.users.clone(),
            f.security.clone(),
        );

        let envelope = protector.protect("payload").await.unwrap();
        let mut tampered = envelope.into_bytes();
        let last = tampered.len() - 1;
        tampered[last] = if tampered[last] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(tampered).unwrap();

        let result = protector.unprotect(&tampered).await;
        assert!(matches!(result, Err(Error::Crypto(_))));
    }
}
