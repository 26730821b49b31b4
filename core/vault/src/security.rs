//! Credential verification and master key envelope encryption.
//!
//! Every user owns one random master key (MEK) generated at registration.
//! At rest the MEK only exists wrapped by a password-derived key (PDK);
//! this service is the single place that wraps and unwraps that envelope.
//!
//! The invariant the rest of the system leans on: a password change
//! re-wraps the envelope but never changes the MEK itself, so stored
//! secrets stay decryptable without re-encryption.

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use zeroize::Zeroize;

use strongroom_common::{Error, Result, UserId};
use strongroom_crypto::{
    decrypt_from_text, derive_key, encrypt_to_text, hash_password, verify_password, KdfParams,
    MasterKey, Salt,
};
use strongroom_storage::{User, UserRepository};

/// Owns password verification and MEK envelope operations.
pub struct SecurityService {
    users: Arc<dyn UserRepository>,
    kdf_params: KdfParams,
}

impl SecurityService {
    /// Create a security service over a user repository.
    pub fn new(users: Arc<dyn UserRepository>, kdf_params: KdfParams) -> Self {
        Self { users, kdf_params }
    }

    /// KDF parameters in effect.
    pub fn kdf_params(&self) -> &KdfParams {
        &self.kdf_params
    }

    /// Verify a password against the user's stored digest.
    ///
    /// Constant-time comparison; a malformed stored digest is an error
    /// (corruption), not a wrong password.
    pub fn verify_password(&self, user: &User, password: &str) -> Result<bool> {
        if password.is_empty() {
            return Ok(false);
        }
        verify_password(
            password,
            &user.password_hash,
            &user.password_salt,
            &self.kdf_params,
        )
    }

    /// Unwrap the user's master key with their password.
    ///
    /// # Postconditions
    /// - `Ok(Some(mek))` on a correct password
    /// - `Ok(None)` on a wrong password; uncovering is never attempted
    ///
    /// # Errors
    /// - `Crypto` if the envelope fails to decrypt after the password
    ///   verified; this signals corrupted security material, not bad
    ///   credentials
    pub fn uncover_mek(&self, user: &User, password: &str) -> Result<Option<MasterKey>> {
        if !self.verify_password(user, password)? {
            return Ok(None);
        }

        let pdk = derive_key(password, &user.pdk_salt, &self.kdf_params)?;
        let mut mek_bytes = decrypt_from_text(pdk.as_bytes(), &user.encrypted_master_key)
            .map_err(|_| {
                Error::Crypto(
                    "Master key envelope failed to decrypt after password verification"
                        .to_string(),
                )
            })?;

        let mek = MasterKey::from_slice(&mek_bytes);
        mek_bytes.zeroize();
        mek.map(Some)
    }

    /// Generate a fresh master key wrapped for a new account.
    ///
    /// # Postconditions
    /// - Returns the base64 envelope and the PDK salt it was wrapped under
    pub fn generate_encrypted_mek(&self, password: &str) -> Result<(String, Salt)> {
        let mek = MasterKey::generate();
        self.encrypt_mek(&mek, password)
    }

    /// Re-wrap an existing master key under a freshly derived PDK.
    ///
    /// Used at password change: the MEK value is identical before and
    /// after, only the wrapping changes.
    pub fn encrypt_mek(&self, mek: &MasterKey, password: &str) -> Result<(String, Salt)> {
        let pdk_salt = Salt::generate();
        let pdk = derive_key(password, &pdk_salt, &self.kdf_params)?;
        let envelope = encrypt_to_text(pdk.as_bytes(), mek.as_bytes())?;
        Ok((envelope, pdk_salt))
    }

    /// Lock a user account and persist the flag.
    ///
    /// Returns `false` if the account was already locked.
    pub async fn lock_user(&self, user: &mut User) -> Result<bool> {
        if user.is_locked {
            return Ok(false);
        }
        user.is_locked = true;
        user.updated_at = Utc::now();
        self.users.update(user).await?;
        warn!(username = %user.username, "User account locked");
        Ok(true)
    }

    /// Unlock a user account and persist the flag.
    ///
    /// Returns `false` if the account was not locked.
    pub async fn unlock_user(&self, user: &mut User) -> Result<bool> {
        if !user.is_locked {
            return Ok(false);
        }
        user.is_locked = false;
        user.updated_at = Utc::now();
        self.users.update(user).await?;
        info!(username = %user.username, "User account unlocked");
        Ok(true)
    }

    /// Register a new user account.
    ///
    /// Hashes the password, generates the master key envelope, and persists
    /// the assembled record.
    ///
    /// # Errors
    /// - `InvalidInput` on empty username, display name, or password
    /// - `AlreadyExists` if the username is taken
    pub async fn create_user(
        &self,
        username: &str,
        display_name: &str,
        password: &str,
    ) -> Result<User> {
        if username.trim().is_empty() || display_name.trim().is_empty() {
            return Err(Error::InvalidInput(
                "Username and display name are required".to_string(),
            ));
        }
        if password.is_empty() {
            return Err(Error::InvalidInput("Password is required".to_string()));
        }
        if self.users.find_by_username(username).await?.is_some() {
            return Err(Error::AlreadyExists(format!(
                "Username '{}' is already taken",
                username
            )));
        }

        let (password_hash, password_salt) = hash_password(password, &self.kdf_params)?;
        let (encrypted_master_key, pdk_salt) = self.generate_encrypted_mek(password)?;

        let now = Utc::now();
        let user = User {
            id: UserId::new(Uuid::new_v4().to_string())?,
            username: username.to_string(),
            display_name: display_name.to_string(),
            password_hash,
            password_salt,
            encrypted_master_key,
            pdk_salt,
            is_active: true,
            is_locked: false,
            created_at: now,
            updated_at: now,
        };

        self.users.add(user.clone()).await?;
        info!(username = %user.username, "User account created");
        Ok(user)
    }

    /// Change a user's password, re-wrapping the master key.
    ///
    /// # Postconditions
    /// - The MEK is unchanged; only the digest, salts, and envelope differ
    /// - Secrets encrypted before the change remain decryptable
    ///
    /// # Errors
    /// - `Unauthorized` if the old password is wrong
    /// - `InvalidInput` if the new password is empty
    pub async fn change_password(
        &self,
        user: &mut User,
        old_password: &str,
        new_password: &str,
    ) -> Result<()> {
        if new_password.is_empty() {
            return Err(Error::InvalidInput("New password is required".to_string()));
        }

        let mek = self
            .uncover_mek(user, old_password)?
            .ok_or_else(|| Error::Unauthorized("Invalid credentials".to_string()))?;

        let (password_hash, password_salt) = hash_password(new_password, &self.kdf_params)?;
        let (encrypted_master_key, pdk_salt) = self.encrypt_mek(&mek, new_password)?;

        user.password_hash = password_hash;
        user.password_salt = password_salt;
        user.encrypted_master_key = encrypted_master_key;
        user.pdk_salt = pdk_salt;
        user.updated_at = Utc::now();

        self.users.update(user).await?;
        info!(username = %user.username, "Password changed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strongroom_crypto::encrypt_field;
    use strongroom_storage::MemoryStore;

    fn service() -> (SecurityService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let users: Arc<dyn UserRepository> = store.clone();
        (SecurityService::new(users, KdfParams::moderate()), store)
    }

    #[tokio::test]
    async fn test_create_user_and_verify_password() {
        let (service, _) = service();
        let user = service
            .create_user("alice", "Alice", "correct horse")
            .await
            .unwrap();

        assert!(service.verify_password(&user, "correct horse").unwrap());
        assert!(!service.verify_password(&user, "wrong").unwrap());
        assert!(!service.verify_password(&user, "").unwrap());
    }

    #[tokio::test]
    async fn test_uncover_mek_roundtrip() {
        let (service, _) = service();
        let user = service
            .create_user("alice", "Alice", "correct horse")
            .await
            .unwrap();

        let mek = service.uncover_mek(&user, "correct horse").unwrap();
        assert!(mek.is_some());

        let again = service.uncover_mek(&user, "correct horse").unwrap();
        assert_eq!(mek.unwrap(), again.unwrap());
    }

    #[tokio::test]
    async fn test_encrypt_mek_roundtrips_same_key() {
        let (service, _) = service();
        let mut user = service
            .create_user("alice", "Alice", "pw-alice")
            .await
            .unwrap();

        let mek = MasterKey::generate();
        let (envelope, pdk_salt) = service.encrypt_mek(&mek, "pw-alice").unwrap();
        user.encrypted_master_key = envelope;
        user.pdk_salt = pdk_salt;

        let uncovered = service.uncover_mek(&user, "pw-alice").unwrap().unwrap();
        assert_eq!(uncovered, mek);
    }

    #[tokio::test]
    async fn test_uncover_mek_wrong_password_is_none() {
        let (service, _) = service();
        let user = service
            .create_user("alice", "Alice", "correct horse")
            .await
            .unwrap();

        assert!(service.uncover_mek(&user, "wrong").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_envelope_is_crypto_error() {
        let (service, _) = service();
        let mut user = service
            .create_user("alice", "Alice", "correct horse")
            .await
            .unwrap();

        // Valid base64, but not a ciphertext the PDK produced.
        user.encrypted_master_key = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA".to_string();

        let result = service.uncover_mek(&user, "correct horse");
        assert!(matches!(result, Err(Error::Crypto(_))));
    }

    #[tokio::test]
    async fn test_password_change_preserves_mek() {
        let (service, _) = service();
        let mut user = service
            .create_user("alice", "Alice", "old password")
            .await
            .unwrap();

        let mek_before = service.uncover_mek(&user, "old password").unwrap().unwrap();

        // A secret wrapped under the MEK before the change.
        let envelope = encrypt_field(mek_before.as_bytes(), "bank pin 1234").unwrap();

        service
            .change_password(&mut user, "old password", "new password")
            .await
            .unwrap();

        assert!(service.uncover_mek(&user, "old password").unwrap().is_none());
        let mek_after = service.uncover_mek(&user, "new password").unwrap().unwrap();
        assert_eq!(mek_before, mek_after);

        // Still decryptable without re-encryption.
        let plaintext =
            strongroom_crypto::decrypt_field(mek_after.as_bytes(), &envelope).unwrap();
        assert_eq!(plaintext, "bank pin 1234");
    }

    #[tokio::test]
    async fn test_change_password_wrong_old_is_unauthorized() {
        let (service, _) = service();
        let mut user = service
            .create_user("alice", "Alice", "old password")
            .await
            .unwrap();

        let result = service
            .change_password(&mut user, "not it", "new password")
            .await;
        assert!(matches!(result, Err(Error::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_lock_unlock_roundtrip() {
        let (service, store) = service();
        let mut user = service
            .create_user("alice", "Alice", "pw-alice")
            .await
            .unwrap();

        assert!(service.lock_user(&mut user).await.unwrap());
        assert!(!service.lock_user(&mut user).await.unwrap());

        let stored = store.find_by_username("alice").await.unwrap().unwrap();
        assert!(stored.is_locked);

        assert!(service.unlock_user(&mut user).await.unwrap());
        assert!(!service.unlock_user(&mut user).await.unwrap());

        let stored = store.find_by_username("alice").await.unwrap().unwrap();
        assert!(!stored.is_locked);
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let (service, _) = service();
        service
            .create_user("alice", "Alice", "pw-one")
            .await
            .unwrap();

        let result = service.create_user("alice", "Other Alice", "pw-two").await;
        assert!(matches!(result, Err(Error::AlreadyExists(_))));
    }
}
