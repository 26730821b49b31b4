//! Transport-security key material.
//!
//! The session store itself is secured by a signing key and an encryption
//! key. This provider either serves externally configured keys or
//! generates them once and persists them to owner-only files under a
//! configurable directory, one file per key.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::rngs::OsRng;
use rand::RngCore;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use strongroom_common::{Error, Result};
use strongroom_crypto::KEY_LENGTH;

/// Logical name of the signing key file.
pub const SIGNING_KEY_NAME: &str = "signing";

/// Logical name of the encryption key file.
pub const ENCRYPTION_KEY_NAME: &str = "encryption";

/// File extension for persisted keys.
const KEY_FILE_EXT: &str = "key";

/// Source of the session-transport key material.
pub trait TransportKeyProvider: Send + Sync {
    /// Key used to sign session payloads.
    fn signing_key(&self) -> Result<Vec<u8>>;

    /// Key used to encrypt session payloads.
    fn encryption_key(&self) -> Result<Vec<u8>>;
}

/// Externally configured keys, served as-is.
pub struct StaticTransportKeys {
    signing: Vec<u8>,
    encryption: Vec<u8>,
}

impl StaticTransportKeys {
    pub fn new(signing: Vec<u8>, encryption: Vec<u8>) -> Self {
        Self { signing, encryption }
    }
}

impl TransportKeyProvider for StaticTransportKeys {
    fn signing_key(&self) -> Result<Vec<u8>> {
        Ok(self.signing.clone())
    }

    fn encryption_key(&self) -> Result<Vec<u8>> {
        Ok(self.encryption.clone())
    }
}

/// Generates keys on first use and persists them under `dir`.
///
/// Each key lives in its own file (`signing.key`, `encryption.key`) with
/// permissions restricted to owner read/write.
pub struct FileTransportKeys {
    dir: PathBuf,
}

impl FileTransportKeys {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn key_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", name, KEY_FILE_EXT))
    }

    fn load_or_generate(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.key_path(name);

        if path.exists() {
            return read_key_file(&path);
        }

        fs::create_dir_all(&self.dir)?;

        let mut key = vec![0u8; KEY_LENGTH];
        OsRng.fill_bytes(&mut key);
        fs::write(&path, URL_SAFE_NO_PAD.encode(&key))?;
        restrict_permissions(&path)?;

        info!(path = %path.display(), "Generated transport key");
        Ok(key)
    }
}

impl TransportKeyProvider for FileTransportKeys {
    fn signing_key(&self) -> Result<Vec<u8>> {
        self.load_or_generate(SIGNING_KEY_NAME)
    }

    fn encryption_key(&self) -> Result<Vec<u8>> {
        self.load_or_generate(ENCRYPTION_KEY_NAME)
    }
}

fn read_key_file(path: &Path) -> Result<Vec<u8>> {
    let text = fs::read_to_string(path)?;
    let key = URL_SAFE_NO_PAD
        .decode(text.trim())
        .map_err(|e| Error::Crypto(format!("Invalid key file encoding: {}", e)))?;
    if key.len() != KEY_LENGTH {
        return Err(Error::Crypto(format!(
            "Invalid key file length: expected {}, got {}",
            KEY_LENGTH,
            key.len()
        )));
    }
    Ok(key)
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_stable_across_calls() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FileTransportKeys::new(dir.path());

        let first = provider.signing_key().unwrap();
        let second = provider.signing_key().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), KEY_LENGTH);
    }

    #[test]
    fn test_signing_and_encryption_keys_differ() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FileTransportKeys::new(dir.path());

        assert_ne!(provider.signing_key().unwrap(), provider.encryption_key().unwrap());
    }

    #[test]
    fn test_keys_survive_new_provider() {
        let dir = tempfile::tempdir().unwrap();

        let first = FileTransportKeys::new(dir.path()).encryption_key().unwrap();
        let second = FileTransportKeys::new(dir.path()).encryption_key().unwrap();
        assert_eq!(first, second);
    }

    #[cfg(unix)]
    #[test]
    fn test_key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let provider = FileTransportKeys::new(dir.path());
        provider.signing_key().unwrap();

        let path = dir.path().join("signing.key");
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_corrupt_key_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signing.key");
        fs::write(&path, "not a key").unwrap();

        let provider = FileTransportKeys::new(dir.path());
        assert!(provider.signing_key().is_err());
    }

    #[test]
    fn test_static_keys_served_as_is() {
        let provider = StaticTransportKeys::new(vec![1u8; 32], vec![2u8; 32]);
        assert_eq!(provider.signing_key().unwrap(), vec![1u8; 32]);
        assert_eq!(provider.encryption_key().unwrap(), vec![2u8; 32]);
    }
}
