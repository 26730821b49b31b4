//! Password hashing and verification.
//!
//! A password digest is the Argon2id derivation of the password under a
//! dedicated salt, encoded as base64 text for storage. Verification
//! re-derives and compares in constant time.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use subtle::ConstantTimeEq;

use crate::kdf::{derive_key, KdfParams};
use crate::keys::{Salt, KEY_LENGTH};
use strongroom_common::{Error, Result};

/// Hash a password with a freshly generated salt.
///
/// # Preconditions
/// - `password` must not be empty
///
/// # Postconditions
/// - Returns the base64 digest and the salt it was derived under
///
/// # Errors
/// - Returns error if password is empty
pub fn hash_password(password: &str, params: &KdfParams) -> Result<(String, Salt)> {
    let salt = Salt::generate();
    let digest = hash_password_with_salt(password, &salt, params)?;
    Ok((digest, salt))
}

/// Hash a password under an existing salt.
pub fn hash_password_with_salt(password: &str, salt: &Salt, params: &KdfParams) -> Result<String> {
    let key = derive_key(password, salt, params)?;
    Ok(URL_SAFE_NO_PAD.encode(key.as_bytes()))
}

/// Verify a password against a stored digest and salt.
///
/// The comparison is constant-time; the result never depends on how many
/// digest bytes matched.
///
/// # Errors
/// - Returns error if the stored digest is malformed (signals corruption,
///   not a wrong password)
pub fn verify_password(
    password: &str,
    digest: &str,
    salt: &Salt,
    params: &KdfParams,
) -> Result<bool> {
    let stored = URL_SAFE_NO_PAD
        .decode(digest)
        .map_err(|e| Error::Crypto(format!("Invalid password digest encoding: {}", e)))?;
    if stored.len() != KEY_LENGTH {
        return Err(Error::Crypto(format!(
            "Invalid password digest length: expected {}, got {}",
            KEY_LENGTH,
            stored.len()
        )));
    }

    let derived = derive_key(password, salt, params)?;

    Ok(derived.as_bytes()[..].ct_eq(&stored[..]).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let params = KdfParams::moderate();
        let (digest, salt) = hash_password("secure-password", &params).unwrap();

        assert!(verify_password("secure-password", &digest, &salt, &params).unwrap());
        assert!(!verify_password("wrong-password", &digest, &salt, &params).unwrap());
    }

    #[test]
    fn test_hash_uses_fresh_salt() {
        let params = KdfParams::moderate();
        let (digest1, salt1) = hash_password("same-password", &params).unwrap();
        let (digest2, salt2) = hash_password("same-password", &params).unwrap();

        assert_ne!(salt1.as_bytes(), salt2.as_bytes());
        assert_ne!(digest1, digest2);
    }

    #[test]
    fn test_verify_rejects_corrupt_digest() {
        let params = KdfParams::moderate();
        let salt = Salt::generate();

        assert!(verify_password("pw", "???", &salt, &params).is_err());
        assert!(verify_password("pw", "c2hvcnQ", &salt, &params).is_err());
    }

    #[test]
    fn test_empty_password_fails() {
        let params = KdfParams::moderate();
        assert!(hash_password("", &params).is_err());
    }
}
