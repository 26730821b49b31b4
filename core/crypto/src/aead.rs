//! Authenticated encryption using XChaCha20-Poly1305.
//!
//! XChaCha20-Poly1305 provides both confidentiality and authenticity,
//! with a 24-byte nonce that is safe for random generation. The nonce is
//! prepended to the ciphertext; the Poly1305 tag makes any tampering fail
//! decryption rather than silently corrupt.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chacha20poly1305::{
    aead::{generic_array::GenericArray, Aead, AeadCore, KeyInit, OsRng},
    XChaCha20Poly1305,
};

use crate::keys::KEY_LENGTH;
use strongroom_common::{Error, Result};

/// Nonce size for XChaCha20-Poly1305 (24 bytes).
pub const NONCE_SIZE: usize = 24;

/// Authentication tag size (16 bytes).
pub const TAG_SIZE: usize = 16;

/// Encrypt plaintext using XChaCha20-Poly1305.
///
/// # Postconditions
/// - Returns nonce || ciphertext || tag
/// - The nonce is randomly generated per call
///
/// # Errors
/// - Returns error if encryption fails
pub fn encrypt(key: &[u8; KEY_LENGTH], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(key));
    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| Error::Crypto(format!("Encryption failed: {}", e)))?;

    let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    result.extend_from_slice(&nonce);
    result.extend_from_slice(&ciphertext);

    Ok(result)
}

/// Decrypt ciphertext using XChaCha20-Poly1305.
///
/// # Preconditions
/// - Ciphertext format: nonce || encrypted_data || tag
///
/// # Errors
/// - Returns error if ciphertext is too short
/// - Returns error if authentication fails (wrong key or tampered data)
pub fn decrypt(key: &[u8; KEY_LENGTH], ciphertext: &[u8]) -> Result<Vec<u8>> {
    if ciphertext.len() < NONCE_SIZE + TAG_SIZE {
        return Err(Error::Crypto("Ciphertext too short".to_string()));
    }

    let (nonce_bytes, encrypted) = ciphertext.split_at(NONCE_SIZE);
    let nonce = GenericArray::from_slice(nonce_bytes);

    let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(key));

    cipher
        .decrypt(nonce, encrypted)
        .map_err(|_| Error::Crypto("Decryption failed: wrong key or tampered data".to_string()))
}

/// Encrypt bytes into a base64 text envelope for repository storage.
pub fn encrypt_to_text(key: &[u8; KEY_LENGTH], plaintext: &[u8]) -> Result<String> {
    let ciphertext = encrypt(key, plaintext)?;
    Ok(URL_SAFE_NO_PAD.encode(ciphertext))
}

/// Decrypt a base64 text envelope back to bytes.
///
/// # Errors
/// - Returns error on malformed encoding or authentication failure
pub fn decrypt_from_text(key: &[u8; KEY_LENGTH], ciphertext: &str) -> Result<Vec<u8>> {
    let bytes = URL_SAFE_NO_PAD
        .decode(ciphertext)
        .map_err(|e| Error::Crypto(format!("Invalid ciphertext encoding: {}", e)))?;
    decrypt(key, &bytes)
}

/// Encrypt a string field into a base64 text envelope.
pub fn encrypt_field(key: &[u8; KEY_LENGTH], plaintext: &str) -> Result<String> {
    encrypt_to_text(key, plaintext.as_bytes())
}

/// Decrypt a base64 text envelope back to a string field.
///
/// # Errors
/// - Returns error if the plaintext is not valid UTF-8 (signals the
///   envelope was not produced from a string field)
pub fn decrypt_field(key: &[u8; KEY_LENGTH], ciphertext: &str) -> Result<String> {
    let plaintext = decrypt_from_text(key, ciphertext)?;
    String::from_utf8(plaintext)
        .map_err(|_| Error::Crypto("Decrypted field is not valid UTF-8".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = [42u8; KEY_LENGTH];
        let plaintext = b"Hello, World!";

        let ciphertext = encrypt(&key, plaintext).unwrap();
        let decrypted = decrypt(&key, &ciphertext).unwrap();

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_ciphertext_size() {
        let key = [42u8; KEY_LENGTH];
        let plaintext = b"Test message";

        let ciphertext = encrypt(&key, plaintext).unwrap();

        assert_eq!(ciphertext.len(), NONCE_SIZE + plaintext.len() + TAG_SIZE);
    }

    #[test]
    fn test_different_nonce_each_time() {
        let key = [42u8; KEY_LENGTH];
        let plaintext = b"Same plaintext";

        let ct1 = encrypt(&key, plaintext).unwrap();
        let ct2 = encrypt(&key, plaintext).unwrap();

        assert_ne!(&ct1[..NONCE_SIZE], &ct2[..NONCE_SIZE]);
        assert_ne!(ct1, ct2);
    }

    #[test]
    fn test_wrong_key_fails() {
        let key1 = [1u8; KEY_LENGTH];
        let key2 = [2u8; KEY_LENGTH];

        let ciphertext = encrypt(&key1, b"Secret data").unwrap();

        assert!(decrypt(&key2, &ciphertext).is_err());
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = [42u8; KEY_LENGTH];

        let mut ciphertext = encrypt(&key, b"Important data").unwrap();
        ciphertext[NONCE_SIZE + 5] ^= 0xFF;

        assert!(decrypt(&key, &ciphertext).is_err());
    }

    #[test]
    fn test_too_short_ciphertext_fails() {
        let key = [42u8; KEY_LENGTH];
        assert!(decrypt(&key, &[0u8; NONCE_SIZE]).is_err());
    }

    #[test]
    fn test_empty_plaintext() {
        let key = [42u8; KEY_LENGTH];

        let ciphertext = encrypt(&key, b"").unwrap();
        let decrypted = decrypt(&key, &ciphertext).unwrap();

        assert_eq!(decrypted, b"");
    }

    #[test]
    fn test_field_roundtrip() {
        let key = [9u8; KEY_LENGTH];

        let envelope = encrypt_field(&key, "bank password").unwrap();
        assert_ne!(envelope, "bank password");

        let plaintext = decrypt_field(&key, &envelope).unwrap();
        assert_eq!(plaintext, "bank password");
    }

    #[test]
    fn test_field_rejects_bad_encoding() {
        let key = [9u8; KEY_LENGTH];
        assert!(decrypt_field(&key, "!!! not base64 !!!").is_err());
    }

    proptest! {
        #[test]
        fn prop_roundtrip_any_plaintext(plaintext in proptest::collection::vec(any::<u8>(), 0..512)) {
            let key = [42u8; KEY_LENGTH];
            let ciphertext = encrypt(&key, &plaintext).unwrap();
            let decrypted = decrypt(&key, &ciphertext).unwrap();
            prop_assert_eq!(decrypted, plaintext);
        }

        #[test]
        fn prop_other_key_never_decrypts(byte in 1u8..=255) {
            let key = [0u8; KEY_LENGTH];
            let other = [byte; KEY_LENGTH];
            let ciphertext = encrypt(&key, b"payload").unwrap();
            prop_assert!(decrypt(&other, &ciphertext).is_err());
        }
    }
}
