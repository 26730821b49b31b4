//! Cryptographic primitives for Strongroom.
//!
//! This module provides:
//! - Password hashing and key derivation using Argon2id
//! - Authenticated encryption using XChaCha20-Poly1305
//! - Secure key management with automatic zeroization
//!
//! # Security Guarantees
//! - All key material is automatically zeroized on drop
//! - No plaintext or key material is ever logged
//! - Constant-time operations for sensitive comparisons

pub mod aead;
pub mod hash;
pub mod kdf;
pub mod keys;

pub use aead::{decrypt, decrypt_field, decrypt_from_text, encrypt, encrypt_field, encrypt_to_text};
pub use hash::{hash_password, verify_password};
pub use kdf::{derive_key, KdfParams};
pub use keys::{MasterKey, PasswordKey, Salt, KEY_LENGTH, SALT_LENGTH};
