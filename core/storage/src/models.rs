//! Persisted record types.
//!
//! These are storage-layer shapes: every sensitive field is either a
//! digest, a salt, or ciphertext produced upstream. Nothing here can be
//! decrypted without key material the store never sees.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use strongroom_common::UserId;
use strongroom_crypto::Salt;

/// A user account with its security material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Stable account identifier.
    pub id: UserId,
    /// Unique sign-in name.
    pub username: String,
    /// Display name for presentation.
    pub display_name: String,
    /// Base64 Argon2id digest of the password.
    pub password_hash: String,
    /// Salt the password digest was derived under.
    pub password_salt: Salt,
    /// The master key wrapped by the password-derived key (base64 envelope).
    ///
    /// Only decryptable by re-deriving the PDK from the *current* password
    /// and `pdk_salt`; a password change re-wraps this envelope.
    pub encrypted_master_key: String,
    /// Salt for password-derived-key derivation (independent of
    /// `password_salt`).
    pub pdk_salt: Salt,
    /// Whether the account may sign in at all.
    pub is_active: bool,
    /// Whether the account is locked (manually or by lockout).
    pub is_locked: bool,
    /// Account creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Client metadata attached to a sign-in attempt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Remote address, if the transport knows one.
    pub address: Option<String>,
    /// User agent or tool identifier.
    pub user_agent: Option<String>,
}

impl ClientInfo {
    /// Client info for a local administrative tool.
    pub fn local_tool(name: &str) -> Self {
        Self {
            address: None,
            user_agent: Some(name.to_string()),
        }
    }
}

/// Append-only audit record of one sign-in attempt.
///
/// Every attempt produces exactly one record, including attempts against
/// nonexistent usernames (those carry no user id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignInHistoryItem {
    /// Record identifier.
    pub id: String,
    /// The account the attempt resolved to, if any.
    pub user_id: Option<UserId>,
    /// Username as supplied by the client.
    pub username: String,
    /// When the attempt was processed.
    pub timestamp: DateTime<Utc>,
    /// Client metadata.
    pub client: ClientInfo,
    /// Whether the attempt succeeded.
    pub success: bool,
    /// Denial reason for failed attempts.
    pub failure_reason: Option<String>,
}

/// A named secret belonging to one user.
///
/// Both `name` and `value` are ciphertext envelopes; the plaintext shape
/// is the concern of the owning manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretRecord {
    /// Record identifier.
    pub id: String,
    /// Owning user.
    pub user_id: UserId,
    /// Encrypted secret name.
    pub name: String,
    /// Encrypted secret value.
    pub value: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}
