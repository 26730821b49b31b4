//! Common error types for Strongroom.

use thiserror::Error;

/// Top-level error type for Strongroom operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Caller supplied empty or malformed data.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Credentials did not check out. The message is intentionally generic.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The account state forbids the operation (locked, inactive, lockout).
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Cryptographic operation failed (integrity, tamper, wrong key).
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// No encryption key could be obtained for the operation.
    #[error("Key unavailable: {0}")]
    KeyUnavailable(String),

    /// Persistence collaborator failed.
    #[error("Database error: {0}")]
    Database(String),

    /// Internal invariant violation or collaborator misbehavior.
    #[error("Internal error: {0}")]
    Internal(String),

    /// A collaborator reported non-error-but-unsuccessful, e.g. an update
    /// that affected zero rows.
    #[error("Operation failed: {0}")]
    OperationFailed(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// User-safe message for transport responses.
    ///
    /// Technical detail stays in internal logs; `Unauthorized` always maps
    /// to the same generic phrase so responses never reveal whether a
    /// username exists, and internal failures never leak their cause.
    pub fn user_message(&self) -> String {
        match self {
            Error::InvalidInput(msg) => msg.clone(),
            Error::Unauthorized(_) => "Invalid username or password.".to_string(),
            Error::Forbidden(msg) => msg.clone(),
            Error::NotFound(msg) => msg.clone(),
            Error::AlreadyExists(msg) => msg.clone(),
            Error::KeyUnavailable(_) => "No encryption key is available.".to_string(),
            Error::Crypto(_)
            | Error::Database(_)
            | Error::Internal(_)
            | Error::OperationFailed(_)
            | Error::Io(_)
            | Error::Serialization(_) => "An internal error occurred.".to_string(),
        }
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
