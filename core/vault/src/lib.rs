//! Vault engine for Strongroom.
//!
//! This module provides:
//! - Envelope encryption of per-user master keys (SecurityService)
//! - The sign-in state machine with lockout accounting (SignInHandler)
//! - Session-scoped master key caching (SessionSignInManager, MekStore)
//! - Field-level protection for crypto-agnostic managers (DataProtector)
//! - Named-secret management (SecretManager)
//!
//! # Architecture
//! The vault module sits between transport front ends and the repository
//! layer, handling all credential verification and encryption transparently.
//! Key material only ever exists in memory here; repositories and session
//! stores see ciphertext.

pub mod keyfile;
pub mod protect;
pub mod secrets;
pub mod security;
pub mod session;
pub mod signin;

pub use keyfile::{FileTransportKeys, StaticTransportKeys, TransportKeyProvider};
pub use protect::{DataProtector, PasswordDataProtector, SessionDataProtector};
pub use secrets::{SecretEntry, SecretManager};
pub use security::SecurityService;
pub use session::{
    MekStore, MemorySessionStore, SessionConfig, SessionId, SessionMekStore,
    SessionSignInManager, SessionStore,
};
pub use signin::{SignInHandler, SignInPolicy, SignInRequest, SignInSuccess};
