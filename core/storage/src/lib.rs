//! Persistence abstraction for Strongroom.
//!
//! This module provides trait-based repository interfaces for users,
//! sign-in history, and secrets, plus two concrete implementations: an
//! in-memory store for tests and a local JSON-file store for the CLI.
//!
//! # Design Principles
//! - Repositories operate on already-encrypted fields and raw flags only;
//!   no cryptographic logic lives here
//! - The sign-in history is append-only; records are never mutated
//! - Async operations: all repository calls are async

pub mod local;
pub mod memory;
pub mod models;
pub mod repository;

pub use local::JsonFileStore;
pub use memory::MemoryStore;
pub use models::{ClientInfo, SecretRecord, SignInHistoryItem, User};
pub use repository::{SecretRepository, SignInHistoryRepository, UserRepository};
