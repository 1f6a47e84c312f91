//! kvwarden - user, role and permission management for etcd
//!
//! kvwarden wraps etcd's auth API in a small facade: users and roles are
//! created idempotently, roles are granted read/write access over key
//! ranges or prefixes, and every store call runs under its own deadline.
//! Failures come back as typed errors; nothing here terminates the process.

pub mod auth;
pub mod config;
pub mod kv;
pub mod store;
pub mod walkthrough;

use thiserror::Error;

pub use auth::{AuthManager, AuthManagerError, ErrorKind, Permission, PermissionMode};
pub use kv::{KvClient, KvError};
pub use store::{Connector, Credentials, EtcdConnector, MemoryStore, StoreClient, StoreError};

/// Core error types for kvwarden
#[derive(Error, Debug)]
pub enum KvWardenError {
    #[error("Store error: {0}")]
    Store(#[from] store::StoreError),

    #[error("Auth error: {0}")]
    Auth(#[from] auth::AuthManagerError),

    #[error("KV error: {0}")]
    Kv(#[from] kv::KvError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Walkthrough failed: {0}")]
    Walkthrough(#[from] walkthrough::WalkthroughError),
}

impl KvWardenError {
    /// Classification of the underlying store failure, if there is one
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            KvWardenError::Store(e) => Some(auth::classify(e)),
            KvWardenError::Auth(e) => Some(e.kind()),
            KvWardenError::Kv(e) => Some(e.kind()),
            KvWardenError::Config(_) => None,
            KvWardenError::Walkthrough(e) => match e {
                walkthrough::WalkthroughError::Connect { source, .. } => Some(auth::classify(source)),
                walkthrough::WalkthroughError::Kv(e) => Some(e.kind()),
                walkthrough::WalkthroughError::Auth(e) => Some(e.kind()),
            },
        }
    }
}
