//! Store client abstraction
//!
//! The KV+Auth surface kvwarden needs from the backing store, and the
//! connector used to open a client under a given identity.

mod etcd;
mod memory;

pub use etcd::{EtcdConnector, EtcdStore};
pub use memory::MemoryStore;

use crate::auth::{Permission, RoleInfo, UserInfo};
use async_trait::async_trait;
use secrecy::SecretString;
use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Store-assigned counter, bumped by every successful write
pub type Revision = i64;

/// Status code attached to a rejected store request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    AlreadyExists,
    NotFound,
    PermissionDenied,
    Unauthenticated,
    FailedPrecondition,
    InvalidArgument,
    DeadlineExceeded,
    Unavailable,
    Other,
}

impl From<tonic::Code> for StatusCode {
    fn from(code: tonic::Code) -> Self {
        match code {
            tonic::Code::AlreadyExists => StatusCode::AlreadyExists,
            tonic::Code::NotFound => StatusCode::NotFound,
            tonic::Code::PermissionDenied => StatusCode::PermissionDenied,
            tonic::Code::Unauthenticated => StatusCode::Unauthenticated,
            tonic::Code::FailedPrecondition => StatusCode::FailedPrecondition,
            tonic::Code::InvalidArgument => StatusCode::InvalidArgument,
            tonic::Code::DeadlineExceeded => StatusCode::DeadlineExceeded,
            tonic::Code::Unavailable => StatusCode::Unavailable,
            _ => StatusCode::Other,
        }
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusCode::AlreadyExists => write!(f, "already_exists"),
            StatusCode::NotFound => write!(f, "not_found"),
            StatusCode::PermissionDenied => write!(f, "permission_denied"),
            StatusCode::Unauthenticated => write!(f, "unauthenticated"),
            StatusCode::FailedPrecondition => write!(f, "failed_precondition"),
            StatusCode::InvalidArgument => write!(f, "invalid_argument"),
            StatusCode::DeadlineExceeded => write!(f, "deadline_exceeded"),
            StatusCode::Unavailable => write!(f, "unavailable"),
            StatusCode::Other => write!(f, "other"),
        }
    }
}

/// Store-related errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{message} ({code})")]
    Status { code: StatusCode, message: String },

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Store error: {0}")]
    Other(String),
}

impl StoreError {
    /// Build a status error
    pub fn status(code: StatusCode, message: impl Into<String>) -> Self {
        StoreError::Status {
            code,
            message: message.into(),
        }
    }

    /// Structured status code, if the store sent one
    pub fn code(&self) -> Option<StatusCode> {
        match self {
            StoreError::Status { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// A key/value pair returned by a read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl KeyValue {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn key_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.key)
    }

    pub fn value_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.value)
    }
}

/// How a read interprets its key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetScope {
    /// Exactly the given key
    Key,
    /// Every key starting with the given key
    Prefix,
}

/// Login used when opening a client
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }
}

/// KV+Auth operations offered by the backing store
///
/// Calls are not bounded by this trait; callers wrap them with
/// [`with_deadline`].
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Write a key, returning the store revision after the write
    async fn put(&self, key: &str, value: &str) -> Result<Revision, StoreError>;

    /// Point or prefix read
    async fn get(&self, key: &str, scope: GetScope) -> Result<Vec<KeyValue>, StoreError>;

    // ==================== Users ====================

    async fn user_add(&self, name: &str, password: &SecretString) -> Result<(), StoreError>;

    async fn user_delete(&self, name: &str) -> Result<(), StoreError>;

    async fn user_grant_role(&self, name: &str, role: &str) -> Result<(), StoreError>;

    async fn user_get(&self, name: &str) -> Result<UserInfo, StoreError>;

    async fn user_list(&self) -> Result<Vec<String>, StoreError>;

    // ==================== Roles ====================

    async fn role_add(&self, name: &str) -> Result<(), StoreError>;

    async fn role_delete(&self, name: &str) -> Result<(), StoreError>;

    async fn role_grant_permission(
        &self,
        name: &str,
        permission: &Permission,
    ) -> Result<(), StoreError>;

    async fn role_get(&self, name: &str) -> Result<RoleInfo, StoreError>;

    async fn role_list(&self) -> Result<Vec<String>, StoreError>;
}

/// Opens store clients under a given identity
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect, authenticating when credentials are given
    async fn connect(
        &self,
        credentials: Option<&Credentials>,
    ) -> Result<Arc<dyn StoreClient>, StoreError>;
}

/// Run one store call under its own deadline
pub async fn with_deadline<T, F>(budget: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(budget, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(budget)),
    }
}
