//! Data-plane access: bounded put/get against the store

use crate::auth::{classify, ErrorKind, DEFAULT_REQUEST_TIMEOUT};
use crate::store::{with_deadline, GetScope, KeyValue, Revision, StoreClient, StoreError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Data-plane errors
#[derive(Error, Debug)]
pub enum KvError {
    #[error("put {key} failed: {source}")]
    Put { key: String, source: StoreError },

    #[error("get {key} failed: {source}")]
    Get { key: String, source: StoreError },
}

impl KvError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            KvError::Put { source, .. } | KvError::Get { source, .. } => classify(source),
        }
    }
}

/// Put/get facade with a per-call deadline
#[derive(Clone)]
pub struct KvClient {
    store: Arc<dyn StoreClient>,
    request_timeout: Duration,
}

impl KvClient {
    pub fn new(store: Arc<dyn StoreClient>) -> Self {
        Self {
            store,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Write a key and return the store revision after the write
    pub async fn put(&self, key: &str, value: &str) -> Result<Revision, KvError> {
        let revision = with_deadline(self.request_timeout, self.store.put(key, value))
            .await
            .map_err(|source| KvError::Put {
                key: key.to_string(),
                source,
            })?;
        info!(key = %key, revision, "Current revision");
        Ok(revision)
    }

    /// Read a single key
    pub async fn get(&self, key: &str) -> Result<Vec<KeyValue>, KvError> {
        self.read(key, GetScope::Key).await
    }

    /// Read every key under a prefix
    pub async fn get_prefix(&self, prefix: &str) -> Result<Vec<KeyValue>, KvError> {
        self.read(prefix, GetScope::Prefix).await
    }

    async fn read(&self, key: &str, scope: GetScope) -> Result<Vec<KeyValue>, KvError> {
        let entries = with_deadline(self.request_timeout, self.store.get(key, scope))
            .await
            .map_err(|source| KvError::Get {
                key: key.to_string(),
                source,
            })?;
        for kv in &entries {
            debug!(key = %kv.key_str(), value = %kv.value_str(), "Read");
        }
        Ok(entries)
    }
}
