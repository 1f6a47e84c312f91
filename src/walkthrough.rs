//! Scoped-user walkthrough
//!
//! Writes and reads a sample key, provisions a user whose role only covers
//! its own key prefix, checks that restriction from the user's own session,
//! then removes the role and the user again.
//!
//! Steps are not transactional. When a step fails the error is returned and
//! whatever earlier steps created stays in the store.

use crate::auth::{AuthManager, AuthManagerError, ErrorKind, Permission, PermissionMode};
use crate::kv::{KvClient, KvError};
use crate::store::{Connector, Credentials, KeyValue, Revision, StoreError};
use secrecy::SecretString;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Names and values used by the walkthrough
#[derive(Debug, Clone)]
pub struct WalkthroughSettings {
    pub sample_key: String,
    pub sample_value: String,
    pub user: String,
    pub password: SecretString,
    pub role: String,
    /// Key inside the user's prefix
    pub scoped_key: String,
    pub scoped_value: String,
    /// Key outside the user's prefix
    pub foreign_key: String,
}

impl Default for WalkthroughSettings {
    fn default() -> Self {
        Self {
            sample_key: "sample_key".to_string(),
            sample_value: "sample_value".to_string(),
            user: "user1".to_string(),
            password: SecretString::from("123"),
            role: "role1".to_string(),
            scoped_key: "user1/123".to_string(),
            scoped_value: "value".to_string(),
            foreign_key: "user3/123".to_string(),
        }
    }
}

/// A key/value pair as shown in the report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub key: String,
    pub value: String,
}

impl From<&KeyValue> for Entry {
    fn from(kv: &KeyValue) -> Self {
        Self {
            key: kv.key_str().into_owned(),
            value: kv.value_str().into_owned(),
        }
    }
}

/// Outcome of reading outside the granted prefix
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ForeignRead {
    Denied { reason: String },
    Allowed { entries: Vec<Entry> },
}

impl ForeignRead {
    pub fn is_denied(&self) -> bool {
        matches!(self, ForeignRead::Denied { .. })
    }
}

/// What the walkthrough observed
#[derive(Debug, Clone, Serialize)]
pub struct WalkthroughReport {
    pub sample_revision: Revision,
    pub sample_entries: Vec<Entry>,
    pub grant: String,
    pub scoped_revision: Revision,
    pub foreign_read: ForeignRead,
    pub removed_role: String,
    pub removed_user: String,
}

/// Walkthrough errors
#[derive(Error, Debug)]
pub enum WalkthroughError {
    #[error("Failed to connect as {user}: {source}")]
    Connect { user: String, source: StoreError },

    #[error(transparent)]
    Kv(#[from] KvError),

    #[error(transparent)]
    Auth(#[from] AuthManagerError),
}

/// Run the walkthrough
///
/// `admin` must be allowed to manage users and roles.
pub async fn run(
    connector: &dyn Connector,
    admin: &Credentials,
    settings: &WalkthroughSettings,
    request_timeout: Duration,
) -> Result<WalkthroughReport, WalkthroughError> {
    let admin_store =
        connector
            .connect(Some(admin))
            .await
            .map_err(|source| WalkthroughError::Connect {
                user: admin.username.clone(),
                source,
            })?;

    let kv = KvClient::new(admin_store.clone()).with_request_timeout(request_timeout);
    let auth = AuthManager::new(admin_store).with_request_timeout(request_timeout);

    let sample_revision = kv.put(&settings.sample_key, &settings.sample_value).await?;
    let sample_entries: Vec<Entry> = kv
        .get(&settings.sample_key)
        .await?
        .iter()
        .map(Entry::from)
        .collect();
    for entry in &sample_entries {
        info!(key = %entry.key, value = %entry.value, "Sample entry");
    }

    auth.create_user(&settings.user, &settings.password).await?;
    auth.create_role(&settings.role).await?;
    auth.bind_user_role(&settings.user, &settings.role).await?;

    let grant = Permission::prefix(PermissionMode::ReadWrite, settings.user.as_str());
    auth.grant(&settings.role, &grant).await?;

    let user_login = Credentials {
        username: settings.user.clone(),
        password: settings.password.clone(),
    };
    let user_store =
        connector
            .connect(Some(&user_login))
            .await
            .map_err(|source| WalkthroughError::Connect {
                user: settings.user.clone(),
                source,
            })?;
    let user_kv = KvClient::new(user_store).with_request_timeout(request_timeout);

    let scoped_revision = user_kv
        .put(&settings.scoped_key, &settings.scoped_value)
        .await?;

    let foreign_read = match user_kv.get(&settings.foreign_key).await {
        Ok(entries) => {
            warn!(key = %settings.foreign_key, "Read outside the granted prefix was allowed");
            ForeignRead::Allowed {
                entries: entries.iter().map(Entry::from).collect(),
            }
        }
        Err(err) if err.kind() == ErrorKind::PermissionDenied => {
            info!(key = %settings.foreign_key, "Read outside the granted prefix denied");
            ForeignRead::Denied {
                reason: err.to_string(),
            }
        }
        Err(err) => return Err(err.into()),
    };

    auth.delete_role(&settings.role).await?;
    auth.delete_user(&settings.user).await?;

    Ok(WalkthroughReport {
        sample_revision,
        sample_entries,
        grant: grant.to_string(),
        scoped_revision,
        foreign_read,
        removed_role: settings.role.clone(),
        removed_user: settings.user.clone(),
    })
}
