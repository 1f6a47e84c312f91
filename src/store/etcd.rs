//! etcd v3 store binding
//!
//! Maps the [`StoreClient`] surface onto `etcd-client`.

use super::{
    Connector, Credentials, GetScope, KeyValue, Revision, StatusCode, StoreClient, StoreError,
};
use crate::auth::{Permission, PermissionMode, RoleInfo, UserInfo};
use async_trait::async_trait;
use etcd_client::{Client, ConnectOptions, GetOptions, PermissionType};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

impl From<etcd_client::Error> for StoreError {
    fn from(err: etcd_client::Error) -> Self {
        match err {
            etcd_client::Error::GRpcStatus(status) => StoreError::Status {
                code: status.code().into(),
                message: status.message().to_string(),
            },
            etcd_client::Error::TransportError(e) => StoreError::Unavailable(e.to_string()),
            etcd_client::Error::IoError(e) => StoreError::Unavailable(e.to_string()),
            other => StoreError::Other(other.to_string()),
        }
    }
}

impl From<PermissionMode> for PermissionType {
    fn from(mode: PermissionMode) -> Self {
        match mode {
            PermissionMode::Read => PermissionType::Read,
            PermissionMode::Write => PermissionType::Write,
            PermissionMode::ReadWrite => PermissionType::Readwrite,
        }
    }
}

fn mode_from_wire(value: i32) -> Result<PermissionMode, StoreError> {
    match value {
        0 => Ok(PermissionMode::Read),
        1 => Ok(PermissionMode::Write),
        2 => Ok(PermissionMode::ReadWrite),
        other => Err(StoreError::Other(format!(
            "unknown permission type {} in store response",
            other
        ))),
    }
}

/// Store client backed by an etcd cluster
#[derive(Clone)]
pub struct EtcdStore {
    client: Client,
}

impl EtcdStore {
    /// Dial the cluster, authenticating when credentials are given
    pub async fn connect(
        endpoints: &[String],
        dial_timeout: Duration,
        credentials: Option<&Credentials>,
    ) -> Result<Self, StoreError> {
        let mut options = ConnectOptions::new().with_connect_timeout(dial_timeout);
        if let Some(creds) = credentials {
            options = options.with_user(
                creds.username.clone(),
                creds.password.expose_secret().to_string(),
            );
        }

        debug!(endpoints = ?endpoints, "Dialing etcd");
        let dial = Client::connect(endpoints, Some(options));
        let client = match tokio::time::timeout(dial_timeout, dial).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(StoreError::Unavailable(format!(
                    "dial {:?} timed out after {:?}",
                    endpoints, dial_timeout
                )))
            }
        };

        Ok(Self { client })
    }

    /// Wrap an already connected client
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StoreClient for EtcdStore {
    async fn put(&self, key: &str, value: &str) -> Result<Revision, StoreError> {
        let mut client = self.client.clone();
        let resp = client.put(key, value, None).await?;
        resp.header()
            .map(|h| h.revision())
            .ok_or_else(|| StoreError::Other("put response carried no header".to_string()))
    }

    async fn get(&self, key: &str, scope: GetScope) -> Result<Vec<KeyValue>, StoreError> {
        let mut client = self.client.clone();
        let options = match scope {
            GetScope::Key => None,
            GetScope::Prefix => Some(GetOptions::new().with_prefix()),
        };
        let resp = client.get(key, options).await?;
        Ok(resp
            .kvs()
            .iter()
            .map(|kv| KeyValue::new(kv.key(), kv.value()))
            .collect())
    }

    async fn user_add(&self, name: &str, password: &SecretString) -> Result<(), StoreError> {
        let mut client = self.client.clone();
        client
            .user_add(name, password.expose_secret().to_string(), None)
            .await?;
        Ok(())
    }

    async fn user_delete(&self, name: &str) -> Result<(), StoreError> {
        let mut client = self.client.clone();
        client.user_delete(name).await?;
        Ok(())
    }

    async fn user_grant_role(&self, name: &str, role: &str) -> Result<(), StoreError> {
        let mut client = self.client.clone();
        client.user_grant_role(name, role).await?;
        Ok(())
    }

    async fn user_get(&self, name: &str) -> Result<UserInfo, StoreError> {
        let mut client = self.client.clone();
        let resp = client.user_get(name).await?;
        Ok(UserInfo {
            name: name.to_string(),
            roles: resp.roles().to_vec(),
        })
    }

    async fn user_list(&self) -> Result<Vec<String>, StoreError> {
        let mut client = self.client.clone();
        let resp = client.user_list().await?;
        Ok(resp.users().to_vec())
    }

    async fn role_add(&self, name: &str) -> Result<(), StoreError> {
        let mut client = self.client.clone();
        client.role_add(name).await?;
        Ok(())
    }

    async fn role_delete(&self, name: &str) -> Result<(), StoreError> {
        let mut client = self.client.clone();
        client.role_delete(name).await?;
        Ok(())
    }

    async fn role_grant_permission(
        &self,
        name: &str,
        permission: &Permission,
    ) -> Result<(), StoreError> {
        let mut perm =
            etcd_client::Permission::new(permission.mode.into(), permission.key.clone());
        if !permission.range_end.is_empty() {
            perm = perm.with_range_end(permission.range_end.clone());
        }

        let mut client = self.client.clone();
        client.role_grant_permission(name, perm).await?;
        Ok(())
    }

    async fn role_get(&self, name: &str) -> Result<RoleInfo, StoreError> {
        let mut client = self.client.clone();
        let resp = client.role_get(name).await?;
        let permissions = resp
            .permissions()
            .iter()
            .map(|p| {
                Ok(Permission::new(mode_from_wire(p.get_type())?, p.key())
                    .with_range_end(p.range_end()))
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        Ok(RoleInfo {
            name: name.to_string(),
            permissions,
        })
    }

    async fn role_list(&self) -> Result<Vec<String>, StoreError> {
        let mut client = self.client.clone();
        let resp = client.role_list().await?;
        Ok(resp.roles().to_vec())
    }
}

/// Opens [`EtcdStore`] clients against a fixed endpoint list
#[derive(Debug, Clone)]
pub struct EtcdConnector {
    endpoints: Vec<String>,
    dial_timeout: Duration,
}

impl EtcdConnector {
    pub fn new(endpoints: Vec<String>, dial_timeout: Duration) -> Self {
        Self {
            endpoints,
            dial_timeout,
        }
    }
}

#[async_trait]
impl Connector for EtcdConnector {
    async fn connect(
        &self,
        credentials: Option<&Credentials>,
    ) -> Result<Arc<dyn StoreClient>, StoreError> {
        let store = EtcdStore::connect(&self.endpoints, self.dial_timeout, credentials).await?;
        Ok(Arc::new(store))
    }
}
