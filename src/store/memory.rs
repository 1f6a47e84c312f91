//! In-process store
//!
//! Keeps keys, users and roles in memory and enforces etcd's auth rules,
//! including its status codes and error texts. Every handle shares the same
//! state; a handle acts as the user it was opened for.

use super::{
    Connector, Credentials, GetScope, KeyValue, Revision, StatusCode, StoreClient, StoreError,
};
use crate::auth::{prefix_range_end, Permission, RoleInfo, UserInfo, ALL_KEYS_FROM};
use async_trait::async_trait;
use parking_lot::RwLock;
use secrecy::{ExposeSecret, SecretString};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Built-in administrator
pub const ROOT_USER: &str = "root";
/// Role granting full access
pub const ROOT_ROLE: &str = "root";

fn user_empty() -> StoreError {
    StoreError::status(StatusCode::InvalidArgument, "etcdserver: user name is empty")
}

fn role_empty() -> StoreError {
    StoreError::status(StatusCode::InvalidArgument, "etcdserver: role name is empty")
}

fn auth_failed() -> StoreError {
    StoreError::status(
        StatusCode::InvalidArgument,
        "etcdserver: authentication failed, invalid user ID or password",
    )
}

fn permission_denied() -> StoreError {
    StoreError::status(StatusCode::PermissionDenied, "etcdserver: permission denied")
}

fn user_exists() -> StoreError {
    StoreError::status(
        StatusCode::FailedPrecondition,
        "etcdserver: user name already exists",
    )
}

fn user_not_found() -> StoreError {
    StoreError::status(StatusCode::FailedPrecondition, "etcdserver: user name not found")
}

fn role_exists() -> StoreError {
    StoreError::status(
        StatusCode::FailedPrecondition,
        "etcdserver: role name already exists",
    )
}

fn role_not_found() -> StoreError {
    StoreError::status(StatusCode::FailedPrecondition, "etcdserver: role name not found")
}

fn invalid_auth_management() -> StoreError {
    StoreError::status(
        StatusCode::FailedPrecondition,
        "etcdserver: invalid auth management",
    )
}

struct MemoryUser {
    password: SecretString,
    roles: BTreeSet<String>,
}

/// Shared store contents
struct MemoryState {
    revision: Revision,
    data: BTreeMap<Vec<u8>, Vec<u8>>,
    users: BTreeMap<String, MemoryUser>,
    /// Role name -> grants, ordered by (key, range_end)
    roles: BTreeMap<String, Vec<Permission>>,
}

impl MemoryState {
    fn is_root(&self, user: &str) -> bool {
        self.users
            .get(user)
            .map(|u| u.roles.contains(ROOT_ROLE))
            .unwrap_or(false)
    }
}

/// In-memory store with etcd auth semantics
#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
    /// User this handle acts as; `None` for an unauthenticated handle
    principal: Option<String>,
}

impl MemoryStore {
    /// Create an empty store with a `root` user, returning a root handle
    ///
    /// The revision starts at 1, as on a fresh etcd cluster.
    pub fn new(root_password: SecretString) -> Self {
        let mut roles = BTreeMap::new();
        roles.insert(ROOT_ROLE.to_string(), Vec::new());

        let mut users = BTreeMap::new();
        users.insert(
            ROOT_USER.to_string(),
            MemoryUser {
                password: root_password,
                roles: [ROOT_ROLE.to_string()].into_iter().collect(),
            },
        );

        let state = MemoryState {
            revision: 1,
            data: BTreeMap::new(),
            users,
            roles,
        };

        Self {
            state: Arc::new(RwLock::new(state)),
            principal: Some(ROOT_USER.to_string()),
        }
    }

    /// Open a handle authenticated as another user
    pub fn session(&self, credentials: &Credentials) -> Result<MemoryStore, StoreError> {
        if credentials.username.is_empty() {
            return Err(user_empty());
        }

        let state = self.state.read();
        let authenticated = state
            .users
            .get(&credentials.username)
            .map(|u| u.password.expose_secret() == credentials.password.expose_secret())
            .unwrap_or(false);
        if !authenticated {
            return Err(auth_failed());
        }

        Ok(Self {
            state: self.state.clone(),
            principal: Some(credentials.username.clone()),
        })
    }

    /// Open a handle with no identity
    pub fn anonymous(&self) -> MemoryStore {
        Self {
            state: self.state.clone(),
            principal: None,
        }
    }

    /// User this handle acts as
    pub fn principal(&self) -> Option<&str> {
        self.principal.as_deref()
    }

    /// Current store revision
    pub fn revision(&self) -> Revision {
        self.state.read().revision
    }

    fn require_principal(&self) -> Result<&str, StoreError> {
        self.principal.as_deref().ok_or_else(user_empty)
    }

    fn check_admin(&self, state: &MemoryState) -> Result<(), StoreError> {
        let user = self.require_principal()?;
        if state.is_root(user) {
            Ok(())
        } else {
            Err(permission_denied())
        }
    }

    fn check_range(
        &self,
        state: &MemoryState,
        key: &[u8],
        range_end: &[u8],
        write: bool,
    ) -> Result<(), StoreError> {
        let user = self.require_principal()?;
        let Some(record) = state.users.get(user) else {
            return Err(permission_denied());
        };
        if record.roles.contains(ROOT_ROLE) {
            return Ok(());
        }

        let allowed = record
            .roles
            .iter()
            .filter_map(|role| state.roles.get(role))
            .flatten()
            .any(|perm| perm.allows(key, range_end, write));

        if allowed {
            Ok(())
        } else {
            Err(permission_denied())
        }
    }
}

#[async_trait]
impl StoreClient for MemoryStore {
    async fn put(&self, key: &str, value: &str) -> Result<Revision, StoreError> {
        let mut state = self.state.write();
        self.check_range(&state, key.as_bytes(), b"", true)?;

        state.revision += 1;
        state
            .data
            .insert(key.as_bytes().to_vec(), value.as_bytes().to_vec());
        Ok(state.revision)
    }

    async fn get(&self, key: &str, scope: GetScope) -> Result<Vec<KeyValue>, StoreError> {
        let state = self.state.read();
        let key = key.as_bytes();

        match scope {
            GetScope::Key => {
                self.check_range(&state, key, b"", false)?;
                Ok(state
                    .data
                    .get(key)
                    .map(|value| vec![KeyValue::new(key, value.as_slice())])
                    .unwrap_or_default())
            }
            GetScope::Prefix => {
                let end = prefix_range_end(key);
                self.check_range(&state, key, &end, false)?;

                let entries = if end == ALL_KEYS_FROM {
                    state
                        .data
                        .range(key.to_vec()..)
                        .map(|(k, v)| KeyValue::new(k.as_slice(), v.as_slice()))
                        .collect()
                } else {
                    state
                        .data
                        .range(key.to_vec()..end)
                        .map(|(k, v)| KeyValue::new(k.as_slice(), v.as_slice()))
                        .collect()
                };
                Ok(entries)
            }
        }
    }

    async fn user_add(&self, name: &str, password: &SecretString) -> Result<(), StoreError> {
        let mut state = self.state.write();
        self.check_admin(&state)?;

        if name.is_empty() {
            return Err(user_empty());
        }
        if state.users.contains_key(name) {
            return Err(user_exists());
        }

        state.users.insert(
            name.to_string(),
            MemoryUser {
                password: password.clone(),
                roles: BTreeSet::new(),
            },
        );
        Ok(())
    }

    async fn user_delete(&self, name: &str) -> Result<(), StoreError> {
        let mut state = self.state.write();
        self.check_admin(&state)?;

        if name == ROOT_USER {
            return Err(invalid_auth_management());
        }
        state.users.remove(name).map(|_| ()).ok_or_else(user_not_found)
    }

    async fn user_grant_role(&self, name: &str, role: &str) -> Result<(), StoreError> {
        let mut state = self.state.write();
        self.check_admin(&state)?;

        if !state.roles.contains_key(role) {
            return Err(role_not_found());
        }
        let user = state.users.get_mut(name).ok_or_else(user_not_found)?;
        // Re-granting a held role is accepted without change
        user.roles.insert(role.to_string());
        Ok(())
    }

    async fn user_get(&self, name: &str) -> Result<UserInfo, StoreError> {
        let state = self.state.read();
        self.check_admin(&state)?;

        let user = state.users.get(name).ok_or_else(user_not_found)?;
        Ok(UserInfo {
            name: name.to_string(),
            roles: user.roles.iter().cloned().collect(),
        })
    }

    async fn user_list(&self) -> Result<Vec<String>, StoreError> {
        let state = self.state.read();
        self.check_admin(&state)?;
        Ok(state.users.keys().cloned().collect())
    }

    async fn role_add(&self, name: &str) -> Result<(), StoreError> {
        let mut state = self.state.write();
        self.check_admin(&state)?;

        if name.is_empty() {
            return Err(role_empty());
        }
        if state.roles.contains_key(name) {
            return Err(role_exists());
        }
        state.roles.insert(name.to_string(), Vec::new());
        Ok(())
    }

    async fn role_delete(&self, name: &str) -> Result<(), StoreError> {
        let mut state = self.state.write();
        self.check_admin(&state)?;

        if name == ROOT_ROLE {
            return Err(invalid_auth_management());
        }
        if state.roles.remove(name).is_none() {
            return Err(role_not_found());
        }
        for user in state.users.values_mut() {
            user.roles.remove(name);
        }
        Ok(())
    }

    async fn role_grant_permission(
        &self,
        name: &str,
        permission: &Permission,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write();
        self.check_admin(&state)?;

        let grants = state.roles.get_mut(name).ok_or_else(role_not_found)?;
        // Same range replaces the existing mode
        match grants
            .iter_mut()
            .find(|p| p.key == permission.key && p.range_end == permission.range_end)
        {
            Some(existing) => existing.mode = permission.mode,
            None => {
                grants.push(permission.clone());
                grants.sort_by(|a, b| a.key.cmp(&b.key).then_with(|| a.range_end.cmp(&b.range_end)));
            }
        }
        Ok(())
    }

    async fn role_get(&self, name: &str) -> Result<RoleInfo, StoreError> {
        let state = self.state.read();
        self.check_admin(&state)?;

        let grants = state.roles.get(name).ok_or_else(role_not_found)?;
        Ok(RoleInfo {
            name: name.to_string(),
            permissions: grants.clone(),
        })
    }

    async fn role_list(&self) -> Result<Vec<String>, StoreError> {
        let state = self.state.read();
        self.check_admin(&state)?;
        Ok(state.roles.keys().cloned().collect())
    }
}

#[async_trait]
impl Connector for MemoryStore {
    async fn connect(
        &self,
        credentials: Option<&Credentials>,
    ) -> Result<Arc<dyn StoreClient>, StoreError> {
        let handle = match credentials {
            Some(creds) => self.session(creds)?,
            None => self.anonymous(),
        };
        Ok(Arc::new(handle))
    }
}
