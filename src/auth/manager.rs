//! Authorization manager for kvwarden
//!
//! Idempotent user, role and permission management over a [`StoreClient`].
//! The manager keeps no state of its own; every call goes to the store.

use super::classify::{classify, is_already_exists, ErrorKind};
use super::types::{Permission, PermissionMode, RoleInfo, UserInfo};
use crate::store::{with_deadline, StoreClient, StoreError};
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Budget applied to each store call unless configured otherwise
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

/// Manager operation, carried by errors and log events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreateUser,
    CreateRole,
    BindUserRole,
    GrantPermission,
    DeleteRole,
    DeleteUser,
    UserInfo,
    RoleInfo,
    ListUsers,
    ListRoles,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::CreateUser => write!(f, "create user"),
            Operation::CreateRole => write!(f, "create role"),
            Operation::BindUserRole => write!(f, "bind user role"),
            Operation::GrantPermission => write!(f, "grant permission"),
            Operation::DeleteRole => write!(f, "delete role"),
            Operation::DeleteUser => write!(f, "delete user"),
            Operation::UserInfo => write!(f, "get user"),
            Operation::RoleInfo => write!(f, "get role"),
            Operation::ListUsers => write!(f, "list users"),
            Operation::ListRoles => write!(f, "list roles"),
        }
    }
}

/// Authorization manager errors
#[derive(Error, Debug)]
pub enum AuthManagerError {
    #[error("{operation} failed, store unreachable: {source}")]
    RemoteUnavailable {
        operation: Operation,
        source: StoreError,
    },

    #[error("{operation} timed out: {source}")]
    Timeout {
        operation: Operation,
        source: StoreError,
    },

    #[error("{operation} denied: {source}")]
    PermissionDenied {
        operation: Operation,
        source: StoreError,
    },

    #[error("{operation} failed, not found: {source}")]
    NotFound {
        operation: Operation,
        source: StoreError,
    },

    #[error("{operation} failed, conflict: {source}")]
    Conflict {
        operation: Operation,
        source: StoreError,
    },

    #[error("{operation} failed: {source}")]
    Unknown {
        operation: Operation,
        source: StoreError,
    },
}

impl AuthManagerError {
    fn from_store(operation: Operation, source: StoreError) -> Self {
        match classify(&source) {
            ErrorKind::RemoteUnavailable => AuthManagerError::RemoteUnavailable { operation, source },
            ErrorKind::Timeout => AuthManagerError::Timeout { operation, source },
            ErrorKind::PermissionDenied => AuthManagerError::PermissionDenied { operation, source },
            ErrorKind::NotFound => AuthManagerError::NotFound { operation, source },
            ErrorKind::ConflictIgnorable => AuthManagerError::Conflict { operation, source },
            ErrorKind::Unknown => AuthManagerError::Unknown { operation, source },
        }
    }

    /// Classification of the underlying failure
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthManagerError::RemoteUnavailable { .. } => ErrorKind::RemoteUnavailable,
            AuthManagerError::Timeout { .. } => ErrorKind::Timeout,
            AuthManagerError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            AuthManagerError::NotFound { .. } => ErrorKind::NotFound,
            AuthManagerError::Conflict { .. } => ErrorKind::ConflictIgnorable,
            AuthManagerError::Unknown { .. } => ErrorKind::Unknown,
        }
    }

    /// The operation that failed
    pub fn operation(&self) -> Operation {
        match self {
            AuthManagerError::RemoteUnavailable { operation, .. }
            | AuthManagerError::Timeout { operation, .. }
            | AuthManagerError::PermissionDenied { operation, .. }
            | AuthManagerError::NotFound { operation, .. }
            | AuthManagerError::Conflict { operation, .. }
            | AuthManagerError::Unknown { operation, .. } => *operation,
        }
    }

    /// The store error behind this failure
    pub fn store_error(&self) -> &StoreError {
        match self {
            AuthManagerError::RemoteUnavailable { source, .. }
            | AuthManagerError::Timeout { source, .. }
            | AuthManagerError::PermissionDenied { source, .. }
            | AuthManagerError::NotFound { source, .. }
            | AuthManagerError::Conflict { source, .. }
            | AuthManagerError::Unknown { source, .. } => source,
        }
    }
}

/// Result type for auth manager operations
pub type AuthResult<T> = Result<T, AuthManagerError>;

/// Manages users, roles and grants in the backing store
///
/// Multi-step sequences are not atomic: if a later step fails, entities
/// created by earlier steps stay in the store.
#[derive(Clone)]
pub struct AuthManager {
    store: Arc<dyn StoreClient>,
    request_timeout: Duration,
}

impl AuthManager {
    /// Create a manager over an admin store client
    pub fn new(store: Arc<dyn StoreClient>) -> Self {
        Self {
            store,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Override the per-call time budget
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Treat an "already exists" outcome as success
    fn absorb_conflict(
        operation: Operation,
        subject: &str,
        outcome: Result<(), StoreError>,
    ) -> AuthResult<()> {
        match outcome {
            Ok(()) => Ok(()),
            Err(err) if is_already_exists(&err) => {
                info!(operation = %operation, subject = %subject, "Already present, skipping");
                Ok(())
            }
            Err(err) => Err(AuthManagerError::from_store(operation, err)),
        }
    }

    // ==================== Users ====================

    /// Create a user; an existing user is left untouched
    pub async fn create_user(&self, user: &str, secret: &SecretString) -> AuthResult<()> {
        let outcome = with_deadline(self.request_timeout, self.store.user_add(user, secret)).await;
        Self::absorb_conflict(Operation::CreateUser, user, outcome)?;
        debug!(user = %user, "User ensured");
        Ok(())
    }

    /// Delete a user
    pub async fn delete_user(&self, user: &str) -> AuthResult<()> {
        with_deadline(self.request_timeout, self.store.user_delete(user))
            .await
            .map_err(|e| AuthManagerError::from_store(Operation::DeleteUser, e))?;
        info!(user = %user, "User deleted");
        Ok(())
    }

    /// Bind a user to a role; an existing binding is left untouched
    pub async fn bind_user_role(&self, user: &str, role: &str) -> AuthResult<()> {
        let outcome = with_deadline(
            self.request_timeout,
            self.store.user_grant_role(user, role),
        )
        .await;
        let subject = format!("{}:{}", user, role);
        Self::absorb_conflict(Operation::BindUserRole, &subject, outcome)?;
        debug!(user = %user, role = %role, "Role bound");
        Ok(())
    }

    /// Read a user's bound roles
    pub async fn user_info(&self, user: &str) -> AuthResult<UserInfo> {
        with_deadline(self.request_timeout, self.store.user_get(user))
            .await
            .map_err(|e| AuthManagerError::from_store(Operation::UserInfo, e))
    }

    pub async fn list_users(&self) -> AuthResult<Vec<String>> {
        with_deadline(self.request_timeout, self.store.user_list())
            .await
            .map_err(|e| AuthManagerError::from_store(Operation::ListUsers, e))
    }

    // ==================== Roles ====================

    /// Create a role; an existing role is left untouched
    pub async fn create_role(&self, role: &str) -> AuthResult<()> {
        let outcome = with_deadline(self.request_timeout, self.store.role_add(role)).await;
        Self::absorb_conflict(Operation::CreateRole, role, outcome)?;
        debug!(role = %role, "Role ensured");
        Ok(())
    }

    /// Delete a role, which also drops its grants and bindings
    pub async fn delete_role(&self, role: &str) -> AuthResult<()> {
        with_deadline(self.request_timeout, self.store.role_delete(role))
            .await
            .map_err(|e| AuthManagerError::from_store(Operation::DeleteRole, e))?;
        info!(role = %role, "Role deleted");
        Ok(())
    }

    /// Attach a grant over `[key, range_end)` to a role
    ///
    /// Not conflict-guarded: every store error is returned.
    pub async fn grant_permission(
        &self,
        role: &str,
        key: impl Into<Vec<u8>>,
        range_end: impl Into<Vec<u8>>,
        mode: PermissionMode,
    ) -> AuthResult<()> {
        let permission = Permission::new(mode, key).with_range_end(range_end);
        self.grant(role, &permission).await
    }

    /// Attach a grant over every key sharing `prefix`
    pub async fn grant_prefix(
        &self,
        role: &str,
        prefix: impl Into<Vec<u8>>,
        mode: PermissionMode,
    ) -> AuthResult<()> {
        let permission = Permission::prefix(mode, prefix);
        self.grant(role, &permission).await
    }

    /// Attach a prepared grant to a role
    pub async fn grant(&self, role: &str, permission: &Permission) -> AuthResult<()> {
        with_deadline(
            self.request_timeout,
            self.store.role_grant_permission(role, permission),
        )
        .await
        .map_err(|e| AuthManagerError::from_store(Operation::GrantPermission, e))?;
        info!(role = %role, permission = %permission, "Permission granted");
        Ok(())
    }

    /// Read a role's grants
    pub async fn role_info(&self, role: &str) -> AuthResult<RoleInfo> {
        with_deadline(self.request_timeout, self.store.role_get(role))
            .await
            .map_err(|e| AuthManagerError::from_store(Operation::RoleInfo, e))
    }

    pub async fn list_roles(&self) -> AuthResult<Vec<String>> {
        with_deadline(self.request_timeout, self.store.role_list())
            .await
            .map_err(|e| AuthManagerError::from_store(Operation::ListRoles, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Credentials, MemoryStore, StatusCode};

    fn admin() -> (MemoryStore, AuthManager) {
        let store = MemoryStore::new(SecretString::from("1234"));
        let manager = AuthManager::new(Arc::new(store.clone()));
        (store, manager)
    }

    #[tokio::test]
    async fn test_create_user_is_idempotent() {
        let (store, manager) = admin();

        manager
            .create_user("user1", &SecretString::from("123"))
            .await
            .unwrap();
        manager
            .create_user("user1", &SecretString::from("other"))
            .await
            .unwrap();

        // The first secret still authenticates
        assert!(store.session(&Credentials::new("user1", "123")).is_ok());
        assert!(store.session(&Credentials::new("user1", "other")).is_err());
    }

    #[tokio::test]
    async fn test_create_role_is_idempotent() {
        let (_store, manager) = admin();

        manager.create_role("role1").await.unwrap();
        manager.create_role("role1").await.unwrap();

        let roles = manager.list_roles().await.unwrap();
        assert_eq!(roles.iter().filter(|r| *r == "role1").count(), 1);
    }

    #[tokio::test]
    async fn test_bind_twice_leaves_one_binding() {
        let (_store, manager) = admin();
        manager
            .create_user("user1", &SecretString::from("123"))
            .await
            .unwrap();
        manager.create_role("role1").await.unwrap();

        manager.bind_user_role("user1", "role1").await.unwrap();
        manager.bind_user_role("user1", "role1").await.unwrap();

        let info = manager.user_info("user1").await.unwrap();
        assert_eq!(info.roles, vec!["role1".to_string()]);
    }

    #[tokio::test]
    async fn test_grant_after_role_deleted_fails() {
        let (_store, manager) = admin();
        manager.create_role("role1").await.unwrap();
        manager.delete_role("role1").await.unwrap();

        assert!(manager.role_info("role1").await.is_err());

        let err = manager
            .grant_prefix("role1", "user1", PermissionMode::ReadWrite)
            .await
            .unwrap_err();
        assert_eq!(err.operation(), Operation::GrantPermission);
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_delete_missing_user_propagates() {
        let (_store, manager) = admin();
        let err = manager.delete_user("ghost").await.unwrap_err();
        assert!(matches!(err, AuthManagerError::NotFound { .. }));
        assert_eq!(err.operation(), Operation::DeleteUser);
    }

    #[tokio::test]
    async fn test_grant_permission_explicit_range() {
        let (_store, manager) = admin();
        manager.create_role("role1").await.unwrap();
        manager
            .grant_permission("role1", "a", "c", PermissionMode::Read)
            .await
            .unwrap();

        let info = manager.role_info("role1").await.unwrap();
        assert_eq!(
            info.permissions,
            vec![Permission::new(PermissionMode::Read, "a").with_range_end("c")]
        );
    }

    #[test]
    fn test_error_mapping_keeps_kind() {
        let err = AuthManagerError::from_store(
            Operation::DeleteRole,
            StoreError::status(StatusCode::FailedPrecondition, "etcdserver: role name already exists"),
        );
        assert!(matches!(err, AuthManagerError::Conflict { .. }));
        assert_eq!(err.kind(), ErrorKind::ConflictIgnorable);
        assert!(err.to_string().starts_with("delete role failed, conflict"));
    }
}
