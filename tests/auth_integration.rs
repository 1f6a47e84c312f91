//! Integration tests for the authorization facade
//!
//! Tests the full flow: connector -> store client -> auth manager / kv client

use async_trait::async_trait;
use kvwarden::auth::{
    AuthManager, AuthManagerError, ErrorKind, Operation, Permission, PermissionMode, RoleInfo,
    UserInfo,
};
use kvwarden::kv::KvClient;
use kvwarden::store::{
    Connector, Credentials, GetScope, KeyValue, MemoryStore, Revision, StatusCode, StoreClient,
    StoreError,
};
use kvwarden::walkthrough::{self, WalkthroughSettings};
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;

const ROOT_PASSWORD: &str = "1234";

fn root_store() -> MemoryStore {
    MemoryStore::new(SecretString::from(ROOT_PASSWORD))
}

fn manager(store: &MemoryStore) -> AuthManager {
    AuthManager::new(Arc::new(store.clone()))
}

/// Store whose calls all behave the same way
enum ScriptedStore {
    /// Every call fails with this error
    Failing(fn() -> StoreError),
    /// Calls never complete
    Stalled,
}

impl ScriptedStore {
    async fn outcome<T>(&self) -> Result<T, StoreError> {
        match self {
            ScriptedStore::Failing(error) => Err(error()),
            ScriptedStore::Stalled => std::future::pending().await,
        }
    }
}

#[async_trait]
impl StoreClient for ScriptedStore {
    async fn put(&self, _: &str, _: &str) -> Result<Revision, StoreError> {
        self.outcome().await
    }

    async fn get(&self, _: &str, _: GetScope) -> Result<Vec<KeyValue>, StoreError> {
        self.outcome().await
    }

    async fn user_add(&self, _: &str, _: &SecretString) -> Result<(), StoreError> {
        self.outcome().await
    }

    async fn user_delete(&self, _: &str) -> Result<(), StoreError> {
        self.outcome().await
    }

    async fn user_grant_role(&self, _: &str, _: &str) -> Result<(), StoreError> {
        self.outcome().await
    }

    async fn user_get(&self, _: &str) -> Result<UserInfo, StoreError> {
        self.outcome().await
    }

    async fn user_list(&self) -> Result<Vec<String>, StoreError> {
        self.outcome().await
    }

    async fn role_add(&self, _: &str) -> Result<(), StoreError> {
        self.outcome().await
    }

    async fn role_delete(&self, _: &str) -> Result<(), StoreError> {
        self.outcome().await
    }

    async fn role_grant_permission(&self, _: &str, _: &Permission) -> Result<(), StoreError> {
        self.outcome().await
    }

    async fn role_get(&self, _: &str) -> Result<RoleInfo, StoreError> {
        self.outcome().await
    }

    async fn role_list(&self) -> Result<Vec<String>, StoreError> {
        self.outcome().await
    }
}

/// Duplicate user creation succeeds and keeps the first secret
#[tokio::test]
async fn test_duplicate_create_user_keeps_secret() {
    let store = root_store();
    let auth = manager(&store);

    auth.create_user("user1", &SecretString::from("123"))
        .await
        .unwrap();
    auth.create_user("user1", &SecretString::from("changed"))
        .await
        .unwrap();

    assert!(store.session(&Credentials::new("user1", "123")).is_ok());
    assert!(store.session(&Credentials::new("user1", "changed")).is_err());
}

/// A deleted role stays gone and can no longer receive grants
#[tokio::test]
async fn test_grant_on_deleted_role_propagates() {
    let store = root_store();
    let auth = manager(&store);

    auth.create_role("role1").await.unwrap();
    auth.delete_role("role1").await.unwrap();
    assert!(!auth.list_roles().await.unwrap().contains(&"role1".to_string()));

    let err = auth
        .grant_prefix("role1", "user1", PermissionMode::ReadWrite)
        .await
        .unwrap_err();
    assert_ne!(err.kind(), ErrorKind::ConflictIgnorable);
    assert_eq!(err.operation(), Operation::GrantPermission);
}

/// Binding twice succeeds and yields one binding
#[tokio::test]
async fn test_bind_twice_single_binding() {
    let store = root_store();
    let auth = manager(&store);

    auth.create_user("user1", &SecretString::from("123"))
        .await
        .unwrap();
    auth.create_role("role1").await.unwrap();
    auth.bind_user_role("user1", "role1").await.unwrap();
    auth.bind_user_role("user1", "role1").await.unwrap();

    let info = auth.user_info("user1").await.unwrap();
    assert_eq!(info.roles, vec!["role1".to_string()]);
}

/// A prefix grant allows keys under the prefix and nothing else
#[tokio::test]
async fn test_prefix_grant_from_user_session() {
    let store = root_store();
    let auth = manager(&store);

    auth.create_user("user1", &SecretString::from("123"))
        .await
        .unwrap();
    auth.create_role("role1").await.unwrap();
    auth.bind_user_role("user1", "role1").await.unwrap();
    auth.grant_permission(
        "role1",
        "user1",
        kvwarden::auth::prefix_range_end(b"user1"),
        PermissionMode::ReadWrite,
    )
    .await
    .unwrap();

    let user_store = store
        .connect(Some(&Credentials::new("user1", "123")))
        .await
        .unwrap();
    let user_kv = KvClient::new(user_store);

    user_kv.put("user1/123", "value").await.unwrap();
    let entries = user_kv.get("user1/123").await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].value_str(), "value");

    let err = user_kv.get("user3/123").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
}

/// Put/get round trip with strictly increasing revisions
#[tokio::test]
async fn test_put_get_round_trip() {
    let store = root_store();
    let kv = KvClient::new(Arc::new(store));

    let first = kv.put("sample_key", "sample_value").await.unwrap();
    let entries = kv.get("sample_key").await.unwrap();
    assert_eq!(entries, vec![KeyValue::new("sample_key", "sample_value")]);

    let second = kv.put("other_key", "x").await.unwrap();
    let third = kv.put("sample_key", "sample_value").await.unwrap();
    assert!(first < second);
    assert!(second < third);
}

/// A store that never answers yields a timeout once the budget runs out
#[tokio::test(start_paused = true)]
async fn test_stalled_store_times_out() {
    let budget = Duration::from_secs(3);
    let store: Arc<dyn StoreClient> = Arc::new(ScriptedStore::Stalled);

    let started = tokio::time::Instant::now();
    let err = KvClient::new(store.clone())
        .with_request_timeout(budget)
        .put("sample_key", "sample_value")
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(elapsed >= budget);
    assert!(elapsed <= budget + Duration::from_millis(500));

    let err = AuthManager::new(store)
        .with_request_timeout(budget)
        .create_user("user1", &SecretString::from("123"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthManagerError::Timeout { .. }));
}

/// Each call gets a fresh budget
#[tokio::test(start_paused = true)]
async fn test_budget_is_per_call() {
    let budget = Duration::from_millis(200);
    let auth = AuthManager::new(Arc::new(ScriptedStore::Stalled)).with_request_timeout(budget);

    for _ in 0..3 {
        let started = tokio::time::Instant::now();
        let err = auth.create_role("role1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(started.elapsed() < budget * 2);
    }
}

/// Connection failures surface as unavailable, never as conflicts
#[tokio::test]
async fn test_unavailable_store_propagates() {
    let store = ScriptedStore::Failing(|| StoreError::Unavailable("connection refused".to_string()));
    let auth = AuthManager::new(Arc::new(store));

    let err = auth
        .create_user("user1", &SecretString::from("123"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthManagerError::RemoteUnavailable { .. }));
    assert_eq!(err.kind(), ErrorKind::RemoteUnavailable);
}

/// A structured AlreadyExists code is absorbed on create and bind
#[tokio::test]
async fn test_structured_conflict_absorbed() {
    let store = ScriptedStore::Failing(|| StoreError::status(StatusCode::AlreadyExists, "exists"));
    let auth = AuthManager::new(Arc::new(store));

    auth.create_user("user1", &SecretString::from("123"))
        .await
        .unwrap();
    auth.create_role("role1").await.unwrap();
    auth.bind_user_role("user1", "role1").await.unwrap();

    // Grants and deletes are not guarded
    let err = auth
        .grant_prefix("role1", "user1", PermissionMode::Read)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthManagerError::Conflict { .. }));
    assert!(auth.delete_role("role1").await.is_err());
    assert!(auth.delete_user("user1").await.is_err());
}

/// Unrecognized failures come back as unknown
#[tokio::test]
async fn test_unknown_error_propagates() {
    let store = ScriptedStore::Failing(|| StoreError::status(StatusCode::Other, "etcdserver: too many requests"));
    let auth = AuthManager::new(Arc::new(store));

    let err = auth.create_role("role1").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unknown);
    assert!(err.to_string().contains("too many requests"));
}

/// No rollback: a user created before a failed bind stays in the store
#[tokio::test]
async fn test_partial_failure_leaves_user() {
    let store = root_store();
    let auth = manager(&store);

    auth.create_user("user1", &SecretString::from("123"))
        .await
        .unwrap();
    let err = auth
        .bind_user_role("user1", "missing-role")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.operation(), Operation::BindUserRole);

    let users = auth.list_users().await.unwrap();
    assert!(users.contains(&"user1".to_string()));
    assert!(auth.user_info("user1").await.unwrap().roles.is_empty());
}

/// Granting the same range twice keeps a single grant
#[tokio::test]
async fn test_regrant_same_range() {
    let store = root_store();
    let auth = manager(&store);

    auth.create_role("role1").await.unwrap();
    auth.grant_prefix("role1", "user1", PermissionMode::ReadWrite)
        .await
        .unwrap();
    auth.grant_prefix("role1", "user1", PermissionMode::ReadWrite)
        .await
        .unwrap();

    let info = auth.role_info("role1").await.unwrap();
    assert_eq!(
        info.permissions,
        vec![Permission::prefix(PermissionMode::ReadWrite, "user1")]
    );
}

/// The full walkthrough, driven through the connector seam
#[tokio::test]
async fn test_walkthrough_end_to_end() {
    let store = root_store();
    let connector: Arc<dyn Connector> = Arc::new(store.clone());
    let settings = WalkthroughSettings {
        user: "alice".to_string(),
        role: "alice-rw".to_string(),
        scoped_key: "alice/notes".to_string(),
        foreign_key: "bob/notes".to_string(),
        ..WalkthroughSettings::default()
    };

    let report = walkthrough::run(
        connector.as_ref(),
        &Credentials::new("root", ROOT_PASSWORD),
        &settings,
        Duration::from_secs(3),
    )
    .await
    .unwrap();

    assert!(report.foreign_read.is_denied());
    assert_eq!(report.removed_user, "alice");
    assert_eq!(report.removed_role, "alice-rw");

    let auth = manager(&store);
    assert!(!auth.list_users().await.unwrap().contains(&"alice".to_string()));
    assert!(auth.role_info("alice-rw").await.is_err());

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["foreign_read"]["outcome"], "denied");
}
