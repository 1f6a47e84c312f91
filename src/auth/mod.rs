//! Authorization management over the store's native auth API
//!
//! Provides idempotent management of store-side RBAC:
//! - Create users and roles (existing ones are left alone)
//! - Bind users to roles
//! - Grant roles read/write access over key ranges or prefixes
//! - Delete users and roles
//! - Classify store errors into benign conflicts and real failures

mod classify;
mod manager;
mod types;

pub use classify::{classify, is_already_exists, ErrorKind};
pub use manager::{AuthManager, AuthManagerError, AuthResult, Operation, DEFAULT_REQUEST_TIMEOUT};
pub use types::{prefix_range_end, Permission, PermissionMode, RoleInfo, UserInfo, ALL_KEYS_FROM};
