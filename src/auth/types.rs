//! Authorization types for kvwarden
//!
//! Provides:
//! - PermissionMode enum for read/write access
//! - Permission struct describing a key range grant
//! - UserInfo and RoleInfo snapshots read back from the store

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Range end meaning "every key from `key` onwards"
pub const ALL_KEYS_FROM: &[u8] = &[0];

/// Access mode carried by a permission grant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionMode {
    Read,
    Write,
    ReadWrite,
}

impl PermissionMode {
    pub fn allows_read(self) -> bool {
        matches!(self, PermissionMode::Read | PermissionMode::ReadWrite)
    }

    pub fn allows_write(self) -> bool {
        matches!(self, PermissionMode::Write | PermissionMode::ReadWrite)
    }
}

impl FromStr for PermissionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "read" => Ok(PermissionMode::Read),
            "write" => Ok(PermissionMode::Write),
            "readwrite" | "read-write" | "rw" => Ok(PermissionMode::ReadWrite),
            other => Err(format!("Unknown permission mode: {}", other)),
        }
    }
}

impl std::fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PermissionMode::Read => write!(f, "read"),
            PermissionMode::Write => write!(f, "write"),
            PermissionMode::ReadWrite => write!(f, "readwrite"),
        }
    }
}

/// Compute the lexicographic successor of a key prefix
///
/// Trailing `0xff` bytes are dropped and the last remaining byte is
/// incremented. A prefix made only of `0xff` bytes (or an empty one) yields
/// [`ALL_KEYS_FROM`].
pub fn prefix_range_end(prefix: &[u8]) -> Vec<u8> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < 0xff {
            end.push(last + 1);
            return end;
        }
    }
    ALL_KEYS_FROM.to_vec()
}

/// A grant of `mode` over the half-open key range `[key, range_end)`
///
/// An empty `range_end` grants the single key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Permission {
    pub mode: PermissionMode,
    pub key: Vec<u8>,
    pub range_end: Vec<u8>,
}

impl Permission {
    /// Single-key grant
    pub fn new(mode: PermissionMode, key: impl Into<Vec<u8>>) -> Self {
        Self {
            mode,
            key: key.into(),
            range_end: Vec::new(),
        }
    }

    /// Grant over every key sharing `prefix`
    pub fn prefix(mode: PermissionMode, prefix: impl Into<Vec<u8>>) -> Self {
        let key = prefix.into();
        let range_end = prefix_range_end(&key);
        Self {
            mode,
            key,
            range_end,
        }
    }

    /// Set an explicit range end
    pub fn with_range_end(mut self, range_end: impl Into<Vec<u8>>) -> Self {
        self.range_end = range_end.into();
        self
    }

    pub fn is_single_key(&self) -> bool {
        self.range_end.is_empty()
    }

    pub fn is_prefix(&self) -> bool {
        !self.is_single_key() && self.range_end == prefix_range_end(&self.key)
    }

    /// Check whether this grant spans the requested range
    ///
    /// An empty `range_end` requests the single key `key`.
    pub fn covers(&self, key: &[u8], range_end: &[u8]) -> bool {
        if self.is_single_key() {
            return range_end.is_empty() && self.key == key;
        }
        if key < self.key.as_slice() {
            return false;
        }

        let open_ended = self.range_end == ALL_KEYS_FROM;
        if range_end.is_empty() {
            return open_ended || key < self.range_end.as_slice();
        }
        if range_end == ALL_KEYS_FROM {
            return open_ended;
        }
        open_ended || range_end <= self.range_end.as_slice()
    }

    /// Check read/write intent along with the range
    pub fn allows(&self, key: &[u8], range_end: &[u8], write: bool) -> bool {
        let mode_ok = if write {
            self.mode.allows_write()
        } else {
            self.mode.allows_read()
        };
        mode_ok && self.covers(key, range_end)
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let key = String::from_utf8_lossy(&self.key);
        if self.is_single_key() {
            write!(f, "{} {}", self.mode, key)
        } else if self.is_prefix() {
            write!(f, "{} {}* (prefix)", self.mode, key)
        } else if self.range_end == ALL_KEYS_FROM {
            write!(f, "{} [{}, <end>)", self.mode, key)
        } else {
            write!(
                f,
                "{} [{}, {})",
                self.mode,
                key,
                String::from_utf8_lossy(&self.range_end)
            )
        }
    }
}

/// A user and the roles bound to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserInfo {
    pub name: String,
    pub roles: Vec<String>,
}

/// A role and its permission grants
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleInfo {
    pub name: String,
    pub permissions: Vec<Permission>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("read".parse::<PermissionMode>(), Ok(PermissionMode::Read));
        assert_eq!("WRITE".parse::<PermissionMode>(), Ok(PermissionMode::Write));
        assert_eq!("rw".parse::<PermissionMode>(), Ok(PermissionMode::ReadWrite));
        assert!("execute".parse::<PermissionMode>().is_err());
    }

    #[test]
    fn test_mode_access() {
        assert!(PermissionMode::Read.allows_read());
        assert!(!PermissionMode::Read.allows_write());
        assert!(PermissionMode::Write.allows_write());
        assert!(!PermissionMode::Write.allows_read());
        assert!(PermissionMode::ReadWrite.allows_read());
        assert!(PermissionMode::ReadWrite.allows_write());
    }

    #[test]
    fn test_prefix_range_end() {
        assert_eq!(prefix_range_end(b"user1"), b"user2".to_vec());
        assert_eq!(prefix_range_end(b"a\xff"), b"b".to_vec());
        assert_eq!(prefix_range_end(b"\xff\xff"), ALL_KEYS_FROM.to_vec());
        assert_eq!(prefix_range_end(b""), ALL_KEYS_FROM.to_vec());
    }

    #[test]
    fn test_prefix_grant_covers_keys_under_prefix() {
        let perm = Permission::prefix(PermissionMode::ReadWrite, "user1");
        assert!(perm.is_prefix());
        assert!(perm.covers(b"user1", b""));
        assert!(perm.covers(b"user1/123", b""));
        assert!(!perm.covers(b"user3/123", b""));
        assert!(!perm.covers(b"user0", b""));
        assert!(!perm.covers(b"user2", b""));
    }

    #[test]
    fn test_prefix_grant_covers_prefix_reads() {
        let perm = Permission::prefix(PermissionMode::Read, "user1");
        assert!(perm.covers(b"user1/", &prefix_range_end(b"user1/")));
        assert!(perm.covers(b"user1", &prefix_range_end(b"user1")));
        assert!(!perm.covers(b"user", &prefix_range_end(b"user")));
        assert!(!perm.covers(b"user1", ALL_KEYS_FROM));
    }

    #[test]
    fn test_single_key_grant() {
        let perm = Permission::new(PermissionMode::Read, "sample_key");
        assert!(perm.is_single_key());
        assert!(perm.covers(b"sample_key", b""));
        assert!(!perm.covers(b"sample_key2", b""));
        assert!(!perm.covers(b"sample_key", b"sample_kez"));
    }

    #[test]
    fn test_open_ended_grant() {
        let perm = Permission::new(PermissionMode::Read, "m").with_range_end(ALL_KEYS_FROM);
        assert!(perm.covers(b"m", b""));
        assert!(perm.covers(b"zzz", ALL_KEYS_FROM));
        assert!(!perm.covers(b"a", b""));
    }

    #[test]
    fn test_allows_checks_mode() {
        let perm = Permission::prefix(PermissionMode::Read, "user1");
        assert!(perm.allows(b"user1/123", b"", false));
        assert!(!perm.allows(b"user1/123", b"", true));
    }

    #[test]
    fn test_permission_display() {
        let prefix = Permission::prefix(PermissionMode::ReadWrite, "user1");
        assert_eq!(prefix.to_string(), "readwrite user1* (prefix)");

        let single = Permission::new(PermissionMode::Read, "k");
        assert_eq!(single.to_string(), "read k");

        let range = Permission::new(PermissionMode::Write, "a").with_range_end("c");
        assert_eq!(range.to_string(), "write [a, c)");
    }
}
