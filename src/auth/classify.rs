//! Store error classification
//!
//! The structured status code decides first. etcd reports several auth
//! conflicts as `FailedPrecondition` with the detail only in the message, so
//! the message text is checked when the code alone is not conclusive.

use crate::store::{StatusCode, StoreError};

const ALREADY_EXISTS: &str = "already exists";
const NOT_FOUND: &str = "not found";
const PERMISSION_DENIED: &str = "permission denied";
const AUTH_FAILED: &str = "authentication failed";

/// How a store failure should be treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Benign "already exists" conflict on create/bind
    ConflictIgnorable,
    /// Connection or dial failure
    RemoteUnavailable,
    /// A call ran past its time budget
    Timeout,
    /// Caller lacks rights, or authentication failed
    PermissionDenied,
    /// The target entity does not exist
    NotFound,
    /// Anything else
    Unknown,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::ConflictIgnorable => write!(f, "conflict"),
            ErrorKind::RemoteUnavailable => write!(f, "unavailable"),
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::PermissionDenied => write!(f, "permission denied"),
            ErrorKind::NotFound => write!(f, "not found"),
            ErrorKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// Classify a store error
pub fn classify(err: &StoreError) -> ErrorKind {
    match err {
        StoreError::Timeout(_) => ErrorKind::Timeout,
        StoreError::Unavailable(_) => ErrorKind::RemoteUnavailable,
        StoreError::Status { code, message } => match code {
            StatusCode::AlreadyExists => ErrorKind::ConflictIgnorable,
            StatusCode::NotFound => ErrorKind::NotFound,
            StatusCode::PermissionDenied | StatusCode::Unauthenticated => {
                ErrorKind::PermissionDenied
            }
            StatusCode::DeadlineExceeded => ErrorKind::Timeout,
            StatusCode::Unavailable => ErrorKind::RemoteUnavailable,
            _ => classify_message(message),
        },
        StoreError::Other(message) => classify_message(message),
    }
}

/// Fallback for errors whose code does not say enough
fn classify_message(message: &str) -> ErrorKind {
    let message = message.to_lowercase();
    if message.contains(ALREADY_EXISTS) {
        ErrorKind::ConflictIgnorable
    } else if message.contains(NOT_FOUND) {
        ErrorKind::NotFound
    } else if message.contains(PERMISSION_DENIED) || message.contains(AUTH_FAILED) {
        ErrorKind::PermissionDenied
    } else {
        ErrorKind::Unknown
    }
}

/// Check whether an error is a benign "already exists" conflict
pub fn is_already_exists(err: &StoreError) -> bool {
    classify(err) == ErrorKind::ConflictIgnorable
}
