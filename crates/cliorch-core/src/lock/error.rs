//! Errors returned by the resource locker

use std::time::Duration;
use thiserror::Error;

/// Failure to acquire or release a named lock
///
/// `NotHolder` and `Reentrant` indicate programming errors in the caller and
/// are logged at error level before being returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    /// The lock was not granted within the requested bound
    #[error("timed out after {waited:?} waiting for lock '{key}'")]
    Timeout { key: String, waited: Duration },

    /// Release of a handle that no longer holds the lock
    #[error("lock '{key}' released by a handle that does not hold it")]
    NotHolder { key: String },

    /// A critical section tried to acquire the key it already holds
    #[error("lock '{key}' is already held by the enclosing section; locks are not re-entrant")]
    Reentrant { key: String },
}

impl LockError {
    /// Resource key the error refers to
    pub fn key(&self) -> &str {
        match self {
            LockError::Timeout { key, .. }
            | LockError::NotHolder { key }
            | LockError::Reentrant { key } => key,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, LockError::Timeout { .. })
    }
}
