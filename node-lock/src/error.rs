use std::time::Duration;

use thiserror::Error;

use crate::mode::LockKind;

/// Why an upgrade from a read lock to a write lock did not happen.
///
/// Both cases are recoverable: the engine still holds the caller's read slot
/// when it returns one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum UpgradeError {
    /// Another upgrade is already outstanding on the same lock.
    #[error("another upgrade is already in progress on this lock")]
    Contended,
    /// The write lock was not granted in time; the read lock was restored.
    #[error("write lock not granted within {0:?}")]
    TimedOut(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    #[error("{kind} lock on {resource} not acquired by {owner} within {timeout:?} ({holders})")]
    Timeout {
        resource: String,
        owner: String,
        kind: LockKind,
        timeout: Duration,
        holders: String,
    },

    #[error("lock upgrade failed: {0}")]
    Upgrade(#[from] UpgradeError),

    /// Neither the write lock nor the caller's read lock could be obtained
    /// after an upgrade attempt; the caller holds nothing.
    #[error("upgrade failed and the read lock could not be restored within {timeout:?}")]
    UpgradeRecovery { timeout: Duration },

    #[error("illegal lock state: {0}")]
    IllegalState(String),

    #[error("interrupted while waiting for a lock")]
    Interrupted,

    #[error("{0} is not a read owner of this lock")]
    OwnerNotExisted(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unknown isolation level `{0}`")]
    UnknownIsolationLevel(String),
}

impl LockError {
    /// Errors after which the caller may retry or abort the enclosing
    /// operation normally.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            LockError::Timeout { .. } | LockError::Upgrade(_) | LockError::Interrupted
        )
    }

    /// Invariant violations and the upgrade double failure.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LockError::IllegalState(_)
                | LockError::UpgradeRecovery { .. }
                | LockError::OwnerNotExisted(_)
        )
    }
}

pub type Result<T, E = LockError> = std::result::Result<T, E>;
