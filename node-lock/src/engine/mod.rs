//! Lock engines: the synchronization state machines behind a node lock.
//!
//! An engine knows nothing about owners. It counts grants and waiters and
//! decides who may proceed; [`ResourceLock`](crate::ResourceLock) layers owner
//! identity on top of it.

use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, MutexGuard};

use crate::error::Result;

mod null;
mod semaphore;
mod upgradable;

pub use null::NullLock;
pub use semaphore::{ExclusiveWriteLock, Semaphore, SerialLock};
pub use upgradable::{UpgradableLock, WriterMode};

/// Read/write lock with timed acquisition and read-to-write upgrade.
///
/// Acquisitions return `Ok(false)` when the timeout elapses and
/// [`LockError::Interrupted`](crate::LockError::Interrupted) when
/// [`interrupt_waiters`](LockEngine::interrupt_waiters) cut the wait short.
/// A zero timeout makes a single non-blocking attempt.
pub trait LockEngine: Send + Sync + fmt::Debug {
    fn try_read(&self, timeout: Duration) -> Result<bool>;

    fn try_write(&self, timeout: Duration) -> Result<bool>;

    fn release_read(&self);

    fn release_write(&self);

    /// Turns a read grant held by the caller into a write grant.
    ///
    /// On a recoverable [`UpgradeError`](crate::UpgradeError) the caller
    /// still holds its read grant. On
    /// [`Interrupted`](crate::LockError::Interrupted) and
    /// [`UpgradeRecovery`](crate::LockError::UpgradeRecovery) it holds
    /// nothing.
    fn upgrade(&self, timeout: Duration) -> Result<()>;

    /// Wakes every waiting thread with `LockError::Interrupted`.
    fn interrupt_waiters(&self) {}

    /// `false` for engines that grant everything; owners of such a lock
    /// are not recorded.
    fn records_owners(&self) -> bool {
        true
    }

    fn stats(&self) -> EngineStats;
}

/// Point-in-time view of an engine's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub active_readers: u32,
    pub write_held: bool,
    pub waiting_readers: u32,
    pub waiting_writers: u32,
    pub waiting_upgrader: bool,
}

impl EngineStats {
    pub fn is_idle(&self) -> bool {
        self.active_readers == 0
            && !self.write_held
            && self.waiting_readers == 0
            && self.waiting_writers == 0
            && !self.waiting_upgrader
    }
}

/// `None` means wait forever.
#[inline]
pub(crate) fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

#[inline]
pub(crate) fn expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|deadline| Instant::now() >= deadline)
}

/// Parks on `cond` until notified or until `deadline` passes.
#[inline]
pub(crate) fn wait_until<T>(
    cond: &Condvar,
    guard: &mut MutexGuard<'_, T>,
    deadline: Option<Instant>,
) {
    match deadline {
        Some(deadline) => {
            let _ = cond.wait_until(guard, deadline);
        }
        None => cond.wait(guard),
    }
}
