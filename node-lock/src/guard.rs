use async_lock::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::fmt;

use crate::mode::LockKind;

enum StripeGuardInner<'a> {
    Read { _guard: RwLockReadGuard<'a, ()> },
    Write { guard: RwLockWriteGuard<'a, ()> },
}

/// Scoped hold on one slot of a [`StripedLockTable`](crate::StripedLockTable).
///
/// The slot is released when the guard drops. Guards are not reentrant:
/// awaiting a second guard on a slot the task already holds exclusively
/// never completes.
pub struct StripeGuard<'a> {
    slot: usize,
    inner: StripeGuardInner<'a>,
}

impl<'a> StripeGuard<'a> {
    /// Dispatches to [`RwLock::read`] or [`RwLock::write`] depending on `kind`.
    #[inline]
    pub(crate) async fn acquire(lock: &'a RwLock<()>, slot: usize, kind: LockKind) -> Self {
        let inner = match kind {
            LockKind::Read => StripeGuardInner::Read {
                _guard: lock.read().await,
            },
            LockKind::Write => StripeGuardInner::Write {
                guard: lock.write().await,
            },
        };
        Self { slot, inner }
    }

    /// Returns `None` if the slot cannot be taken immediately.
    #[inline]
    pub(crate) fn try_acquire(lock: &'a RwLock<()>, slot: usize, kind: LockKind) -> Option<Self> {
        let inner = match kind {
            LockKind::Read => StripeGuardInner::Read {
                _guard: lock.try_read()?,
            },
            LockKind::Write => StripeGuardInner::Write {
                guard: lock.try_write()?,
            },
        };
        Some(Self { slot, inner })
    }

    /// Index of the slot this guard holds.
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn kind(&self) -> LockKind {
        match self.inner {
            StripeGuardInner::Read { .. } => LockKind::Read,
            StripeGuardInner::Write { .. } => LockKind::Write,
        }
    }

    /// Atomically turns an exclusive hold into a shared one. Shared guards
    /// are returned unchanged.
    pub fn downgrade(self) -> Self {
        let inner = match self.inner {
            StripeGuardInner::Write { guard } => StripeGuardInner::Read {
                _guard: RwLockWriteGuard::downgrade(guard),
            },
            read => read,
        };
        Self {
            slot: self.slot,
            inner,
        }
    }
}

impl fmt::Debug for StripeGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StripeGuard")
            .field("slot", &self.slot)
            .field("kind", &self.kind())
            .finish()
    }
}
