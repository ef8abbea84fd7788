use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, trace};

use crate::engine::{EngineStats, LockEngine};
use crate::error::{LockError, Result};
use crate::factory;
use crate::isolation::IsolationLevel;
use crate::mode::{LockKind, LockType};
use crate::ownership::{LockOwner, OwnershipMap};

/// Who holds a resource at the moment it was sampled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockStatus<O: LockOwner> {
    pub readers: HashSet<O>,
    pub writer: Option<O>,
}

impl<O: LockOwner> LockStatus<O> {
    pub fn is_read_locked(&self) -> bool {
        !self.readers.is_empty()
    }

    pub fn is_write_locked(&self) -> bool {
        self.writer.is_some()
    }

    pub fn is_locked(&self) -> bool {
        self.is_read_locked() || self.is_write_locked()
    }
}

/// Read/write lock of a single resource, owned by caller-supplied identities.
///
/// Acquisitions are reentrant per owner: asking again for access the owner
/// already has returns `Ok(false)` without blocking. A reader asking for the
/// write lock is upgraded in place.
///
/// Under [`IsolationLevel::None`] nothing is recorded: every acquisition
/// returns `Ok(true)` and the resource never reports itself locked.
///
/// ```
/// use std::time::Duration;
/// use node_lock::{IsolationLevel, LockType, ResourceLock};
///
/// let lock = ResourceLock::new("/a/b", IsolationLevel::RepeatableRead);
/// let timeout = Duration::from_millis(100);
///
/// assert!(lock.acquire_read(&"tx-1", timeout).unwrap());
/// assert!(!lock.acquire_read(&"tx-1", timeout).unwrap());
/// assert!(lock.acquire_write(&"tx-1", timeout).unwrap());
/// assert!(lock.is_owner(&"tx-1", LockType::Write));
///
/// lock.release(&"tx-1");
/// assert!(!lock.is_locked());
/// ```
#[derive(Debug)]
pub struct ResourceLock<O: LockOwner> {
    resource: String,
    engine: Box<dyn LockEngine>,
    owners: Mutex<OwnershipMap<O>>,
}

impl<O: LockOwner> ResourceLock<O> {
    pub fn new(resource: impl Into<String>, isolation: IsolationLevel) -> Self {
        Self::with_engine(resource, factory::engine_for(isolation))
    }

    pub fn with_engine(resource: impl Into<String>, engine: Box<dyn LockEngine>) -> Self {
        Self {
            resource: resource.into(),
            engine,
            owners: Mutex::new(OwnershipMap::new()),
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn acquire(&self, owner: &O, kind: LockKind, timeout: Duration) -> Result<bool> {
        match kind {
            LockKind::Read => self.acquire_read(owner, timeout),
            LockKind::Write => self.acquire_write(owner, timeout),
        }
    }

    /// Acquires shared access for `owner`.
    ///
    /// Returns `Ok(false)` if `owner` already holds the read or the write
    /// lock, and [`LockError::Timeout`] if access was not granted in time.
    pub fn acquire_read(&self, owner: &O, timeout: Duration) -> Result<bool> {
        if !self.engine.records_owners() {
            return Ok(true);
        }
        if self.owners.lock().is_owner(owner, LockType::Any) {
            trace!(resource = %self.resource, ?owner, "read requested by current owner");
            return Ok(false);
        }
        if !self.engine.try_read(timeout)? {
            return Err(self.timeout_error(owner, LockKind::Read, timeout));
        }
        let mut owners = self.owners.lock();
        // The same owner may have been granted from another thread meanwhile.
        if owners.is_owner(owner, LockType::Any) {
            self.engine.release_read();
            trace!(resource = %self.resource, ?owner, "read granted to a current owner");
            return Ok(false);
        }
        owners.add_reader(owner.clone());
        drop(owners);
        trace!(resource = %self.resource, ?owner, "read lock acquired");
        Ok(true)
    }

    /// Acquires exclusive access for `owner`, upgrading its read lock if it
    /// holds one.
    ///
    /// If the upgrade fails, `owner` is left holding nothing on this
    /// resource.
    pub fn acquire_write(&self, owner: &O, timeout: Duration) -> Result<bool> {
        if !self.engine.records_owners() {
            return Ok(true);
        }
        let is_reader = {
            let owners = self.owners.lock();
            if owners.is_owner(owner, LockType::Write) {
                trace!(resource = %self.resource, ?owner, "write requested by current writer");
                return Ok(false);
            }
            owners.is_owner(owner, LockType::Read)
        };

        if is_reader {
            self.upgrade(owner, timeout)?;
            return Ok(true);
        }

        if !self.engine.try_write(timeout)? {
            return Err(self.timeout_error(owner, LockKind::Write, timeout));
        }
        let mut owners = self.owners.lock();
        if owners.is_owner(owner, LockType::Write) {
            self.engine.release_write();
            trace!(resource = %self.resource, ?owner, "write granted to the current writer");
            return Ok(false);
        }
        if let Err(e) = owners.set_writer_if_absent(owner.clone()) {
            error!(resource = %self.resource, ?owner, error = %e, "write granted twice");
            self.engine.release_write();
            return Err(e);
        }
        drop(owners);
        trace!(resource = %self.resource, ?owner, "write lock acquired");
        Ok(true)
    }

    fn upgrade(&self, owner: &O, timeout: Duration) -> Result<()> {
        if let Err(e) = self.engine.upgrade(timeout) {
            let mut owners = self.owners.lock();
            owners.remove_reader(owner);
            // Recoverable failures leave the read grant with the engine.
            if matches!(e, LockError::Upgrade(_)) {
                self.engine.release_read();
            }
            let holders = owners.to_string();
            if e.is_fatal() {
                error!(resource = %self.resource, ?owner, error = %e, %holders, "lock upgrade failed");
            } else {
                debug!(resource = %self.resource, ?owner, error = %e, %holders, "lock upgrade failed");
            }
            return Err(e);
        }

        if let Err(e) = self.owners.lock().upgrade(owner) {
            error!(resource = %self.resource, ?owner, error = %e, "upgraded owner lost its read lock");
            self.engine.release_write();
            return Err(e);
        }
        trace!(resource = %self.resource, ?owner, "read lock upgraded to write");
        Ok(())
    }

    /// Releases whatever `owner` holds. Does nothing if it holds nothing.
    pub fn release(&self, owner: &O) {
        let mut owners = self.owners.lock();
        if owners.writer() == Some(owner) {
            owners.remove_writer();
            self.engine.release_write();
            trace!(resource = %self.resource, ?owner, "write lock released");
        } else if owners.remove_reader(owner) {
            self.engine.release_read();
            trace!(resource = %self.resource, ?owner, "read lock released");
        }
    }

    /// Force-releases every reader and the writer.
    pub fn release_all(&self) {
        let mut owners = self.owners.lock();
        let (readers, writer) = owners.clear();
        for _ in &readers {
            self.engine.release_read();
        }
        if writer.is_some() {
            self.engine.release_write();
        }
        if !readers.is_empty() || writer.is_some() {
            debug!(
                resource = %self.resource,
                readers = readers.len(),
                writer = ?writer,
                "all locks released"
            );
        }
    }

    /// Wakes every thread blocked on this resource with
    /// [`LockError::Interrupted`].
    pub fn interrupt_waiters(&self) {
        self.engine.interrupt_waiters();
    }

    pub fn is_owner(&self, owner: &O, kind: LockType) -> bool {
        self.owners.lock().is_owner(owner, kind)
    }

    pub fn is_read_locked(&self) -> bool {
        self.owners.lock().is_read_locked()
    }

    pub fn is_write_locked(&self) -> bool {
        self.owners.lock().is_write_locked()
    }

    pub fn is_locked(&self) -> bool {
        let owners = self.owners.lock();
        owners.is_read_locked() || owners.is_write_locked()
    }

    pub fn readers(&self) -> Vec<O> {
        self.owners.lock().readers().cloned().collect()
    }

    pub fn writer(&self) -> Option<O> {
        self.owners.lock().writer().cloned()
    }

    pub fn status(&self) -> LockStatus<O> {
        let owners = self.owners.lock();
        LockStatus {
            readers: owners.readers().cloned().collect(),
            writer: owners.writer().cloned(),
        }
    }

    pub fn engine_stats(&self) -> EngineStats {
        self.engine.stats()
    }

    fn timeout_error(&self, owner: &O, kind: LockKind, timeout: Duration) -> LockError {
        let holders = self.owners.lock().to_string();
        debug!(resource = %self.resource, ?owner, %kind, ?timeout, %holders, "lock acquisition timed out");
        LockError::Timeout {
            resource: self.resource.clone(),
            owner: format!("{owner:?}"),
            kind,
            timeout,
            holders,
        }
    }
}

impl<O: LockOwner> fmt::Display for ResourceLock<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.resource, self.owners.lock())
    }
}
