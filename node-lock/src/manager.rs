use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::debug;

use crate::config::LockConfig;
use crate::error::Result;
use crate::factory;
use crate::mode::{LockKind, LockType};
use crate::ownership::LockOwner;
use crate::resource::{LockStatus, ResourceLock};

/// Registry of node locks keyed by resource name.
///
/// Locks are created on first use with the configured isolation level and
/// stay registered until [`purge_idle`](LockManager::purge_idle) finds them
/// unused.
///
/// ```
/// use std::time::Duration;
/// use node_lock::{LockConfig, LockManager};
///
/// let locks: LockManager<u64> = LockManager::new(LockConfig::default());
/// let timeout = Duration::from_millis(50);
///
/// assert!(locks.acquire_read("/a", &1, timeout).unwrap());
/// assert!(locks.acquire_read("/a", &2, timeout).unwrap());
/// assert!(locks.acquire_write("/b", &1, timeout).unwrap());
///
/// let status = locks.lock_status("/a").unwrap();
/// assert_eq!(status.readers.len(), 2);
///
/// locks.release_owned(&1);
/// locks.release("/a", &2);
/// assert!(!locks.is_locked("/a"));
/// assert_eq!(locks.purge_idle(), 2);
/// ```
#[derive(Debug)]
pub struct LockManager<O: LockOwner> {
    config: LockConfig,
    locks: DashMap<String, Arc<ResourceLock<O>>>,
}

impl<O: LockOwner> LockManager<O> {
    pub fn new(config: LockConfig) -> Self {
        Self {
            config,
            locks: DashMap::new(),
        }
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// The lock of `resource`, created if it does not exist yet.
    pub fn lock_for(&self, resource: &str) -> Arc<ResourceLock<O>> {
        if let Some(lock) = self.locks.get(resource) {
            return Arc::clone(lock.value());
        }
        let lock = self.locks.entry(resource.to_owned()).or_insert_with(|| {
            Arc::new(ResourceLock::with_engine(
                resource,
                factory::engine_for(self.config.isolation),
            ))
        });
        Arc::clone(lock.value())
    }

    fn existing(&self, resource: &str) -> Option<Arc<ResourceLock<O>>> {
        self.locks.get(resource).map(|lock| Arc::clone(lock.value()))
    }

    pub fn acquire_read(&self, resource: &str, owner: &O, timeout: Duration) -> Result<bool> {
        self.lock_for(resource).acquire_read(owner, timeout)
    }

    pub fn acquire_write(&self, resource: &str, owner: &O, timeout: Duration) -> Result<bool> {
        self.lock_for(resource).acquire_write(owner, timeout)
    }

    /// Acquires with the configured default timeout.
    pub fn acquire(&self, resource: &str, owner: &O, kind: LockKind) -> Result<bool> {
        self.lock_for(resource).acquire(owner, kind, self.config.lock_timeout)
    }

    pub fn release(&self, resource: &str, owner: &O) {
        if let Some(lock) = self.existing(resource) {
            lock.release(owner);
        }
    }

    pub fn release_all(&self, resource: &str) {
        if let Some(lock) = self.existing(resource) {
            lock.release_all();
        }
    }

    /// Releases every lock `owner` holds, on any resource. Returns how many
    /// resources were released.
    pub fn release_owned(&self, owner: &O) -> usize {
        let held: Vec<_> = self
            .locks
            .iter()
            .filter(|entry| entry.value().is_owner(owner, LockType::Any))
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for lock in &held {
            lock.release(owner);
        }
        if !held.is_empty() {
            debug!(?owner, resources = held.len(), "released all locks of owner");
        }
        held.len()
    }

    pub fn lock_status(&self, resource: &str) -> Option<LockStatus<O>> {
        self.existing(resource).map(|lock| lock.status())
    }

    pub fn is_locked(&self, resource: &str) -> bool {
        self.existing(resource).is_some_and(|lock| lock.is_locked())
    }

    pub fn interrupt_waiters(&self, resource: &str) {
        if let Some(lock) = self.existing(resource) {
            lock.interrupt_waiters();
        }
    }

    /// Drops registry entries that are unlocked, have no waiters, and are
    /// not referenced outside the registry. Returns how many were dropped.
    pub fn purge_idle(&self) -> usize {
        let mut purged = 0;
        self.locks.retain(|_, lock| {
            let keep =
                Arc::strong_count(lock) > 1 || lock.is_locked() || !lock.engine_stats().is_idle();
            if !keep {
                purged += 1;
            }
            keep
        });
        if purged > 0 {
            debug!(purged, "purged idle resource locks");
        }
        purged
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl<O: LockOwner> Default for LockManager<O> {
    fn default() -> Self {
        Self::new(LockConfig::default())
    }
}
