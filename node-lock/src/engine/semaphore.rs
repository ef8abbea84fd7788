use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{error, trace};

use crate::engine::{deadline_after, expired, wait_until, EngineStats, LockEngine};
use crate::error::{LockError, Result, UpgradeError};

#[derive(Debug)]
struct Permits {
    available: u32,
    capacity: u32,
    waiting: u32,
    interrupts: u64,
}

/// Counting semaphore with timed acquisition.
#[derive(Debug)]
pub struct Semaphore {
    permits: Mutex<Permits>,
    released: Condvar,
}

impl Semaphore {
    pub fn new(permits: u32) -> Self {
        Self {
            permits: Mutex::new(Permits {
                available: permits,
                capacity: permits,
                waiting: 0,
                interrupts: 0,
            }),
            released: Condvar::new(),
        }
    }

    /// Takes one permit, waiting up to `timeout` for it.
    pub fn acquire(&self, timeout: Duration) -> Result<bool> {
        let deadline = deadline_after(timeout);
        let mut permits = self.permits.lock();
        if permits.available > 0 {
            permits.available -= 1;
            return Ok(true);
        }
        if timeout.is_zero() {
            return Ok(false);
        }

        permits.waiting += 1;
        let epoch = permits.interrupts;
        let outcome = loop {
            wait_until(&self.released, &mut permits, deadline);
            if permits.interrupts != epoch {
                break Err(LockError::Interrupted);
            }
            if permits.available > 0 {
                permits.available -= 1;
                break Ok(true);
            }
            if expired(deadline) {
                break Ok(false);
            }
        };
        permits.waiting -= 1;

        // A wake-up consumed by a waiter that gave up goes to the next one.
        if !matches!(outcome, Ok(true)) && permits.available > 0 && permits.waiting > 0 {
            self.released.notify_one();
        }
        outcome
    }

    pub fn release(&self) {
        let mut permits = self.permits.lock();
        if permits.available >= permits.capacity {
            error!(
                capacity = permits.capacity,
                "semaphore released more often than acquired"
            );
            return;
        }
        permits.available += 1;
        if permits.waiting > 0 {
            self.released.notify_one();
        }
    }

    pub fn available_permits(&self) -> u32 {
        self.permits.lock().available
    }

    pub fn interrupt_waiters(&self) {
        let mut permits = self.permits.lock();
        permits.interrupts = permits.interrupts.wrapping_add(1);
        self.released.notify_all();
    }

    fn waiting(&self) -> u32 {
        self.permits.lock().waiting
    }
}

/// `ReadUncommitted` engine: reads are free, writers exclude each other.
#[derive(Debug)]
pub struct ExclusiveWriteLock {
    writers: Semaphore,
}

impl ExclusiveWriteLock {
    pub fn new() -> Self {
        Self {
            writers: Semaphore::new(1),
        }
    }
}

impl Default for ExclusiveWriteLock {
    fn default() -> Self {
        Self::new()
    }
}

impl LockEngine for ExclusiveWriteLock {
    fn try_read(&self, _timeout: Duration) -> Result<bool> {
        Ok(true)
    }

    fn try_write(&self, timeout: Duration) -> Result<bool> {
        self.writers.acquire(timeout)
    }

    fn release_read(&self) {}

    fn release_write(&self) {
        self.writers.release();
    }

    /// Readers hold nothing here, so an upgrade is a plain write acquisition.
    fn upgrade(&self, timeout: Duration) -> Result<()> {
        if self.writers.acquire(timeout)? {
            trace!("upgraded uncommitted read to write");
            Ok(())
        } else {
            Err(UpgradeError::TimedOut(timeout).into())
        }
    }

    fn interrupt_waiters(&self) {
        self.writers.interrupt_waiters();
    }

    fn stats(&self) -> EngineStats {
        EngineStats {
            write_held: self.writers.available_permits() == 0,
            waiting_writers: self.writers.waiting(),
            ..EngineStats::default()
        }
    }
}

/// `Serializable` engine: one permit shared by readers and writers.
#[derive(Debug)]
pub struct SerialLock {
    permit: Semaphore,
}

impl SerialLock {
    pub fn new() -> Self {
        Self {
            permit: Semaphore::new(1),
        }
    }
}

impl Default for SerialLock {
    fn default() -> Self {
        Self::new()
    }
}

impl LockEngine for SerialLock {
    fn try_read(&self, timeout: Duration) -> Result<bool> {
        self.permit.acquire(timeout)
    }

    fn try_write(&self, timeout: Duration) -> Result<bool> {
        self.permit.acquire(timeout)
    }

    fn release_read(&self) {
        self.permit.release();
    }

    fn release_write(&self) {
        self.permit.release();
    }

    /// The reader already owns the only permit.
    fn upgrade(&self, _timeout: Duration) -> Result<()> {
        if self.permit.available_permits() > 0 {
            error!("serializable upgrade requested without a held read lock");
            return Err(LockError::IllegalState(
                "upgrade requested without holding a read lock".into(),
            ));
        }
        Ok(())
    }

    fn interrupt_waiters(&self) {
        self.permit.interrupt_waiters();
    }

    fn stats(&self) -> EngineStats {
        EngineStats {
            write_held: self.permit.available_permits() == 0,
            waiting_writers: self.permit.waiting(),
            ..EngineStats::default()
        }
    }
}
