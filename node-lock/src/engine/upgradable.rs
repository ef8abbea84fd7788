use std::thread::{self, ThreadId};
use std::time::Duration;

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{error, trace, warn};

use crate::engine::{deadline_after, expired, wait_until, EngineStats, LockEngine};
use crate::error::{LockError, Result, UpgradeError};

/// Whether a writer has to wait for active readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterMode {
    /// A writer waits until every reader is gone (`RepeatableRead`).
    Blocking,
    /// A writer only waits for another writer (`ReadCommitted`).
    NonBlocking,
}

#[derive(Debug, Default)]
struct State {
    active_readers: u32,
    active_writer: Option<ThreadId>,
    waiting_readers: u32,
    /// Readers re-acquiring their slot after a timed-out upgrade. They skip
    /// the writer-preference rule.
    restoring_readers: u32,
    waiting_writers: u32,
    waiting_upgrader: u32,
    /// Ticket of the upgrade in progress, if any.
    upgrader: Option<u64>,
    next_ticket: u64,
    interrupts: u64,
}

impl State {
    fn allow_reader(&self, mode: WriterMode) -> bool {
        match mode {
            WriterMode::Blocking => {
                self.active_writer.is_none()
                    && self.waiting_writers == 0
                    && self.waiting_upgrader == 0
            }
            WriterMode::NonBlocking => self.active_writer.is_none(),
        }
    }

    /// `ticket` is `Some` only for the upgrader, which preempts every other
    /// writer while its marker is set.
    fn allow_writer(&self, mode: WriterMode, ticket: Option<u64>) -> bool {
        if self.active_writer.is_some() {
            return false;
        }
        if mode == WriterMode::Blocking && self.active_readers > 0 {
            return false;
        }
        match self.upgrader {
            Some(marked) => ticket == Some(marked),
            None => true,
        }
    }
}

/// Writer-preferring read/write lock with in-place upgrade.
///
/// New readers queue behind waiting writers so a steady stream of readers
/// cannot starve a writer. At most one upgrade may be outstanding; while it
/// waits, the upgrader is served before any ordinary writer.
///
/// ```
/// use std::time::Duration;
/// use node_lock::{LockEngine, UpgradableLock};
///
/// let lock = UpgradableLock::new();
/// assert!(lock.try_read(Duration::ZERO).unwrap());
/// lock.upgrade(Duration::from_millis(10)).unwrap();
/// assert!(lock.stats().write_held);
/// lock.release_write();
/// ```
#[derive(Debug)]
pub struct UpgradableLock {
    mode: WriterMode,
    state: Mutex<State>,
    readers: Condvar,
    writers: Condvar,
}

impl UpgradableLock {
    /// Strict variant: writers wait for readers.
    pub fn new() -> Self {
        Self::with_mode(WriterMode::Blocking)
    }

    /// Writers ignore active readers.
    pub fn non_blocking_writer() -> Self {
        Self::with_mode(WriterMode::NonBlocking)
    }

    pub fn with_mode(mode: WriterMode) -> Self {
        Self {
            mode,
            state: Mutex::new(State::default()),
            readers: Condvar::new(),
            writers: Condvar::new(),
        }
    }

    pub fn mode(&self) -> WriterMode {
        self.mode
    }

    fn signal_writers(&self, state: &State) {
        if state.waiting_upgrader > 0 {
            // Only the marked upgrader may proceed; everyone else re-parks.
            self.writers.notify_all();
        } else if state.waiting_writers > 0 {
            self.writers.notify_one();
        }
    }

    /// Hands on a wake-up that a departing waiter may have swallowed.
    fn pass_on(&self, state: &State) {
        if state.waiting_readers > 0 && state.allow_reader(self.mode) {
            self.readers.notify_all();
        }
        if (state.waiting_writers > 0 || state.waiting_upgrader > 0)
            && state.allow_writer(self.mode, state.upgrader)
        {
            self.signal_writers(state);
        }
    }

    /// Re-acquires the read slot given up by a timed-out upgrade.
    ///
    /// `epoch` is the interrupt epoch the upgrade started in.
    fn restore_read(
        &self,
        state: &mut MutexGuard<'_, State>,
        timeout: Duration,
        epoch: u64,
    ) -> Result<bool> {
        let deadline = deadline_after(timeout);
        if state.active_writer.is_none() {
            state.active_readers += 1;
            return Ok(true);
        }
        state.restoring_readers += 1;
        let outcome = loop {
            wait_until(&self.readers, state, deadline);
            if state.interrupts != epoch {
                break Err(LockError::Interrupted);
            }
            if state.active_writer.is_none() {
                state.active_readers += 1;
                break Ok(true);
            }
            if expired(deadline) {
                break Ok(false);
            }
        };
        state.restoring_readers -= 1;
        outcome
    }
}

impl Default for UpgradableLock {
    fn default() -> Self {
        Self::new()
    }
}

impl LockEngine for UpgradableLock {
    fn try_read(&self, timeout: Duration) -> Result<bool> {
        let deadline = deadline_after(timeout);
        let mut state = self.state.lock();
        if state.allow_reader(self.mode) {
            state.active_readers += 1;
            return Ok(true);
        }
        if timeout.is_zero() {
            return Ok(false);
        }

        state.waiting_readers += 1;
        let epoch = state.interrupts;
        let outcome = loop {
            wait_until(&self.readers, &mut state, deadline);
            if state.interrupts != epoch {
                break Err(LockError::Interrupted);
            }
            if state.allow_reader(self.mode) {
                state.active_readers += 1;
                break Ok(true);
            }
            if expired(deadline) {
                break Ok(false);
            }
        };
        state.waiting_readers -= 1;
        outcome
    }

    fn try_write(&self, timeout: Duration) -> Result<bool> {
        let deadline = deadline_after(timeout);
        let mut state = self.state.lock();
        if state.allow_writer(self.mode, None) {
            state.active_writer = Some(thread::current().id());
            return Ok(true);
        }
        if timeout.is_zero() {
            return Ok(false);
        }

        state.waiting_writers += 1;
        let epoch = state.interrupts;
        let outcome = loop {
            wait_until(&self.writers, &mut state, deadline);
            if state.interrupts != epoch {
                break Err(LockError::Interrupted);
            }
            if state.allow_writer(self.mode, None) {
                state.active_writer = Some(thread::current().id());
                break Ok(true);
            }
            if expired(deadline) {
                break Ok(false);
            }
        };
        state.waiting_writers -= 1;
        if !matches!(outcome, Ok(true)) {
            // Readers may have been held back only by this writer.
            self.pass_on(&state);
        }
        outcome
    }

    fn release_read(&self) {
        let mut state = self.state.lock();
        if state.active_readers == 0 {
            error!("read lock released while no reader is active");
            return;
        }
        state.active_readers -= 1;
        if state.active_readers == 0 && self.mode == WriterMode::Blocking {
            self.signal_writers(&state);
        }
    }

    fn release_write(&self) {
        let mut state = self.state.lock();
        if state.active_writer.take().is_none() {
            error!("write lock released while no writer is active");
            return;
        }
        let wake_readers = (state.waiting_readers > 0 && state.allow_reader(self.mode))
            || state.restoring_readers > 0;
        if wake_readers {
            self.readers.notify_all();
        }
        if state.waiting_upgrader > 0 {
            self.writers.notify_all();
        } else if state.waiting_writers > 0
            && (self.mode == WriterMode::NonBlocking || !wake_readers)
        {
            self.writers.notify_one();
        }
    }

    fn upgrade(&self, timeout: Duration) -> Result<()> {
        let mut state = self.state.lock();
        if state.active_readers == 0 {
            error!("upgrade requested without a held read lock");
            return Err(LockError::IllegalState(
                "upgrade requested without holding a read lock".into(),
            ));
        }
        if state.upgrader.is_some() {
            warn!("rejecting concurrent upgrade attempt");
            return Err(UpgradeError::Contended.into());
        }

        if state.active_readers == 1 && state.active_writer.is_none() {
            state.active_readers = 0;
            state.active_writer = Some(thread::current().id());
            trace!("upgraded sole reader in place");
            return Ok(());
        }

        state.active_readers -= 1;
        let ticket = state.next_ticket;
        state.next_ticket = state.next_ticket.wrapping_add(1);
        state.upgrader = Some(ticket);
        state.waiting_upgrader = 1;

        let deadline = deadline_after(timeout);
        let epoch = state.interrupts;
        let granted = loop {
            if state.allow_writer(self.mode, Some(ticket)) {
                state.active_writer = Some(thread::current().id());
                break Some(Ok(()));
            }
            if state.interrupts != epoch {
                break Some(Err(LockError::Interrupted));
            }
            if expired(deadline) {
                break None;
            }
            wait_until(&self.writers, &mut state, deadline);
        };
        state.upgrader = None;
        state.waiting_upgrader = 0;

        match granted {
            Some(Ok(())) => {
                trace!(
                    readers = state.active_readers,
                    "upgraded after waiting for the write lock"
                );
                Ok(())
            }
            Some(Err(e)) => {
                self.pass_on(&state);
                Err(e)
            }
            None => {
                self.pass_on(&state);
                if self.restore_read(&mut state, timeout, epoch)? {
                    Err(UpgradeError::TimedOut(timeout).into())
                } else {
                    error!(
                        ?timeout,
                        "upgrade timed out and the read lock could not be restored"
                    );
                    Err(LockError::UpgradeRecovery { timeout })
                }
            }
        }
    }

    fn interrupt_waiters(&self) {
        let mut state = self.state.lock();
        state.interrupts = state.interrupts.wrapping_add(1);
        self.readers.notify_all();
        self.writers.notify_all();
    }

    fn stats(&self) -> EngineStats {
        let state = self.state.lock();
        EngineStats {
            active_readers: state.active_readers,
            write_held: state.active_writer.is_some(),
            waiting_readers: state.waiting_readers + state.restoring_readers,
            waiting_writers: state.waiting_writers,
            waiting_upgrader: state.waiting_upgrader > 0,
        }
    }
}
