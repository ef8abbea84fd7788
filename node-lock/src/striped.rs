//! Fixed-size table of read/write locks shared by an unbounded key space.
//!
//! Keeping one [`ResourceLock`](crate::ResourceLock) per key of an external
//! store would grow without bound. The striped table instead hashes every
//! key onto one of `N` slots, `N` a power of two, and accepts that unrelated
//! keys sharing a slot contend with each other.
//!
//! Two ways of holding a slot share the same locks:
//!
//! * [`acquire`](StripedLockTable::acquire) / [`release`](StripedLockTable::release)
//!   hold a slot on behalf of the calling thread until it is released. They
//!   are reentrant per thread and block the thread while waiting.
//! * [`read`](StripedLockTable::read), [`write`](StripedLockTable::write) and
//!   [`lock_all`](StripedLockTable::lock_all) return [`StripeGuard`]s for
//!   async callers; the slot is released when the guard drops.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use async_lock::{RwLock, RwLockReadGuardArc, RwLockWriteGuardArc};
use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::config::LockConfig;
use crate::error::{LockError, Result};
use crate::guard::StripeGuard;
use crate::mode::LockKind;

/// Upper bound on the number of slots.
pub const MAX_CONCURRENCY: usize = 1 << 16;

struct WriteHold {
    thread: ThreadId,
    holds: u32,
    _guard: RwLockWriteGuardArc<()>,
}

struct ReadHold {
    holds: u32,
    _guard: RwLockReadGuardArc<()>,
}

/// Thread-affine holds of one slot.
#[derive(Default)]
struct Holds {
    writer: Option<WriteHold>,
    readers: HashMap<ThreadId, ReadHold>,
}

struct Slot {
    lock: Arc<RwLock<()>>,
    holds: Mutex<Holds>,
}

impl Slot {
    fn new() -> Self {
        Self {
            lock: Arc::new(RwLock::new(())),
            holds: Mutex::new(Holds::default()),
        }
    }
}

/// Supplemental hash applied to a key's 32-bit hash before slot selection.
///
/// Hierarchical names such as `/a/b/1` and `/a/b/2` produce hashes that
/// differ only in a few low bits; slot selection reads the high bits, so
/// those low-bit differences are spread across the whole word first.
pub fn spread_hash(mut h: u32) -> u32 {
    h = h.wrapping_add((h << 15) ^ 0xffff_cd7d);
    h ^= h >> 10;
    h = h.wrapping_add(h << 3);
    h ^= h >> 6;
    h = h.wrapping_add((h << 2).wrapping_add(h << 14));
    h ^ (h >> 16)
}

fn hash32<K: Hash + ?Sized>(id: &K) -> u32 {
    let mut hasher = DefaultHasher::new();
    id.hash(&mut hasher);
    let h = hasher.finish();
    (h ^ (h >> 32)) as u32
}

/// Striped read/write locks.
///
/// ```
/// use node_lock::StripedLockTable;
///
/// let table = StripedLockTable::new(20).unwrap();
/// assert_eq!(table.slot_count(), 32);
///
/// table.acquire("/a/b", true).unwrap();
/// table.acquire("/a/b", true).unwrap(); // reentrant
/// table.release("/a/b");
/// assert!(table.is_held_by_current_thread("/a/b"));
/// table.release("/a/b");
/// assert!(!table.is_held_by_current_thread("/a/b"));
/// ```
pub struct StripedLockTable {
    slots: Box<[Slot]>,
    shift: u32,
    mask: usize,
}

impl StripedLockTable {
    /// Creates a table with the next power of two `>= concurrency` slots.
    pub fn new(concurrency: usize) -> Result<Self> {
        if concurrency == 0 {
            return Err(LockError::InvalidArgument(
                "concurrency must be at least 1".into(),
            ));
        }
        if concurrency > MAX_CONCURRENCY {
            return Err(LockError::InvalidArgument(format!(
                "concurrency {concurrency} exceeds the maximum of {MAX_CONCURRENCY}"
            )));
        }
        Ok(Self::with_concurrency(concurrency))
    }

    pub fn from_config(config: &LockConfig) -> Result<Self> {
        config.validate()?;
        Self::new(config.concurrency)
    }

    fn with_concurrency(concurrency: usize) -> Self {
        let mut bits = 0u32;
        let mut count = 1usize;
        while count < concurrency {
            bits += 1;
            count <<= 1;
        }
        Self {
            slots: (0..count).map(|_| Slot::new()).collect(),
            shift: 32 - bits,
            mask: count - 1,
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Slot guarding `id`.
    pub fn slot_index<K: Hash + ?Sized>(&self, id: &K) -> usize {
        let spread = spread_hash(hash32(id));
        spread.checked_shr(self.shift).unwrap_or(0) as usize & self.mask
    }

    /// Locks the slot of `id` for the current thread, blocking until granted.
    ///
    /// A thread holding the slot exclusively may acquire it again in either
    /// mode, and a reader may read again; every acquisition needs its own
    /// [`release`](Self::release). Asking for exclusive access while holding
    /// only shared access fails with [`LockError::IllegalState`].
    pub fn acquire<K: Hash + ?Sized>(&self, id: &K, exclusive: bool) -> Result<()> {
        self.acquire_slot(self.slot_index(id), LockKind::from_exclusive(exclusive))
    }

    /// Like [`acquire`](Self::acquire) but gives up immediately when the slot
    /// is taken.
    pub fn try_acquire<K: Hash + ?Sized>(&self, id: &K, exclusive: bool) -> Result<bool> {
        let index = self.slot_index(id);
        let kind = LockKind::from_exclusive(exclusive);
        if self.reenter(index, kind)? {
            return Ok(true);
        }
        let slot = &self.slots[index];
        let me = thread::current().id();
        let granted = match kind {
            LockKind::Read => slot.lock.try_read_arc().map(|guard| {
                slot.holds.lock().readers.insert(me, ReadHold { holds: 1, _guard: guard });
            }),
            LockKind::Write => slot.lock.try_write_arc().map(|guard| {
                slot.holds.lock().writer = Some(WriteHold {
                    thread: me,
                    holds: 1,
                    _guard: guard,
                });
            }),
        };
        Ok(granted.is_some())
    }

    /// Releases one hold of the current thread on the slot of `id`.
    ///
    /// Returns `false`, and logs a warning, if the thread holds nothing there:
    /// the lock was already released or belongs to another thread.
    pub fn release<K: Hash + ?Sized>(&self, id: &K) -> bool {
        let index = self.slot_index(id);
        let released = self.release_slot(index);
        if !released {
            warn!(slot = index, "release of a striped lock not held by the current thread");
        }
        released
    }

    /// Acquires the slots of all `ids`, in ascending slot order.
    ///
    /// On failure the slots already taken by this call are released again.
    pub fn acquire_all<'k, K, I>(&self, ids: I, exclusive: bool) -> Result<()>
    where
        K: Hash + ?Sized + 'k,
        I: IntoIterator<Item = &'k K>,
    {
        let kind = LockKind::from_exclusive(exclusive);
        let mut indices: Vec<usize> = ids.into_iter().map(|id| self.slot_index(id)).collect();
        indices.sort_unstable();
        for (taken, &index) in indices.iter().enumerate() {
            if let Err(e) = self.acquire_slot(index, kind) {
                for &held in &indices[..taken] {
                    self.release_slot(held);
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Releases one hold per id. Ids whose slot is no longer held by the
    /// current thread are skipped.
    pub fn release_all<'k, K, I>(&self, ids: I)
    where
        K: Hash + ?Sized + 'k,
        I: IntoIterator<Item = &'k K>,
    {
        for id in ids {
            self.release_slot(self.slot_index(id));
        }
    }

    pub fn is_held_by_current_thread<K: Hash + ?Sized>(&self, id: &K) -> bool {
        let me = thread::current().id();
        let holds = self.slots[self.slot_index(id)].holds.lock();
        holds.writer.as_ref().is_some_and(|w| w.thread == me) || holds.readers.contains_key(&me)
    }

    pub fn is_write_held_by_current_thread<K: Hash + ?Sized>(&self, id: &K) -> bool {
        let me = thread::current().id();
        let holds = self.slots[self.slot_index(id)].holds.lock();
        holds.writer.as_ref().is_some_and(|w| w.thread == me)
    }

    /// Whether a writer holds, or is about to take, the slot of `id`.
    pub fn is_write_locked<K: Hash + ?Sized>(&self, id: &K) -> bool {
        self.slots[self.slot_index(id)].lock.try_read().is_none()
    }

    /// Whether the slot of `id` is held in any mode by anyone.
    ///
    /// Thread-affine holds and writers are seen without taking the slot.
    /// Shared [`StripeGuard`]s are not tracked, so an otherwise free slot is
    /// probed with a non-blocking exclusive acquisition; a concurrent
    /// `try_*` call on that slot may fail during that instant.
    pub fn is_locked<K: Hash + ?Sized>(&self, id: &K) -> bool {
        let slot = &self.slots[self.slot_index(id)];
        {
            let holds = slot.holds.lock();
            if holds.writer.is_some() || !holds.readers.is_empty() {
                return true;
            }
        }
        if slot.lock.try_read().is_none() {
            return true;
        }
        slot.lock.try_write().is_none()
    }

    /// Shared scoped hold on the slot of `id`.
    pub async fn read<K: Hash + ?Sized>(&self, id: &K) -> StripeGuard<'_> {
        let index = self.slot_index(id);
        StripeGuard::acquire(&self.slots[index].lock, index, LockKind::Read).await
    }

    /// Exclusive scoped hold on the slot of `id`.
    pub async fn write<K: Hash + ?Sized>(&self, id: &K) -> StripeGuard<'_> {
        let index = self.slot_index(id);
        StripeGuard::acquire(&self.slots[index].lock, index, LockKind::Write).await
    }

    pub fn try_read<K: Hash + ?Sized>(&self, id: &K) -> Option<StripeGuard<'_>> {
        let index = self.slot_index(id);
        StripeGuard::try_acquire(&self.slots[index].lock, index, LockKind::Read)
    }

    pub fn try_write<K: Hash + ?Sized>(&self, id: &K) -> Option<StripeGuard<'_>> {
        let index = self.slot_index(id);
        StripeGuard::try_acquire(&self.slots[index].lock, index, LockKind::Write)
    }

    /// Scoped holds on the slots of all `ids`.
    ///
    /// Each slot is taken once, in ascending slot order, so concurrent
    /// batches cannot deadlock against each other.
    ///
    /// ```
    /// use node_lock::{LockKind, StripedLockTable};
    ///
    /// # tokio_test::block_on(async {
    /// let table = StripedLockTable::new(8).unwrap();
    /// let guards = table.lock_all(["/a", "/b", "/a"], LockKind::Write).await;
    /// assert!(guards.len() <= 2);
    /// assert!(guards.windows(2).all(|w| w[0].slot() < w[1].slot()));
    /// # });
    /// ```
    pub async fn lock_all<K, I>(&self, ids: I, kind: LockKind) -> Vec<StripeGuard<'_>>
    where
        K: Hash,
        I: IntoIterator<Item = K>,
    {
        let mut indices: Vec<usize> = ids.into_iter().map(|id| self.slot_index(&id)).collect();
        indices.sort_unstable();
        indices.dedup();

        let mut guards = Vec::with_capacity(indices.len());
        for index in indices {
            guards.push(StripeGuard::acquire(&self.slots[index].lock, index, kind).await);
        }
        guards
    }

    /// Bumps an existing hold of the current thread. `Ok(false)` means the
    /// slot has to be locked for real.
    fn reenter(&self, index: usize, kind: LockKind) -> Result<bool> {
        let me = thread::current().id();
        let mut holds = self.slots[index].holds.lock();
        if let Some(writer) = holds.writer.as_mut().filter(|w| w.thread == me) {
            writer.holds += 1;
            trace!(slot = index, holds = writer.holds, "re-entered write-held stripe");
            return Ok(true);
        }
        match kind {
            LockKind::Read => match holds.readers.get_mut(&me) {
                Some(reader) => {
                    reader.holds += 1;
                    Ok(true)
                }
                None => Ok(false),
            },
            LockKind::Write if holds.readers.contains_key(&me) => {
                warn!(slot = index, "write requested on a stripe the current thread reads");
                Err(LockError::IllegalState(format!(
                    "stripe {index} is read-locked by the current thread and cannot be upgraded"
                )))
            }
            LockKind::Write => Ok(false),
        }
    }

    fn acquire_slot(&self, index: usize, kind: LockKind) -> Result<()> {
        if self.reenter(index, kind)? {
            return Ok(());
        }
        let slot = &self.slots[index];
        let me = thread::current().id();
        // Block outside the holds mutex; only this thread inserts its own entry.
        match kind {
            LockKind::Read => {
                let guard = slot.lock.read_arc_blocking();
                slot.holds.lock().readers.insert(me, ReadHold { holds: 1, _guard: guard });
            }
            LockKind::Write => {
                let guard = slot.lock.write_arc_blocking();
                slot.holds.lock().writer = Some(WriteHold {
                    thread: me,
                    holds: 1,
                    _guard: guard,
                });
            }
        }
        trace!(slot = index, %kind, "stripe acquired");
        Ok(())
    }

    fn release_slot(&self, index: usize) -> bool {
        let me = thread::current().id();
        let mut holds = self.slots[index].holds.lock();

        let write_remaining = match holds.writer.as_mut().filter(|w| w.thread == me) {
            Some(writer) => {
                writer.holds -= 1;
                Some(writer.holds)
            }
            None => None,
        };
        if let Some(remaining) = write_remaining {
            if remaining == 0 {
                holds.writer = None;
                trace!(slot = index, "stripe write lock released");
            } else {
                trace!(slot = index, remaining, "stripe still write-held by the current thread");
            }
            return true;
        }

        let read_remaining = match holds.readers.get_mut(&me) {
            Some(reader) => {
                reader.holds -= 1;
                reader.holds
            }
            None => return false,
        };
        if read_remaining == 0 {
            holds.readers.remove(&me);
        }
        true
    }
}

impl Default for StripedLockTable {
    fn default() -> Self {
        Self::with_concurrency(LockConfig::DEFAULT_CONCURRENCY)
    }
}

impl fmt::Debug for StripedLockTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StripedLockTable")
            .field("slots", &self.slots.len())
            .field("shift", &self.shift)
            .finish()
    }
}
