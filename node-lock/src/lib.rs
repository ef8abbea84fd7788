//! Per-node read/write locks for a tree-structured cache.
//!
//! Every node of the cache namespace (`/a/b/c`) can be guarded by its own
//! [`ResourceLock`]. Locks are held on behalf of caller-supplied **owners**
//! (a transaction handle, a session id, ...), not threads: the same owner
//! may acquire and release from different threads, and re-acquiring access
//! it already has is a no-op. A reader asking for the write lock is
//! **upgraded in place**, without handing the node to another writer first.
//!
//! The [`IsolationLevel`] chosen at construction selects the engine:
//!
//! | Level | Engine | Prevents |
//! |-------|--------|----------|
//! | `None` | [`NullLock`] | nothing |
//! | `ReadUncommitted` | [`ExclusiveWriteLock`] | write/write races |
//! | `ReadCommitted` | [`UpgradableLock`], non-blocking writer | dirty reads |
//! | `RepeatableRead` | [`UpgradableLock`] | dirty and non-repeatable reads |
//! | `Serializable` | [`SerialLock`] | dirty, non-repeatable and phantom reads |
//!
//! # Quick Start
//!
//! ```rust
//! use std::time::Duration;
//! use node_lock::{LockConfig, LockError, LockManager};
//!
//! let locks: LockManager<&str> = LockManager::new(LockConfig::default());
//! let timeout = Duration::from_millis(50);
//!
//! assert!(locks.acquire_read("/x", &"A", timeout).unwrap());
//!
//! // B cannot write while A reads.
//! let err = locks.acquire_write("/x", &"B", timeout).unwrap_err();
//! assert!(matches!(err, LockError::Timeout { .. }));
//!
//! // A upgrades its read lock, then lets go.
//! assert!(locks.acquire_write("/x", &"A", timeout).unwrap());
//! locks.release("/x", &"A");
//!
//! assert!(locks.acquire_write("/x", &"B", timeout).unwrap());
//! ```
//!
//! # Striped locks
//!
//! [`StripedLockTable`] guards an unbounded key space with a fixed number of
//! locks, for stores where one lock per key would cost too much memory:
//!
//! ```rust
//! use node_lock::StripedLockTable;
//!
//! let table = StripedLockTable::new(20).unwrap();
//! table.acquire_all(["/a/1", "/a/2"], true).unwrap();
//! table.release_all(["/a/1", "/a/2"]);
//! ```

mod config;
pub mod engine;
mod error;
pub mod factory;
mod guard;
mod isolation;
mod manager;
mod mode;
mod ownership;
mod resource;
pub mod striped;

pub use config::LockConfig;
pub use engine::{
    EngineStats, ExclusiveWriteLock, LockEngine, NullLock, Semaphore, SerialLock, UpgradableLock,
    WriterMode,
};
pub use error::{LockError, Result, UpgradeError};
pub use guard::StripeGuard;
pub use isolation::IsolationLevel;
pub use manager::LockManager;
pub use mode::{LockKind, LockType};
pub use ownership::{LockOwner, OwnershipMap};
pub use resource::{LockStatus, ResourceLock};
pub use striped::StripedLockTable;
