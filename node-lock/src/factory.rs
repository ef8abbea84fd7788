//! Selects the engine guarding a resource from its isolation level.

use crate::engine::{ExclusiveWriteLock, LockEngine, NullLock, SerialLock, UpgradableLock};
use crate::isolation::IsolationLevel;

/// Builds a fresh engine for `level`.
///
/// | Level | Engine |
/// |-------|--------|
/// | `None` | [`NullLock`] |
/// | `ReadUncommitted` | [`ExclusiveWriteLock`] |
/// | `ReadCommitted` | [`UpgradableLock::non_blocking_writer`] |
/// | `RepeatableRead` | [`UpgradableLock::new`] |
/// | `Serializable` | [`SerialLock`] |
pub fn engine_for(level: IsolationLevel) -> Box<dyn LockEngine> {
    match level {
        IsolationLevel::None => Box::new(NullLock),
        IsolationLevel::ReadUncommitted => Box::new(ExclusiveWriteLock::new()),
        IsolationLevel::ReadCommitted => Box::new(UpgradableLock::non_blocking_writer()),
        IsolationLevel::RepeatableRead => Box::new(UpgradableLock::new()),
        IsolationLevel::Serializable => Box::new(SerialLock::new()),
    }
}

/// Same as [`engine_for`], with the level given by its configuration name.
pub fn engine_for_name(name: &str) -> crate::Result<Box<dyn LockEngine>> {
    Ok(engine_for(name.parse()?))
}
