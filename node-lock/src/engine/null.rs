use std::time::Duration;

use crate::engine::{EngineStats, LockEngine};
use crate::error::Result;

/// Engine that grants everything and tracks nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLock;

impl LockEngine for NullLock {
    #[inline]
    fn try_read(&self, _timeout: Duration) -> Result<bool> {
        Ok(true)
    }

    #[inline]
    fn try_write(&self, _timeout: Duration) -> Result<bool> {
        Ok(true)
    }

    #[inline]
    fn release_read(&self) {}

    #[inline]
    fn release_write(&self) {}

    #[inline]
    fn upgrade(&self, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    fn records_owners(&self) -> bool {
        false
    }

    fn stats(&self) -> EngineStats {
        EngineStats::default()
    }
}
