use std::time::Duration;

use crate::error::{LockError, Result};
use crate::isolation::IsolationLevel;

/// Construction-time settings for [`LockManager`](crate::LockManager) and
/// [`StripedLockTable`](crate::StripedLockTable).
///
/// ```
/// use std::time::Duration;
/// use node_lock::{IsolationLevel, LockConfig};
///
/// let config = LockConfig::default()
///     .with_isolation_name("read-committed")
///     .unwrap()
///     .with_lock_timeout(Duration::from_millis(250));
/// assert_eq!(config.isolation, IsolationLevel::ReadCommitted);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LockConfig {
    pub isolation: IsolationLevel,
    /// Timeout used by acquisitions that do not pass one explicitly.
    pub lock_timeout: Duration,
    /// Striping concurrency hint, rounded up to a power of two.
    pub concurrency: usize,
}

impl LockConfig {
    pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);
    pub const DEFAULT_CONCURRENCY: usize = 20;

    pub fn with_isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = isolation;
        self
    }

    pub fn with_isolation_name(mut self, name: &str) -> Result<Self> {
        self.isolation = name.parse()?;
        Ok(self)
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(LockError::InvalidArgument(
                "concurrency must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            isolation: IsolationLevel::default(),
            lock_timeout: Self::DEFAULT_LOCK_TIMEOUT,
            concurrency: Self::DEFAULT_CONCURRENCY,
        }
    }
}
