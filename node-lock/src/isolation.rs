use std::fmt;
use std::str::FromStr;

use crate::error::LockError;

/// Isolation policy of a node lock.
///
/// The level is the only input deciding which [`LockEngine`](crate::LockEngine)
/// guards a resource, see [`factory::engine_for`](crate::factory::engine_for).
///
/// | Level | Reads | Writes |
/// |-------|-------|--------|
/// | `None` | never block | never block |
/// | `ReadUncommitted` | never block | exclusive among writers |
/// | `ReadCommitted` | wait for an active writer | do not wait for readers |
/// | `RepeatableRead` | wait for active or queued writers | wait for readers and writer |
/// | `Serializable` | one permit shared with writes | one permit shared with reads |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "String", into = "String")
)]
pub enum IsolationLevel {
    None,
    ReadUncommitted,
    ReadCommitted,
    #[default]
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub const ALL: [IsolationLevel; 5] = [
        IsolationLevel::None,
        IsolationLevel::ReadUncommitted,
        IsolationLevel::ReadCommitted,
        IsolationLevel::RepeatableRead,
        IsolationLevel::Serializable,
    ];

    /// Canonical configuration name, e.g. `REPEATABLE_READ`.
    pub fn as_str(self) -> &'static str {
        match self {
            IsolationLevel::None => "NONE",
            IsolationLevel::ReadUncommitted => "READ_UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ_COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE_READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }

    /// Whether writers of this level wait for active readers to drain.
    pub fn writers_wait_for_readers(self) -> bool {
        matches!(
            self,
            IsolationLevel::RepeatableRead | IsolationLevel::Serializable
        )
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IsolationLevel {
    type Err = LockError;

    /// Case-insensitive; `-`, `_` and spaces are interchangeable.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .map(|c| match c {
                '-' | ' ' => '_',
                c => c.to_ascii_uppercase(),
            })
            .collect();
        IsolationLevel::ALL
            .into_iter()
            .find(|level| level.as_str() == normalized)
            .ok_or_else(|| LockError::UnknownIsolationLevel(s.to_owned()))
    }
}

impl TryFrom<String> for IsolationLevel {
    type Error = LockError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<IsolationLevel> for String {
    fn from(level: IsolationLevel) -> Self {
        level.as_str().to_owned()
    }
}
