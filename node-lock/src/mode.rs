use std::fmt;

/// Access requested by an acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockKind {
    Read,
    Write,
}

impl LockKind {
    /// Maps the `exclusive` flag used by collaborators onto a kind.
    #[inline]
    pub fn from_exclusive(exclusive: bool) -> Self {
        if exclusive {
            LockKind::Write
        } else {
            LockKind::Read
        }
    }

    #[inline]
    pub fn is_exclusive(self) -> bool {
        matches!(self, LockKind::Write)
    }
}

impl fmt::Display for LockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockKind::Read => f.write_str("read"),
            LockKind::Write => f.write_str("write"),
        }
    }
}

/// Ownership filter for [`ResourceLock::is_owner`](crate::ResourceLock::is_owner).
///
/// `Any` matches an owner holding either kind of lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockType {
    Read,
    Write,
    Any,
}

impl LockType {
    #[inline]
    pub(crate) fn includes_read(self) -> bool {
        matches!(self, LockType::Read | LockType::Any)
    }

    #[inline]
    pub(crate) fn includes_write(self) -> bool {
        matches!(self, LockType::Write | LockType::Any)
    }
}

impl From<LockKind> for LockType {
    fn from(kind: LockKind) -> Self {
        match kind {
            LockKind::Read => LockType::Read,
            LockKind::Write => LockType::Write,
        }
    }
}
