use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;

use crate::error::{LockError, Result};
use crate::mode::LockType;

/// Identity on whose behalf a lock is held.
///
/// Equal owners are the same logical owner, whichever thread acts for them.
pub trait LockOwner: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static {}

impl<T> LockOwner for T where T: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static {}

/// Who holds a resource: any number of readers or a single writer.
///
/// Readers and a writer coexist only where the engine lets writers in next
/// to readers (`ReadUncommitted`, `ReadCommitted`).
#[derive(Debug, Clone)]
pub struct OwnershipMap<O> {
    writer: Option<O>,
    readers: HashSet<O>,
}

impl<O: LockOwner> OwnershipMap<O> {
    pub fn new() -> Self {
        Self {
            writer: None,
            readers: HashSet::new(),
        }
    }

    pub fn is_owner(&self, owner: &O, kind: LockType) -> bool {
        (kind.includes_write() && self.writer.as_ref() == Some(owner))
            || (kind.includes_read() && self.readers.contains(owner))
    }

    /// Returns `false` if `owner` was already a reader.
    pub fn add_reader(&mut self, owner: O) -> bool {
        self.readers.insert(owner)
    }

    pub fn remove_reader(&mut self, owner: &O) -> bool {
        self.readers.remove(owner)
    }

    /// Fails if a writer is already recorded; the engine admits one writer
    /// at a time so this indicates corrupted state.
    pub fn set_writer_if_absent(&mut self, owner: O) -> Result<()> {
        if let Some(current) = &self.writer {
            return Err(LockError::IllegalState(format!(
                "write owner already set to {current:?} while granting to {owner:?}"
            )));
        }
        self.writer = Some(owner);
        Ok(())
    }

    pub fn remove_writer(&mut self) -> Option<O> {
        self.writer.take()
    }

    /// Moves `owner` from the reader set to the writer slot.
    pub fn upgrade(&mut self, owner: &O) -> Result<()> {
        if !self.readers.remove(owner) {
            return Err(LockError::OwnerNotExisted(format!("{owner:?}")));
        }
        if let Some(current) = &self.writer {
            self.readers.insert(owner.clone());
            return Err(LockError::IllegalState(format!(
                "cannot upgrade {owner:?}: write owner is {current:?}"
            )));
        }
        self.writer = Some(owner.clone());
        Ok(())
    }

    pub fn writer(&self) -> Option<&O> {
        self.writer.as_ref()
    }

    pub fn readers(&self) -> impl Iterator<Item = &O> {
        self.readers.iter()
    }

    pub fn reader_count(&self) -> usize {
        self.readers.len()
    }

    pub fn is_read_locked(&self) -> bool {
        !self.readers.is_empty()
    }

    pub fn is_write_locked(&self) -> bool {
        self.writer.is_some()
    }

    /// Empties the map, returning the former readers and writer.
    pub fn clear(&mut self) -> (Vec<O>, Option<O>) {
        (self.readers.drain().collect(), self.writer.take())
    }
}

impl<O: LockOwner> Default for OwnershipMap<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: LockOwner> fmt::Display for OwnershipMap<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("read owners: [")?;
        for (i, reader) in self.readers.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{reader:?}")?;
        }
        f.write_str("], write owner: ")?;
        match &self.writer {
            Some(writer) => write!(f, "{writer:?}"),
            None => f.write_str("none"),
        }
    }
}
