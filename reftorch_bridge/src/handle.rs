//! Handle table: the only owner of live native tensors.
//!
//! Handles come from a monotonically increasing counter starting at 1 and are
//! never recycled, so a stale handle can only ever miss, never alias a newer
//! tensor.

use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, trace};

use crate::error::{BridgeError, BridgeResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(i64);

impl Handle {
    /// Wraps a raw engine number. Whether it names a tensor is up to the table.
    pub fn from_raw(raw: i64) -> Self {
        Handle(raw)
    }

    pub fn raw(self) -> i64 {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug)]
pub struct HandleTable<T> {
    entries: BTreeMap<Handle, T>,
    next: i64,
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HandleTable<T> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            next: 1,
        }
    }

    pub fn allocate(&mut self, tensor: T) -> Handle {
        let handle = Handle(self.next);
        self.next += 1;
        self.entries.insert(handle, tensor);
        trace!(%handle, live = self.entries.len(), "allocated");
        handle
    }

    pub fn resolve(&self, handle: Handle) -> BridgeResult<&T> {
        self.entries
            .get(&handle)
            .ok_or(BridgeError::UnknownHandle(handle))
    }

    /// Only for operations contracted to mutate their operand in place.
    pub fn resolve_mut(&mut self, handle: Handle) -> BridgeResult<&mut T> {
        self.entries
            .get_mut(&handle)
            .ok_or(BridgeError::UnknownHandle(handle))
    }

    /// Drops the tensor behind `handle`. Releasing a handle that is not live
    /// (never issued, already released, or swept by `release_all`) is an
    /// `UnknownHandle` error and touches nothing else.
    pub fn release(&mut self, handle: Handle) -> BridgeResult<()> {
        match self.entries.remove(&handle) {
            Some(tensor) => {
                drop(tensor);
                trace!(%handle, live = self.entries.len(), "released");
                Ok(())
            }
            None => {
                debug!(%handle, "release of a handle that is not live");
                Err(BridgeError::UnknownHandle(handle))
            }
        }
    }

    /// Empties the table; returns how many tensors were dropped.
    pub fn release_all(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        debug!(count, "released all handles");
        count
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.entries.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Live handles in ascending order.
    pub fn handles(&self) -> impl Iterator<Item = Handle> + '_ {
        self.entries.keys().copied()
    }

    /// The value the next `allocate` will return.
    pub fn next_handle(&self) -> Handle {
        Handle(self.next)
    }
}
