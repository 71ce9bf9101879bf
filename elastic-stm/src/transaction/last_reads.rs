use std::collections::VecDeque;

use crate::lock_table::{LockTable, OwnerId};
use crate::object::LocationId;

use super::{still_valid, ReadEntry, ReadSet, WriteSet};

/// Bounded window of the most recent reads of an elastic transaction.
///
/// Only these `k` reads are checked by partial validation; older reads are
/// forgotten when pushed out.
#[derive(Debug)]
pub struct LastReadEntries {
    window: VecDeque<ReadEntry>,
    capacity: usize,
}

impl LastReadEntries {
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> LastReadEntries {
        assert!(capacity > 0, "elastic window must hold at least one read");
        LastReadEntries {
            window: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Record a read, evicting the oldest one when full.
    pub fn push(&mut self, entry: ReadEntry) {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(entry);
    }

    pub fn contains(&self, location: LocationId) -> bool {
        self.window.iter().any(|e| e.location == location)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReadEntry> {
        self.window.iter()
    }

    /// Partial validation: O(k) in the window size.
    pub fn validate(&self, table: &LockTable, owner: OwnerId, write_set: &WriteSet) -> bool {
        self.window
            .iter()
            .all(|entry| still_valid(entry, table, owner, write_set))
    }

    /// Move the window, oldest first, into a full read set.
    pub fn drain_into(&mut self, read_set: &mut ReadSet) {
        read_set.extend(self.window.drain(..));
    }

    pub fn clear(&mut self) {
        self.window.clear();
    }
}
