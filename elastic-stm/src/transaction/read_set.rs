use crate::lock_table::{LockTable, OwnerId};
use crate::object::LocationId;

use super::{still_valid, WriteSet};

/// One read event: the location, its lock table slot and the timestamp the
/// slot carried when the value was read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadEntry {
    pub location: LocationId,
    pub slot: usize,
    pub observed: u64,
}

/// Append-only log of the reads of a transaction.
///
/// Repeated reads of one location are kept as separate entries and each is
/// checked on its own. Storage is reused across attempts.
#[derive(Debug, Default)]
pub struct ReadSet {
    entries: Vec<ReadEntry>,
}

impl ReadSet {
    pub fn new() -> ReadSet {
        ReadSet::with_capacity(64)
    }

    pub fn with_capacity(capacity: usize) -> ReadSet {
        ReadSet {
            entries: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn add(&mut self, location: LocationId, slot: usize, observed: u64) {
        self.push(ReadEntry {
            location,
            slot,
            observed,
        });
    }

    #[inline]
    pub fn push(&mut self, entry: ReadEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn contains(&self, location: LocationId) -> bool {
        self.entries.iter().any(|e| e.location == location)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReadEntry> {
        self.entries.iter()
    }

    /// Check every entry against the lock table.
    pub fn validate(&self, table: &LockTable, owner: OwnerId, write_set: &WriteSet) -> bool {
        self.entries
            .iter()
            .all(|entry| still_valid(entry, table, owner, write_set))
    }
}

impl Extend<ReadEntry> for ReadSet {
    fn extend<I: IntoIterator<Item = ReadEntry>>(&mut self, iter: I) {
        self.entries.extend(iter);
    }
}
