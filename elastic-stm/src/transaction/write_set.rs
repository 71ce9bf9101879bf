use std::fmt;
use std::sync::Arc;

use crate::codec::{self, Value};
use crate::lock_table::LockTable;
use crate::object::{LocationId, TObject};

use super::RegisterType;

/// A buffered write.
struct WriteEntry {
    location: LocationId,
    object: Arc<TObject>,
    offset: usize,
    slot: usize,
    value: Value,
    /// Timestamp the slot carried when this transaction locked it.
    locked_at: u64,
    /// Next entry of the same slot, for distinct locations sharing it.
    next: Option<usize>,
}

/// Redo log of a transaction.
///
/// Every slot in the index is locked by the owning transaction; the lock is
/// taken before the first entry of the slot is appended and released by
/// [`WriteSet::commit`] or [`WriteSet::rollback`].
#[derive(Default)]
pub struct WriteSet {
    entries: Vec<WriteEntry>,
    /// Slot to index of the first entry of its chain.
    heads: RegisterType,
}

impl WriteSet {
    pub fn new() -> WriteSet {
        WriteSet::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of slots locked through this set.
    pub fn locked_slots(&self) -> usize {
        self.heads.len()
    }

    fn find(&self, slot: usize, location: LocationId) -> Option<usize> {
        let mut cursor = self.heads.get(&slot).copied();
        while let Some(i) = cursor {
            let entry = &self.entries[i];
            if entry.location == location {
                return Some(i);
            }
            cursor = entry.next;
        }
        None
    }

    /// Buffer a write, coalescing with an earlier write to the same location.
    ///
    /// `locked_at` is the timestamp returned by the lock table when the slot
    /// was freshly acquired for this write, `None` if the slot was already
    /// held.
    ///
    /// # Panics
    ///
    /// Panics if the slot is neither in the set nor freshly locked.
    pub fn append(
        &mut self,
        slot: usize,
        object: &Arc<TObject>,
        offset: usize,
        value: Value,
        locked_at: Option<u64>,
    ) {
        let location = object.location(offset);
        if let Some(i) = self.find(slot, location) {
            self.entries[i].value = value;
            return;
        }

        let index = self.entries.len();
        let (locked_at, next) = match self.heads.get(&slot).copied() {
            Some(head) => (self.entries[head].locked_at, Some(head)),
            None => match locked_at {
                Some(ts) => (ts, None),
                None => panic!("write to slot {slot} without holding its lock"),
            },
        };
        self.entries.push(WriteEntry {
            location,
            object: object.clone(),
            offset,
            slot,
            value,
            locked_at,
            next,
        });
        self.heads.insert(slot, index);
    }

    /// Buffered value of a location, if this transaction wrote it.
    pub fn get_value(&self, slot: usize, location: LocationId) -> Option<Value> {
        self.find(slot, location).map(|i| self.entries[i].value)
    }

    /// Timestamp of a slot at the time this transaction locked it.
    pub fn locked_timestamp(&self, slot: usize) -> Option<u64> {
        self.heads.get(&slot).map(|&i| self.entries[i].locked_at)
    }

    pub fn owns(&self, slot: usize) -> bool {
        self.heads.contains_key(&slot)
    }

    /// Write every buffered value to memory, then release each slot stamped
    /// with `timestamp`.
    pub fn commit(&mut self, table: &LockTable, timestamp: u64) {
        for entry in &self.entries {
            codec::write(entry.object.word(entry.offset), entry.value);
        }
        for &slot in self.heads.keys() {
            table.release_and_stamp(slot, timestamp);
        }
        self.clear();
    }

    /// Release each slot with the timestamp it had before being locked.
    /// Memory is left untouched.
    pub fn rollback(&mut self, table: &LockTable) {
        for &head in self.heads.values() {
            let entry = &self.entries[head];
            table.release_and_stamp(entry.slot, entry.locked_at);
        }
        self.clear();
    }

    /// Forget every entry without touching the lock table.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.heads.clear();
    }
}

impl fmt::Debug for WriteSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteSet")
            .field("entries", &self.entries.len())
            .field("slots", &self.heads.len())
            .finish()
    }
}
