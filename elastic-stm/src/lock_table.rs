//! Versioned lock table.
//!
//! A fixed array of atomic words. Every location hashes to one slot; a slot
//! is either free and carries the timestamp of the last commit that wrote a
//! location mapped to it, or locked and carries the id of its owner.
//!
//! Distinct locations sharing a slot only cause false conflicts.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::object::LocationId;

/// Reserved bit marking a locked slot.
pub const LOCK_BIT: u64 = 1 << 63;

/// Identity of a transaction context, stored in the slots it locks.
///
/// Ids are strictly positive and never have [`LOCK_BIT`] set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(u64);

impl OwnerId {
    pub(crate) fn new(raw: u64) -> OwnerId {
        assert!(raw != 0 && raw & LOCK_BIT == 0, "invalid owner id {raw}");
        OwnerId(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.get())
    }
}

/// Decoded content of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockWord {
    /// Free, last stamped with this commit timestamp.
    Free(u64),
    /// Held by a transaction.
    Locked(OwnerId),
}

impl LockWord {
    #[inline]
    pub fn from_raw(raw: u64) -> LockWord {
        if raw & LOCK_BIT == 0 {
            LockWord::Free(raw)
        } else {
            LockWord::Locked(OwnerId(raw & !LOCK_BIT))
        }
    }

    #[inline]
    pub fn raw(self) -> u64 {
        match self {
            LockWord::Free(ts) => ts,
            LockWord::Locked(owner) => owner.0 | LOCK_BIT,
        }
    }

    pub fn timestamp(self) -> Option<u64> {
        match self {
            LockWord::Free(ts) => Some(ts),
            LockWord::Locked(_) => None,
        }
    }

    pub fn is_locked_by(self, owner: OwnerId) -> bool {
        self == LockWord::Locked(owner)
    }
}

/// The slot is held by a different owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("slot {slot} is held by {holder}")]
pub struct LockedByOther {
    pub slot: usize,
    pub holder: OwnerId,
}

/// Outcome of a successful [`LockTable::try_lock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquired {
    /// The slot was free and now belongs to the caller. `previous` is the
    /// timestamp it carried, to be restored on rollback.
    Fresh { previous: u64 },
    /// The caller already held the slot.
    Reentrant,
}

pub struct LockTable {
    words: Box<[AtomicU64]>,
    bits: u32,
}

impl LockTable {
    /// Table of `1 << bits` free slots stamped with timestamp 0.
    pub fn new(bits: u32) -> LockTable {
        assert!((1..=usize::BITS - 1).contains(&bits), "lock table bits out of range: {bits}");
        let words = (0..1usize << bits).map(|_| AtomicU64::new(0)).collect();
        LockTable { words, bits }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Slot index covering a location.
    #[inline]
    pub fn slot_of(&self, location: LocationId) -> usize {
        let key = (location.object() as u64).wrapping_add((location.offset() as u64) << 3);
        (key.wrapping_mul(0x9E37_79B9_7F4A_7C15) >> (64 - self.bits)) as usize
    }

    /// Current content of a slot, without any ownership interpretation.
    #[inline]
    pub fn load(&self, slot: usize) -> LockWord {
        LockWord::from_raw(self.words[slot].load(Ordering::Acquire))
    }

    /// Non-mutating peek. Succeeds if the slot is free or held by `owner`.
    #[inline]
    pub fn check_lock(&self, slot: usize, owner: OwnerId) -> Result<LockWord, LockedByOther> {
        match self.load(slot) {
            LockWord::Locked(holder) if holder != owner => Err(LockedByOther { slot, holder }),
            word => Ok(word),
        }
    }

    /// Acquire a slot for `owner`. Exactly one contender wins a free slot.
    pub fn try_lock(&self, slot: usize, owner: OwnerId) -> Result<Acquired, LockedByOther> {
        let word = &self.words[slot];
        let mut current = word.load(Ordering::Acquire);
        loop {
            match LockWord::from_raw(current) {
                LockWord::Locked(holder) if holder == owner => return Ok(Acquired::Reentrant),
                LockWord::Locked(holder) => return Err(LockedByOther { slot, holder }),
                LockWord::Free(previous) => {
                    match word.compare_exchange_weak(
                        current,
                        LockWord::Locked(owner).raw(),
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => return Ok(Acquired::Fresh { previous }),
                        Err(actual) => current = actual,
                    }
                }
            }
        }
    }

    /// Free a slot and stamp it. Only the current owner may call this.
    #[inline]
    pub fn release_and_stamp(&self, slot: usize, timestamp: u64) {
        debug_assert!(timestamp & LOCK_BIT == 0);
        debug_assert!(matches!(self.load(slot), LockWord::Locked(_)));
        self.words[slot].store(timestamp, Ordering::Release);
    }
}

impl fmt::Debug for LockTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockTable")
            .field("slots", &self.words.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;

    fn owner(n: u64) -> OwnerId {
        OwnerId::new(n)
    }

    #[test]
    fn raw_roundtrip_keeps_lock_bit() {
        let word = LockWord::Locked(owner(42));
        assert_eq!(word.raw() & LOCK_BIT, LOCK_BIT);
        assert_eq!(LockWord::from_raw(word.raw()), word);
        assert_eq!(LockWord::from_raw(17), LockWord::Free(17));
    }

    #[test]
    fn lock_is_reentrant_for_owner() {
        let table = LockTable::new(4);
        assert_eq!(table.try_lock(3, owner(1)), Ok(Acquired::Fresh { previous: 0 }));
        assert_eq!(table.try_lock(3, owner(1)), Ok(Acquired::Reentrant));
        assert_eq!(
            table.try_lock(3, owner(2)),
            Err(LockedByOther { slot: 3, holder: owner(1) })
        );
    }

    #[test]
    fn check_lock_reports_other_owner_only() {
        let table = LockTable::new(4);
        assert_eq!(table.check_lock(0, owner(1)), Ok(LockWord::Free(0)));
        table.try_lock(0, owner(1)).unwrap();
        assert_eq!(table.check_lock(0, owner(1)), Ok(LockWord::Locked(owner(1))));
        assert!(table.check_lock(0, owner(2)).is_err());
    }

    #[test]
    fn release_stamps_timestamp() {
        let table = LockTable::new(2);
        table.try_lock(1, owner(9)).unwrap();
        table.release_and_stamp(1, 12);
        assert_eq!(table.load(1), LockWord::Free(12));
        assert_eq!(table.try_lock(1, owner(3)), Ok(Acquired::Fresh { previous: 12 }));
    }

    #[test]
    fn slot_of_stays_in_range() {
        let table = LockTable::new(3);
        assert_eq!(table.len(), 8);
        assert!(!table.is_empty());
        for object in (0..4096usize).step_by(8) {
            for offset in 0..4 {
                let slot = table.slot_of(LocationId::new(object, offset));
                assert!(slot < table.len());
            }
        }
    }

    #[test]
    fn single_winner_under_contention() {
        let table = Arc::new(LockTable::new(1));
        let handles: Vec<_> = (1..=8)
            .map(|n| {
                let table = table.clone();
                std::thread::spawn(move || table.try_lock(0, owner(n)).is_ok())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
