pub mod atomic;
pub mod context;
pub mod last_reads;
pub mod read_set;
pub mod write_set;

pub use context::TxContext;
pub use last_reads::LastReadEntries;
pub use read_set::{ReadEntry, ReadSet};
pub use write_set::WriteSet;

cfg_if::cfg_if! {
    if #[cfg(feature = "hash-registers")] {
        use rustc_hash::FxHashMap;
    } else {
        use std::collections::BTreeMap;
    }
}

use crate::lock_table::{LockTable, LockWord, OwnerId};

/// Slot index of the write set: lock table slot to first entry of its chain.
#[cfg(not(feature = "hash-registers"))]
pub(crate) type RegisterType = BTreeMap<usize, usize>;
#[cfg(feature = "hash-registers")]
pub(crate) type RegisterType = FxHashMap<usize, usize>;

/// Validation policy of a transaction, chosen at `init` from the mode string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Full read set, snapshot extension on timestamp mismatch.
    Regular,
    /// Regular, declared read-only. Only affects statistics.
    ReadOnlyRegular,
    /// Bounded recent-read window while the transaction has not written.
    Elastic,
}

impl Mode {
    /// Interpret a mode string: `"elastic"` anywhere selects the elastic
    /// policy, `"roregular"` a declared read-only regular block, anything
    /// else the regular policy.
    pub fn parse(mode: &str) -> Mode {
        if mode.contains("elastic") {
            Mode::Elastic
        } else if mode.contains("roregular") {
            Mode::ReadOnlyRegular
        } else {
            Mode::Regular
        }
    }

    pub fn is_elastic(self) -> bool {
        self == Mode::Elastic
    }
}

impl From<&str> for Mode {
    fn from(mode: &str) -> Self {
        Mode::parse(mode)
    }
}

/// Lifecycle of a context. `Committed` and `Aborted` are left by the next `init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Uninitialized,
    Active,
    Committed,
    Aborted,
}

/// A recorded read is still valid if its slot carries the same timestamp,
/// or if this owner locked the slot while it carried that timestamp.
#[inline]
pub(crate) fn still_valid(
    entry: &ReadEntry,
    table: &LockTable,
    owner: OwnerId,
    write_set: &WriteSet,
) -> bool {
    match table.load(entry.slot) {
        LockWord::Free(ts) => ts == entry.observed,
        LockWord::Locked(holder) if holder == owner => {
            write_set.locked_timestamp(entry.slot) == Some(entry.observed)
        }
        LockWord::Locked(_) => false,
    }
}
