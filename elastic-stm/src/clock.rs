use std::sync::atomic::{AtomicU64, Ordering};

/// Shared commit counter.
///
/// Incremented exactly once by every committing transaction that wrote
/// something; its value totally orders those commits.
#[derive(Debug, Default)]
pub struct GlobalClock {
    now: AtomicU64,
}

impl GlobalClock {
    pub fn new() -> GlobalClock {
        GlobalClock::starting_at(0)
    }

    /// Clock whose first commit will be stamped `start + 1`.
    pub fn starting_at(start: u64) -> GlobalClock {
        GlobalClock {
            now: AtomicU64::new(start),
        }
    }

    #[inline]
    pub fn get(&self) -> u64 {
        self.now.load(Ordering::Acquire)
    }

    /// Advance the clock and return the new value, which becomes the caller's
    /// commit timestamp.
    #[inline]
    pub fn advance(&self) -> u64 {
        self.now.fetch_add(1, Ordering::AcqRel) + 1
    }
}
