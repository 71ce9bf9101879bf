use std::fmt;
use std::ops::AddAssign;

use crate::result::Conflict;
use crate::transaction::Mode;

/// Commit and abort counters of one or more transaction contexts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxStats {
    /// Committed attempts, all modes.
    pub commits: u64,
    /// Commits with an empty write set.
    pub read_only_commits: u64,
    /// Commits of blocks declared read-only (`"roregular"`).
    pub declared_read_only_commits: u64,
    /// Commits in elastic mode.
    pub elastic_commits: u64,
    /// Aborted attempts, indexed like [`Conflict::ALL`].
    pub aborts: [u64; 6],
    /// Atomic blocks that ran out of retries.
    pub exhausted: u64,
    /// Atomic blocks stopped by their control function.
    pub abandoned: u64,
}

impl TxStats {
    pub(crate) fn record_commit(&mut self, mode: Mode, read_only: bool) {
        self.commits += 1;
        if read_only {
            self.read_only_commits += 1;
        }
        match mode {
            Mode::Elastic => self.elastic_commits += 1,
            Mode::ReadOnlyRegular => self.declared_read_only_commits += 1,
            Mode::Regular => {}
        }
    }

    pub(crate) fn record_abort(&mut self, conflict: Conflict) {
        self.aborts[conflict.index()] += 1;
    }

    pub(crate) fn record_exhausted(&mut self) {
        self.exhausted += 1;
    }

    pub(crate) fn record_abandoned(&mut self) {
        self.abandoned += 1;
    }

    pub fn aborts_for(&self, conflict: Conflict) -> u64 {
        self.aborts[conflict.index()]
    }

    pub fn total_aborts(&self) -> u64 {
        self.aborts.iter().sum()
    }

    /// Fraction of attempts that aborted, in `[0, 1]`.
    pub fn abort_rate(&self) -> f64 {
        let attempts = self.commits + self.total_aborts();
        if attempts == 0 {
            0.0
        } else {
            self.total_aborts() as f64 / attempts as f64
        }
    }
}

impl AddAssign for TxStats {
    fn add_assign(&mut self, rhs: TxStats) {
        self.commits += rhs.commits;
        self.read_only_commits += rhs.read_only_commits;
        self.declared_read_only_commits += rhs.declared_read_only_commits;
        self.elastic_commits += rhs.elastic_commits;
        for (a, b) in self.aborts.iter_mut().zip(rhs.aborts) {
            *a += b;
        }
        self.exhausted += rhs.exhausted;
        self.abandoned += rhs.abandoned;
    }
}

impl fmt::Display for TxStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "commits: {} (read-only {}, declared read-only {}, elastic {})",
            self.commits, self.read_only_commits, self.declared_read_only_commits, self.elastic_commits
        )?;
        write!(f, "aborts: {}", self.total_aborts())?;
        for conflict in Conflict::ALL {
            let n = self.aborts_for(conflict);
            if n > 0 {
                write!(f, ", {conflict}: {n}")?;
            }
        }
        if self.exhausted > 0 {
            write!(f, "\nexhausted: {}", self.exhausted)?;
        }
        if self.abandoned > 0 {
            write!(f, "\nabandoned: {}", self.abandoned)?;
        }
        Ok(())
    }
}
