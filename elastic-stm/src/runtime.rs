use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::clock::GlobalClock;
use crate::config::{ConfigError, StmConfig};
use crate::lock_table::{LockTable, OwnerId};
use crate::stats::TxStats;
use crate::transaction::TxContext;

/// State shared by every context of one runtime.
struct Shared {
    table: LockTable,
    clock: GlobalClock,
    config: StmConfig,
    next_owner: AtomicU64,
    /// Counters flushed by contexts; never touched on a transactional path.
    stats: Mutex<TxStats>,
}

/// Handle on an STM runtime: the lock table and the global clock.
///
/// Cloning is cheap and every clone refers to the same runtime. Each worker
/// thread obtains its own [`TxContext`] through [`Stm::context`].
#[derive(Clone)]
pub struct Stm {
    shared: Arc<Shared>,
}

impl Stm {
    pub fn new(config: StmConfig) -> Result<Stm, ConfigError> {
        config.validate()?;
        Ok(Stm::build(config))
    }

    fn build(config: StmConfig) -> Stm {
        debug!(
            slots = 1usize << config.lock_table_bits,
            elastic_window = config.elastic_window,
            retry_budget = ?config.retry_budget,
            "creating stm runtime"
        );
        Stm {
            shared: Arc::new(Shared {
                table: LockTable::new(config.lock_table_bits),
                clock: GlobalClock::new(),
                config,
                next_owner: AtomicU64::new(1),
                stats: Mutex::new(TxStats::default()),
            }),
        }
    }

    /// A fresh transaction context owned by the caller.
    pub fn context(&self) -> TxContext {
        TxContext::new(self.clone(), self.allocate_owner())
    }

    fn allocate_owner(&self) -> OwnerId {
        OwnerId::new(self.shared.next_owner.fetch_add(1, Ordering::Relaxed))
    }

    pub fn config(&self) -> &StmConfig {
        &self.shared.config
    }

    pub fn clock(&self) -> &GlobalClock {
        &self.shared.clock
    }

    pub fn lock_table(&self) -> &LockTable {
        &self.shared.table
    }

    /// Counters published so far by this runtime's contexts.
    pub fn collect_stats(&self) -> TxStats {
        *self.shared.stats.lock()
    }

    pub(crate) fn publish(&self, stats: TxStats) {
        *self.shared.stats.lock() += stats;
    }

    /// Check if two handles refer to the same runtime.
    pub fn ptr_eq(this: &Stm, other: &Stm) -> bool {
        Arc::ptr_eq(&this.shared, &other.shared)
    }
}

impl Default for Stm {
    fn default() -> Self {
        Stm::build(StmConfig::default())
    }
}

impl fmt::Debug for Stm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stm")
            .field("config", &self.shared.config)
            .field("clock", &self.shared.clock.get())
            .finish_non_exhaustive()
    }
}
