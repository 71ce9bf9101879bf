/// Tunables of an [`Stm`](crate::Stm) runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StmConfig {
    /// The lock table holds `1 << lock_table_bits` slots.
    pub lock_table_bits: u32,
    /// Capacity `k` of the elastic recent-read window.
    pub elastic_window: usize,
    /// Attempts the retry driver makes before giving up. `None` retries forever.
    pub retry_budget: Option<usize>,
}

pub const DEFAULT_LOCK_TABLE_BITS: u32 = 20;
pub const MAX_LOCK_TABLE_BITS: u32 = 28;
pub const DEFAULT_ELASTIC_WINDOW: usize = 2;

impl Default for StmConfig {
    fn default() -> Self {
        StmConfig {
            lock_table_bits: DEFAULT_LOCK_TABLE_BITS,
            elastic_window: DEFAULT_ELASTIC_WINDOW,
            retry_budget: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("lock table bits must be in 1..=28, got {0}")]
    LockTableBits(u32),
    #[error("elastic window must hold at least one read")]
    EmptyElasticWindow,
    #[error("retry budget must allow at least one attempt")]
    ZeroRetryBudget,
}

impl StmConfig {
    pub fn with_lock_table_bits(mut self, bits: u32) -> Self {
        self.lock_table_bits = bits;
        self
    }

    pub fn with_elastic_window(mut self, k: usize) -> Self {
        self.elastic_window = k;
        self
    }

    pub fn with_retry_budget(mut self, attempts: usize) -> Self {
        self.retry_budget = Some(attempts);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_LOCK_TABLE_BITS).contains(&self.lock_table_bits) {
            return Err(ConfigError::LockTableBits(self.lock_table_bits));
        }
        if self.elastic_window == 0 {
            return Err(ConfigError::EmptyElasticWindow);
        }
        if self.retry_budget == Some(0) {
            return Err(ConfigError::ZeroRetryBudget);
        }
        Ok(())
    }
}
