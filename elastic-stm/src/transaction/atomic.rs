use std::convert::Infallible;

use tracing::warn;

use crate::result::{
    AbortSignal, Conflict, RetryBudgetExhausted, StmClosureResult, TransactionClosureResult,
    TransactionControl, TransactionError, TransactionResult,
};

use super::{Mode, TxContext, TxState};

/// Rolls the attempt back if the body panics.
///
/// Use guard, so that the locks of an unwinding attempt are released.
struct RollbackGuard<'a> {
    tx: &'a mut TxContext,
}

impl Drop for RollbackGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.tx.rollback();
        }
    }
}

impl TxContext {
    /// Run a function atomically, retrying on conflicts.
    ///
    /// Fails only when the runtime's retry budget runs out.
    pub fn atomically<T, F>(
        &mut self,
        block_id: u32,
        mode: &str,
        mut f: F,
    ) -> Result<T, RetryBudgetExhausted>
    where
        F: FnMut(&mut TxContext) -> StmClosureResult<T>,
    {
        let result = self.with_control_and_err::<T, Infallible, _, _>(
            block_id,
            mode,
            |_| TransactionControl::Retry,
            |tx| f(tx).map_err(TransactionError::from),
        );
        match result {
            TransactionResult::Validated(t) => Ok(t),
            TransactionResult::Cancelled(never) => match never {},
            TransactionResult::Failed(exhausted) => Err(exhausted),
        }
    }

    /// Run a fallible function atomically.
    ///
    /// A body returning [`TransactionError::User`] does not cancel the
    /// transaction by itself: the attempt still commits, then the error is
    /// returned as [`TransactionResult::Cancelled`]. If that commit fails the
    /// body is run again.
    pub fn atomically_with_err<T, E, F>(
        &mut self,
        block_id: u32,
        mode: &str,
        f: F,
    ) -> TransactionResult<T, E>
    where
        F: FnMut(&mut TxContext) -> TransactionClosureResult<T, E>,
    {
        self.with_control_and_err(block_id, mode, |_| TransactionControl::Retry, f)
    }

    /// Run a function atomically.
    ///
    /// `with_control` takes another control function, that
    /// can steer the control flow and possibly terminate early.
    ///
    /// `control` can react to counters, timeouts or external inputs.
    ///
    /// It allows the user to fall back to another strategy, like a global lock
    /// in the case of too much contention.
    pub fn with_control<T, F, C>(&mut self, block_id: u32, mode: &str, control: C, mut f: F) -> Option<T>
    where
        F: FnMut(&mut TxContext) -> StmClosureResult<T>,
        C: FnMut(Conflict) -> TransactionControl,
    {
        self.with_control_and_err::<T, Infallible, _, _>(block_id, mode, control, |tx| {
            f(tx).map_err(TransactionError::from)
        })
        .validated()
    }

    /// The retry loop behind every other driver.
    ///
    /// Each attempt re-initializes the context. The loop ends on a successful
    /// commit, when `control` returns [`TransactionControl::Abort`], or when
    /// the configured retry budget is spent. Both early exits are reported as
    /// [`TransactionResult::Failed`]; the stats tell them apart.
    pub fn with_control_and_err<T, E, C, F>(
        &mut self,
        block_id: u32,
        mode: &str,
        mut control: C,
        mut f: F,
    ) -> TransactionResult<T, E>
    where
        F: FnMut(&mut TxContext) -> TransactionClosureResult<T, E>,
        C: FnMut(Conflict) -> TransactionControl,
    {
        let mode = Mode::parse(mode);
        let budget = self.stm().config().retry_budget;
        let mut attempts = 0;

        loop {
            attempts += 1;
            self.begin(block_id, mode);

            let outcome = {
                let mut guard = RollbackGuard { tx: self };
                f(&mut *guard.tx)
            };

            let conflict = match outcome {
                Ok(t) => {
                    if self.commit() {
                        return TransactionResult::Validated(t);
                    }
                    Conflict::InvalidCommit
                }
                // the failure may stem from an inconsistent snapshot, so it
                // only counts if the attempt commits
                Err(TransactionError::User(e)) => {
                    if self.commit() {
                        return TransactionResult::Cancelled(e);
                    }
                    Conflict::InvalidCommit
                }
                Err(TransactionError::Stm(AbortSignal(conflict))) => {
                    if self.state() == TxState::Active {
                        // body raised the signal itself
                        self.stats_mut().record_abort(conflict);
                    }
                    self.rollback();
                    conflict
                }
            };

            if budget.is_some_and(|b| attempts >= b) {
                warn!(block_id, attempts, %conflict, "retry budget exhausted");
                self.stats_mut().record_exhausted();
                return TransactionResult::Failed(RetryBudgetExhausted { block_id, attempts });
            }
            if control(conflict) == TransactionControl::Abort {
                warn!(block_id, attempts, %conflict, "atomic block abandoned");
                self.stats_mut().record_abandoned();
                return TransactionResult::Failed(RetryBudgetExhausted { block_id, attempts });
            }
        }
    }
}
