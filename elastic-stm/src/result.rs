use std::fmt;

use crate::lock_table::LockedByOther;

/// Why a transaction attempt was aborted. Every reason is retriable.
#[derive(Eq, PartialEq, Clone, Copy, Debug, Hash, thiserror::Error)]
pub enum Conflict {
    /// A different owner holds the slot on peek or lock.
    #[error("location locked by another transaction")]
    LockedByOther,
    /// Elastic partial validation found the recent-read window stale.
    #[error("conflict between successive reads")]
    BetweenSuccessiveReads,
    /// A write found the recent-read window stale.
    #[error("conflict between read and write")]
    BetweenReadAndWrite,
    /// A write targets a location already read, which is now too old.
    #[error("write after read of a newer version")]
    WriteAfterRead,
    /// Full re-validation failed while widening the snapshot.
    #[error("snapshot extension failed")]
    ExtendFailed,
    /// Commit-time full re-validation failed.
    #[error("commit validation failed")]
    InvalidCommit,
}

impl Conflict {
    pub const ALL: [Conflict; 6] = [
        Conflict::LockedByOther,
        Conflict::BetweenSuccessiveReads,
        Conflict::BetweenReadAndWrite,
        Conflict::WriteAfterRead,
        Conflict::ExtendFailed,
        Conflict::InvalidCommit,
    ];

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

/// Abort signal carried out of an instrumented access.
///
/// Cheap to copy and carries no backtrace; the retry driver catches it once.
#[derive(Eq, PartialEq, Clone, Copy, Debug, thiserror::Error)]
#[error("transaction aborted: {0}")]
pub struct AbortSignal(pub Conflict);

impl AbortSignal {
    pub fn conflict(self) -> Conflict {
        self.0
    }
}

impl From<LockedByOther> for AbortSignal {
    fn from(_: LockedByOther) -> Self {
        AbortSignal(Conflict::LockedByOther)
    }
}

/// Return type of every instrumented access and of non-fallible bodies.
pub type StmClosureResult<T> = Result<T, AbortSignal>;

/// Error of a single step of a fallible transaction body.
#[derive(Eq, PartialEq, Clone, Copy, Debug, thiserror::Error)]
pub enum TransactionError<E> {
    /// The engine aborted the attempt.
    #[error(transparent)]
    Stm(#[from] AbortSignal),
    /// The body failed on its own.
    ///
    /// The transaction still tries to commit; the error is reported only if
    /// the commit succeeds.
    #[error("user failure")]
    User(E),
}

/// Return type of a fallible transaction body.
pub type TransactionClosureResult<T, E> = Result<T, TransactionError<E>>;

/// Whether the retry driver keeps going after a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionControl {
    Retry,
    Abort,
}

/// Terminal failure of an atomic block: no attempt committed.
///
/// Returned both when the retry budget is spent and when a control function
/// stops the block; [`TxStats`](crate::TxStats) counts the two apart.
#[derive(Eq, PartialEq, Clone, Copy, Debug, thiserror::Error)]
#[error("atomic block {block_id} gave up after {attempts} attempts")]
pub struct RetryBudgetExhausted {
    pub block_id: u32,
    pub attempts: usize,
}

/// Result of a transaction.
///
/// A given transaction can finish in three different ways:
/// - it is validated, and returns an output value,
/// - its body failed but the transaction still committed, so the user error is returned,
/// - it never managed to commit within its retry budget.
///
/// All of the associated methods behave like their equivalent for [`std::result::Result`].
#[derive(Eq, PartialEq, Clone, Copy, Debug)]
#[must_use = "this `TransactionResult` may model an error, which should be handled"]
pub enum TransactionResult<T, E> {
    /// Transaction completed successfully.
    Validated(T),
    /// Transaction committed, then re-raised the failure of its body.
    Cancelled(E),
    /// Transaction was abandoned, by the retry budget or by the control
    /// function.
    Failed(RetryBudgetExhausted),
}

impl<T, E> TransactionResult<T, E> {
    pub fn is_validated(&self) -> bool {
        matches!(self, Self::Validated(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn validated(self) -> Option<T> {
        match self {
            Self::Validated(t) => Some(t),
            Self::Cancelled(_) | Self::Failed(_) => None,
        }
    }

    pub fn cancelled(self) -> Option<E> {
        match self {
            Self::Cancelled(e) => Some(e),
            Self::Validated(_) | Self::Failed(_) => None,
        }
    }

    pub fn failed(self) -> Option<RetryBudgetExhausted> {
        match self {
            Self::Failed(f) => Some(f),
            Self::Validated(_) | Self::Cancelled(_) => None,
        }
    }

    /// Collapse into a `Result`, mapping the terminal failure through `f`.
    pub fn into_result(self, f: impl FnOnce(RetryBudgetExhausted) -> E) -> Result<T, E> {
        match self {
            Self::Validated(t) => Ok(t),
            Self::Cancelled(e) => Err(e),
            Self::Failed(x) => Err(f(x)),
        }
    }

    pub fn expect(self, msg: &str) -> T
    where
        E: fmt::Debug,
    {
        match self {
            Self::Validated(t) => t,
            Self::Cancelled(e) => panic!("{msg}: {e:?}"),
            Self::Failed(x) => panic!("{msg}: {x}"),
        }
    }

    pub fn unwrap(self) -> T
    where
        E: fmt::Debug,
    {
        match self {
            Self::Validated(t) => t,
            Self::Cancelled(e) => {
                panic!("called `TransactionResult::unwrap()` on a `Cancelled` value: {e:?}")
            }
            Self::Failed(x) => panic!("called `TransactionResult::unwrap()` on a `Failed` value: {x}"),
        }
    }

    pub fn unwrap_err(self) -> E
    where
        T: fmt::Debug,
    {
        match self {
            Self::Validated(t) => {
                panic!("called `TransactionResult::unwrap_err()` on a `Validated` value: {t:?}")
            }
            Self::Cancelled(e) => e,
            Self::Failed(x) => panic!("called `TransactionResult::unwrap_err()` on a `Failed` value: {x}"),
        }
    }

    pub fn unwrap_or_default(self) -> T
    where
        T: Default,
    {
        match self {
            Self::Validated(t) => t,
            Self::Cancelled(_) | Self::Failed(_) => Default::default(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::lock_table::OwnerId;

    #[test]
    fn conflict_indices_are_dense() {
        for (i, c) in Conflict::ALL.iter().enumerate() {
            assert_eq!(c.index(), i);
        }
    }

    #[test]
    fn locked_by_other_converts_to_abort() {
        let err = LockedByOther {
            slot: 1,
            holder: OwnerId::new(2),
        };
        assert_eq!(AbortSignal::from(err).conflict(), Conflict::LockedByOther);
    }

    #[test]
    fn question_mark_lifts_abort_into_transaction_error() {
        fn body() -> TransactionClosureResult<(), &'static str> {
            Err(AbortSignal(Conflict::ExtendFailed))?;
            Ok(())
        }
        assert_eq!(
            body(),
            Err(TransactionError::Stm(AbortSignal(Conflict::ExtendFailed)))
        );
    }

    #[test]
    fn result_accessors() {
        let ok: TransactionResult<i32, &str> = TransactionResult::Validated(3);
        assert!(ok.is_validated());
        assert_eq!(ok.validated(), Some(3));

        let cancelled: TransactionResult<i32, &str> = TransactionResult::Cancelled("boom");
        assert_eq!(cancelled.unwrap_err(), "boom");

        let failed: TransactionResult<i32, &str> = TransactionResult::Failed(RetryBudgetExhausted {
            block_id: 7,
            attempts: 3,
        });
        assert!(failed.is_failed());
        assert_eq!(failed.into_result(|_| "exhausted"), Err("exhausted"));
        assert_eq!(failed.unwrap_or_default(), 0);
    }

    #[test]
    fn abort_signal_message_names_reason() {
        let msg = AbortSignal(Conflict::WriteAfterRead).to_string();
        assert!(msg.contains("write after read"));
    }
}
