//! Word-based software transactional memory with two validation policies.
//!
//! Shared data lives in [`TObject`]s: fixed arrays of word-sized fields. Every
//! field maps to a slot of a versioned lock table; a global clock orders
//! commits. Transactions buffer their writes, lock written slots eagerly and
//! validate their reads against a snapshot interval that can be extended
//! while they run.
//!
//! Two policies are available, selected by the mode string given at `init`:
//!
//! - **regular** (`""`, `"regular"`, `"roregular"`): every read is logged and
//!   re-validated when the snapshot has to be extended. Transactions observe
//!   a single consistent snapshot.
//! - **elastic** (`"elastic"`): until its first write, a transaction only
//!   keeps the last `k` reads and validates just those, sliding its snapshot
//!   forward. Long read-only traversals do not abort because of commits to
//!   locations they have moved past.
//!
//! ```
//! use elastic_stm::{Stm, StmConfig, TVar};
//!
//! let stm = Stm::new(StmConfig::default().with_lock_table_bits(12)).unwrap();
//! let mut tx = stm.context();
//!
//! let from = TVar::new(100_i64);
//! let to = TVar::new(0_i64);
//!
//! tx.atomically(1, "regular", |tx| {
//!     let amount = 30;
//!     from.modify(tx, |x| x - amount)?;
//!     to.modify(tx, |x| x + amount)
//! })
//! .unwrap();
//!
//! let total = tx
//!     .atomically(2, "elastic", |tx| Ok(from.read(tx)? + to.read(tx)?))
//!     .unwrap();
//! assert_eq!(total, 100);
//! ```
//!
//! Each worker thread owns one [`TxContext`]; contexts of one [`Stm`] share its
//! lock table and clock. Instrumented code may also drive the lifecycle by
//! hand through [`TxContext::init`], the access hooks, [`TxContext::commit`]
//! and [`TxContext::rollback`].

pub mod clock;
pub mod codec;
pub mod config;
pub mod lock_table;
mod object;
mod result;
mod runtime;
pub mod stats;
pub mod transaction;

pub use codec::{FieldType, Kind, ObjRef, Value};
pub use config::{ConfigError, StmConfig};
pub use object::{LocationId, TField, TObject, TVar};
pub use result::{
    AbortSignal, Conflict, RetryBudgetExhausted, StmClosureResult, TransactionClosureResult,
    TransactionControl, TransactionError, TransactionResult,
};
pub use runtime::Stm;
pub use stats::TxStats;
pub use transaction::{Mode, TxContext, TxState};

#[cfg(feature = "bench")]
pub use transaction::{LastReadEntries, ReadEntry, ReadSet, WriteSet};
