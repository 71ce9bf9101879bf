use std::fmt;
use std::mem;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::codec::{self, FieldType, Kind, Value};
use crate::lock_table::{Acquired, LockWord, OwnerId};
use crate::object::{LocationId, TField, TObject};
use crate::result::{AbortSignal, Conflict, StmClosureResult};
use crate::runtime::Stm;
use crate::stats::TxStats;

use super::{LastReadEntries, Mode, ReadEntry, ReadSet, TxState, WriteSet};

/// Per-worker transaction context.
///
/// A context is reused across every attempt of every atomic block run by its
/// owner. The instrumentation contract is:
///
/// 1. [`init`](TxContext::init) at the start of each attempt,
/// 2. [`before_read_access`](TxContext::before_read_access) then
///    [`on_read_access`](TxContext::on_read_access) for each field read,
///    [`on_write_access`](TxContext::on_write_access) for each field write,
/// 3. [`commit`](TxContext::commit), or [`rollback`](TxContext::rollback) when
///    the body gave up.
///
/// Any access that returns an [`AbortSignal`] has already rolled the attempt
/// back. [`TxContext::read`] and [`TxContext::write`] bundle the hooks for
/// typed fields.
///
/// Reads are checked against the snapshot interval `[lb, ub]`: `lb` is the
/// clock value at `init`, `ub` grows when the snapshot is extended (regular
/// policy) or slid forward (elastic policy).
pub struct TxContext {
    stm: Stm,
    owner: OwnerId,
    state: TxState,
    mode: Mode,
    block_id: u32,
    lb: u64,
    ub: u64,
    read_set: ReadSet,
    write_set: WriteSet,
    last_reads: LastReadEntries,
    /// Reason of the last abort, reported again if the body keeps going.
    last_conflict: Option<Conflict>,
    stats: TxStats,
    #[cfg(test)]
    hooks: ReadHooks,
}

/// One-shot callbacks fired inside the read loop, to interleave commits
/// deterministically.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct ReadHooks {
    pub(crate) after_load: Option<Box<dyn FnOnce() + Send>>,
    pub(crate) before_snapshot_move: Option<Box<dyn FnOnce() + Send>>,
}

impl TxContext {
    pub(crate) fn new(stm: Stm, owner: OwnerId) -> TxContext {
        let window = stm.config().elastic_window;
        trace!(%owner, "new transaction context");
        TxContext {
            stm,
            owner,
            state: TxState::Uninitialized,
            mode: Mode::Regular,
            block_id: 0,
            lb: 0,
            ub: 0,
            read_set: ReadSet::new(),
            write_set: WriteSet::new(),
            last_reads: LastReadEntries::new(window),
            last_conflict: None,
            stats: TxStats::default(),
            #[cfg(test)]
            hooks: ReadHooks::default(),
        }
    }

    /// Start an attempt of block `block_id`; `mode` is parsed by [`Mode::parse`].
    pub fn init(&mut self, block_id: u32, mode: &str) {
        self.begin(block_id, Mode::parse(mode));
    }

    /// Start an attempt with an already parsed mode.
    pub fn begin(&mut self, block_id: u32, mode: Mode) {
        if !self.write_set.is_empty() {
            // previous attempt was neither committed nor rolled back
            self.write_set.rollback(self.stm.lock_table());
        }
        self.read_set.clear();
        self.last_reads.clear();
        self.block_id = block_id;
        self.mode = mode;
        let now = self.stm.clock().get();
        self.lb = now;
        self.ub = now;
        self.last_conflict = None;
        self.state = TxState::Active;
    }

    fn ensure_active(&self) -> StmClosureResult<()> {
        match self.state {
            TxState::Active => Ok(()),
            TxState::Aborted => match self.last_conflict {
                Some(conflict) => Err(AbortSignal(conflict)),
                None => panic!("STM: transaction context used after rollback"),
            },
            TxState::Uninitialized | TxState::Committed => {
                panic!("STM: transaction context used outside of an attempt")
            }
        }
    }

    /// Roll back and turn `conflict` into the signal handed to the body.
    #[cold]
    fn abort(&mut self, conflict: Conflict) -> AbortSignal {
        trace!(owner = %self.owner, block = self.block_id, %conflict, "abort");
        self.stats.record_abort(conflict);
        self.last_conflict = Some(conflict);
        self.rollback();
        AbortSignal(conflict)
    }

    #[inline]
    fn in_elastic_fast_path(&self) -> bool {
        self.mode.is_elastic() && self.write_set.is_empty()
    }

    /// Peek at the lock covering a field before reading it.
    pub fn before_read_access(&mut self, object: &TObject, offset: usize) -> StmClosureResult<()> {
        self.ensure_active()?;
        let table = self.stm.lock_table();
        let slot = table.slot_of(object.location(offset));
        if table.check_lock(slot, self.owner).is_err() {
            return Err(self.abort(Conflict::LockedByOther));
        }
        Ok(())
    }

    /// Read a field as `kind`.
    pub fn on_read_access(
        &mut self,
        object: &TObject,
        offset: usize,
        kind: Kind,
    ) -> StmClosureResult<Value> {
        self.ensure_active()?;
        let location = object.location(offset);
        let slot = self.stm.lock_table().slot_of(location);

        if self.write_set.owns(slot) {
            if let Some(value) = self.write_set.get_value(slot, location) {
                return Ok(value.reinterpret(kind));
            }
            // Slot held for a colliding location: memory cannot change, but
            // its version may be newer than the snapshot.
            let newer = self
                .write_set
                .locked_timestamp(slot)
                .is_some_and(|ts| ts > self.ub);
            if newer && !self.extend() {
                return Err(self.abort(Conflict::ExtendFailed));
            }
            return Ok(codec::read(object.word(offset), kind));
        }

        match self.read_unowned(object, offset, kind, location, slot) {
            Ok(value) => Ok(value),
            Err(conflict) => Err(self.abort(conflict)),
        }
    }

    fn read_unowned(
        &mut self,
        object: &TObject,
        offset: usize,
        kind: Kind,
        location: LocationId,
        slot: usize,
    ) -> Result<Value, Conflict> {
        loop {
            let before = match self.stm.lock_table().check_lock(slot, self.owner) {
                Ok(LockWord::Free(ts)) => ts,
                Ok(LockWord::Locked(_)) => {
                    unreachable!("slot {slot} is held by its reader but missing from the write set")
                }
                Err(_) => return Err(Conflict::LockedByOther),
            };
            let value = codec::read(object.word(offset), kind);
            #[cfg(test)]
            self.run_hook(|hooks| &mut hooks.after_load);
            if self.stm.lock_table().load(slot) != LockWord::Free(before) {
                // a commit raced with the load
                continue;
            }

            if before > self.ub {
                #[cfg(test)]
                self.run_hook(|hooks| &mut hooks.before_snapshot_move);
                if self.in_elastic_fast_path() {
                    if !self.last_reads.validate(self.stm.lock_table(), self.owner, &self.write_set) {
                        return Err(Conflict::BetweenSuccessiveReads);
                    }
                    self.ub = self.stm.clock().get();
                } else if !self.extend() {
                    return Err(Conflict::ExtendFailed);
                }
                // The new bound was read after the value: a commit in between
                // may sit below it.
                if self.stm.lock_table().load(slot) != LockWord::Free(before) {
                    continue;
                }
                debug_assert!(before <= self.ub);
            }

            if self.in_elastic_fast_path() {
                self.last_reads.push(ReadEntry {
                    location,
                    slot,
                    observed: before,
                });
            } else {
                self.read_set.add(location, slot, before);
            }
            return Ok(value);
        }
    }

    /// Buffer a write to a field, locking its slot.
    pub fn on_write_access(
        &mut self,
        object: &Arc<TObject>,
        offset: usize,
        value: Value,
    ) -> StmClosureResult<()> {
        self.ensure_active()?;
        let location = object.location(offset);
        let slot = self.stm.lock_table().slot_of(location);

        let previous = match self.stm.lock_table().try_lock(slot, self.owner) {
            Ok(Acquired::Reentrant) => {
                self.write_set.append(slot, object, offset, value, None);
                return Ok(());
            }
            Ok(Acquired::Fresh { previous }) => previous,
            Err(_) => return Err(self.abort(Conflict::LockedByOther)),
        };

        let fast_path = self.in_elastic_fast_path();
        // From here the slot is released by rollback with `previous`.
        self.write_set.append(slot, object, offset, value, Some(previous));

        if previous > self.ub
            && (self.last_reads.contains(location) || self.read_set.contains(location))
        {
            return Err(self.abort(Conflict::WriteAfterRead));
        }
        if self.mode.is_elastic()
            && !self.last_reads.validate(self.stm.lock_table(), self.owner, &self.write_set)
        {
            return Err(self.abort(Conflict::BetweenReadAndWrite));
        }
        if fast_path {
            self.last_reads.drain_into(&mut self.read_set);
        }
        Ok(())
    }

    /// Try to commit the attempt. On `false` the attempt is rolled back.
    pub fn commit(&mut self) -> bool {
        match self.state {
            TxState::Active => {}
            TxState::Committed => return true,
            TxState::Aborted => return false,
            TxState::Uninitialized => panic!("STM: commit without init"),
        }

        if self.write_set.is_empty() {
            // every read was validated when it happened
            self.finish_commit(true);
            return true;
        }

        let timestamp = self.stm.clock().advance();
        if timestamp != self.lb + 1
            && !self
                .read_set
                .validate(self.stm.lock_table(), self.owner, &self.write_set)
        {
            debug!(
                owner = %self.owner,
                block = self.block_id,
                timestamp,
                lb = self.lb,
                reads = self.read_set.len(),
                "commit validation failed"
            );
            self.abort(Conflict::InvalidCommit);
            return false;
        }

        self.write_set.commit(self.stm.lock_table(), timestamp);
        self.finish_commit(false);
        true
    }

    fn finish_commit(&mut self, read_only: bool) {
        self.state = TxState::Committed;
        self.stats.record_commit(self.mode, read_only);
    }

    /// Release every lock held by the attempt. Idempotent.
    pub fn rollback(&mut self) {
        if self.state == TxState::Active {
            self.write_set.rollback(self.stm.lock_table());
            self.state = TxState::Aborted;
        }
    }

    /// Move `ub` to the current clock if the whole read set is still valid.
    pub fn extend(&mut self) -> bool {
        let candidate = self.stm.clock().get();
        if self
            .read_set
            .validate(self.stm.lock_table(), self.owner, &self.write_set)
        {
            trace!(owner = %self.owner, from = self.ub, to = candidate, "snapshot extended");
            self.ub = candidate;
            true
        } else {
            false
        }
    }

    /// Read a field of any kind: both read hooks in one call.
    pub fn read_value(
        &mut self,
        object: &TObject,
        offset: usize,
        kind: Kind,
    ) -> StmClosureResult<Value> {
        self.before_read_access(object, offset)?;
        self.on_read_access(object, offset, kind)
    }

    /// Write a field of any kind.
    pub fn write_value(
        &mut self,
        object: &Arc<TObject>,
        offset: usize,
        value: Value,
    ) -> StmClosureResult<()> {
        self.on_write_access(object, offset, value)
    }

    /// Read a typed field.
    pub fn read<T: FieldType>(&mut self, field: &TField<T>) -> StmClosureResult<T> {
        self.read_value(field.object(), field.offset(), T::KIND)
            .map(T::from_value)
    }

    /// Write a typed field.
    ///
    /// The write is not visible to other transactions until commit.
    pub fn write<T: FieldType>(&mut self, field: &TField<T>, value: T) -> StmClosureResult<()> {
        self.on_write_access(field.object(), field.offset(), value.into_value())
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn block_id(&self) -> u32 {
        self.block_id
    }

    /// Current snapshot interval `(lb, ub)`.
    pub fn snapshot(&self) -> (u64, u64) {
        (self.lb, self.ub)
    }

    pub fn read_set(&self) -> &ReadSet {
        &self.read_set
    }

    pub fn write_set(&self) -> &WriteSet {
        &self.write_set
    }

    pub fn last_reads(&self) -> &LastReadEntries {
        &self.last_reads
    }

    pub fn stm(&self) -> &Stm {
        &self.stm
    }

    /// Counters of this context since its last publication.
    pub fn stats(&self) -> &TxStats {
        &self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut TxStats {
        &mut self.stats
    }

    #[cfg(test)]
    pub(crate) fn hooks_mut(&mut self) -> &mut ReadHooks {
        &mut self.hooks
    }

    #[cfg(test)]
    fn run_hook(
        &mut self,
        pick: impl FnOnce(&mut ReadHooks) -> &mut Option<Box<dyn FnOnce() + Send>>,
    ) {
        if let Some(hook) = pick(&mut self.hooks).take() {
            hook();
        }
    }

    /// Hand the local counters over to the runtime.
    pub fn publish_stats(&mut self) {
        let stats = mem::take(&mut self.stats);
        if stats != TxStats::default() {
            self.stm.publish(stats);
        }
    }
}

impl Drop for TxContext {
    fn drop(&mut self) {
        self.rollback();
        self.publish_stats();
    }
}

impl fmt::Debug for TxContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxContext")
            .field("owner", &self.owner)
            .field("state", &self.state)
            .field("mode", &self.mode)
            .field("block_id", &self.block_id)
            .field("lb", &self.lb)
            .field("ub", &self.ub)
            .field("reads", &self.read_set.len())
            .field("writes", &self.write_set.len())
            .finish()
    }
}
