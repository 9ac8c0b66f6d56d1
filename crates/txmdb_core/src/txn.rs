//! Per-thread reusable transaction handles.
//!
//! A [`ReusableTxn`] owns at most one outermost native transaction plus a
//! stack of nested write transactions. It is begun, committed or aborted and
//! begun again for the whole life of its thread, so the environment can track
//! a stable identity per thread.
//!
//! ## States
//!
//! ```text
//! Idle --begin--> Active(kind, 0) --begin(rw)--> Active(rw, 1) ...
//!   ^                  |                              |
//!   +--commit/abort----+          commit/abort -------+ (depth - 1)
//! ```
//!
//! Read-only outermost transactions are reset rather than freed when they
//! finish and are renewed by the next read-only begin.

use crate::env::EnvShared;
use crate::error::{CoreError, CoreResult};
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::{debug, warn};
use txmdb_storage::{EnvFlags, NativeTxn, ResetReader};

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// The kind of the outermost transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxnKind {
    /// Read-only snapshot.
    ReadOnly,
    /// Read-write transaction.
    ReadWrite,
}

impl TxnKind {
    fn of(txn: &NativeTxn) -> Self {
        if txn.is_read_only() {
            Self::ReadOnly
        } else {
            Self::ReadWrite
        }
    }
}

/// Observable state of a transaction handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    /// No native transaction is held.
    Idle,
    /// A transaction is open. `depth` counts nested transactions.
    Active {
        /// Kind of the outermost transaction.
        kind: TxnKind,
        /// Number of nested transactions open inside the outermost one.
        depth: usize,
    },
    /// The handle was closed and cannot be used again.
    Closed,
}

/// Position of the innermost open transaction, used to pin scopes.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ActiveTxn {
    pub(crate) kind: TxnKind,
    pub(crate) level: usize,
    pub(crate) generation: u64,
}

#[derive(Debug)]
struct TxnSlot {
    /// Thread the handle is pinned to; `None` once detached.
    owner: Option<ThreadId>,
    /// Open native transactions, outermost first.
    stack: Vec<NativeTxn>,
    spare_reader: Option<ResetReader>,
    /// Thread that began the current outermost write transaction.
    writer: Option<ThreadId>,
    /// Bumped on every outermost begin and on detach. Scopes pinned to an
    /// older generation are stale.
    generation: u64,
    closed: bool,
}

impl TxnSlot {
    fn kind(&self) -> Option<TxnKind> {
        self.stack.first().map(TxnKind::of)
    }

    fn state(&self) -> TxnState {
        if self.closed {
            return TxnState::Closed;
        }
        match self.kind() {
            None => TxnState::Idle,
            Some(kind) => TxnState::Active {
                kind,
                depth: self.stack.len() - 1,
            },
        }
    }

    fn active(&self) -> Option<ActiveTxn> {
        self.kind().map(|kind| ActiveTxn {
            kind,
            level: self.stack.len() - 1,
            generation: self.generation,
        })
    }

    fn holds(&self, level: usize, generation: u64) -> bool {
        !self.closed && self.generation == generation && self.stack.len() > level
    }

    /// Aborts every open transaction innermost first and frees the spare
    /// reader. Returns the number of transactions aborted.
    fn release(&mut self) -> usize {
        let aborted = self.stack.len();
        while let Some(txn) = self.stack.pop() {
            txn.abort();
        }
        self.spare_reader = None;
        self.writer = None;
        aborted
    }
}

impl Drop for TxnSlot {
    fn drop(&mut self) {
        self.release();
    }
}

/// One thread's reusable transaction.
pub(crate) struct ReusableTxn {
    id: u64,
    env: Arc<EnvShared>,
    slot: Mutex<TxnSlot>,
}

impl ReusableTxn {
    /// Creates a handle pinned to `owner`.
    pub(crate) fn new(env: Arc<EnvShared>, owner: ThreadId) -> Self {
        let id = NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed);
        debug!(handle = id, thread = ?owner, "created transaction handle");
        Self {
            id,
            env,
            slot: Mutex::new(TxnSlot {
                owner: Some(owner),
                stack: Vec::new(),
                spare_reader: None,
                writer: None,
                generation: 0,
                closed: false,
            }),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn env(&self) -> &Arc<EnvShared> {
        &self.env
    }

    /// Locks the slot for an operation by the calling thread.
    ///
    /// Fails if the environment or handle is closed, if the handle is pinned
    /// to another thread, or if another thread owns the open write
    /// transaction and the engine's writer lock is in use.
    fn lock(&self) -> CoreResult<MutexGuard<'_, TxnSlot>> {
        let slot = self.slot.lock();
        if slot.closed {
            return Err(if self.env.is_closed() {
                CoreError::EnvironmentClosed
            } else {
                CoreError::TransactionClosed
            });
        }
        self.env.assert_open()?;

        let current = thread::current().id();
        if let Some(owner) = slot.owner {
            if owner != current {
                return Err(CoreError::illegal_state(format!(
                    "transaction handle {} belongs to thread {owner:?}",
                    self.id
                )));
            }
        }
        if let Some(writer) = slot.writer {
            if writer != current && !self.env.flags().contains(EnvFlags::NO_LOCK) {
                return Err(CoreError::illegal_state(format!(
                    "write transaction of handle {} was begun on thread {writer:?}",
                    self.id
                )));
            }
        }
        Ok(slot)
    }

    /// Returns the handle's state without any ownership checks.
    pub(crate) fn state(&self) -> TxnState {
        self.slot.lock().state()
    }

    /// Returns the innermost open transaction, if any.
    pub(crate) fn active(&self) -> CoreResult<Option<ActiveTxn>> {
        Ok(self.lock()?.active())
    }

    /// Returns true while the scope pinned at `level` is still open.
    pub(crate) fn holds(&self, level: usize, generation: u64) -> bool {
        self.slot.lock().holds(level, generation)
    }

    /// Begins an outermost transaction, or a nested one if a write
    /// transaction is already open.
    ///
    /// `read_only` is forced on read-only environments.
    ///
    /// An outermost begin may wait on the engine's writer lock, so the slot
    /// is unlocked meanwhile and a concurrent [`close`](Self::close) can
    /// still reach it.
    pub(crate) fn begin(&self, read_only: bool) -> CoreResult<ActiveTxn> {
        let mut slot = self.lock()?;
        let read_only = read_only || self.env.is_read_only();

        match slot.kind() {
            None => {
                let spare = if read_only {
                    slot.spare_reader.take()
                } else {
                    None
                };
                let native = self.env.native()?;
                drop(slot);

                let txn = match spare {
                    Some(reader) => reader.renew()?,
                    None => native.begin_txn(read_only)?,
                };

                slot = self.slot.lock();
                if slot.closed {
                    // Dropping aborts the transaction on the thread that began it.
                    drop(txn);
                    return Err(if self.env.is_closed() {
                        CoreError::EnvironmentClosed
                    } else {
                        CoreError::TransactionClosed
                    });
                }
                if slot.kind().is_some() {
                    drop(txn);
                    return Err(CoreError::illegal_state(
                        "a transaction was begun concurrently on the same handle",
                    ));
                }
                slot.stack.push(txn);
                slot.generation += 1;
                slot.writer = (!read_only).then(|| thread::current().id());
            }
            Some(TxnKind::ReadOnly) => {
                return Err(CoreError::illegal_state(
                    "cannot nest a transaction inside a read-only transaction",
                ));
            }
            Some(TxnKind::ReadWrite) if read_only => {
                return Err(CoreError::illegal_state(
                    "cannot begin a read-only transaction inside a read-write transaction",
                ));
            }
            Some(TxnKind::ReadWrite) => {
                let child = slot
                    .stack
                    .last()
                    .ok_or_else(|| CoreError::illegal_state("no active transaction"))?
                    .begin_nested()?;
                slot.stack.push(child);
            }
        }

        let active = slot
            .active()
            .ok_or_else(|| CoreError::illegal_state("transaction did not start"))?;
        Ok(active)
    }

    /// Commits the innermost open transaction.
    pub(crate) fn commit(&self) -> CoreResult<()> {
        let mut slot = self.lock()?;
        let txn = slot
            .stack
            .pop()
            .ok_or_else(|| CoreError::illegal_state("no active transaction"))?;
        Self::finish(&mut slot, txn, true)
    }

    /// Aborts the innermost open transaction.
    pub(crate) fn abort(&self) -> CoreResult<()> {
        let mut slot = self.lock()?;
        let txn = slot
            .stack
            .pop()
            .ok_or_else(|| CoreError::illegal_state("no active transaction"))?;
        Self::finish(&mut slot, txn, false)
    }

    /// Finishes the transaction at `level` for a scope.
    ///
    /// With `unwind`, deeper nested transactions are aborted first;
    /// otherwise their presence is an error.
    pub(crate) fn finish_level(
        &self,
        level: usize,
        generation: u64,
        commit: bool,
        unwind: bool,
    ) -> CoreResult<()> {
        let mut slot = self.lock()?;
        if !slot.holds(level, generation) {
            return Err(CoreError::illegal_state(
                "the scope's transaction has already finished",
            ));
        }
        if slot.stack.len() > level + 1 {
            if !unwind {
                return Err(CoreError::illegal_state(format!(
                    "{} nested transaction(s) still open",
                    slot.stack.len() - level - 1
                )));
            }
            while slot.stack.len() > level + 1 {
                if let Some(child) = slot.stack.pop() {
                    child.abort();
                }
            }
        }
        let txn = slot
            .stack
            .pop()
            .ok_or_else(|| CoreError::illegal_state("no active transaction"))?;
        Self::finish(&mut slot, txn, commit)
    }

    fn finish(slot: &mut TxnSlot, txn: NativeTxn, commit: bool) -> CoreResult<()> {
        if !slot.stack.is_empty() {
            if commit {
                txn.commit()?;
            } else {
                txn.abort();
            }
            return Ok(());
        }

        slot.writer = None;
        if txn.is_read_only() {
            // Nothing to write back, so commit and abort both park the reader.
            match txn.reset() {
                Ok(reader) => slot.spare_reader = Some(reader),
                Err(txn) if commit => txn.commit()?,
                Err(txn) => txn.abort(),
            }
            return Ok(());
        }

        if commit {
            txn.commit()?;
        } else {
            txn.abort();
        }
        Ok(())
    }

    /// Runs `f` against the innermost open native transaction on behalf of
    /// a scope pinned at `level`.
    pub(crate) fn with_native<R>(
        &self,
        level: usize,
        generation: u64,
        f: impl FnOnce(&mut NativeTxn) -> CoreResult<R>,
    ) -> CoreResult<R> {
        let mut slot = self.lock()?;
        if !slot.holds(level, generation) {
            return Err(CoreError::illegal_state(
                "the scope's transaction has already finished",
            ));
        }
        match slot.stack.last_mut() {
            Some(txn) => f(txn),
            None => Err(CoreError::illegal_state("no active transaction")),
        }
    }

    /// Unpins the handle from its thread.
    ///
    /// An open write transaction can only move when the environment runs
    /// without the engine's writer lock.
    pub(crate) fn detach(&self) -> CoreResult<()> {
        let mut slot = self.lock()?;
        if slot.kind() == Some(TxnKind::ReadWrite)
            && !self.env.flags().contains(EnvFlags::NO_LOCK)
        {
            return Err(CoreError::illegal_state(
                "an open read-write transaction can only be detached with NO_LOCK",
            ));
        }
        slot.owner = None;
        slot.generation += 1;
        debug!(handle = self.id, "detached transaction handle");
        Ok(())
    }

    /// Closes the handle from any thread, aborting open transactions.
    ///
    /// Idempotent.
    pub(crate) fn close(&self) {
        let mut slot = self.slot.lock();
        if slot.closed {
            return;
        }
        slot.closed = true;
        let aborted = slot.release();
        if aborted > 0 {
            warn!(
                handle = self.id,
                aborted, "closed transaction handle with open transactions"
            );
        } else {
            debug!(handle = self.id, "closed transaction handle");
        }
    }
}

impl std::fmt::Debug for ReusableTxn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReusableTxn")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Environment;

    fn handle(env: &Environment) -> Arc<ReusableTxn> {
        env.current_handle().unwrap()
    }

    #[test]
    fn begin_commit_cycle() {
        let env = Environment::open_temporary().unwrap();
        let txn = handle(&env);
        assert_eq!(txn.state(), TxnState::Idle);

        txn.begin(false).unwrap();
        assert_eq!(
            txn.state(),
            TxnState::Active {
                kind: TxnKind::ReadWrite,
                depth: 0
            }
        );
        txn.commit().unwrap();
        assert_eq!(txn.state(), TxnState::Idle);

        txn.begin(true).unwrap();
        txn.abort().unwrap();
        assert_eq!(txn.state(), TxnState::Idle);
    }

    #[test]
    fn commit_while_idle_is_illegal() {
        let env = Environment::open_temporary().unwrap();
        let txn = handle(&env);
        assert!(matches!(txn.commit(), Err(CoreError::IllegalState { .. })));
        assert!(matches!(txn.abort(), Err(CoreError::IllegalState { .. })));
    }

    #[test]
    fn read_only_cannot_nest() {
        let env = Environment::open_temporary().unwrap();
        let txn = handle(&env);
        txn.begin(true).unwrap();
        assert!(matches!(
            txn.begin(true),
            Err(CoreError::IllegalState { .. })
        ));
        assert!(matches!(
            txn.begin(false),
            Err(CoreError::IllegalState { .. })
        ));
        txn.abort().unwrap();
    }

    #[test]
    fn read_only_inside_write_is_illegal() {
        let env = Environment::open_temporary().unwrap();
        let txn = handle(&env);
        txn.begin(false).unwrap();
        assert!(matches!(
            txn.begin(true),
            Err(CoreError::IllegalState { .. })
        ));
        txn.abort().unwrap();
    }

    #[test]
    fn nesting_depth_tracks_begins() {
        let env = Environment::open_temporary().unwrap();
        let txn = handle(&env);
        txn.begin(false).unwrap();
        let inner = txn.begin(false).unwrap();
        assert_eq!(inner.level, 1);
        txn.begin(false).unwrap();
        assert_eq!(
            txn.state(),
            TxnState::Active {
                kind: TxnKind::ReadWrite,
                depth: 2
            }
        );

        txn.abort().unwrap();
        txn.commit().unwrap();
        assert_eq!(
            txn.state(),
            TxnState::Active {
                kind: TxnKind::ReadWrite,
                depth: 0
            }
        );
        txn.commit().unwrap();
        assert_eq!(txn.state(), TxnState::Idle);
    }

    #[test]
    fn read_only_env_forces_read_only() {
        let dir = tempfile::tempdir().unwrap();
        Environment::open(dir.path()).unwrap().close();

        let env = Environment::open_with_config(
            dir.path(),
            crate::EnvConfig::new().read_only(true),
        )
        .unwrap();
        let txn = handle(&env);
        let active = txn.begin(false).unwrap();
        assert_eq!(active.kind, TxnKind::ReadOnly);
        txn.commit().unwrap();
    }

    #[test]
    fn reader_is_parked_and_renewed() {
        let env = Environment::open_temporary().unwrap();
        let txn = handle(&env);
        txn.begin(true).unwrap();
        txn.commit().unwrap();
        assert!(txn.slot.lock().spare_reader.is_some());

        txn.begin(true).unwrap();
        assert!(txn.slot.lock().spare_reader.is_none());
        txn.abort().unwrap();
        assert!(txn.slot.lock().spare_reader.is_some());
    }

    #[test]
    fn generation_changes_per_outermost_begin() {
        let env = Environment::open_temporary().unwrap();
        let txn = handle(&env);
        let first = txn.begin(true).unwrap();
        assert!(txn.holds(0, first.generation));
        txn.commit().unwrap();
        assert!(!txn.holds(0, first.generation));

        let second = txn.begin(true).unwrap();
        assert_ne!(first.generation, second.generation);
        assert!(!txn.holds(0, first.generation));
        txn.commit().unwrap();
    }

    #[test]
    fn finish_level_refuses_open_children() {
        let env = Environment::open_temporary().unwrap();
        let txn = handle(&env);
        let outer = txn.begin(false).unwrap();
        txn.begin(false).unwrap();

        assert!(matches!(
            txn.finish_level(0, outer.generation, true, false),
            Err(CoreError::IllegalState { .. })
        ));
        txn.finish_level(0, outer.generation, false, true).unwrap();
        assert_eq!(txn.state(), TxnState::Idle);
    }

    #[test]
    fn close_is_idempotent() {
        let env = Environment::open_temporary().unwrap();
        let txn = handle(&env);
        txn.begin(false).unwrap();
        txn.close();
        txn.close();
        assert_eq!(txn.state(), TxnState::Closed);
        assert!(matches!(txn.begin(true), Err(CoreError::TransactionClosed)));
    }

    #[test]
    fn close_reaches_handle_waiting_for_writer_lock() {
        let env = Environment::open_temporary().unwrap();
        let writer = handle(&env);
        writer.begin(false).unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        let result = thread::scope(|s| {
            let waiter = s.spawn(|| {
                let txn = handle(&env);
                tx.send(Arc::clone(&txn)).unwrap();
                txn.begin(false)
            });
            let blocked = rx.recv().unwrap();
            thread::sleep(std::time::Duration::from_millis(100));
            blocked.close();
            assert_eq!(blocked.state(), TxnState::Closed);
            writer.abort().unwrap();
            waiter.join().unwrap()
        });

        assert!(matches!(result, Err(CoreError::TransactionClosed)));
        writer.begin(false).unwrap();
        writer.commit().unwrap();
    }

    #[test]
    fn other_thread_is_rejected() {
        let env = Environment::open_temporary().unwrap();
        let txn = handle(&env);
        let result = thread::spawn(move || txn.begin(true)).join().unwrap();
        assert!(matches!(result, Err(CoreError::IllegalState { .. })));
    }

    #[test]
    fn ids_are_unique() {
        let env = Environment::open_temporary().unwrap();
        let here = handle(&env).id();
        let there = thread::scope(|s| s.spawn(|| handle(&env).id()).join().unwrap());
        assert_ne!(here, there);
    }
}
