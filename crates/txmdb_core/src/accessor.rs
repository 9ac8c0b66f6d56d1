//! Transaction scopes and the six accessors that hand them out.
//!
//! | Accessor | Requires | Begins | Owns |
//! |---|---|---|---|
//! | [`with_existing_txn`](Environment::with_existing_txn) | any open transaction | never | no |
//! | [`with_existing_read_only_txn`](Environment::with_existing_read_only_txn) | open read-only transaction | never | no |
//! | [`with_existing_read_write_txn`](Environment::with_existing_read_write_txn) | writable env, open read-write transaction | never | no |
//! | [`with_read_only_txn`](Environment::with_read_only_txn) | nothing | when idle | if it began |
//! | [`with_read_write_txn`](Environment::with_read_write_txn) | writable env, no open read-only transaction | when idle | if it began |
//! | [`with_nested_read_write_txn`](Environment::with_nested_read_write_txn) | writable env, no open read-only transaction | always | yes |
//!
//! An owning scope commits or aborts its own level. A scope that only reuses
//! an open transaction never finishes it.

use crate::env::{EnvShared, Environment};
use crate::error::{CoreError, CoreResult};
use crate::txn::{ActiveTxn, ReusableTxn, TxnKind, TxnState};
use std::sync::Arc;
use tracing::{debug, warn};
use txmdb_storage::NativeTxn;

/// A scoped view of the calling thread's transaction.
///
/// Owning scopes abort their transaction when dropped without
/// [`commit`](Self::commit). Non-owning scopes leave the transaction alone.
#[must_use = "an owning scope aborts its transaction when dropped"]
#[derive(Debug)]
pub struct Txn {
    handle: Arc<ReusableTxn>,
    kind: TxnKind,
    level: usize,
    generation: u64,
    owns: bool,
    finished: bool,
}

impl Txn {
    pub(crate) fn new(handle: Arc<ReusableTxn>, active: ActiveTxn, owns: bool) -> Self {
        Self {
            handle,
            kind: active.kind,
            level: active.level,
            generation: active.generation,
            owns,
            finished: false,
        }
    }

    /// Kind of the transaction this scope runs in.
    #[must_use]
    pub fn kind(&self) -> TxnKind {
        self.kind
    }

    /// Returns true if the scope's transaction is read-only.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.kind == TxnKind::ReadOnly
    }

    /// Returns true if this scope began the transaction and must finish it.
    #[must_use]
    pub fn owns_txn(&self) -> bool {
        self.owns
    }

    /// Nesting level of the scope; 0 is the outermost transaction.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.level
    }

    /// Returns true while the scope's transaction is still open.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.handle.holds(self.level, self.generation)
    }

    /// State of the underlying handle.
    #[must_use]
    pub fn state(&self) -> TxnState {
        self.handle.state()
    }

    /// Id of the underlying handle.
    #[must_use]
    pub fn handle_id(&self) -> u64 {
        self.handle.id()
    }

    /// Commits the scope's transaction if the scope owns it.
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` if a nested transaction is still open inside
    /// this one or the transaction already finished, or a storage error if
    /// the native commit fails.
    pub fn commit(mut self) -> CoreResult<()> {
        self.finish(true)
    }

    /// Aborts the scope's transaction if the scope owns it.
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` if a nested transaction is still open inside
    /// this one or the transaction already finished.
    pub fn abort(mut self) -> CoreResult<()> {
        self.finish(false)
    }

    fn finish(&mut self, commit: bool) -> CoreResult<()> {
        self.finished = true;
        if !self.owns {
            return Ok(());
        }
        self.handle
            .finish_level(self.level, self.generation, commit, false)
    }

    pub(crate) fn env(&self) -> &Arc<EnvShared> {
        self.handle.env()
    }

    /// Runs `f` against the innermost open native transaction.
    pub(crate) fn with_native<R>(
        &self,
        f: impl FnOnce(&mut NativeTxn) -> CoreResult<R>,
    ) -> CoreResult<R> {
        self.handle.with_native(self.level, self.generation, f)
    }
}

impl Drop for Txn {
    fn drop(&mut self) {
        if self.finished || !self.owns || !self.is_active() {
            return;
        }
        match self
            .handle
            .finish_level(self.level, self.generation, false, true)
        {
            Ok(()) => debug!(
                handle = self.handle.id(),
                level = self.level,
                "aborted unfinished transaction scope"
            ),
            Err(e) if e.is_closed() => {}
            Err(e) => warn!(
                handle = self.handle.id(),
                level = self.level,
                error = %e,
                "failed to abort transaction scope"
            ),
        }
    }
}

impl Environment {
    fn require_active(&self) -> CoreResult<(Arc<ReusableTxn>, ActiveTxn)> {
        let handle = self
            .existing_handle()?
            .ok_or_else(|| CoreError::illegal_state("no active transaction"))?;
        let active = handle
            .active()?
            .ok_or_else(|| CoreError::illegal_state("no active transaction"))?;
        Ok((handle, active))
    }

    /// Reuses the calling thread's open transaction, of either kind.
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` if no transaction is open.
    pub fn with_existing_txn(&self) -> CoreResult<Txn> {
        let (handle, active) = self.require_active()?;
        Ok(Txn::new(handle, active, false))
    }

    /// Reuses the calling thread's open read-only transaction.
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` if no read-only transaction is open.
    pub fn with_existing_read_only_txn(&self) -> CoreResult<Txn> {
        let (handle, active) = self.require_active()?;
        if active.kind != TxnKind::ReadOnly {
            return Err(CoreError::illegal_state(
                "the open transaction is not read-only",
            ));
        }
        Ok(Txn::new(handle, active, false))
    }

    /// Reuses the calling thread's open read-write transaction.
    ///
    /// # Errors
    ///
    /// Returns `Unsupported` on a read-only environment and `IllegalState` if
    /// no read-write transaction is open.
    pub fn with_existing_read_write_txn(&self) -> CoreResult<Txn> {
        self.shared().assert_writable()?;
        let (handle, active) = self.require_active()?;
        if active.kind != TxnKind::ReadWrite {
            return Err(CoreError::illegal_state(
                "the open transaction is not read-write",
            ));
        }
        Ok(Txn::new(handle, active, false))
    }

    /// Begins a read-only transaction, or reuses whatever transaction is
    /// already open.
    ///
    /// # Errors
    ///
    /// Returns an error if the environment is closed or the native begin
    /// fails.
    pub fn with_read_only_txn(&self) -> CoreResult<Txn> {
        let handle = self.current_handle()?;
        if let Some(active) = handle.active()? {
            return Ok(Txn::new(handle, active, false));
        }
        let active = handle.begin(true)?;
        Ok(Txn::new(handle, active, true))
    }

    /// Begins a read-write transaction, or reuses the open read-write one.
    ///
    /// # Errors
    ///
    /// Returns `Unsupported` on a read-only environment and `IllegalState` if
    /// a read-only transaction is open.
    pub fn with_read_write_txn(&self) -> CoreResult<Txn> {
        self.shared().assert_writable()?;
        let handle = self.current_handle()?;
        match handle.active()? {
            Some(active) if active.kind == TxnKind::ReadWrite => {
                Ok(Txn::new(handle, active, false))
            }
            Some(_) => Err(CoreError::illegal_state(
                "a read-only transaction is open on this thread",
            )),
            None => {
                let active = handle.begin(false)?;
                Ok(Txn::new(handle, active, true))
            }
        }
    }

    /// Begins a read-write transaction, nested inside the open one if any.
    ///
    /// # Errors
    ///
    /// Returns `Unsupported` on a read-only environment and `IllegalState` if
    /// a read-only transaction is open.
    pub fn with_nested_read_write_txn(&self) -> CoreResult<Txn> {
        self.shared().assert_writable()?;
        let handle = self.current_handle()?;
        let active = handle.begin(false)?;
        Ok(Txn::new(handle, active, true))
    }
}
