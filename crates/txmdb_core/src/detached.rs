//! Handles moved out of their thread.

use crate::accessor::Txn;
use crate::error::{CoreError, CoreResult};
use crate::txn::{ReusableTxn, TxnKind, TxnState};
use std::sync::Arc;

/// A transaction handle that no longer belongs to a thread.
///
/// Returned by [`Environment::detach_txn_from_current_thread`]. The holder is
/// the sole owner: the environment will not close it on shutdown and the
/// original thread gets a fresh handle on its next call. Moving it to another
/// thread is allowed; sharing it is not, so it is not `Clone`.
///
/// Dropping the handle closes it.
///
/// [`Environment::detach_txn_from_current_thread`]: crate::Environment::detach_txn_from_current_thread
#[derive(Debug)]
pub struct DetachedTxn {
    handle: Arc<ReusableTxn>,
}

impl DetachedTxn {
    pub(crate) fn new(handle: Arc<ReusableTxn>) -> Self {
        Self { handle }
    }

    /// Id of the handle; stable across detachment.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.handle.id()
    }

    /// Current state of the handle.
    #[must_use]
    pub fn state(&self) -> TxnState {
        self.handle.state()
    }

    /// Returns true while a transaction is open.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self.state(), TxnState::Active { .. })
    }

    /// Kind of the open outermost transaction.
    #[must_use]
    pub fn kind(&self) -> Option<TxnKind> {
        match self.state() {
            TxnState::Active { kind, .. } => Some(kind),
            _ => None,
        }
    }

    /// Nesting depth of the open transaction.
    #[must_use]
    pub fn depth(&self) -> Option<usize> {
        match self.state() {
            TxnState::Active { depth, .. } => Some(depth),
            _ => None,
        }
    }

    /// Begins a transaction, nested if a read-write one is open.
    ///
    /// # Errors
    ///
    /// Same as [`Environment::begin_txn`](crate::Environment::begin_txn).
    pub fn begin(&mut self, read_only: bool) -> CoreResult<()> {
        self.handle.begin(read_only)?;
        Ok(())
    }

    /// Commits the innermost open transaction.
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` if no transaction is open.
    pub fn commit(&mut self) -> CoreResult<()> {
        self.handle.commit()
    }

    /// Aborts the innermost open transaction.
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` if no transaction is open.
    pub fn abort(&mut self) -> CoreResult<()> {
        self.handle.abort()
    }

    /// A non-owning scope over the open transaction, for database access.
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` if no transaction is open.
    pub fn scope(&self) -> CoreResult<Txn> {
        let active = self
            .handle
            .active()?
            .ok_or_else(|| CoreError::illegal_state("no active transaction"))?;
        Ok(Txn::new(Arc::clone(&self.handle), active, false))
    }

    /// Closes the handle, aborting any open transaction. Idempotent.
    pub fn close(&mut self) {
        self.handle.close();
    }
}

impl Drop for DetachedTxn {
    fn drop(&mut self) {
        self.handle.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EnvConfig, Environment};
    use txmdb_storage::EnvFlags;

    fn no_tls_env() -> Environment {
        Environment::open_temporary_with_config(
            EnvConfig::new().flags(EnvFlags::NO_TLS | EnvFlags::NO_LOCK),
        )
        .unwrap()
    }

    #[test]
    fn detached_idle_handle_can_run_transactions() {
        let env = no_tls_env();
        let mut detached = env.detach_txn_from_current_thread().unwrap();
        assert!(!detached.is_active());
        assert_eq!(detached.kind(), None);

        detached.begin(false).unwrap();
        detached.begin(false).unwrap();
        assert_eq!(detached.kind(), Some(TxnKind::ReadWrite));
        assert_eq!(detached.depth(), Some(1));
        detached.commit().unwrap();
        detached.commit().unwrap();
        assert!(matches!(
            detached.commit(),
            Err(CoreError::IllegalState { .. })
        ));
    }

    #[test]
    fn close_twice_is_harmless() {
        let env = no_tls_env();
        let mut detached = env.detach_txn_from_current_thread().unwrap();
        detached.begin(true).unwrap();
        detached.close();
        detached.close();
        assert_eq!(detached.state(), TxnState::Closed);
        assert!(matches!(
            detached.begin(true),
            Err(CoreError::TransactionClosed)
        ));
    }

    #[test]
    fn detached_handle_survives_env_registry_close() {
        let env = no_tls_env();
        let mut detached = env.detach_txn_from_current_thread().unwrap();
        detached.begin(true).unwrap();

        env.close();
        assert!(detached.is_active());
        assert!(matches!(
            detached.commit(),
            Err(CoreError::EnvironmentClosed)
        ));
        detached.close();
        assert_eq!(detached.state(), TxnState::Closed);
    }

    #[test]
    fn scope_requires_open_txn() {
        let env = no_tls_env();
        let mut detached = env.detach_txn_from_current_thread().unwrap();
        assert!(matches!(
            detached.scope(),
            Err(CoreError::IllegalState { .. })
        ));
        detached.begin(true).unwrap();
        let scope = detached.scope().unwrap();
        assert!(!scope.owns_txn());
        assert_eq!(scope.handle_id(), detached.id());
    }
}
