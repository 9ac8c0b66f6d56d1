//! Native transaction handles.

use crate::env::NativeEnv;
use crate::error::{lmdb_result, StorageError, StorageResult};
use lmdb_master_sys as ffi;
use std::cell::Cell;
use std::io;
use std::mem::ManuallyDrop;
use std::os::raw::c_uint;
use std::ptr::{self, NonNull};
use std::sync::Arc;

/// A live native transaction.
///
/// The transaction is aborted when dropped. [`commit`](Self::commit),
/// [`abort`](Self::abort) and [`reset`](Self::reset) consume it.
///
/// Nested transactions borrow nothing from their parent at the type level;
/// the caller must finish children before their parent.
#[derive(Debug)]
pub struct NativeTxn {
    ptr: NonNull<ffi::MDB_txn>,
    env: Arc<NativeEnv>,
    read_only: bool,
    nested: bool,
    opened_db: Cell<bool>,
}

// SAFETY: the handle may only be moved to another thread when the environment
// was opened with MDB_NOTLS (read transactions) or MDB_NOLOCK (write
// transactions). txmdb_core enforces that before handing a transaction to
// another thread.
unsafe impl Send for NativeTxn {}

impl NativeTxn {
    pub(crate) fn begin(
        env: Arc<NativeEnv>,
        parent: Option<&NativeTxn>,
        read_only: bool,
    ) -> StorageResult<Self> {
        let flags: c_uint = if read_only {
            ffi::MDB_RDONLY as c_uint
        } else {
            0
        };
        let parent_ptr = parent.map_or(ptr::null_mut(), NativeTxn::as_ptr);

        let mut raw: *mut ffi::MDB_txn = ptr::null_mut();
        // SAFETY: the environment is open, the parent (if any) is a live
        // write transaction of the same environment and `raw` is a valid
        // out-pointer.
        lmdb_result(unsafe { ffi::mdb_txn_begin(env.as_ptr(), parent_ptr, flags, &mut raw) })?;
        let ptr = NonNull::new(raw)
            .ok_or_else(|| StorageError::Io(io::Error::from(io::ErrorKind::OutOfMemory)))?;

        Ok(Self {
            ptr,
            env,
            read_only,
            nested: parent.is_some(),
            opened_db: Cell::new(false),
        })
    }

    pub(crate) fn as_ptr(&self) -> *mut ffi::MDB_txn {
        self.ptr.as_ptr()
    }

    /// Returns true if this is a read-only transaction.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Returns true if this transaction has a parent.
    #[must_use]
    pub fn is_nested(&self) -> bool {
        self.nested
    }

    /// Returns true if a database was opened through this transaction.
    #[must_use]
    pub fn opened_db(&self) -> bool {
        self.opened_db.get()
    }

    pub(crate) fn mark_opened_db(&self) {
        self.opened_db.set(true);
    }

    /// Returns the environment this transaction belongs to.
    #[must_use]
    pub fn env(&self) -> &Arc<NativeEnv> {
        &self.env
    }

    /// Begins a child transaction of this write transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if this transaction is read-only or the native call
    /// fails.
    pub fn begin_nested(&self) -> StorageResult<NativeTxn> {
        if self.read_only {
            return Err(StorageError::ReadOnlyParent);
        }
        NativeTxn::begin(Arc::clone(&self.env), Some(self), false)
    }

    /// Commits the transaction.
    ///
    /// The native handle is freed whether or not the commit succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the native commit fails; the transaction is then
    /// lost.
    pub fn commit(self) -> StorageResult<()> {
        let (ptr, env) = self.into_parts();
        // SAFETY: the handle is live and is consumed here.
        let rc = unsafe { ffi::mdb_txn_commit(ptr.as_ptr()) };
        drop(env);
        lmdb_result(rc)
    }

    /// Aborts the transaction, discarding any writes.
    pub fn abort(self) {
        drop(self);
    }

    /// Resets a top-level read-only transaction so it can be renewed later.
    ///
    /// Write transactions, nested transactions and transactions that opened
    /// a database cannot be reset and are handed back unchanged in the `Err`
    /// variant. A reset discards database handles opened by the transaction,
    /// so those must be committed instead.
    pub fn reset(self) -> Result<ResetReader, Self> {
        if !self.read_only || self.nested || self.opened_db.get() {
            return Err(self);
        }
        let (ptr, env) = self.into_parts();
        // SAFETY: the handle is a live top-level read-only transaction.
        unsafe { ffi::mdb_txn_reset(ptr.as_ptr()) };
        Ok(ResetReader { ptr, env })
    }

    fn into_parts(self) -> (NonNull<ffi::MDB_txn>, Arc<NativeEnv>) {
        let this = ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so the Arc is moved out exactly once.
        let env = unsafe { ptr::read(&this.env) };
        (this.ptr, env)
    }
}

impl Drop for NativeTxn {
    fn drop(&mut self) {
        // SAFETY: the handle is live; children were finished by the owner.
        unsafe { ffi::mdb_txn_abort(self.as_ptr()) }
    }
}

/// A reset read-only transaction waiting to be renewed.
///
/// Holding one keeps the native allocation (and, without `NO_TLS`, the
/// thread's reader slot) so the next read can skip `mdb_txn_begin`.
#[derive(Debug)]
pub struct ResetReader {
    ptr: NonNull<ffi::MDB_txn>,
    env: Arc<NativeEnv>,
}

// SAFETY: same conditions as NativeTxn.
unsafe impl Send for ResetReader {}

impl ResetReader {
    /// Renews the transaction with a fresh snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the native call fails; the handle is freed.
    pub fn renew(self) -> StorageResult<NativeTxn> {
        // SAFETY: the handle is a reset read-only transaction. On failure
        // `self` is dropped and the handle aborted.
        lmdb_result(unsafe { ffi::mdb_txn_renew(self.ptr.as_ptr()) })?;

        let this = ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so the Arc is moved out exactly once.
        let env = unsafe { ptr::read(&this.env) };
        Ok(NativeTxn {
            ptr: this.ptr,
            env,
            read_only: true,
            nested: false,
            opened_db: Cell::new(false),
        })
    }
}

impl Drop for ResetReader {
    fn drop(&mut self) {
        // SAFETY: aborting a reset transaction frees it.
        unsafe { ffi::mdb_txn_abort(self.ptr.as_ptr()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DbFlags, EnvOptions};
    use tempfile::tempdir;

    fn open_env() -> (tempfile::TempDir, Arc<NativeEnv>) {
        let dir = tempdir().unwrap();
        let env = NativeEnv::open(dir.path(), &EnvOptions::default()).unwrap();
        (dir, env)
    }

    #[test]
    fn write_then_read() {
        let (_dir, env) = open_env();

        let mut txn = env.begin_txn(false).unwrap();
        let db = txn.open_db(None, DbFlags::EMPTY).unwrap();
        txn.put(db, b"hello", b"world").unwrap();
        txn.commit().unwrap();

        let txn = env.begin_txn(true).unwrap();
        assert_eq!(txn.get(db, b"hello").unwrap(), Some(&b"world"[..]));
        assert_eq!(txn.get(db, b"missing").unwrap(), None);
    }

    #[test]
    fn abort_discards_writes() {
        let (_dir, env) = open_env();

        let mut txn = env.begin_txn(false).unwrap();
        let db = txn.open_db(None, DbFlags::EMPTY).unwrap();
        txn.put(db, b"k", b"v").unwrap();
        txn.abort();

        let txn = env.begin_txn(true).unwrap();
        assert_eq!(txn.get(db, b"k").unwrap(), None);
    }

    #[test]
    fn nested_commit_and_abort() {
        let (_dir, env) = open_env();

        let mut outer = env.begin_txn(false).unwrap();
        let db = outer.open_db(None, DbFlags::EMPTY).unwrap();

        let mut kept = outer.begin_nested().unwrap();
        assert!(kept.is_nested());
        kept.put(db, b"kept", b"1").unwrap();
        kept.commit().unwrap();

        let mut dropped = outer.begin_nested().unwrap();
        dropped.put(db, b"dropped", b"2").unwrap();
        dropped.abort();

        outer.commit().unwrap();

        let txn = env.begin_txn(true).unwrap();
        assert_eq!(txn.get(db, b"kept").unwrap(), Some(&b"1"[..]));
        assert_eq!(txn.get(db, b"dropped").unwrap(), None);
    }

    #[test]
    fn read_only_cannot_nest() {
        let (_dir, env) = open_env();
        let txn = env.begin_txn(true).unwrap();
        assert!(txn.begin_nested().is_err());
    }

    #[test]
    fn reset_and_renew_sees_new_data() {
        let (_dir, env) = open_env();

        let mut txn = env.begin_txn(false).unwrap();
        let db = txn.open_db(None, DbFlags::EMPTY).unwrap();
        txn.commit().unwrap();

        let reader = env.begin_txn(true).unwrap();
        assert_eq!(reader.get(db, b"k").unwrap(), None);
        let parked = reader.reset().unwrap();

        let mut writer = env.begin_txn(false).unwrap();
        writer.put(db, b"k", b"v").unwrap();
        writer.commit().unwrap();

        let reader = parked.renew().unwrap();
        assert!(reader.is_read_only());
        assert_eq!(reader.get(db, b"k").unwrap(), Some(&b"v"[..]));
    }

    #[test]
    fn write_txn_cannot_reset() {
        let (_dir, env) = open_env();
        let txn = env.begin_txn(false).unwrap();
        let txn = txn.reset().unwrap_err();
        assert!(!txn.is_read_only());
    }

    #[test]
    fn reader_that_opened_db_cannot_reset() {
        let (_dir, env) = open_env();
        let txn = env.begin_txn(true).unwrap();
        txn.open_db(None, DbFlags::EMPTY).unwrap();
        assert!(txn.opened_db());
        let txn = txn.reset().unwrap_err();
        txn.commit().unwrap();
    }

    #[test]
    fn transaction_keeps_env_alive() {
        let (_dir, env) = open_env();
        let txn = env.begin_txn(true).unwrap();
        let weak = Arc::downgrade(&env);
        drop(env);
        assert!(weak.upgrade().is_some());
        drop(txn);
        assert!(weak.upgrade().is_none());
    }
}
