//! Database handles and single-key operations.

use crate::env::Stat;
use crate::error::{lmdb_result, StorageError, StorageResult};
use crate::txn::NativeTxn;
use lmdb_master_sys as ffi;
use std::ffi::CString;
use std::mem::MaybeUninit;
use std::ops::BitOr;
use std::os::raw::{c_int, c_uint};
use std::{ptr, slice};

/// Flags passed to `mdb_dbi_open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DbFlags(c_uint);

impl DbFlags {
    /// No flags.
    pub const EMPTY: Self = Self(0);
    /// Create the database if it doesn't exist.
    pub const CREATE: Self = Self(ffi::MDB_CREATE as c_uint);
    /// Compare keys in reverse byte order.
    pub const REVERSE_KEY: Self = Self(ffi::MDB_REVERSEKEY as c_uint);
    /// Allow duplicate keys.
    pub const DUP_SORT: Self = Self(ffi::MDB_DUPSORT as c_uint);
    /// Keys are native-endian unsigned machine integers.
    pub const INTEGER_KEY: Self = Self(ffi::MDB_INTEGERKEY as c_uint);
    /// Duplicate values all have the same size (with `DUP_SORT`).
    pub const DUP_FIXED: Self = Self(ffi::MDB_DUPFIXED as c_uint);
    /// Duplicate values are native-endian machine integers (with `DUP_SORT`).
    pub const INTEGER_DUP: Self = Self(ffi::MDB_INTEGERDUP as c_uint);

    /// Returns the raw flag word.
    #[must_use]
    pub const fn bits(self) -> c_uint {
        self.0
    }

    /// Returns true if every flag in `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for DbFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// An open database handle.
///
/// Handles stay valid for the lifetime of the environment once the
/// transaction that opened them has committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dbi(ffi::MDB_dbi);

impl Dbi {
    /// Returns the raw database index.
    #[must_use]
    pub fn raw(self) -> u32 {
        self.0 as u32
    }
}

fn to_val(bytes: &[u8]) -> ffi::MDB_val {
    ffi::MDB_val {
        mv_size: bytes.len() as _,
        mv_data: bytes.as_ptr() as *mut _,
    }
}

fn empty_val() -> ffi::MDB_val {
    ffi::MDB_val {
        mv_size: 0,
        mv_data: ptr::null_mut(),
    }
}

impl NativeTxn {
    /// Opens (or with [`DbFlags::CREATE`], creates) a database.
    ///
    /// `None` opens the unnamed main database.
    ///
    /// # Errors
    ///
    /// Returns an error if the name contains a NUL byte, the database does
    /// not exist without `CREATE`, or the environment has no room for more
    /// named databases.
    pub fn open_db(&self, name: Option<&str>, flags: DbFlags) -> StorageResult<Dbi> {
        let c_name = name
            .map(|n| CString::new(n).map_err(|_| StorageError::InvalidPath(n.to_string())))
            .transpose()?;
        let name_ptr = c_name.as_ref().map_or(ptr::null(), |n| n.as_ptr());

        let mut dbi: ffi::MDB_dbi = 0;
        // SAFETY: the transaction is live and `dbi` is a valid out-pointer.
        lmdb_result(unsafe { ffi::mdb_dbi_open(self.as_ptr(), name_ptr, flags.bits(), &mut dbi) })?;
        self.mark_opened_db();
        Ok(Dbi(dbi))
    }

    /// Reads the value stored under `key`.
    ///
    /// The returned slice points into the memory map and is valid until the
    /// transaction ends or writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the native call fails for any reason other than a
    /// missing key.
    pub fn get(&self, dbi: Dbi, key: &[u8]) -> StorageResult<Option<&[u8]>> {
        let mut key_val = to_val(key);
        let mut data_val = empty_val();
        // SAFETY: the transaction is live and both vals are valid.
        let rc = unsafe { ffi::mdb_get(self.as_ptr(), dbi.0, &mut key_val, &mut data_val) };
        if rc == ffi::MDB_NOTFOUND as c_int {
            return Ok(None);
        }
        lmdb_result(rc)?;

        if data_val.mv_size == 0 {
            return Ok(Some(&[]));
        }
        // SAFETY: the library returned a pointer into the map that stays valid
        // while `self` is borrowed and not written through.
        let data = unsafe {
            slice::from_raw_parts(data_val.mv_data as *const u8, data_val.mv_size as usize)
        };
        Ok(Some(data))
    }

    /// Stores `value` under `key`, replacing any existing value.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction is read-only, the key is too
    /// large, or the map is full.
    pub fn put(&mut self, dbi: Dbi, key: &[u8], value: &[u8]) -> StorageResult<()> {
        let mut key_val = to_val(key);
        let mut data_val = to_val(value);
        // SAFETY: the transaction is live; the library copies both buffers.
        lmdb_result(unsafe { ffi::mdb_put(self.as_ptr(), dbi.0, &mut key_val, &mut data_val, 0) })
    }

    /// Deletes `key` and all its values. Returns false if the key was absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction is read-only or the native call
    /// fails.
    pub fn del(&mut self, dbi: Dbi, key: &[u8]) -> StorageResult<bool> {
        let mut key_val = to_val(key);
        // SAFETY: the transaction is live; a null data pointer deletes every
        // value stored under the key.
        let rc = unsafe { ffi::mdb_del(self.as_ptr(), dbi.0, &mut key_val, ptr::null_mut()) };
        if rc == ffi::MDB_NOTFOUND as c_int {
            return Ok(false);
        }
        lmdb_result(rc)?;
        Ok(true)
    }

    /// Returns statistics for a database.
    ///
    /// # Errors
    ///
    /// Returns an error if the native call fails.
    pub fn db_stat(&self, dbi: Dbi) -> StorageResult<Stat> {
        let mut raw = MaybeUninit::<ffi::MDB_stat>::uninit();
        // SAFETY: the transaction is live; the struct is fully written on success.
        let raw = unsafe {
            lmdb_result(ffi::mdb_stat(self.as_ptr(), dbi.0, raw.as_mut_ptr()))?;
            raw.assume_init()
        };
        Ok(Stat::from_raw(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EnvOptions, NativeEnv};
    use tempfile::tempdir;

    #[test]
    fn delete_reports_presence() {
        let dir = tempdir().unwrap();
        let env = NativeEnv::open(dir.path(), &EnvOptions::default()).unwrap();

        let mut txn = env.begin_txn(false).unwrap();
        let db = txn.open_db(None, DbFlags::EMPTY).unwrap();
        txn.put(db, b"a", b"1").unwrap();
        assert!(txn.del(db, b"a").unwrap());
        assert!(!txn.del(db, b"a").unwrap());
        txn.commit().unwrap();
    }

    #[test]
    fn named_database_with_integer_keys() {
        let dir = tempdir().unwrap();
        let options = EnvOptions {
            max_dbs: 4,
            ..EnvOptions::default()
        };
        let env = NativeEnv::open(dir.path(), &options).unwrap();

        let mut txn = env.begin_txn(false).unwrap();
        let db = txn
            .open_db(Some("numbers"), DbFlags::CREATE | DbFlags::INTEGER_KEY)
            .unwrap();
        txn.put(db, &7u32.to_ne_bytes(), b"seven").unwrap();
        txn.put(db, &3u32.to_ne_bytes(), b"three").unwrap();
        assert_eq!(txn.db_stat(db).unwrap().entries, 2);
        txn.commit().unwrap();

        let txn = env.begin_txn(true).unwrap();
        assert_eq!(
            txn.get(db, &7u32.to_ne_bytes()).unwrap(),
            Some(&b"seven"[..])
        );
    }

    #[test]
    fn missing_named_database_without_create_fails() {
        let dir = tempdir().unwrap();
        let options = EnvOptions {
            max_dbs: 4,
            ..EnvOptions::default()
        };
        let env = NativeEnv::open(dir.path(), &options).unwrap();

        let txn = env.begin_txn(true).unwrap();
        let err = txn.open_db(Some("nope"), DbFlags::EMPTY).unwrap_err();
        assert_eq!(err.code(), Some(ffi::MDB_NOTFOUND as c_int));
    }

    #[test]
    fn flags_compose() {
        let flags = DbFlags::DUP_SORT | DbFlags::DUP_FIXED;
        assert!(flags.contains(DbFlags::DUP_SORT));
        assert!(!flags.contains(DbFlags::INTEGER_KEY));
    }
}
