//! Native environment handle.

use crate::error::{lmdb_result, StorageError, StorageResult};
use crate::txn::NativeTxn;
use lmdb_master_sys as ffi;
use std::ffi::CString;
use std::io;
use std::mem::MaybeUninit;
use std::ops::{BitOr, BitOrAssign};
use std::os::raw::{c_int, c_uint};
use std::path::Path;
use std::ptr::{self, NonNull};
use std::sync::Arc;

/// Environment flags passed to `mdb_env_open` and `mdb_env_set_flags`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EnvFlags(c_uint);

impl EnvFlags {
    /// No flags.
    pub const EMPTY: Self = Self(0);
    /// Use the path as the data file instead of a directory.
    pub const NO_SUBDIR: Self = Self(ffi::MDB_NOSUBDIR as c_uint);
    /// Don't flush system buffers to disk when committing.
    pub const NO_SYNC: Self = Self(ffi::MDB_NOSYNC as c_uint);
    /// Open the environment read-only.
    pub const READ_ONLY: Self = Self(ffi::MDB_RDONLY as c_uint);
    /// Flush system buffers once per transaction, omitting the metadata flush.
    pub const NO_META_SYNC: Self = Self(ffi::MDB_NOMETASYNC as c_uint);
    /// Use a writeable memory map.
    pub const WRITE_MAP: Self = Self(ffi::MDB_WRITEMAP as c_uint);
    /// Use asynchronous msync when `WRITE_MAP` is used.
    pub const MAP_ASYNC: Self = Self(ffi::MDB_MAPASYNC as c_uint);
    /// Don't tie reader slots to threads.
    pub const NO_TLS: Self = Self(ffi::MDB_NOTLS as c_uint);
    /// Don't do any locking; the caller manages concurrency.
    pub const NO_LOCK: Self = Self(ffi::MDB_NOLOCK as c_uint);
    /// Turn off readahead.
    pub const NO_READAHEAD: Self = Self(ffi::MDB_NORDAHEAD as c_uint);
    /// Don't initialize malloc'd memory before writing to the data file.
    pub const NO_MEM_INIT: Self = Self(ffi::MDB_NOMEMINIT as c_uint);

    /// Returns the raw flag word.
    #[must_use]
    pub const fn bits(self) -> c_uint {
        self.0
    }

    /// Creates flags from a raw flag word.
    #[must_use]
    pub const fn from_bits(bits: c_uint) -> Self {
        Self(bits)
    }

    /// Returns true if every flag in `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns the union of both flag sets.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns the flags in `self` that are not in `other`.
    #[must_use]
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }
}

impl BitOr for EnvFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for EnvFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Sizing and flags applied before the environment is opened.
#[derive(Debug, Clone)]
pub struct EnvOptions {
    /// Maximum size of the memory map in bytes.
    pub map_size: u64,
    /// Maximum number of concurrent readers.
    pub max_readers: u32,
    /// Maximum number of named databases (0 = only the unnamed database).
    pub max_dbs: u32,
    /// Flags passed to `mdb_env_open`.
    pub flags: EnvFlags,
}

impl Default for EnvOptions {
    fn default() -> Self {
        Self {
            map_size: 10 * 1024 * 1024,
            max_readers: 126,
            max_dbs: 0,
            flags: EnvFlags::EMPTY,
        }
    }
}

/// Environment information as reported by `mdb_env_info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvInfo {
    /// Size of the memory map in bytes.
    pub map_size: u64,
    /// ID of the last used page.
    pub last_page: u64,
    /// ID of the last committed transaction.
    pub last_txn_id: u64,
    /// Maximum number of reader slots.
    pub max_readers: u32,
    /// Number of reader slots in use.
    pub num_readers: u32,
}

/// B-tree statistics as reported by `mdb_env_stat` and `mdb_stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    /// Page size in bytes.
    pub page_size: u32,
    /// Depth of the B-tree.
    pub depth: u32,
    /// Number of internal pages.
    pub branch_pages: u64,
    /// Number of leaf pages.
    pub leaf_pages: u64,
    /// Number of overflow pages.
    pub overflow_pages: u64,
    /// Number of data items.
    pub entries: u64,
}

impl Stat {
    pub(crate) fn from_raw(raw: &ffi::MDB_stat) -> Self {
        Self {
            page_size: raw.ms_psize as u32,
            depth: raw.ms_depth as u32,
            branch_pages: raw.ms_branch_pages as u64,
            leaf_pages: raw.ms_leaf_pages as u64,
            overflow_pages: raw.ms_overflow_pages as u64,
            entries: raw.ms_entries as u64,
        }
    }
}

/// An open native environment.
///
/// The handle is closed with `mdb_env_close` when the last reference is
/// dropped. Transactions hold a reference, so the environment always outlives
/// them.
#[derive(Debug)]
pub struct NativeEnv {
    ptr: NonNull<ffi::MDB_env>,
}

// SAFETY: an MDB_env may be shared between threads; the library serializes
// access internally.
unsafe impl Send for NativeEnv {}
// SAFETY: see above.
unsafe impl Sync for NativeEnv {}

impl NativeEnv {
    /// Creates, configures and opens an environment at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the path cannot be converted or the native library
    /// refuses any of the configuration or open calls.
    pub fn open(path: &Path, options: &EnvOptions) -> StorageResult<Arc<Self>> {
        let c_path = path_to_cstring(path)?;

        let mut raw: *mut ffi::MDB_env = ptr::null_mut();
        // SAFETY: `raw` is a valid out-pointer.
        lmdb_result(unsafe { ffi::mdb_env_create(&mut raw) })?;
        let ptr = NonNull::new(raw)
            .ok_or_else(|| StorageError::Io(io::Error::from(io::ErrorKind::OutOfMemory)))?;

        // From here on a failed call closes the half-configured handle on drop.
        let env = Self { ptr };

        let map_size = usize::try_from(options.map_size).unwrap_or(usize::MAX);
        // SAFETY: the handle is valid and not yet opened.
        unsafe {
            lmdb_result(ffi::mdb_env_set_mapsize(env.as_ptr(), map_size as _))?;
            lmdb_result(ffi::mdb_env_set_maxreaders(
                env.as_ptr(),
                options.max_readers as c_uint,
            ))?;
            if options.max_dbs > 0 {
                lmdb_result(ffi::mdb_env_set_maxdbs(env.as_ptr(), options.max_dbs as _))?;
            }
            lmdb_result(ffi::mdb_env_open(
                env.as_ptr(),
                c_path.as_ptr(),
                options.flags.bits(),
                0o644,
            ))?;
        }

        Ok(Arc::new(env))
    }

    pub(crate) fn as_ptr(&self) -> *mut ffi::MDB_env {
        self.ptr.as_ptr()
    }

    /// Returns the flags currently in effect.
    ///
    /// # Errors
    ///
    /// Returns an error if the native call fails.
    pub fn flags(&self) -> StorageResult<EnvFlags> {
        let mut bits: c_uint = 0;
        // SAFETY: the handle is open and `bits` is a valid out-pointer.
        lmdb_result(unsafe { ffi::mdb_env_get_flags(self.as_ptr(), &mut bits) })?;
        Ok(EnvFlags(bits))
    }

    /// Sets or clears flags on an open environment.
    ///
    /// Only the flags the native library allows to change after open
    /// (`NO_SYNC`, `NO_META_SYNC`, `MAP_ASYNC`, `NO_MEM_INIT`) are accepted.
    ///
    /// # Errors
    ///
    /// Returns an error if the native call fails.
    pub fn set_flags(&self, flags: EnvFlags, on: bool) -> StorageResult<()> {
        // SAFETY: the handle is open.
        lmdb_result(unsafe {
            ffi::mdb_env_set_flags(self.as_ptr(), flags.bits(), c_int::from(on))
        })
    }

    /// Flushes the data buffers to disk.
    ///
    /// With `force` the flush is synchronous even when `NO_SYNC` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the native call fails.
    pub fn sync(&self, force: bool) -> StorageResult<()> {
        // SAFETY: the handle is open.
        lmdb_result(unsafe { ffi::mdb_env_sync(self.as_ptr(), c_int::from(force)) })
    }

    /// Returns environment information.
    ///
    /// # Errors
    ///
    /// Returns an error if the native call fails.
    pub fn info(&self) -> StorageResult<EnvInfo> {
        let mut raw = MaybeUninit::<ffi::MDB_envinfo>::uninit();
        // SAFETY: the handle is open; the struct is fully written on success.
        let raw = unsafe {
            lmdb_result(ffi::mdb_env_info(self.as_ptr(), raw.as_mut_ptr()))?;
            raw.assume_init()
        };
        Ok(EnvInfo {
            map_size: raw.me_mapsize as u64,
            last_page: raw.me_last_pgno as u64,
            last_txn_id: raw.me_last_txnid as u64,
            max_readers: raw.me_maxreaders as u32,
            num_readers: raw.me_numreaders as u32,
        })
    }

    /// Returns statistics for the main database.
    ///
    /// # Errors
    ///
    /// Returns an error if the native call fails.
    pub fn stat(&self) -> StorageResult<Stat> {
        let mut raw = MaybeUninit::<ffi::MDB_stat>::uninit();
        // SAFETY: the handle is open; the struct is fully written on success.
        let raw = unsafe {
            lmdb_result(ffi::mdb_env_stat(self.as_ptr(), raw.as_mut_ptr()))?;
            raw.assume_init()
        };
        Ok(Stat::from_raw(&raw))
    }

    /// Begins a top-level transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the native call fails, e.g. when the reader table
    /// is full or a write transaction is requested on a read-only
    /// environment.
    pub fn begin_txn(self: &Arc<Self>, read_only: bool) -> StorageResult<NativeTxn> {
        NativeTxn::begin(Arc::clone(self), None, read_only)
    }
}

impl Drop for NativeEnv {
    fn drop(&mut self) {
        // SAFETY: no transaction is alive because each holds a reference to
        // this environment.
        unsafe { ffi::mdb_env_close(self.as_ptr()) }
    }
}

#[cfg(unix)]
fn path_to_cstring(path: &Path) -> StorageResult<CString> {
    use std::os::unix::ffi::OsStrExt;
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| StorageError::InvalidPath(path.display().to_string()))
}

#[cfg(not(unix))]
fn path_to_cstring(path: &Path) -> StorageResult<CString> {
    let s = path
        .to_str()
        .ok_or_else(|| StorageError::InvalidPath(path.display().to_string()))?;
    CString::new(s).map_err(|_| StorageError::InvalidPath(path.display().to_string()))
}
