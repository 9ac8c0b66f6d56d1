//! Environment facade.

use crate::config::{DbOptions, EnvConfig};
use crate::database::Database;
use crate::detached::DetachedTxn;
use crate::error::{CoreError, CoreResult};
use crate::registry::TxnRegistry;
use crate::txn::{ReusableTxn, TxnState};
use parking_lot::{Mutex, RwLock};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};
use txmdb_codec::Serializer;
use txmdb_storage::{EnvFlags, EnvInfo, NativeEnv, Stat};

/// State shared by the environment, its handles and its databases.
#[derive(Debug)]
pub(crate) struct EnvShared {
    native: RwLock<Option<Arc<NativeEnv>>>,
    closed: AtomicBool,
    read_only: bool,
    flags: EnvFlags,
    registry: TxnRegistry,
    /// `mdb_dbi_open` must not run in two transactions at once.
    dbi_lock: Mutex<()>,
}

impl EnvShared {
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub(crate) fn flags(&self) -> EnvFlags {
        self.flags
    }

    pub(crate) fn assert_open(&self) -> CoreResult<()> {
        if self.is_closed() {
            Err(CoreError::EnvironmentClosed)
        } else {
            Ok(())
        }
    }

    pub(crate) fn assert_writable(&self) -> CoreResult<()> {
        self.assert_open()?;
        if self.read_only {
            return Err(CoreError::unsupported("the environment is read-only"));
        }
        Ok(())
    }

    /// Returns the native environment while it is open.
    pub(crate) fn native(&self) -> CoreResult<Arc<NativeEnv>> {
        self.native
            .read()
            .as_ref()
            .map(Arc::clone)
            .ok_or(CoreError::EnvironmentClosed)
    }

    pub(crate) fn registry(&self) -> &TxnRegistry {
        &self.registry
    }

    pub(crate) fn dbi_lock(&self) -> &Mutex<()> {
        &self.dbi_lock
    }
}

/// An LMDB environment with per-thread reusable transactions.
///
/// Each thread that touches the environment gets its own transaction handle
/// on first use. The handle holds at most one outermost transaction; nested
/// transactions are available inside read-write transactions only.
///
/// ```rust,no_run
/// use txmdb_core::{DbOptions, Environment};
/// use txmdb_codec::STRING;
///
/// let env = Environment::open_temporary()?;
/// let db = env.open_database(None, STRING, STRING, DbOptions::default())?;
///
/// let txn = env.with_read_write_txn()?;
/// db.put(&txn, &"k".to_string(), &"v".to_string())?;
/// txn.commit()?;
///
/// let txn = env.with_read_only_txn()?;
/// assert_eq!(db.get(&txn, &"k".to_string())?, Some("v".to_string()));
/// # Ok::<(), txmdb_core::CoreError>(())
/// ```
///
/// Closing the environment closes every registered handle first, aborting
/// whatever they hold, then releases the native environment.
pub struct Environment {
    shared: Arc<EnvShared>,
    path: PathBuf,
    temporary: bool,
}

impl Environment {
    /// Opens an environment in an existing directory with default settings.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `path` is not a directory, or a storage
    /// error if the native open fails.
    pub fn open(path: &Path) -> CoreResult<Self> {
        Self::open_with_config(path, EnvConfig::default())
    }

    /// Opens an environment in an existing directory.
    ///
    /// With [`EnvFlags::NO_SUBDIR`] in `config.flags`, `path` names the data
    /// file instead of a directory.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `path` is not a directory, or a storage
    /// error if the native open fails.
    pub fn open_with_config(path: &Path, config: EnvConfig) -> CoreResult<Self> {
        if !config.flags.contains(EnvFlags::NO_SUBDIR) && !path.is_dir() {
            return Err(CoreError::invalid_config(format!(
                "{} is not a directory",
                path.display()
            )));
        }
        Self::open_native(path, &config, EnvFlags::EMPTY, false)
    }

    /// Opens an ephemeral environment with default settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary file cannot be created or the native
    /// open fails.
    pub fn open_temporary() -> CoreResult<Self> {
        Self::open_temporary_with_config(EnvConfig::default())
    }

    /// Opens an ephemeral environment.
    ///
    /// The data lives in a temporary file opened with `NO_SUBDIR | NO_SYNC`.
    /// The file and its lock file are unlinked right after the open, so the
    /// operating system reclaims them once the environment is gone.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for a read-only configuration, or an error if
    /// the temporary file cannot be created or the native open fails.
    pub fn open_temporary_with_config(config: EnvConfig) -> CoreResult<Self> {
        if config.read_only {
            return Err(CoreError::invalid_config(
                "a temporary environment cannot be read-only",
            ));
        }
        let file = tempfile::Builder::new()
            .prefix("txmdb-")
            .suffix("-data.mdb")
            .tempfile()?
            .into_temp_path();

        let env = Self::open_native(&file, &config, EnvFlags::NO_SUBDIR | EnvFlags::NO_SYNC, true)?;

        let mut lock_path = file.as_os_str().to_owned();
        lock_path.push("-lock");
        match fs::remove_file(&lock_path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        file.close()?;
        Ok(env)
    }

    fn open_native(
        path: &Path,
        config: &EnvConfig,
        extra: EnvFlags,
        temporary: bool,
    ) -> CoreResult<Self> {
        let options = config.native_options(extra);
        let native = NativeEnv::open(path, &options)?;
        let flags = native.flags()?;

        info!(
            path = %path.display(),
            read_only = config.read_only,
            map_size = options.map_size,
            temporary,
            "opened environment"
        );

        Ok(Self {
            shared: Arc::new(EnvShared {
                native: RwLock::new(Some(native)),
                closed: AtomicBool::new(false),
                read_only: config.read_only,
                flags,
                registry: TxnRegistry::new(),
                dbi_lock: Mutex::new(()),
            }),
            path: path.to_path_buf(),
            temporary,
        })
    }

    pub(crate) fn shared(&self) -> &Arc<EnvShared> {
        &self.shared
    }

    /// Returns the calling thread's handle, creating it on first use.
    pub(crate) fn current_handle(&self) -> CoreResult<Arc<ReusableTxn>> {
        self.shared.assert_open()?;
        let shared = Arc::clone(&self.shared);
        self.shared
            .registry()
            .get_or_create(move |thread| ReusableTxn::new(shared, thread))
    }

    /// Returns the calling thread's handle without creating one.
    pub(crate) fn existing_handle(&self) -> CoreResult<Option<Arc<ReusableTxn>>> {
        self.shared.assert_open()?;
        self.shared.registry().current()
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Begins a transaction on the calling thread.
    ///
    /// If a read-write transaction is already open this begins a nested one.
    /// `read_only` is forced on a read-only environment.
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` when nesting inside a read-only transaction or
    /// requesting a read-only transaction inside a read-write one.
    pub fn begin_txn(&self, read_only: bool) -> CoreResult<()> {
        self.current_handle()?.begin(read_only)?;
        Ok(())
    }

    /// Commits the calling thread's innermost transaction.
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` if no transaction is open.
    pub fn commit_txn(&self) -> CoreResult<()> {
        match self.existing_handle()? {
            Some(handle) => handle.commit(),
            None => Err(CoreError::illegal_state("no active transaction")),
        }
    }

    /// Aborts the calling thread's innermost transaction.
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` if no transaction is open.
    pub fn abort_txn(&self) -> CoreResult<()> {
        match self.existing_handle()? {
            Some(handle) => handle.abort(),
            None => Err(CoreError::illegal_state("no active transaction")),
        }
    }

    /// Returns the state of the calling thread's handle.
    ///
    /// # Errors
    ///
    /// Returns `EnvironmentClosed` after [`close`](Self::close).
    pub fn txn_state(&self) -> CoreResult<TxnState> {
        Ok(self
            .existing_handle()?
            .map_or(TxnState::Idle, |handle| handle.state()))
    }

    /// Moves the calling thread's handle out of the environment's control.
    ///
    /// The thread's next transaction call creates a fresh handle. The
    /// returned handle can be sent to another thread and is closed when
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` unless the environment was opened with
    /// [`EnvFlags::NO_TLS`], or when an open read-write transaction would
    /// move without [`EnvFlags::NO_LOCK`].
    pub fn detach_txn_from_current_thread(&self) -> CoreResult<DetachedTxn> {
        self.shared.assert_open()?;
        if self.is_thread_local_txns() {
            return Err(CoreError::illegal_state(
                "detaching a transaction requires the NO_TLS flag",
            ));
        }
        let handle = self.current_handle()?;
        handle.detach()?;
        self.shared.registry().remove_current();
        Ok(DetachedTxn::new(handle))
    }

    /// Number of handles currently registered with the environment.
    #[must_use]
    pub fn active_handles(&self) -> usize {
        self.shared.registry().len()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Closes the environment.
    ///
    /// Every registered handle is closed first, aborting any transaction it
    /// holds. Detached handles keep the native environment alive until they
    /// are closed, but fail with `EnvironmentClosed` meanwhile. Calling this
    /// again is a no-op.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let handles = self.shared.registry().close();
        let count = handles.len();
        for handle in handles {
            handle.close();
        }

        let native = self.shared.native.write().take();
        if let Some(native) = native {
            if Arc::strong_count(&native) > 1 {
                debug!("native environment release deferred to detached handles");
            }
        }
        info!(path = %self.path.display(), handles = count, "closed environment");
    }

    /// Returns true once [`close`](Self::close) has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    // ========================================================================
    // Durability
    // ========================================================================

    /// Flushes system buffers to disk after each commit's metadata write.
    ///
    /// # Errors
    ///
    /// Returns an error if the environment is closed or the native call fails.
    pub fn enable_meta_sync(&self) -> CoreResult<()> {
        self.set_flag(EnvFlags::NO_META_SYNC, false)
    }

    /// Skips the metadata flush on commit. A crash may undo the last
    /// committed transaction but keeps the database intact.
    ///
    /// # Errors
    ///
    /// Returns an error if the environment is closed or the native call fails.
    pub fn disable_meta_sync(&self) -> CoreResult<()> {
        self.set_flag(EnvFlags::NO_META_SYNC, true)
    }

    /// Flushes system buffers to disk on every commit.
    ///
    /// # Errors
    ///
    /// Returns an error if the environment is closed or the native call fails.
    pub fn enable_sync(&self) -> CoreResult<()> {
        self.set_flag(EnvFlags::NO_SYNC, false)
    }

    /// Skips the flush on commit. A crash may lose recent transactions, and
    /// with `WRITE_MAP` may corrupt the database.
    ///
    /// # Errors
    ///
    /// Returns an error if the environment is closed or the native call fails.
    pub fn disable_sync(&self) -> CoreResult<()> {
        self.set_flag(EnvFlags::NO_SYNC, true)
    }

    fn set_flag(&self, flag: EnvFlags, on: bool) -> CoreResult<()> {
        self.shared.assert_open()?;
        self.shared.native()?.set_flags(flag, on)?;
        Ok(())
    }

    /// Flushes data buffers to disk. With `force` the flush is synchronous
    /// even when sync is disabled.
    ///
    /// # Errors
    ///
    /// Returns `Unsupported` on a read-only environment, or an error if the
    /// native call fails.
    pub fn sync(&self, force: bool) -> CoreResult<()> {
        self.shared.assert_writable()?;
        self.shared.native()?.sync(force)?;
        Ok(())
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Returns true if the environment was opened read-only.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.shared.is_read_only()
    }

    /// Path the environment was opened at. For temporary environments the
    /// file no longer exists.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true for ephemeral environments.
    #[must_use]
    pub fn is_temporary(&self) -> bool {
        self.temporary
    }

    /// Returns true if native transactions are bound to their thread, i.e.
    /// the environment was opened without `NO_TLS`.
    #[must_use]
    pub fn is_thread_local_txns(&self) -> bool {
        !self.shared.flags().contains(EnvFlags::NO_TLS)
    }

    /// Flags the environment was opened with.
    #[must_use]
    pub fn flags(&self) -> EnvFlags {
        self.shared.flags()
    }

    /// Returns environment information.
    ///
    /// # Errors
    ///
    /// Returns an error if the environment is closed or the native call fails.
    pub fn info(&self) -> CoreResult<EnvInfo> {
        Ok(self.shared.native()?.info()?)
    }

    /// Returns statistics for the unnamed database.
    ///
    /// # Errors
    ///
    /// Returns an error if the environment is closed or the native call fails.
    pub fn stat(&self) -> CoreResult<Stat> {
        Ok(self.shared.native()?.stat()?)
    }

    // ========================================================================
    // Databases
    // ========================================================================

    /// Opens a typed database. `None` opens the unnamed database.
    ///
    /// The native database flags follow the serializers: integer keys for
    /// integer key serializers and, with `dup_sort`, fixed-size and integer
    /// duplicates for fixed-width value serializers.
    ///
    /// The database is opened in a transaction of its own, which commits
    /// before any other thread may open a database.
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` if the calling thread already has a transaction
    /// open, or an error if the environment is closed or the native open
    /// fails.
    pub fn open_database<K, V>(
        &self,
        name: Option<&str>,
        key_serializer: K,
        value_serializer: V,
        options: DbOptions,
    ) -> CoreResult<Database<K, V>>
    where
        K: Serializer,
        V: Serializer,
    {
        let create = options.create && !self.is_read_only();
        let flags = Database::<K, V>::native_flags(&key_serializer, &value_serializer, options, create);

        let txn = if self.is_read_only() {
            self.with_read_only_txn()?
        } else {
            self.with_read_write_txn()?
        };
        if !txn.owns_txn() {
            return Err(CoreError::illegal_state(
                "open_database cannot run inside an open transaction",
            ));
        }

        let guard = self.shared.dbi_lock().lock();
        let dbi = match txn.with_native(|native| Ok(native.open_db(name, flags)?)) {
            Ok(dbi) => txn.commit().map(|()| dbi),
            Err(e) => {
                drop(txn);
                Err(e)
            }
        };
        drop(guard);
        let dbi = dbi?;

        debug!(name = name.unwrap_or("<main>"), dbi = dbi.raw(), "opened database");
        Ok(Database::new(
            Arc::clone(&self.shared),
            dbi,
            key_serializer,
            value_serializer,
        ))
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("path", &self.path)
            .field("read_only", &self.is_read_only())
            .field("temporary", &self.temporary)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Drop for Environment {
    fn drop(&mut self) {
        self.close();
    }
}
