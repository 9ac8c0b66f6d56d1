//! Environment and database configuration.

use txmdb_storage::{EnvFlags, EnvOptions};

/// Default maximum size of the memory map (1 TiB).
pub const DEFAULT_MAP_SIZE: u64 = 1 << 40;

/// Default maximum number of concurrent readers.
pub const DEFAULT_MAX_READERS: u32 = 4096;

/// Configuration for opening an environment.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    /// Open the environment read-only.
    pub read_only: bool,

    /// Maximum size of the memory map in bytes.
    pub map_size: u64,

    /// Maximum number of named databases (0 = only the unnamed database).
    pub max_dbs: u32,

    /// Maximum number of concurrent reader slots.
    pub max_readers: u32,

    /// Extra native open flags.
    pub flags: EnvFlags,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            read_only: false,
            map_size: DEFAULT_MAP_SIZE,
            max_dbs: 0,
            max_readers: DEFAULT_MAX_READERS,
            flags: EnvFlags::EMPTY,
        }
    }
}

impl EnvConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether the environment is read-only.
    #[must_use]
    pub const fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }

    /// Sets the maximum map size.
    #[must_use]
    pub const fn map_size(mut self, size: u64) -> Self {
        self.map_size = size;
        self
    }

    /// Sets the maximum number of named databases.
    #[must_use]
    pub const fn max_dbs(mut self, count: u32) -> Self {
        self.max_dbs = count;
        self
    }

    /// Sets the maximum number of reader slots.
    #[must_use]
    pub const fn max_readers(mut self, count: u32) -> Self {
        self.max_readers = count;
        self
    }

    /// Replaces the extra native flags.
    #[must_use]
    pub const fn flags(mut self, flags: EnvFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Adds native flags to the ones already set.
    #[must_use]
    pub const fn with_flags(mut self, flags: EnvFlags) -> Self {
        self.flags = self.flags.union(flags);
        self
    }

    /// Native options for `mdb_env_open`, with `extra` flags added.
    pub(crate) fn native_options(&self, extra: EnvFlags) -> EnvOptions {
        let mut flags = self.flags.union(extra);
        if self.read_only {
            flags |= EnvFlags::READ_ONLY;
        }
        EnvOptions {
            map_size: self.map_size,
            max_readers: self.max_readers,
            max_dbs: self.max_dbs,
            flags,
        }
    }
}

/// Options for opening a typed database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbOptions {
    /// Create the database if it doesn't exist. Ignored on read-only
    /// environments.
    pub create: bool,

    /// Allow several values per key.
    pub dup_sort: bool,
}

impl Default for DbOptions {
    fn default() -> Self {
        Self {
            create: true,
            dup_sort: false,
        }
    }
}

impl DbOptions {
    /// Creates options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the database if missing.
    #[must_use]
    pub const fn create(mut self, value: bool) -> Self {
        self.create = value;
        self
    }

    /// Sets whether duplicate keys are allowed.
    #[must_use]
    pub const fn dup_sort(mut self, value: bool) -> Self {
        self.dup_sort = value;
        self
    }
}
