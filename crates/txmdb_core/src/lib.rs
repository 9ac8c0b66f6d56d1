//! # txmdb Core
//!
//! Thread-aware transaction management over LMDB.
//!
//! LMDB transactions are single-threaded, fixed to read-only or read-write
//! when they begin, and limited to one per thread. This crate wraps them in:
//!
//! - a reusable per-thread transaction handle that is begun, finished and
//!   begun again instead of being recreated
//! - a registry of every thread's handle, so closing the [`Environment`]
//!   aborts whatever is still open anywhere
//! - six accessors ([`Environment::with_read_only_txn`] and friends) that
//!   hand out [`Txn`] scopes with well-defined ownership
//! - explicit hand-off of a handle to another thread ([`DetachedTxn`])
//! - typed [`Database`]s that move values through `txmdb_codec` serializers
//!
//! ```rust,no_run
//! use txmdb_codec::{INT, STRING};
//! use txmdb_core::{DbOptions, EnvConfig, Environment};
//!
//! let env = Environment::open_temporary_with_config(EnvConfig::new().max_dbs(4))?;
//! let users = env.open_database(Some("users"), INT, STRING, DbOptions::default())?;
//!
//! let txn = env.with_read_write_txn()?;
//! users.put(&txn, &1, &"ada".to_string())?;
//! txn.commit()?;
//! # Ok::<(), txmdb_core::CoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod accessor;
mod config;
mod database;
mod detached;
mod env;
mod error;
mod registry;
mod txn;

pub use accessor::Txn;
pub use config::{DbOptions, EnvConfig, DEFAULT_MAP_SIZE, DEFAULT_MAX_READERS};
pub use database::Database;
pub use detached::DetachedTxn;
pub use env::Environment;
pub use error::{CoreError, CoreResult};
pub use txn::{TxnKind, TxnState};
pub use txmdb_storage::{EnvFlags, EnvInfo, Stat};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
