//! # txmdb Storage
//!
//! Thin, owning wrappers over the native LMDB environment, transaction and
//! database handles.
//!
//! This crate is the only place in txmdb that talks to the C library. It
//! does not know about threads, registries or nesting rules; those live in
//! `txmdb_core`. What it does guarantee:
//!
//! - A [`NativeEnv`] is reference counted and every [`NativeTxn`] holds a
//!   reference to it, so `mdb_env_close` never runs while a transaction is
//!   still alive.
//! - A [`NativeTxn`] is aborted when dropped unless it was committed or reset.
//! - A reset read-only transaction ([`ResetReader`]) can be renewed instead of
//!   allocating a new native transaction.
//!
//! ## Example
//!
//! ```no_run
//! use txmdb_storage::{DbFlags, EnvFlags, EnvOptions, NativeEnv};
//! use std::path::Path;
//!
//! let env = NativeEnv::open(Path::new("data"), &EnvOptions::default()).unwrap();
//! let mut txn = env.begin_txn(false).unwrap();
//! let db = txn.open_db(None, DbFlags::EMPTY).unwrap();
//! txn.put(db, b"key", b"value").unwrap();
//! txn.commit().unwrap();
//! ```

#![warn(missing_docs)]

mod db;
mod env;
mod error;
mod txn;

pub use db::{DbFlags, Dbi};
pub use env::{EnvFlags, EnvInfo, EnvOptions, NativeEnv, Stat};
pub use error::{StorageError, StorageResult};
pub use txn::{NativeTxn, ResetReader};
