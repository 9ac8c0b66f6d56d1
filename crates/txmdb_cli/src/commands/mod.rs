//! CLI command implementations.

pub mod get;
pub mod info;
pub mod put;
pub mod sync;

use std::fs;
use std::path::Path;
use thiserror::Error;
use txmdb_core::{CoreResult, EnvConfig, Environment};

/// Errors raised by the CLI itself rather than the environment.
#[derive(Debug, Error)]
pub enum CliError {
    /// The command needs `--path`.
    #[error("environment path required for {command}")]
    MissingPath {
        /// Command that was run.
        command: &'static str,
    },

    /// A write was requested on a read-only environment.
    #[error("{command} cannot run with --read-only")]
    ReadOnly {
        /// Command that was run.
        command: &'static str,
    },

    /// The key has no value.
    #[error("key not found: {key}")]
    KeyNotFound {
        /// The missing key.
        key: String,
    },
}

/// Output format for reporting commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// Opens the environment at `path`, creating the directory for writers.
pub fn open_env(path: &Path, read_only: bool) -> CoreResult<Environment> {
    if !read_only {
        fs::create_dir_all(path)?;
    }
    tracing::debug!(path = %path.display(), read_only, "opening environment");
    Environment::open_with_config(path, EnvConfig::new().read_only(read_only))
}
