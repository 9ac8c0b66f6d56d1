//! Get command implementation.

use super::{open_env, CliError};
use std::path::Path;
use txmdb_codec::STRING;
use txmdb_core::{CoreResult, DbOptions, Environment};

/// Reads `key` from the unnamed database.
pub fn lookup(env: &Environment, key: &str) -> CoreResult<Option<String>> {
    let db = env.open_database(None, STRING, STRING, DbOptions::default())?;
    let txn = env.with_read_only_txn()?;
    let value = db.get(&txn, &key.to_string())?;
    txn.commit()?;
    Ok(value)
}

/// Runs the get command.
pub fn run(path: &Path, read_only: bool, key: &str) -> Result<(), Box<dyn std::error::Error>> {
    let env = open_env(path, read_only)?;
    match lookup(&env, key)? {
        Some(value) => {
            println!("{value}");
            Ok(())
        }
        None => Err(CliError::KeyNotFound {
            key: key.to_string(),
        }
        .into()),
    }
}
