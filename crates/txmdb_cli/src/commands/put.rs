//! Put command implementation.

use super::{open_env, CliError};
use std::path::Path;
use txmdb_codec::STRING;
use txmdb_core::{CoreResult, DbOptions, Environment};

/// Stores `value` under `key` in the unnamed database and commits.
pub fn store(env: &Environment, key: &str, value: &str) -> CoreResult<()> {
    let db = env.open_database(None, STRING, STRING, DbOptions::default())?;
    let txn = env.with_read_write_txn()?;
    db.put(&txn, &key.to_string(), &value.to_string())?;
    txn.commit()
}

/// Runs the put command.
pub fn run(
    path: &Path,
    read_only: bool,
    key: &str,
    value: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if read_only {
        return Err(CliError::ReadOnly { command: "put" }.into());
    }
    let env = open_env(path, false)?;
    store(&env, key, value)?;
    tracing::debug!(key, bytes = value.len(), "stored value");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        run(dir.path(), false, "k", "one").unwrap();
        run(dir.path(), false, "k", "two").unwrap();

        let env = open_env(dir.path(), true).unwrap();
        assert_eq!(
            super::super::get::lookup(&env, "k").unwrap(),
            Some("two".to_string())
        );
    }

    #[test]
    fn put_refuses_read_only() {
        let dir = tempfile::tempdir().unwrap();
        assert!(run(dir.path(), true, "k", "v").is_err());
    }
}
