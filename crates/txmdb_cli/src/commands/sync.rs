//! Sync command implementation.

use super::{open_env, CliError};
use std::path::Path;

/// Runs the sync command.
pub fn run(path: &Path, read_only: bool, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    if read_only {
        return Err(CliError::ReadOnly { command: "sync" }.into());
    }
    let env = open_env(path, false)?;
    env.sync(force)?;
    println!("Synced {:?}{}", path, if force { " (forced)" } else { "" });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_fresh_environment() {
        let dir = tempfile::tempdir().unwrap();
        run(dir.path(), false, true).unwrap();
        assert!(dir.path().join("data.mdb").exists());
    }

    #[test]
    fn sync_refuses_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let err = run(dir.path(), true, false).unwrap_err();
        assert!(err.to_string().contains("--read-only"));
    }
}
