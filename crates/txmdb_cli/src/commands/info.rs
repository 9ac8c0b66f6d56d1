//! Info command implementation.

use super::{open_env, OutputFormat};
use serde::Serialize;
use std::path::Path;
use txmdb_core::{CoreResult, EnvFlags, Environment};

const FLAG_NAMES: [(EnvFlags, &str); 10] = [
    (EnvFlags::NO_SUBDIR, "NO_SUBDIR"),
    (EnvFlags::NO_SYNC, "NO_SYNC"),
    (EnvFlags::READ_ONLY, "READ_ONLY"),
    (EnvFlags::NO_META_SYNC, "NO_META_SYNC"),
    (EnvFlags::WRITE_MAP, "WRITE_MAP"),
    (EnvFlags::MAP_ASYNC, "MAP_ASYNC"),
    (EnvFlags::NO_TLS, "NO_TLS"),
    (EnvFlags::NO_LOCK, "NO_LOCK"),
    (EnvFlags::NO_READAHEAD, "NO_READAHEAD"),
    (EnvFlags::NO_MEM_INIT, "NO_MEM_INIT"),
];

/// Environment inspection result.
#[derive(Debug, Serialize)]
pub struct InfoResult {
    /// Environment path.
    pub path: String,
    /// Whether the environment was opened read-only.
    pub read_only: bool,
    /// Whether transactions are tied to their threads.
    pub thread_local_txns: bool,
    /// Names of the flags the environment is open with.
    pub flags: Vec<&'static str>,
    /// Size of the memory map in bytes.
    pub map_size: u64,
    /// Bytes of the map in use.
    pub used_bytes: u64,
    /// ID of the last committed transaction.
    pub last_txn_id: u64,
    /// Maximum number of reader slots.
    pub max_readers: u32,
    /// Reader slots in use.
    pub num_readers: u32,
    /// Page size in bytes.
    pub page_size: u32,
    /// Depth of the main B-tree.
    pub depth: u32,
    /// Branch, leaf and overflow pages of the main B-tree.
    pub pages: u64,
    /// Entries in the unnamed database.
    pub entries: u64,
}

/// Names of every flag set in `flags`.
pub fn flag_names(flags: EnvFlags) -> Vec<&'static str> {
    FLAG_NAMES
        .iter()
        .filter(|(flag, _)| flags.contains(*flag))
        .map(|(_, name)| *name)
        .collect()
}

/// Gathers the inspection result for an open environment.
pub fn collect(env: &Environment) -> CoreResult<InfoResult> {
    let info = env.info()?;
    let stat = env.stat()?;
    Ok(InfoResult {
        path: env.path().display().to_string(),
        read_only: env.is_read_only(),
        thread_local_txns: env.is_thread_local_txns(),
        flags: flag_names(env.flags()),
        map_size: info.map_size,
        used_bytes: (info.last_page + 1) * u64::from(stat.page_size),
        last_txn_id: info.last_txn_id,
        max_readers: info.max_readers,
        num_readers: info.num_readers,
        page_size: stat.page_size,
        depth: stat.depth,
        pages: stat.branch_pages + stat.leaf_pages + stat.overflow_pages,
        entries: stat.entries,
    })
}

/// Runs the info command.
pub fn run(path: &Path, read_only: bool, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let env = open_env(path, read_only)?;
    let result = collect(&env)?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        OutputFormat::Text => print_text_output(&result),
    }

    Ok(())
}

fn print_text_output(result: &InfoResult) {
    println!("Environment: {}", result.path);
    println!();
    println!("Mode:          {}", if result.read_only { "read-only" } else { "read-write" });
    println!("Thread-local:  {}", result.thread_local_txns);
    if result.flags.is_empty() {
        println!("Flags:         (none)");
    } else {
        println!("Flags:         {}", result.flags.join(" | "));
    }
    println!();
    println!("Map size:      {} bytes", result.map_size);
    println!("Used:          {} bytes", result.used_bytes);
    println!("Last txn:      {}", result.last_txn_id);
    println!("Readers:       {}/{}", result.num_readers, result.max_readers);
    println!();
    println!("Page size:     {} bytes", result.page_size);
    println!("Depth:         {}", result.depth);
    println!("Pages:         {}", result.pages);
    println!("Entries:       {}", result.entries);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_names_lists_set_flags() {
        assert!(flag_names(EnvFlags::EMPTY).is_empty());
        assert_eq!(
            flag_names(EnvFlags::NO_TLS | EnvFlags::NO_SYNC),
            vec!["NO_SYNC", "NO_TLS"]
        );
    }

    #[test]
    fn collect_reports_entries() {
        let dir = tempfile::tempdir().unwrap();
        super::super::put::run(dir.path(), false, "k", "v").unwrap();

        let env = open_env(dir.path(), true).unwrap();
        let result = collect(&env).unwrap();
        assert!(result.read_only);
        assert!(result.flags.contains(&"READ_ONLY"));
        assert_eq!(result.entries, 1);
        assert!(result.used_bytes >= u64::from(result.page_size));

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["entries"], 1);
    }
}
