//! txmdb CLI
//!
//! Command-line tools for LMDB environments managed through txmdb.
//!
//! # Commands
//!
//! - `info` - Display environment flags, map usage and B-tree statistics
//! - `sync` - Flush buffered data to disk
//! - `get` - Read a string value from the unnamed database
//! - `put` - Write a string value to the unnamed database

mod commands;

use clap::{Parser, Subcommand};
use commands::{CliError, OutputFormat};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// txmdb command-line environment tools.
#[derive(Parser)]
#[command(name = "txmdb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the environment directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Open the environment read-only
    #[arg(global = true, short, long)]
    read_only: bool,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display environment flags, map usage and statistics
    Info {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Flush buffered data to disk
    Sync {
        /// Flush even if the environment was opened without sync
        #[arg(long)]
        force: bool,
    },

    /// Print the value stored under KEY
    Get {
        /// Key to look up
        key: String,
    },

    /// Store VALUE under KEY
    Put {
        /// Key to write
        key: String,
        /// Value to store
        value: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let read_only = cli.read_only;
    let path = |command: &'static str| cli.path.clone().ok_or(CliError::MissingPath { command });

    match cli.command {
        Commands::Info { format } => {
            commands::info::run(&path("info")?, read_only, format)?;
        }
        Commands::Sync { force } => {
            commands::sync::run(&path("sync")?, read_only, force)?;
        }
        Commands::Get { ref key } => {
            commands::get::run(&path("get")?, read_only, key)?;
        }
        Commands::Put { ref key, ref value } => {
            commands::put::run(&path("put")?, read_only, key, value)?;
        }
        Commands::Version => {
            println!("txmdb CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("txmdb Core v{}", txmdb_core::VERSION);
        }
    }

    Ok(())
}
