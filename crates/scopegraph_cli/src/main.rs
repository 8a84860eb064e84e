//! ScopeGraph CLI
//!
//! Maintenance tools for ScopeGraph directories.
//!
//! # Commands
//!
//! - `inspect` - Display commit log and keyspace statistics
//! - `verify` - Verify log checksums and edge symmetry
//! - `compact` - Rewrite the commit log to reclaim space
//! - `reindex` - Rebuild every index and write a fresh snapshot

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// ScopeGraph command-line maintenance tools.
#[derive(Parser)]
#[command(name = "scopegraph")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the graph directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display commit log and keyspace statistics
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Verify log checksums, edge symmetry and dangling references
    Verify,

    /// Rewrite the commit log as a single record
    Compact {
        /// Dry run - show what would be done
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Rebuild every index from the graph and write a fresh snapshot
    Reindex,

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Graph path required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Graph path required for verify")?;
            commands::verify::run(&path)?;
        }
        Commands::Compact { dry_run } => {
            let path = cli.path.ok_or("Graph path required for compact")?;
            commands::compact::run(&path, dry_run)?;
        }
        Commands::Reindex => {
            let path = cli.path.ok_or("Graph path required for reindex")?;
            commands::reindex::run(&path)?;
        }
        Commands::Version => {
            println!("ScopeGraph CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("ScopeGraph Core v{}", scopegraph_core::VERSION);
        }
    }

    Ok(())
}
