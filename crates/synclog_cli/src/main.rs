//! Synclog CLI
//!
//! Command-line tools for a file-backed sync log.
//!
//! # Commands
//!
//! - `list` - Print queued requests in replay order
//! - `show` - Print one queued request as JSON
//! - `remove` - Drop a queued request and its ledger rows
//! - `undo` / `redo` - Apply a request's ledger rows to local stores
//! - `replay` - Send the queue to the server
//! - `compact` - Rewrite store logs with live rows only

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use synclog_engine::LedgerDirection;
use tracing_subscriber::EnvFilter;

/// Synclog command-line queue tools.
#[derive(Parser)]
#[command(name = "synclog")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory
    #[arg(global = true, short, long)]
    store: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print queued requests in replay order
    List {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print one queued request as JSON
    Show {
        /// Request id
        request_id: String,
    },

    /// Remove a queued request and its ledger rows
    Remove {
        /// Request id
        request_id: String,
    },

    /// Restore local values from before a request was queued
    Undo {
        /// Request id
        request_id: String,
    },

    /// Re-apply the local values written with a request
    Redo {
        /// Request id
        request_id: String,
    },

    /// Replay the queue against the server
    Replay {
        /// Regex of URLs to check before replay, or "disabled"
        #[arg(long, default_value = "disabled")]
        preflight: String,

        /// Preflight timeout in milliseconds
        #[arg(long, default_value = "60000")]
        preflight_timeout_ms: u64,
    },

    /// Compact store logs to reclaim space
    Compact,

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::List { format } => {
            let store = cli.store.ok_or("Store path required for list")?;
            commands::list::run(&store, &format).await?;
        }
        Commands::Show { request_id } => {
            let store = cli.store.ok_or("Store path required for show")?;
            commands::show::run(&store, &request_id).await?;
        }
        Commands::Remove { request_id } => {
            let store = cli.store.ok_or("Store path required for remove")?;
            commands::remove::run(&store, &request_id).await?;
        }
        Commands::Undo { request_id } => {
            let store = cli.store.ok_or("Store path required for undo")?;
            commands::ledger::run(&store, &request_id, LedgerDirection::Undo).await?;
        }
        Commands::Redo { request_id } => {
            let store = cli.store.ok_or("Store path required for redo")?;
            commands::ledger::run(&store, &request_id, LedgerDirection::Redo).await?;
        }
        Commands::Replay {
            preflight,
            preflight_timeout_ms,
        } => {
            let store = cli.store.ok_or("Store path required for replay")?;
            commands::replay::run(&store, &preflight, preflight_timeout_ms).await?;
        }
        Commands::Compact => {
            let store = cli.store.ok_or("Store path required for compact")?;
            commands::compact::run(&store).await?;
        }
        Commands::Version => {
            println!("Synclog CLI v{}", env!("CARGO_PKG_VERSION"));
            println!(
                "Default stores: {}, {}",
                synclog_engine::DEFAULT_SYNC_LOG_STORE,
                synclog_engine::DEFAULT_UNDO_REDO_STORE
            );
        }
    }

    Ok(())
}
