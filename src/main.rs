//! # Tablemend CLI (`tablemend`)
//!
//! ## Usage
//!
//! ```bash
//! tablemend --config ./config/tablemend.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `tablemend check` | Show missing columns/indexes and pending SQL (read-only) |
//! | `tablemend reconcile` | Add missing columns and indexes |
//! | `tablemend dedup` | Remove duplicate records, keeping the newest |
//! | `tablemend bootstrap` | `reconcile` every table, then `dedup` every rule |
//!
//! Logging goes to stderr and is controlled by `RUST_LOG`
//! (default `warn`, or `debug` with `--verbose`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use tablemend::{bootstrap, check, config, dedup_cmd, reconcile_cmd};

/// Tablemend: declarative schema reconciliation and duplicate cleanup.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/tablemend.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "tablemend",
    about = "Declarative schema reconciliation and duplicate cleanup for SQLite",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/tablemend.toml")]
    config: PathBuf,

    /// Log per-item progress to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report schema drift and preview duplicate cleanup.
    ///
    /// Opens the database read-only. Exits non-zero when any table is
    /// missing a column or index.
    Check {
        /// Only check this table.
        #[arg(long)]
        table: Option<String>,
    },

    /// Add missing columns and indexes.
    ///
    /// Existing columns and indexes are never altered or dropped, so this
    /// is safe to run repeatedly. Exits non-zero when any item failed.
    Reconcile {
        /// Only reconcile this table.
        #[arg(long)]
        table: Option<String>,

        /// Print the reports as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Collapse duplicate records to the newest one per business key.
    Dedup {
        /// Only run the rule for this table.
        #[arg(long)]
        table: Option<String>,

        /// Show what would be removed without deleting anything.
        #[arg(long)]
        dry_run: bool,

        /// Print the reports as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Reconcile every configured table, then run every dedup rule.
    Bootstrap {
        /// Print the combined report as JSON.
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Check { table } => {
            check::run_check(&cfg, table.as_deref()).await?;
        }
        Commands::Reconcile { table, json } => {
            reconcile_cmd::run_reconcile(&cfg, table.as_deref(), json).await?;
        }
        Commands::Dedup {
            table,
            dry_run,
            json,
        } => {
            dedup_cmd::run_dedup(&cfg, table.as_deref(), dry_run, json).await?;
        }
        Commands::Bootstrap { json } => {
            bootstrap::run_bootstrap(&cfg, json).await?;
        }
    }

    Ok(())
}
