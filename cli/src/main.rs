//! reltrain: chained-release database migrations.
//!
//! Releases are TOML files linked by `previous` into a single chain; each
//! target database records what it has applied in an audit table. The CLI
//! applies outstanding changes transactionally per target.

mod commands;
#[cfg(feature = "repl")]
mod shell;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::App;
use reltrain_core::config::DEFAULT_GROUP;

#[derive(Parser)]
#[command(name = "reltrain", version, about = "Chained-release database migrations")]
struct Cli {
    /// Path to the operator config file.
    #[arg(
        long,
        env = "RELTRAIN_CONFIG",
        default_value = "reltrain.toml",
        global = true
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the last applied release/version for every target in a group.
    Status {
        group: String,
        /// Emit machine-readable JSON instead of the human report.
        #[arg(long)]
        json: bool,
    },
    /// Apply outstanding changes to a group.
    Apply {
        #[arg(default_value = DEFAULT_GROUP)]
        group: String,
        /// Release to apply; defaults to the latest in the chain.
        release: Option<String>,
        /// Change version to stop at; defaults to the release's latest.
        version: Option<i32>,
        /// Re-execute exactly VERSION: no chain check, no audit row.
        #[arg(long, requires = "version")]
        force: bool,
    },
    /// Create the audit table on every target in a group.
    Init { group: String },
    /// Insert audit history up to (release, version) without running SQL.
    Backfill {
        group: String,
        release: String,
        version: i32,
    },
    /// Interactive shell with history and config reload.
    #[cfg(feature = "repl")]
    Shell,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Status { group, json } => {
            let app = App::load(&cli.config)?;
            commands::show_status(&app, &group, json).await
        }
        Command::Apply {
            group,
            release,
            version,
            force,
        } => {
            let app = App::load(&cli.config)?;
            commands::apply_changes(&app, &group, release.as_deref(), version, force).await
        }
        Command::Init { group } => {
            let app = App::load(&cli.config)?;
            commands::init_audit_table(&app, &group).await
        }
        Command::Backfill {
            group,
            release,
            version,
        } => {
            let app = App::load(&cli.config)?;
            commands::backfill_history(&app, &group, &release, version).await
        }
        #[cfg(feature = "repl")]
        Command::Shell => shell::run(&cli.config).await,
    }
}
