//! Command implementations for the reltrain CLI.
//!
//! Submodules:
//! - `status`: last applied release/version per target
//! - `apply`: apply outstanding changes to a group
//! - `init`: create the audit table
//! - `backfill`: synthesize audit history for adopted databases

mod apply;
mod backfill;
mod init;
mod status;

pub use apply::apply_changes;
pub use backfill::backfill_history;
pub use init::init_audit_table;
pub use status::show_status;

use std::path::Path;

use anyhow::Context;
use colored::*;

use reltrain_core::config::DatabaseGroup;
use reltrain_core::engine::{TargetOutcome, TargetReport};
use reltrain_core::{Catalog, Config, Engine};
use reltrain_pg::PgConnector;

/// Loaded configuration plus the catalog built from its script directory.
///
/// Both are plain values; `reload` in the shell builds a fresh `App` and
/// swaps it in, so nothing is mutated under a running command.
pub struct App {
    pub config: Config,
    pub catalog: Catalog,
}

impl App {
    pub fn load(config_path: &Path) -> anyhow::Result<Self> {
        let config = Config::load(config_path)
            .with_context(|| format!("error reading config file {}", config_path.display()))?;
        let catalog = Catalog::load(&config.script_dir)
            .with_context(|| format!("error reading release files in {}", config.script_dir.display()))?;
        if catalog.is_empty() {
            println!(
                "{} no release files found in {}",
                "!".yellow(),
                config.script_dir.display().to_string().yellow()
            );
        }
        Ok(Self { config, catalog })
    }

    pub fn connector(&self) -> PgConnector {
        PgConnector::new(self.config.statement_timeout_secs)
    }

    pub fn engine<'a>(&'a self, connector: &'a PgConnector) -> Engine<'a> {
        Engine::new(
            &self.catalog,
            connector,
            self.config.audit_table.qualified(),
            &self.config.script_dir,
        )
    }

    pub fn group(&self, name: &str) -> anyhow::Result<&DatabaseGroup> {
        self.config
            .group(name)
            .ok_or_else(|| anyhow::anyhow!("database group \"{name}\" does not exist in the config"))
    }
}

/// Print one line per target.
pub fn print_reports(reports: &[TargetReport]) {
    for report in reports {
        match &report.outcome {
            TargetOutcome::Applied { release, versions } => {
                let list = versions
                    .iter()
                    .map(i32::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                println!(
                    "  {} {}: applied change(s) {} of release {}",
                    "✓".green(),
                    report.target.cyan(),
                    list.yellow(),
                    release.yellow()
                );
            }
            TargetOutcome::Skipped(reason) => {
                println!(
                    "  {} {}: skipped: {}",
                    "○".dimmed(),
                    report.target.cyan(),
                    reason
                );
            }
            TargetOutcome::Backfilled { rows } => {
                println!(
                    "  {} {}: backfilled {} audit row(s)",
                    "✓".green(),
                    report.target.cyan(),
                    rows
                );
            }
            TargetOutcome::Initialized => {
                println!(
                    "  {} {}: audit table ready",
                    "✓".green(),
                    report.target.cyan()
                );
            }
            TargetOutcome::Failed(failure) => {
                println!(
                    "  {} {}: {}",
                    "✗".red(),
                    report.target.cyan(),
                    failure.error.red()
                );
                if let (Some(release), Some(version)) = (&failure.release, failure.version) {
                    let description = match &failure.description {
                        Some(text) => format!(" ({text})"),
                        None => String::new(),
                    };
                    println!(
                        "    in change {} of release {}{}",
                        version.to_string().yellow(),
                        release.yellow(),
                        description.dimmed()
                    );
                }
                if let Some(sql) = &failure.sql {
                    println!("    {}", "offending SQL:".dimmed());
                    for line in sql.lines() {
                        println!("      {}", line.dimmed());
                    }
                }
            }
        }
    }
}
