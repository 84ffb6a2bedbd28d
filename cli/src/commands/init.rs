//! Audit table initialization.

use anyhow::Result;
use colored::*;

use super::{App, print_reports};

/// Create the audit table on every target in the group (idempotent).
pub async fn init_audit_table(app: &App, group: &str) -> Result<()> {
    let group = app.group(group)?;
    let connector = app.connector();
    let engine = app.engine(&connector);

    println!(
        "{} audit table {} in group {}",
        "Initializing:".cyan().bold(),
        app.config.audit_table.qualified().yellow(),
        group.name.yellow()
    );
    let reports = engine.init(group).await;
    print_reports(&reports);
    Ok(())
}
