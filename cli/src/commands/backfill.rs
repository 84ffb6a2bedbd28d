//! Backfill audit history for adopted databases.

use anyhow::Result;
use colored::*;

use super::{App, print_reports};

/// Insert audit rows up to (release, version) without executing any SQL.
///
/// Used when adopting reltrain on a database that already has the schema:
/// the operator declares how far the schema is, and future applies resume
/// from that point. Refused per target if any history exists.
pub async fn backfill_history(app: &App, group: &str, release: &str, version: i32) -> Result<()> {
    let group = app.group(group)?;
    let connector = app.connector();
    let engine = app.engine(&connector);

    println!(
        "{} audit history up to release {} change {} in group {}",
        "Backfilling:".cyan().bold(),
        release.yellow(),
        version.to_string().yellow(),
        group.name.yellow()
    );
    let reports = engine.backfill(group, release, version).await?;
    print_reports(&reports);
    Ok(())
}
