//! Migration status per target.

use anyhow::Result;
use colored::*;

use super::App;

/// Show the last applied release/version for every target in the group.
pub async fn show_status(app: &App, group: &str, json: bool) -> Result<()> {
    let group = app.group(group)?;
    let connector = app.connector();
    let engine = app.engine(&connector);

    let rows = engine.status(group).await;
    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!("{} {}", "Database status:".cyan().bold(), group.name.yellow());
    for row in &rows {
        match (&row.state, &row.error) {
            (Some(state), _) => {
                println!("  {} {}: {}", "✓".green(), row.target.cyan(), state);
                if !state.unknown_releases.is_empty() {
                    println!(
                        "    {} audit history references unknown release(s): {}",
                        "!".yellow(),
                        state.unknown_releases.join(", ").yellow()
                    );
                }
            }
            (None, Some(error)) => {
                println!("  {} {}: {}", "✗".red(), row.target.cyan(), error.red());
            }
            (None, None) => {}
        }
    }
    Ok(())
}
