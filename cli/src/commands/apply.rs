//! Apply outstanding changes to a database group.

use anyhow::Result;
use colored::*;

use super::{App, print_reports};

/// Apply changes to every target in `group`.
///
/// With no release named, the latest version of the latest release is the
/// goal. With a release, its latest version. With release and version, the
/// explicit pair; `force` re-executes exactly that version with no chain
/// check and no audit row.
pub async fn apply_changes(
    app: &App,
    group: &str,
    release: Option<&str>,
    version: Option<i32>,
    force: bool,
) -> Result<()> {
    let group = app.group(group)?;
    let connector = app.connector();
    let engine = app.engine(&connector);

    let reports = match (release, version) {
        (None, _) => {
            println!(
                "{} latest release to group {}",
                "Applying:".cyan().bold(),
                group.name.yellow()
            );
            engine.apply_latest(group).await?
        }
        (Some(release), None) => {
            println!(
                "{} release {} to group {}",
                "Applying:".cyan().bold(),
                release.yellow(),
                group.name.yellow()
            );
            engine.apply_release(group, release).await?
        }
        (Some(release), Some(version)) => {
            println!(
                "{} release {} change {} to group {}{}",
                "Applying:".cyan().bold(),
                release.yellow(),
                version.to_string().yellow(),
                group.name.yellow(),
                if force { " (forced)".red().to_string() } else { String::new() }
            );
            engine.apply_up_to(group, release, version, force).await?
        }
    };

    print_reports(&reports);
    Ok(())
}
