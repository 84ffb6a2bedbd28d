//! Interactive shell: line history, reload, and the compact command
//! grammar `GROUP [RELEASE [VERSION [-force]]]`.

use std::path::Path;

use colored::*;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use crate::commands::{self, App};
use reltrain_core::config::DEFAULT_GROUP;

const HELP: &str = r#"
>> GROUP RELEASE VERSION
   Apply changes up to VERSION of RELEASE to the targets in GROUP.
>> GROUP RELEASE
   Apply all the latest changes of RELEASE to the targets in GROUP.
>> GROUP
   Apply all the latest changes of the latest release to GROUP.
>> ENTER (empty line)
   Same, for the "DEFAULT" group.
>> GROUP RELEASE VERSION -force
   Re-execute exactly VERSION, skipping the chain check and the audit row.
>> status GROUP
   Show the current status of the targets in GROUP.
>> init GROUP
   Create the audit table on the targets in GROUP.
>> backfill GROUP RELEASE VERSION
   Insert audit history up to VERSION of RELEASE without executing SQL.
>> reload
   Reload the config file and all release files.
>> q
   Quit.
"#;

pub async fn run(config_path: &Path) -> anyhow::Result<()> {
    let mut app = App::load(config_path)?;
    greet(&app);

    let mut editor = DefaultEditor::new()?;
    loop {
        let line = match editor.readline("reltrain> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        let line = line.trim().to_string();
        if !line.is_empty() {
            let _ = editor.add_history_entry(line.as_str());
        }

        match dispatch(&mut app, config_path, &line).await {
            Ok(true) => break,
            Ok(false) => {}
            // Domain errors are recoverable here: report and re-prompt.
            Err(e) => println!("{} {e:#}", "error:".red()),
        }
    }
    Ok(())
}

fn greet(app: &App) {
    if let (Some(_), Some(latest)) = (app.config.default_group(), app.catalog.latest()) {
        println!(
            "Press ENTER to apply the latest changes (up to change {} of release {}) to the \"{}\" group.",
            latest.last_version.to_string().yellow(),
            latest.name.yellow(),
            DEFAULT_GROUP
        );
    }
    println!("Type {} to quit, {} for help.", "q".cyan(), "help".cyan());
}

/// Returns true when the operator asked to quit.
async fn dispatch(app: &mut App, config_path: &Path, line: &str) -> anyhow::Result<bool> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    match parts.as_slice() {
        [] => {
            if app.config.default_group().is_some() {
                commands::apply_changes(app, DEFAULT_GROUP, None, None, false).await?;
            } else {
                println!("{}", "no DEFAULT group is configured".yellow());
            }
        }
        ["q"] | ["quit"] | ["exit"] => return Ok(true),
        ["help"] => println!("{HELP}"),
        ["reload"] => {
            *app = App::load(config_path)?;
            println!("{}", "all configurations have been reloaded".green());
        }
        ["status", group] => commands::show_status(app, group, false).await?,
        ["init", group] => commands::init_audit_table(app, group).await?,
        ["backfill", group, release, version] => {
            let version = parse_version(version)?;
            commands::backfill_history(app, group, release, version).await?;
        }
        [group] => commands::apply_changes(app, group, None, None, false).await?,
        [group, release] => commands::apply_changes(app, group, Some(release), None, false).await?,
        [group, release, version] => {
            let version = parse_version(version)?;
            commands::apply_changes(app, group, Some(release), Some(version), false).await?;
        }
        [group, release, version, "-force"] => {
            let version = parse_version(version)?;
            commands::apply_changes(app, group, Some(release), Some(version), true).await?;
        }
        _ => println!("{}", "incorrect command; type \"help\" for usage".yellow()),
    }
    Ok(false)
}

fn parse_version(text: &str) -> anyhow::Result<i32> {
    text.parse()
        .map_err(|_| anyhow::anyhow!("\"{text}\" is not a change version number"))
}
