//! Operator configuration: database groups, targets, and engine settings.
//!
//! The config file is TOML. Targets carry a connection URL and optional
//! literal text replacements applied to every SQL fragment before it runs,
//! which is how per-environment names (schemas, tablespaces) get injected.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;

/// Group name the bare `apply` invocation falls back to.
pub const DEFAULT_GROUP: &str = "DEFAULT";

fn default_statement_timeout() -> u64 {
    600
}

/// Root of the operator config file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Directory holding release declarations and referenced SQL scripts.
    /// Relative paths are resolved against the config file location.
    pub script_dir: PathBuf,
    /// Per-statement execution timeout, seconds.
    #[serde(default = "default_statement_timeout")]
    pub statement_timeout_secs: u64,
    pub audit_table: AuditTable,
    #[serde(rename = "group", default)]
    pub groups: Vec<DatabaseGroup>,
}

/// Where the execution history lives; one table shared by every target.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditTable {
    pub schema: String,
    pub table: String,
}

impl AuditTable {
    /// Schema-qualified table name as it appears in SQL.
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }
}

/// A named set of targets that receive the same changes.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseGroup {
    pub name: String,
    #[serde(rename = "target", default)]
    pub targets: Vec<DatabaseTarget>,
}

/// One database instance changes are applied to.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseTarget {
    pub name: String,
    pub url: String,
    #[serde(rename = "replace", default)]
    pub replacements: Vec<Replacement>,
}

impl DatabaseTarget {
    /// Apply this target's literal text replacements, in declared order.
    pub fn apply_replacements(&self, sql: &str) -> String {
        let mut sql = sql.to_string();
        for replacement in &self.replacements {
            sql = sql.replace(&replacement.text, &replacement.with);
        }
        sql
    }
}

/// A literal substitution rule: every occurrence of `text` becomes `with`.
#[derive(Debug, Clone, Deserialize)]
pub struct Replacement {
    pub text: String,
    pub with: String,
}

impl Config {
    /// Load and validate the config file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;

        if config.script_dir.is_relative() {
            if let Some(base) = path.parent() {
                config.script_dir = base.join(&config.script_dir);
            }
        }
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.script_dir.as_os_str().is_empty() {
            return Err(ConfigError::MissingScriptDir);
        }
        if self.audit_table.schema.is_empty() || self.audit_table.table.is_empty() {
            return Err(ConfigError::MissingAuditTable);
        }
        if self.groups.is_empty() {
            return Err(ConfigError::NoGroups);
        }
        for group in &self.groups {
            if group.targets.is_empty() {
                return Err(ConfigError::EmptyGroup {
                    group: group.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Look up a group by name.
    pub fn group(&self, name: &str) -> Option<&DatabaseGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// The `DEFAULT` group, if configured.
    pub fn default_group(&self) -> Option<&DatabaseGroup> {
        self.group(DEFAULT_GROUP)
    }
}
