//! Error types for the reltrain core.
//!
//! Load-time problems (`CatalogError`, `ConfigError`) fail fast before any
//! database is touched. `EngineError` covers bad command arguments and is
//! recoverable at the command boundary. `DriverError` is what a backend
//! reports; per-target execution failures are carried in outcomes, not
//! bubbled as `Err`, so one broken target never aborts its siblings.

use std::path::PathBuf;

use thiserror::Error;

/// A release declaration set that cannot form a valid chain.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read release directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse release file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("release file {path} is missing the required release name")]
    MissingName { path: PathBuf },
    #[error("release \"{release}\" declares no changes; at least one is required")]
    EmptyChangeSet { release: String },
    #[error("release \"{release}\" is declared by more than one file")]
    DuplicateRelease { release: String },
    #[error("change versions in release \"{release}\" must start at 1 (found minimum {found})")]
    VersionsDoNotStartAtOne { release: String, found: i32 },
    #[error("release \"{release}\" declares change version {version} more than once")]
    DuplicateVersion { release: String, version: i32 },
    #[error("release \"{release}\" skips change version {missing}; versions must be contiguous")]
    VersionGap { release: String, missing: i32 },
    #[error("expected exactly one root release with no predecessor, found {found}")]
    NoRoot { found: usize },
    #[error("release \"{release}\" must have exactly one successor in the chain")]
    BrokenChain { release: String },
}

/// A config file that cannot describe a usable deployment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("no database group is defined in the config file")]
    NoGroups,
    #[error("database group \"{group}\" has no targets")]
    EmptyGroup { group: String },
    #[error("script_dir must not be empty")]
    MissingScriptDir,
    #[error("audit_table schema and table names must not be empty")]
    MissingAuditTable,
}

/// What a target-database driver can report back to the engine.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("sql execution failed: {0}")]
    Sql(String),
    #[error("audit table access failed: {0}")]
    Audit(String),
    #[error("statement timed out after {0} seconds")]
    Timeout(u64),
}

fn did_you_mean(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(name) => format!(" (did you mean \"{name}\"?)"),
        None => String::new(),
    }
}

/// Bad command arguments, caught before any connection is opened.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("release \"{release}\" does not exist in the loaded catalog{}", did_you_mean(.suggestion))]
    UnknownRelease {
        release: String,
        suggestion: Option<String>,
    },
    #[error("change version {version} does not exist in release \"{release}\"")]
    UnknownChangeVersion { release: String, version: i32 },
    #[error("the catalog is empty; nothing to apply")]
    EmptyCatalog,
}
