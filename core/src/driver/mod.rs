//! Target database access: the seam between the engine and a backend.
//!
//! Transactions are driver state, not borrowed objects: `begin` opens one
//! and everything executed until `commit` or `rollback` runs inside it.
//! One driver handle maps to one connection, owned by a single group
//! operation for its lifetime and released on drop.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::DatabaseTarget;
use crate::error::DriverError;

/// One persisted record that a release/version was applied to a target.
///
/// Append-only; normal operation never updates or deletes rows.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub release: String,
    pub version: i32,
    pub executed_at: DateTime<Utc>,
    pub executor: Option<String>,
    pub executor_addr: Option<String>,
    pub description: Option<String>,
}

impl AuditEntry {
    /// Build an entry stamped with the local clock and invoking identity.
    pub fn new(release: &str, version: i32, description: Option<&str>) -> Self {
        Self {
            release: release.to_string(),
            version,
            executed_at: Utc::now(),
            executor: local_executor(),
            executor_addr: local_host(),
            description: description.map(str::to_owned),
        }
    }
}

// The executor columns are nullable; environments without these variables
// degrade to NULL rather than failing the apply.
fn local_executor() -> Option<String> {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .ok()
        .filter(|v| !v.is_empty())
}

fn local_host() -> Option<String> {
    std::env::var("HOSTNAME").ok().filter(|v| !v.is_empty())
}

/// The operations the engine needs against one target database.
#[async_trait]
pub trait TargetDriver: Send {
    /// Create the audit table if it does not exist.
    async fn ensure_audit_table(&mut self, table: &str) -> Result<(), DriverError>;

    /// Distinct release names present in the target's audit history.
    async fn logged_releases(&mut self, table: &str) -> Result<Vec<String>, DriverError>;

    /// Highest change version logged for `release`, or 0 when none.
    async fn max_logged_version(&mut self, table: &str, release: &str)
    -> Result<i32, DriverError>;

    async fn begin(&mut self) -> Result<(), DriverError>;

    /// Execute one SQL fragment. Multi-statement text runs in declared
    /// order inside the open transaction.
    async fn execute_batch(&mut self, sql: &str) -> Result<(), DriverError>;

    /// Append one audit row (parameterized) inside the open transaction.
    async fn append_audit(&mut self, table: &str, entry: &AuditEntry) -> Result<(), DriverError>;

    async fn commit(&mut self) -> Result<(), DriverError>;

    async fn rollback(&mut self) -> Result<(), DriverError>;
}

/// Opens driver handles for configured targets.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, target: &DatabaseTarget) -> Result<Box<dyn TargetDriver>, DriverError>;
}
