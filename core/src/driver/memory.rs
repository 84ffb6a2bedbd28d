//! In-memory driver: backs the engine test-suite and dry runs.
//!
//! State is keyed by target name and shared across connects, so a sequence
//! of engine calls observes the same history a real database would.
//! Transactions buffer writes and publish them on commit; a scripted
//! failure marker exercises the rollback path.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{AuditEntry, Connector, TargetDriver};
use crate::config::DatabaseTarget;
use crate::error::DriverError;

#[derive(Debug, Default)]
struct TargetData {
    audit_table: bool,
    audit: Vec<AuditEntry>,
    executed: Vec<String>,
}

/// Handle to one target's committed state, for assertions.
#[derive(Clone, Default)]
pub struct MemoryTarget(Arc<Mutex<TargetData>>);

impl MemoryTarget {
    pub fn audit_rows(&self) -> Vec<AuditEntry> {
        self.0.lock().unwrap().audit.clone()
    }

    /// Committed SQL fragments, after replacement, in execution order.
    pub fn executed_sql(&self) -> Vec<String> {
        self.0.lock().unwrap().executed.clone()
    }

    pub fn has_audit_table(&self) -> bool {
        self.0.lock().unwrap().audit_table
    }
}

/// Connector handing out in-memory drivers.
#[derive(Default)]
pub struct MemoryConnector {
    targets: Mutex<HashMap<String, MemoryTarget>>,
    fail_marker: Mutex<Option<String>>,
    refused: Mutex<HashSet<String>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed state for `name`, created on first use.
    pub fn target(&self, name: &str) -> MemoryTarget {
        self.targets
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    /// Any executed fragment containing `marker` fails.
    pub fn fail_on(&self, marker: &str) {
        *self.fail_marker.lock().unwrap() = Some(marker.to_string());
    }

    pub fn clear_failure(&self) {
        *self.fail_marker.lock().unwrap() = None;
    }

    /// Refuse connections to `name`, simulating an unreachable target.
    pub fn refuse(&self, name: &str) {
        self.refused.lock().unwrap().insert(name.to_string());
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, target: &DatabaseTarget) -> Result<Box<dyn TargetDriver>, DriverError> {
        if self.refused.lock().unwrap().contains(&target.name) {
            return Err(DriverError::Connect(format!(
                "target \"{}\" is unreachable",
                target.name
            )));
        }
        Ok(Box::new(MemoryDriver {
            data: self.target(&target.name),
            tx: None,
            fail_marker: self.fail_marker.lock().unwrap().clone(),
        }))
    }
}

#[derive(Default)]
struct Pending {
    audit: Vec<AuditEntry>,
    executed: Vec<String>,
}

/// One in-memory "connection".
pub struct MemoryDriver {
    data: MemoryTarget,
    tx: Option<Pending>,
    fail_marker: Option<String>,
}

#[async_trait]
impl TargetDriver for MemoryDriver {
    async fn ensure_audit_table(&mut self, _table: &str) -> Result<(), DriverError> {
        self.data.0.lock().unwrap().audit_table = true;
        Ok(())
    }

    async fn logged_releases(&mut self, _table: &str) -> Result<Vec<String>, DriverError> {
        let data = self.data.0.lock().unwrap();
        let mut seen = Vec::new();
        for entry in &data.audit {
            if !seen.contains(&entry.release) {
                seen.push(entry.release.clone());
            }
        }
        Ok(seen)
    }

    async fn max_logged_version(
        &mut self,
        _table: &str,
        release: &str,
    ) -> Result<i32, DriverError> {
        let data = self.data.0.lock().unwrap();
        Ok(data
            .audit
            .iter()
            .filter(|e| e.release == release)
            .map(|e| e.version)
            .max()
            .unwrap_or(0))
    }

    async fn begin(&mut self) -> Result<(), DriverError> {
        self.tx = Some(Pending::default());
        Ok(())
    }

    async fn execute_batch(&mut self, sql: &str) -> Result<(), DriverError> {
        if let Some(marker) = &self.fail_marker {
            if sql.contains(marker.as_str()) {
                return Err(DriverError::Sql(format!(
                    "scripted failure on marker \"{marker}\""
                )));
            }
        }
        match &mut self.tx {
            Some(pending) => pending.executed.push(sql.to_string()),
            None => self.data.0.lock().unwrap().executed.push(sql.to_string()),
        }
        Ok(())
    }

    async fn append_audit(&mut self, _table: &str, entry: &AuditEntry) -> Result<(), DriverError> {
        match &mut self.tx {
            Some(pending) => pending.audit.push(entry.clone()),
            None => self.data.0.lock().unwrap().audit.push(entry.clone()),
        }
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), DriverError> {
        if let Some(pending) = self.tx.take() {
            let mut data = self.data.0.lock().unwrap();
            data.executed.extend(pending.executed);
            data.audit.extend(pending.audit);
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DriverError> {
        self.tx = None;
        Ok(())
    }
}
