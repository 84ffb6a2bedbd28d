//! Transactional apply engine.
//!
//! For every target in a group the engine resolves the outstanding range of
//! change versions, executes it in ascending order inside one transaction,
//! appends audit rows in that same transaction, and commits or rolls back
//! as a unit. Targets are processed strictly one at a time in group order;
//! one target's failure never aborts its siblings, and every outcome is
//! reported independently.

use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::catalog::{Catalog, Change, Release, SqlFragment};
use crate::config::{DatabaseGroup, DatabaseTarget};
use crate::driver::{AuditEntry, Connector, TargetDriver};
use crate::error::{DriverError, EngineError};
use crate::state::{self, Advance, SkipReason, TargetState};

/// Outcome of one target within a group operation.
#[derive(Debug)]
pub enum TargetOutcome {
    /// Change versions executed and committed.
    Applied { release: String, versions: Vec<i32> },
    /// Nothing done; chain-continuity or history rules said no.
    Skipped(SkipReason),
    /// Transaction rolled back (or never started); target untouched.
    Failed(ApplyFailure),
    /// Audit rows synthesized by backfill.
    Backfilled { rows: usize },
    /// Audit table present (created or already there).
    Initialized,
}

/// Failure context: which change broke, and the SQL that broke it.
#[derive(Debug)]
pub struct ApplyFailure {
    pub release: Option<String>,
    pub version: Option<i32>,
    pub description: Option<String>,
    pub sql: Option<String>,
    pub error: String,
}

impl ApplyFailure {
    fn connect(error: DriverError) -> Self {
        Self {
            release: None,
            version: None,
            description: None,
            sql: None,
            error: error.to_string(),
        }
    }

    fn setup(release: &Release, error: DriverError) -> Self {
        Self {
            release: Some(release.name.clone()),
            version: None,
            description: None,
            sql: None,
            error: error.to_string(),
        }
    }

    fn at(release: &Release, change: &Change, sql: Option<String>, error: String) -> Self {
        Self {
            release: Some(release.name.clone()),
            version: Some(change.version),
            description: change.description.clone(),
            sql,
            error,
        }
    }
}

/// One target's report within a group run.
#[derive(Debug)]
pub struct TargetReport {
    pub target: String,
    pub outcome: TargetOutcome,
}

/// Per-target status row.
#[derive(Debug, serde::Serialize)]
pub struct TargetStatus {
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<TargetState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The orchestrator. Borrows an immutable catalog snapshot, so a reload
/// elsewhere never changes the chain under a running operation.
pub struct Engine<'a> {
    catalog: &'a Catalog,
    connector: &'a dyn Connector,
    audit_table: String,
    script_root: PathBuf,
}

impl<'a> Engine<'a> {
    pub fn new(
        catalog: &'a Catalog,
        connector: &'a dyn Connector,
        audit_table: impl Into<String>,
        script_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            catalog,
            connector,
            audit_table: audit_table.into(),
            script_root: script_root.into(),
        }
    }

    /// Last applied release/version for every target in the group.
    pub async fn status(&self, group: &DatabaseGroup) -> Vec<TargetStatus> {
        let mut rows = Vec::new();
        for target in &group.targets {
            rows.push(self.status_of(target).await);
        }
        rows
    }

    async fn status_of(&self, target: &DatabaseTarget) -> TargetStatus {
        let mut driver = match self.connector.connect(target).await {
            Ok(driver) => driver,
            Err(e) => {
                return TargetStatus {
                    target: target.name.clone(),
                    state: None,
                    error: Some(e.to_string()),
                };
            }
        };
        match state::current_state(driver.as_mut(), self.catalog, &self.audit_table).await {
            Ok(state) => {
                if !state.unknown_releases.is_empty() {
                    warn!(
                        db = %target.name,
                        releases = ?state.unknown_releases,
                        "audit history references releases unknown to the loaded catalog"
                    );
                }
                TargetStatus {
                    target: target.name.clone(),
                    state: Some(state),
                    error: None,
                }
            }
            Err(e) => TargetStatus {
                target: target.name.clone(),
                state: None,
                error: Some(e.to_string()),
            },
        }
    }

    /// Create the audit table on every target in the group.
    ///
    /// Failures are reported per target and do not stop siblings.
    pub async fn init(&self, group: &DatabaseGroup) -> Vec<TargetReport> {
        let mut reports = Vec::new();
        for target in &group.targets {
            let outcome = match self.connector.connect(target).await {
                Ok(mut driver) => match driver.ensure_audit_table(&self.audit_table).await {
                    Ok(()) => TargetOutcome::Initialized,
                    Err(e) => TargetOutcome::Failed(ApplyFailure::connect(e)),
                },
                Err(e) => TargetOutcome::Failed(ApplyFailure::connect(e)),
            };
            reports.push(TargetReport {
                target: target.name.clone(),
                outcome,
            });
        }
        reports
    }

    /// Apply the latest version of the latest release.
    pub async fn apply_latest(
        &self,
        group: &DatabaseGroup,
    ) -> Result<Vec<TargetReport>, EngineError> {
        let latest = self.catalog.latest().ok_or(EngineError::EmptyCatalog)?;
        Ok(self
            .apply_to_group(group, latest, latest.last_version, false)
            .await)
    }

    /// Apply the latest version of a named release.
    pub async fn apply_release(
        &self,
        group: &DatabaseGroup,
        release: &str,
    ) -> Result<Vec<TargetReport>, EngineError> {
        let release = self.resolve_release(release)?;
        Ok(self
            .apply_to_group(group, release, release.last_version, false)
            .await)
    }

    /// Apply an explicit (release, version), optionally forced.
    ///
    /// Force re-executes exactly the requested version: no chain check, no
    /// prior-state consult, and no audit row. It exists for targeted repair.
    pub async fn apply_up_to(
        &self,
        group: &DatabaseGroup,
        release: &str,
        version: i32,
        force: bool,
    ) -> Result<Vec<TargetReport>, EngineError> {
        let release = self.resolve_release(release)?;
        if release.change(version).is_none() {
            return Err(EngineError::UnknownChangeVersion {
                release: release.name.clone(),
                version,
            });
        }
        Ok(self.apply_to_group(group, release, version, force).await)
    }

    /// Synthesize audit history up to (release, version) without executing
    /// any SQL. Refused per target if any audit rows already exist.
    pub async fn backfill(
        &self,
        group: &DatabaseGroup,
        release: &str,
        version: i32,
    ) -> Result<Vec<TargetReport>, EngineError> {
        let release = self.resolve_release(release)?;
        if release.change(version).is_none() {
            return Err(EngineError::UnknownChangeVersion {
                release: release.name.clone(),
                version,
            });
        }

        let mut reports = Vec::new();
        for target in &group.targets {
            let outcome = self.backfill_target(target, release, version).await;
            reports.push(TargetReport {
                target: target.name.clone(),
                outcome,
            });
        }
        Ok(reports)
    }

    fn resolve_release(&self, name: &str) -> Result<&Release, EngineError> {
        self.catalog
            .get(name)
            .ok_or_else(|| EngineError::UnknownRelease {
                release: name.to_string(),
                suggestion: self.catalog.closest_name(name),
            })
    }

    async fn apply_to_group(
        &self,
        group: &DatabaseGroup,
        release: &Release,
        version: i32,
        force: bool,
    ) -> Vec<TargetReport> {
        let mut reports = Vec::new();
        for target in &group.targets {
            let outcome = self.apply_to_target(target, release, version, force).await;
            match &outcome {
                TargetOutcome::Applied { versions, .. } => {
                    info!(
                        db = %target.name,
                        release = %release.name,
                        ?versions,
                        "changes applied"
                    );
                }
                TargetOutcome::Skipped(reason) => {
                    info!(db = %target.name, %reason, "target skipped");
                }
                TargetOutcome::Failed(failure) => {
                    warn!(db = %target.name, error = %failure.error, "target failed");
                }
                _ => {}
            }
            reports.push(TargetReport {
                target: target.name.clone(),
                outcome,
            });
        }
        reports
    }

    async fn apply_to_target(
        &self,
        target: &DatabaseTarget,
        release: &Release,
        version: i32,
        force: bool,
    ) -> TargetOutcome {
        let mut driver = match self.connector.connect(target).await {
            Ok(driver) => driver,
            Err(e) => return TargetOutcome::Failed(ApplyFailure::connect(e)),
        };

        // Force repairs a single version in isolation: prior state is not
        // consulted, so the range below collapses to exactly `version`.
        let last_current = if force {
            version - 1
        } else {
            match driver
                .max_logged_version(&self.audit_table, &release.name)
                .await
            {
                Ok(v) => v,
                Err(e) => return TargetOutcome::Failed(ApplyFailure::setup(release, e)),
            }
        };

        if !force {
            let advance = state::can_advance(
                driver.as_mut(),
                self.catalog,
                &self.audit_table,
                release,
                version,
                last_current,
            )
            .await;
            match advance {
                Ok(Advance::Allowed) => {}
                Ok(Advance::Denied(reason)) => return TargetOutcome::Skipped(reason),
                Err(e) => return TargetOutcome::Failed(ApplyFailure::setup(release, e)),
            }
        }

        match self
            .run_changes(driver.as_mut(), target, release, last_current + 1, version, force)
            .await
        {
            Ok(versions) => TargetOutcome::Applied {
                release: release.name.clone(),
                versions,
            },
            Err(failure) => {
                if let Err(e) = driver.rollback().await {
                    warn!(db = %target.name, error = %e, "rollback failed");
                }
                TargetOutcome::Failed(failure)
            }
        }
    }

    /// Execute versions `start..=upto` inside one transaction.
    async fn run_changes(
        &self,
        driver: &mut dyn TargetDriver,
        target: &DatabaseTarget,
        release: &Release,
        start: i32,
        upto: i32,
        force: bool,
    ) -> Result<Vec<i32>, ApplyFailure> {
        driver
            .begin()
            .await
            .map_err(|e| ApplyFailure::setup(release, e))?;

        let mut applied = Vec::new();
        for v in start..=upto {
            // The catalog rejects gapped version sets at load time, so a
            // miss here means the loaded release was violated in memory.
            let change = release.change(v).ok_or_else(|| ApplyFailure {
                release: Some(release.name.clone()),
                version: Some(v),
                description: None,
                sql: None,
                error: "change version missing from the loaded release".to_string(),
            })?;

            for fragment in &change.sql {
                let sql = self
                    .resolve_fragment(fragment)
                    .map_err(|e| ApplyFailure::at(release, change, None, e))?;
                let sql = target.apply_replacements(&sql);
                debug!(
                    db = %target.name,
                    release = %release.name,
                    version = v,
                    "executing change fragment"
                );
                driver
                    .execute_batch(&sql)
                    .await
                    .map_err(|e| ApplyFailure::at(release, change, Some(sql), e.to_string()))?;
            }

            if !force {
                let entry = AuditEntry::new(&release.name, v, change.description.as_deref());
                driver
                    .append_audit(&self.audit_table, &entry)
                    .await
                    .map_err(|e| ApplyFailure::at(release, change, None, e.to_string()))?;
            }
            applied.push(v);
        }

        driver
            .commit()
            .await
            .map_err(|e| ApplyFailure::setup(release, e))?;
        Ok(applied)
    }

    fn resolve_fragment(&self, fragment: &SqlFragment) -> Result<String, String> {
        match fragment {
            SqlFragment::Inline(sql) => Ok(sql.clone()),
            SqlFragment::File { path } => {
                let full = self.script_root.join(path);
                std::fs::read_to_string(&full)
                    .map_err(|e| format!("failed to read script {}: {e}", full.display()))
            }
        }
    }

    async fn backfill_target(
        &self,
        target: &DatabaseTarget,
        release: &Release,
        version: i32,
    ) -> TargetOutcome {
        let mut driver = match self.connector.connect(target).await {
            Ok(driver) => driver,
            Err(e) => return TargetOutcome::Failed(ApplyFailure::connect(e)),
        };

        match driver.logged_releases(&self.audit_table).await {
            Ok(logged) if !logged.is_empty() => {
                return TargetOutcome::Skipped(SkipReason::AlreadyHasHistory);
            }
            Ok(_) => {}
            Err(e) => return TargetOutcome::Failed(ApplyFailure::setup(release, e)),
        }

        match self.write_backfill(driver.as_mut(), release, version).await {
            Ok(rows) => {
                info!(db = %target.name, rows, "audit history backfilled");
                TargetOutcome::Backfilled { rows }
            }
            Err(failure) => {
                if let Err(e) = driver.rollback().await {
                    warn!(db = %target.name, error = %e, "rollback failed");
                }
                TargetOutcome::Failed(failure)
            }
        }
    }

    /// Write synthetic audit rows for every version from the chain root up
    /// to (release, version), in one transaction. No SQL is executed.
    async fn write_backfill(
        &self,
        driver: &mut dyn TargetDriver,
        to_release: &Release,
        to_version: i32,
    ) -> Result<usize, ApplyFailure> {
        driver
            .begin()
            .await
            .map_err(|e| ApplyFailure::setup(to_release, e))?;

        let mut rows = 0;
        for release in self.catalog.releases() {
            if release.sequence > to_release.sequence {
                break;
            }
            let upto = if release.sequence == to_release.sequence {
                to_version
            } else {
                release.last_version
            };
            for v in 1..=upto {
                let description = release.change(v).and_then(|c| c.description.as_deref());
                let entry = AuditEntry::new(&release.name, v, description);
                driver
                    .append_audit(&self.audit_table, &entry)
                    .await
                    .map_err(|e| ApplyFailure {
                        release: Some(release.name.clone()),
                        version: Some(v),
                        description: None,
                        sql: None,
                        error: e.to_string(),
                    })?;
                rows += 1;
            }
        }

        driver
            .commit()
            .await
            .map_err(|e| ApplyFailure::setup(to_release, e))?;
        Ok(rows)
    }
}
