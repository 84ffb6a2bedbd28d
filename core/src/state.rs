//! Version state resolution: what a target has executed, and whether a
//! requested advance keeps the chain unbroken.
//!
//! A target's audit rows are the only source of truth for its applied
//! state; the catalog itself never records "applied".

use std::fmt;

use serde::Serialize;

use crate::catalog::{Catalog, Release};
use crate::driver::TargetDriver;
use crate::error::DriverError;

/// Sentinel shown for targets with no usable audit history.
pub const NO_RELEASE_EXECUTED: &str = "no release executed";

/// Last applied release/version, derived on demand from the audit history.
#[derive(Debug, Clone, Serialize)]
pub struct TargetState {
    pub current: Option<CurrentVersion>,
    /// Audit rows naming releases the loaded catalog does not know.
    /// Ignored for state computation, surfaced for diagnostics.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unknown_releases: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CurrentVersion {
    pub release: String,
    pub version: i32,
}

impl TargetState {
    /// True when the audit history holds no rows at all, known or not.
    pub fn has_history(&self) -> bool {
        self.current.is_some() || !self.unknown_releases.is_empty()
    }
}

impl fmt::Display for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.current {
            Some(current) => write!(f, "{} @ change {}", current.release, current.version),
            None => f.write_str(NO_RELEASE_EXECUTED),
        }
    }
}

/// Compute the target's state from its audit history.
///
/// The current release is the one with the highest chain sequence among
/// logged names the catalog knows; its max logged version completes the
/// state. No known rows means the sentinel state.
pub async fn current_state(
    driver: &mut dyn TargetDriver,
    catalog: &Catalog,
    table: &str,
) -> Result<TargetState, DriverError> {
    let logged = driver.logged_releases(table).await?;

    let mut unknown_releases = Vec::new();
    let mut best: Option<&Release> = None;
    for name in &logged {
        match catalog.get(name) {
            Some(release) => {
                if best.is_none_or(|b| release.sequence > b.sequence) {
                    best = Some(release);
                }
            }
            None => unknown_releases.push(name.clone()),
        }
    }

    let current = match best {
        Some(release) => Some(CurrentVersion {
            release: release.name.clone(),
            version: driver.max_logged_version(table, &release.name).await?,
        }),
        None => None,
    };

    Ok(TargetState {
        current,
        unknown_releases,
    })
}

/// Outcome of the chain-continuity check.
#[derive(Debug)]
pub enum Advance {
    Allowed,
    Denied(SkipReason),
}

/// Why a target was left alone. Informational, never a failure.
#[derive(Debug, Clone)]
pub enum SkipReason {
    /// The predecessor release has no logged versions on this target.
    PredecessorNotStarted { predecessor: String },
    /// The predecessor started but never reached its last version.
    PredecessorIncomplete {
        predecessor: String,
        logged: i32,
        required: i32,
    },
    /// The requested version is at or behind what is already logged.
    AlreadyApplied { version: i32 },
    /// Backfill refused: the target already has audit history.
    AlreadyHasHistory,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::PredecessorNotStarted { predecessor } => write!(
                f,
                "previous release \"{predecessor}\" was never executed on this target"
            ),
            SkipReason::PredecessorIncomplete {
                predecessor,
                logged,
                required,
            } => write!(
                f,
                "previous release \"{predecessor}\" stopped at change {logged} of {required}"
            ),
            SkipReason::AlreadyApplied { version } => {
                write!(f, "change {version} was already executed on this target")
            }
            SkipReason::AlreadyHasHistory => {
                f.write_str("audit history already exists on this target")
            }
        }
    }
}

/// Chain-continuity check for advancing `release` to `requested`.
///
/// `last_current` is the target's max logged version for `release` itself.
/// The predecessor gate compares the predecessor's own logged versions
/// against its declared last version, independent of which release is the
/// target's overall current one. Callers bypass this entirely under force.
pub async fn can_advance(
    driver: &mut dyn TargetDriver,
    catalog: &Catalog,
    table: &str,
    release: &Release,
    requested: i32,
    last_current: i32,
) -> Result<Advance, DriverError> {
    if let Some(predecessor) = catalog.predecessor_of(release) {
        let logged = driver.max_logged_version(table, &predecessor.name).await?;
        if logged == 0 {
            return Ok(Advance::Denied(SkipReason::PredecessorNotStarted {
                predecessor: predecessor.name.clone(),
            }));
        }
        if logged < predecessor.last_version {
            return Ok(Advance::Denied(SkipReason::PredecessorIncomplete {
                predecessor: predecessor.name.clone(),
                logged,
                required: predecessor.last_version,
            }));
        }
    }

    if last_current >= requested {
        return Ok(Advance::Denied(SkipReason::AlreadyApplied {
            version: requested,
        }));
    }

    Ok(Advance::Allowed)
}
