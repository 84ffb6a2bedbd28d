//! Backfill behavior: synthesizing audit history for adopted databases
//! without executing any SQL.

mod common;

use common::{AUDIT_TABLE, group, target, two_release_catalog};
use reltrain_core::Engine;
use reltrain_core::driver::memory::MemoryConnector;
use reltrain_core::engine::TargetOutcome;
use reltrain_core::error::EngineError;
use reltrain_core::state::SkipReason;

#[tokio::test]
async fn backfill_writes_the_full_prefix_and_no_sql() {
    let (dir, catalog) = two_release_catalog();
    let connector = MemoryConnector::new();
    let engine = Engine::new(&catalog, &connector, AUDIT_TABLE, dir.path());
    let group = group(vec![target("adopted")]);

    // Up to (R2, 2): all of R1 (2 versions) plus R2 versions 1-2.
    let reports = engine.backfill(&group, "R2", 2).await.unwrap();
    assert!(matches!(reports[0].outcome, TargetOutcome::Backfilled { rows: 4 }));

    let db = connector.target("adopted");
    let rows = db.audit_rows();
    assert_eq!(rows.len(), 4);
    assert!(db.executed_sql().is_empty());

    let versions: Vec<(String, i32)> = rows
        .iter()
        .map(|r| (r.release.clone(), r.version))
        .collect();
    assert_eq!(
        versions,
        vec![
            ("R1".to_string(), 1),
            ("R1".to_string(), 2),
            ("R2".to_string(), 1),
            ("R2".to_string(), 2),
        ]
    );
    // Descriptions come from the declared changes where present.
    assert_eq!(rows[0].description.as_deref(), Some("users table"));

    let status = engine.status(&group).await;
    let current = status[0].state.as_ref().unwrap().current.as_ref().unwrap();
    assert_eq!((current.release.as_str(), current.version), ("R2", 2));
}

#[tokio::test]
async fn backfill_refuses_any_existing_history() {
    let (dir, catalog) = two_release_catalog();
    let connector = MemoryConnector::new();
    let engine = Engine::new(&catalog, &connector, AUDIT_TABLE, dir.path());
    let group = group(vec![target("primary")]);

    let reports = engine.apply_up_to(&group, "R1", 1, false).await.unwrap();
    assert!(matches!(reports[0].outcome, TargetOutcome::Applied { .. }));

    let reports = engine.backfill(&group, "R2", 3).await.unwrap();
    assert!(matches!(
        reports[0].outcome,
        TargetOutcome::Skipped(SkipReason::AlreadyHasHistory)
    ));
    assert_eq!(connector.target("primary").audit_rows().len(), 1);
}

#[tokio::test]
async fn backfill_validates_the_requested_version() {
    let (dir, catalog) = two_release_catalog();
    let connector = MemoryConnector::new();
    let engine = Engine::new(&catalog, &connector, AUDIT_TABLE, dir.path());
    let group = group(vec![target("adopted")]);

    let err = engine.backfill(&group, "R2", 9).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::UnknownChangeVersion { version: 9, .. }
    ));
    assert!(connector.target("adopted").audit_rows().is_empty());
}

#[tokio::test]
async fn apply_resumes_where_backfill_left_off() {
    let (dir, catalog) = two_release_catalog();
    let connector = MemoryConnector::new();
    let engine = Engine::new(&catalog, &connector, AUDIT_TABLE, dir.path());
    let group = group(vec![target("adopted")]);

    engine.backfill(&group, "R1", 2).await.unwrap();

    let reports = engine.apply_up_to(&group, "R2", 3, false).await.unwrap();
    match &reports[0].outcome {
        TargetOutcome::Applied { versions, .. } => assert_eq!(versions, &vec![1, 2, 3]),
        other => panic!("expected Applied, got {other:?}"),
    }
    let db = connector.target("adopted");
    assert_eq!(db.audit_rows().len(), 5);
    // Only R2's changes actually executed.
    assert_eq!(db.executed_sql().len(), 3);
}

#[tokio::test]
async fn backfill_sibling_targets_are_independent() {
    let (dir, catalog) = two_release_catalog();
    let connector = MemoryConnector::new();
    let engine = Engine::new(&catalog, &connector, AUDIT_TABLE, dir.path());
    let seen_only = group(vec![target("seen")]);
    let both = group(vec![target("seen"), target("fresh")]);

    // Give "seen" some history first; only "fresh" accepts the backfill.
    engine.apply_up_to(&seen_only, "R1", 1, false).await.unwrap();

    let reports = engine.backfill(&both, "R1", 2).await.unwrap();
    assert!(matches!(
        reports[0].outcome,
        TargetOutcome::Skipped(SkipReason::AlreadyHasHistory)
    ));
    assert!(matches!(reports[1].outcome, TargetOutcome::Backfilled { rows: 2 }));
}
