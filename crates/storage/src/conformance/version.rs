use std::future::Future;

use super::{make_entry, make_record, seed, TestResult};
use crate::{RecordStorage, StorageError};

pub(super) async fn run_version_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: RecordStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "version",
        "transition_bumps_version_by_one",
        transition_bumps_version_by_one(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "transition_writes_status_history_updated_at_together",
        transition_writes_status_history_updated_at_together(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "stale_expected_version_returns_concurrent_conflict",
        stale_expected_version_returns_concurrent_conflict(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "conflict_error_carries_record_id_and_version",
        conflict_error_carries_record_id_and_version(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "racing_snapshots_produce_exactly_one_winner",
        racing_snapshots_produce_exactly_one_winner(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "transition_on_unknown_record_returns_not_found",
        transition_on_unknown_record_returns_not_found(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "sequential_transitions_accumulate_history",
        sequential_transitions_accumulate_history(factory).await,
    ));

    results
}

// ── Test implementations ─────────────────────────────────────────────

async fn transition_bumps_version_by_one<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, &make_record("pay-1", "payment", "pending")).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let entry = make_entry("system", "pending", "success", "2026-01-02T00:00:00Z");
    let v = s
        .apply_transition(&mut snap, "pay-1", 0, "success", &entry)
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    if v != 1 {
        return Err(format!("expected returned version 1, got {}", v));
    }
    let rec = s.get_record("pay-1").await.map_err(|e| e.to_string())?;
    if rec.version != 1 {
        return Err(format!("expected stored version 1, got {}", rec.version));
    }
    Ok(())
}

/// The status / history / updated_at triple changes together, exactly as
/// the entry describes.
async fn transition_writes_status_history_updated_at_together<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: RecordStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, &make_record("def-1", "deferment_request", "pending")).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let entry = make_entry("registrar1", "pending", "approved", "2026-02-01T09:30:00Z");
    s.apply_transition(&mut snap, "def-1", 0, "approved", &entry)
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let rec = s.get_record("def-1").await.map_err(|e| e.to_string())?;
    if rec.status != "approved" {
        return Err(format!("status not written: {}", rec.status));
    }
    if rec.updated_at != "2026-02-01T09:30:00Z" {
        return Err(format!("updated_at not the entry's at: {}", rec.updated_at));
    }
    match rec.history.last() {
        Some(last) if last == &entry => Ok(()),
        Some(last) => Err(format!("history entry mangled: {:?}", last)),
        None => Err("history empty after transition".to_string()),
    }
}

async fn stale_expected_version_returns_concurrent_conflict<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: RecordStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, &make_record("pay-1", "payment", "pending")).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let entry = make_entry("system", "pending", "success", "2026-01-02T00:00:00Z");
    match s.apply_transition(&mut snap, "pay-1", 7, "success", &entry).await {
        Err(StorageError::ConcurrentConflict { .. }) => Ok(()),
        Err(e) => Err(format!("expected ConcurrentConflict, got {:?}", e)),
        Ok(v) => Err(format!("stale transition accepted, version {}", v)),
    }
}

async fn conflict_error_carries_record_id_and_version<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, &make_record("pay-1", "payment", "pending")).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let entry = make_entry("system", "pending", "success", "2026-01-02T00:00:00Z");
    match s.apply_transition(&mut snap, "pay-1", 3, "success", &entry).await {
        Err(StorageError::ConcurrentConflict {
            record_id,
            expected_version,
        }) => {
            if record_id != "pay-1" || expected_version != 3 {
                return Err(format!(
                    "wrong conflict fields: {} / {}",
                    record_id, expected_version
                ));
            }
            Ok(())
        }
        other => Err(format!("expected ConcurrentConflict, got {:?}", other)),
    }
}

/// Two snapshots staging the same version-conditional transition: the
/// first commit wins, the second surfaces ConcurrentConflict.
async fn racing_snapshots_produce_exactly_one_winner<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, &make_record("def-1", "deferment_request", "pending")).await?;

    let mut a = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let mut b = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let approve = make_entry("registrar1", "pending", "approved", "2026-01-02T00:00:00Z");
    let decline = make_entry("registrar2", "pending", "declined", "2026-01-02T00:00:00Z");
    s.apply_transition(&mut a, "def-1", 0, "approved", &approve)
        .await
        .map_err(|e| e.to_string())?;
    s.apply_transition(&mut b, "def-1", 0, "declined", &decline)
        .await
        .map_err(|e| e.to_string())?;

    s.commit_snapshot(a).await.map_err(|e| e.to_string())?;
    match s.commit_snapshot(b).await {
        Err(StorageError::ConcurrentConflict { .. }) => {}
        Err(e) => return Err(format!("expected ConcurrentConflict, got {:?}", e)),
        Ok(()) => return Err("both racing commits succeeded".to_string()),
    }

    let rec = s.get_record("def-1").await.map_err(|e| e.to_string())?;
    if rec.status != "approved" || rec.version != 1 {
        return Err(format!(
            "final state not the winner's: status={} version={}",
            rec.status, rec.version
        ));
    }
    Ok(())
}

async fn transition_on_unknown_record_returns_not_found<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: RecordStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let entry = make_entry("system", "pending", "success", "2026-01-02T00:00:00Z");
    match s.apply_transition(&mut snap, "ghost", 0, "success", &entry).await {
        Err(StorageError::RecordNotFound { .. }) => Ok(()),
        Err(e) => Err(format!("expected RecordNotFound, got {:?}", e)),
        Ok(_) => Err("transition on unknown record accepted".to_string()),
    }
}

async fn sequential_transitions_accumulate_history<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, &make_record("sub-1", "grade_submission", "pending_approval")).await?;

    let moves = [
        ("pending_approval", "approved", "2026-01-02T00:00:00Z"),
        ("approved", "published", "2026-01-03T00:00:00Z"),
    ];
    for (i, (from, to, at)) in moves.iter().enumerate() {
        let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
        let entry = make_entry("examofficer1", from, to, at);
        s.apply_transition(&mut snap, "sub-1", i as i64, to, &entry)
            .await
            .map_err(|e| e.to_string())?;
        s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
    }

    let rec = s.get_record("sub-1").await.map_err(|e| e.to_string())?;
    if rec.history.len() != 2 {
        return Err(format!("expected history of 2, got {}", rec.history.len()));
    }
    if rec.history[1].to_status != rec.status {
        return Err("last history entry does not match status".to_string());
    }
    if rec.updated_at != "2026-01-03T00:00:00Z" {
        return Err(format!("updated_at not last entry's at: {}", rec.updated_at));
    }
    Ok(())
}
