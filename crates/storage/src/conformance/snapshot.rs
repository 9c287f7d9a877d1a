use std::future::Future;

use super::{make_entry, make_record, seed, TestResult};
use crate::{RecordStorage, StorageError};

pub(super) async fn run_snapshot_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: RecordStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "snapshot",
        "uncommitted_insert_not_visible",
        uncommitted_insert_not_visible(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "aborted_insert_not_visible",
        aborted_insert_not_visible(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "uncommitted_transition_not_visible",
        uncommitted_transition_not_visible(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "aborted_delete_leaves_record",
        aborted_delete_leaves_record(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "multi_operation_commit_is_atomic",
        multi_operation_commit_is_atomic(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "failed_commit_applies_nothing",
        failed_commit_applies_nothing(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "snapshot_observes_own_staged_transition",
        snapshot_observes_own_staged_transition(factory).await,
    ));

    results
}

// ── Test implementations ─────────────────────────────────────────────

async fn uncommitted_insert_not_visible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_record(&mut snap, &make_record("pay-1", "payment", "pending"))
        .await
        .map_err(|e| e.to_string())?;

    match s.get_record("pay-1").await {
        Err(StorageError::RecordNotFound { .. }) => {
            s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;
            Ok(())
        }
        Err(e) => Err(format!("expected RecordNotFound, got {:?}", e)),
        Ok(_) => Err("uncommitted insert visible to outside reader".to_string()),
    }
}

async fn aborted_insert_not_visible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_record(&mut snap, &make_record("pay-1", "payment", "pending"))
        .await
        .map_err(|e| e.to_string())?;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;

    match s.get_record("pay-1").await {
        Err(StorageError::RecordNotFound { .. }) => Ok(()),
        Err(e) => Err(format!("expected RecordNotFound, got {:?}", e)),
        Ok(_) => Err("aborted insert survived".to_string()),
    }
}

async fn uncommitted_transition_not_visible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, &make_record("pay-1", "payment", "pending")).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let entry = make_entry("system", "pending", "success", "2026-01-02T00:00:00Z");
    s.apply_transition(&mut snap, "pay-1", 0, "success", &entry)
        .await
        .map_err(|e| e.to_string())?;

    let rec = s.get_record("pay-1").await.map_err(|e| e.to_string())?;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;
    if rec.status != "pending" || rec.version != 0 {
        return Err(format!(
            "uncommitted transition leaked: status={} version={}",
            rec.status, rec.version
        ));
    }
    Ok(())
}

async fn aborted_delete_leaves_record<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, &make_record("bud-1", "budget", "pending")).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.delete_record(&mut snap, "bud-1")
        .await
        .map_err(|e| e.to_string())?;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;

    s.get_record("bud-1")
        .await
        .map_err(|e| format!("record vanished after aborted delete: {}", e))?;
    Ok(())
}

/// Insert + transition + payload update in one snapshot land together.
async fn multi_operation_commit_is_atomic<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_record(&mut snap, &make_record("pay-1", "payment", "pending"))
        .await
        .map_err(|e| e.to_string())?;
    let entry = make_entry("system", "pending", "processing", "2026-01-02T00:00:00Z");
    s.apply_transition(&mut snap, "pay-1", 0, "processing", &entry)
        .await
        .map_err(|e| e.to_string())?;
    s.update_payload(&mut snap, "pay-1", &serde_json::json!({"amount": 250}))
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let rec = s.get_record("pay-1").await.map_err(|e| e.to_string())?;
    if rec.status != "processing" {
        return Err(format!("expected processing, got {}", rec.status));
    }
    if rec.version != 1 || rec.history.len() != 1 {
        return Err(format!(
            "expected version 1 / history 1, got {} / {}",
            rec.version,
            rec.history.len()
        ));
    }
    if rec.payload["amount"] != serde_json::json!(250) {
        return Err(format!("payload not applied: {}", rec.payload));
    }
    Ok(())
}

/// A commit that hits a staged-precondition violation applies none of the
/// snapshot's operations.
async fn failed_commit_applies_nothing<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, &make_record("pay-1", "payment", "pending")).await?;

    // Stage an insert and a transition, then invalidate the transition's
    // version expectation by committing a competing snapshot first.
    let mut loser = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_record(&mut loser, &make_record("pay-2", "payment", "pending"))
        .await
        .map_err(|e| e.to_string())?;
    let entry = make_entry("system", "pending", "failed", "2026-01-02T00:00:00Z");
    s.apply_transition(&mut loser, "pay-1", 0, "failed", &entry)
        .await
        .map_err(|e| e.to_string())?;

    let mut winner = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let entry = make_entry("system", "pending", "success", "2026-01-02T00:00:01Z");
    s.apply_transition(&mut winner, "pay-1", 0, "success", &entry)
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(winner).await.map_err(|e| e.to_string())?;

    match s.commit_snapshot(loser).await {
        Err(StorageError::ConcurrentConflict { .. }) => {}
        Err(e) => return Err(format!("expected ConcurrentConflict, got {:?}", e)),
        Ok(()) => return Err("losing commit succeeded".to_string()),
    }

    // The loser's insert must not have landed either.
    match s.get_record("pay-2").await {
        Err(StorageError::RecordNotFound { .. }) => Ok(()),
        Err(e) => Err(format!("expected RecordNotFound, got {:?}", e)),
        Ok(_) => Err("partial commit: insert from failed snapshot landed".to_string()),
    }
}

async fn snapshot_observes_own_staged_transition<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, &make_record("def-1", "deferment_request", "pending")).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let entry = make_entry("registrar1", "pending", "approved", "2026-01-02T00:00:00Z");
    s.apply_transition(&mut snap, "def-1", 0, "approved", &entry)
        .await
        .map_err(|e| e.to_string())?;

    let rec = s
        .get_record_for_update(&mut snap, "def-1")
        .await
        .map_err(|e| e.to_string())?;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;
    if rec.status != "approved" || rec.version != 1 {
        return Err(format!(
            "snapshot read missed staged write: status={} version={}",
            rec.status, rec.version
        ));
    }
    Ok(())
}
