use std::future::Future;

use super::{make_record, seed, TestResult};
use crate::{RecordStorage, StorageError};

pub(super) async fn run_init_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: RecordStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "init",
        "insert_creates_record_at_version_0",
        insert_creates_record_at_version_0(factory).await,
    ));
    results.push(TestResult::from_result(
        "init",
        "insert_preserves_all_fields",
        insert_preserves_all_fields(factory).await,
    ));
    results.push(TestResult::from_result(
        "init",
        "duplicate_insert_in_snapshot_returns_already_exists",
        duplicate_insert_in_snapshot_returns_already_exists(factory).await,
    ));
    results.push(TestResult::from_result(
        "init",
        "duplicate_insert_across_snapshots_returns_already_exists",
        duplicate_insert_across_snapshots_returns_already_exists(factory).await,
    ));
    results.push(TestResult::from_result(
        "init",
        "get_unknown_record_returns_not_found",
        get_unknown_record_returns_not_found(factory).await,
    ));
    results.push(TestResult::from_result(
        "init",
        "inserted_record_readable_for_update_in_same_snapshot",
        inserted_record_readable_for_update_in_same_snapshot(factory).await,
    ));
    results.push(TestResult::from_result(
        "init",
        "different_records_are_independent",
        different_records_are_independent(factory).await,
    ));

    results
}

// ── Test implementations ─────────────────────────────────────────────

/// After insert + commit, the record version must be 0 with no history.
async fn insert_creates_record_at_version_0<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, &make_record("pay-1", "payment", "pending")).await?;

    let rec = s.get_record("pay-1").await.map_err(|e| e.to_string())?;
    if rec.version != 0 {
        return Err(format!("expected version 0, got {}", rec.version));
    }
    if !rec.history.is_empty() {
        return Err(format!("expected empty history, got {}", rec.history.len()));
    }
    Ok(())
}

/// Every field written at insert must round-trip through the store.
async fn insert_preserves_all_fields<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let record = make_record("pay-1", "payment", "pending");
    seed(&s, &record).await?;

    let rec = s.get_record("pay-1").await.map_err(|e| e.to_string())?;
    if rec != record {
        return Err(format!("stored record differs: {:?} != {:?}", rec, record));
    }
    Ok(())
}

/// Inserting the same id twice within one snapshot must fail.
async fn duplicate_insert_in_snapshot_returns_already_exists<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: RecordStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let record = make_record("pay-1", "payment", "pending");
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_record(&mut snap, &record)
        .await
        .map_err(|e| e.to_string())?;
    match s.insert_record(&mut snap, &record).await {
        Err(StorageError::AlreadyExists { record_id }) if record_id == "pay-1" => Ok(()),
        Err(e) => Err(format!("expected AlreadyExists, got {:?}", e)),
        Ok(()) => Err("expected AlreadyExists, got Ok".to_string()),
    }
}

/// Inserting an id committed by an earlier snapshot must fail.
async fn duplicate_insert_across_snapshots_returns_already_exists<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: RecordStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let record = make_record("pay-1", "payment", "pending");
    seed(&s, &record).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    match s.insert_record(&mut snap, &record).await {
        Err(StorageError::AlreadyExists { .. }) => Ok(()),
        Err(e) => Err(format!("expected AlreadyExists, got {:?}", e)),
        Ok(()) => Err("expected AlreadyExists, got Ok".to_string()),
    }
}

async fn get_unknown_record_returns_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.get_record("missing").await {
        Err(StorageError::RecordNotFound { record_id }) if record_id == "missing" => Ok(()),
        Err(e) => Err(format!("expected RecordNotFound, got {:?}", e)),
        Ok(r) => Err(format!("expected RecordNotFound, got record {:?}", r.id)),
    }
}

/// A snapshot observes its own staged insert.
async fn inserted_record_readable_for_update_in_same_snapshot<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: RecordStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let record = make_record("pay-1", "payment", "pending");
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_record(&mut snap, &record)
        .await
        .map_err(|e| e.to_string())?;
    let rec = s
        .get_record_for_update(&mut snap, "pay-1")
        .await
        .map_err(|e| e.to_string())?;
    if rec.id != "pay-1" {
        return Err(format!("expected pay-1, got {}", rec.id));
    }
    Ok(())
}

async fn different_records_are_independent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, &make_record("pay-1", "payment", "pending")).await?;
    seed(&s, &make_record("bud-1", "budget", "pending")).await?;

    let pay = s.get_record("pay-1").await.map_err(|e| e.to_string())?;
    let bud = s.get_record("bud-1").await.map_err(|e| e.to_string())?;
    if pay.record_type != "payment" || bud.record_type != "budget" {
        return Err("record types crossed".to_string());
    }
    Ok(())
}
