use std::future::Future;

use super::{make_entry, make_record, seed, TestResult};
use crate::record::RecordFilter;
use crate::{RecordStorage, StorageError};

pub(super) async fn run_query_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: RecordStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "query",
        "list_filters_by_record_type",
        list_filters_by_record_type(factory).await,
    ));
    results.push(TestResult::from_result(
        "query",
        "list_filters_by_status",
        list_filters_by_status(factory).await,
    ));
    results.push(TestResult::from_result(
        "query",
        "list_filters_by_actor",
        list_filters_by_actor(factory).await,
    ));
    results.push(TestResult::from_result(
        "query",
        "list_filters_by_date_range",
        list_filters_by_date_range(factory).await,
    ));
    results.push(TestResult::from_result(
        "query",
        "payload_update_preserves_lifecycle_fields",
        payload_update_preserves_lifecycle_fields(factory).await,
    ));
    results.push(TestResult::from_result(
        "query",
        "delete_removes_record",
        delete_removes_record(factory).await,
    ));
    results.push(TestResult::from_result(
        "query",
        "committed_write_visible_to_next_query",
        committed_write_visible_to_next_query(factory).await,
    ));

    results
}

// ── Test implementations ─────────────────────────────────────────────

async fn list_filters_by_record_type<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, &make_record("pay-1", "payment", "pending")).await?;
    seed(&s, &make_record("pay-2", "payment", "pending")).await?;
    seed(&s, &make_record("bud-1", "budget", "pending")).await?;

    let payments = s
        .list_records("payment", &RecordFilter::default())
        .await
        .map_err(|e| e.to_string())?;
    if payments.len() != 2 {
        return Err(format!("expected 2 payments, got {}", payments.len()));
    }
    if payments.iter().any(|r| r.record_type != "payment") {
        return Err("foreign record type in listing".to_string());
    }
    Ok(())
}

async fn list_filters_by_status<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, &make_record("pay-1", "payment", "pending")).await?;
    seed(&s, &make_record("pay-2", "payment", "success")).await?;

    let filter = RecordFilter {
        status: Some("success".to_string()),
        ..Default::default()
    };
    let hits = s
        .list_records("payment", &filter)
        .await
        .map_err(|e| e.to_string())?;
    if hits.len() != 1 || hits[0].id != "pay-2" {
        return Err(format!("expected [pay-2], got {:?}", hits));
    }
    Ok(())
}

async fn list_filters_by_actor<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut touched = make_record("def-1", "deferment_request", "approved");
    touched.version = 1;
    touched.history.push(make_entry(
        "registrar1",
        "pending",
        "approved",
        "2026-01-02T00:00:00Z",
    ));
    seed(&s, &touched).await?;
    seed(&s, &make_record("def-2", "deferment_request", "pending")).await?;

    let filter = RecordFilter {
        actor: Some("registrar1".to_string()),
        ..Default::default()
    };
    let hits = s
        .list_records("deferment_request", &filter)
        .await
        .map_err(|e| e.to_string())?;
    if hits.len() != 1 || hits[0].id != "def-1" {
        return Err(format!("expected [def-1], got {:?}", hits));
    }
    Ok(())
}

async fn list_filters_by_date_range<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut early = make_record("pay-1", "payment", "pending");
    early.created_at = "2026-01-01T00:00:00Z".to_string();
    let mut late = make_record("pay-2", "payment", "pending");
    late.created_at = "2026-06-01T00:00:00Z".to_string();
    seed(&s, &early).await?;
    seed(&s, &late).await?;

    let filter = RecordFilter {
        created_after: Some("2026-03-01T00:00:00Z".to_string()),
        ..Default::default()
    };
    let hits = s
        .list_records("payment", &filter)
        .await
        .map_err(|e| e.to_string())?;
    if hits.len() != 1 || hits[0].id != "pay-2" {
        return Err(format!("expected [pay-2], got {:?}", hits));
    }
    Ok(())
}

async fn payload_update_preserves_lifecycle_fields<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut record = make_record("bud-1", "budget", "approved");
    record.version = 1;
    record.history.push(make_entry(
        "dean1",
        "pending",
        "approved",
        "2026-01-02T00:00:00Z",
    ));
    record.updated_at = "2026-01-02T00:00:00Z".to_string();
    seed(&s, &record).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.update_payload(&mut snap, "bud-1", &serde_json::json!({"allocated": 5000}))
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let rec = s.get_record("bud-1").await.map_err(|e| e.to_string())?;
    if rec.payload != serde_json::json!({"allocated": 5000}) {
        return Err(format!("payload not replaced: {}", rec.payload));
    }
    if rec.status != "approved"
        || rec.version != 1
        || rec.history.len() != 1
        || rec.updated_at != "2026-01-02T00:00:00Z"
    {
        return Err("payload update disturbed lifecycle fields".to_string());
    }
    Ok(())
}

async fn delete_removes_record<S, F, Fut>(factory: &F) -> Result<(), String>
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
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    match s.get_record("bud-1").await {
        Err(StorageError::RecordNotFound { .. }) => Ok(()),
        Err(e) => Err(format!("expected RecordNotFound, got {:?}", e)),
        Ok(_) => Err("record survived delete".to_string()),
    }
}

/// Read-your-writes: a commit is visible to the very next query.
async fn committed_write_visible_to_next_query<S, F, Fut>(factory: &F) -> Result<(), String>
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
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let rec = s.get_record("pay-1").await.map_err(|e| e.to_string())?;
    if rec.status != "success" {
        return Err(format!("stale read after commit: {}", rec.status));
    }
    Ok(())
}
