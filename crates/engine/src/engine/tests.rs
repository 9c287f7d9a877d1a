use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use provost_core::{builtin_registry, BUDGET, DEFERMENT_REQUEST, GRADE_SUBMISSION, PAYMENT};
use provost_storage::{
    MemoryStorage, Record, RecordFilter, RecordStorage, StorageError, TransitionEntry,
};

use crate::error::EngineError;
use crate::observer::{ObserverError, TransitionObserver};
use crate::observers::GradePublicationObserver;
use crate::LifecycleEngine;

fn engine() -> LifecycleEngine<MemoryStorage> {
    LifecycleEngine::new(Arc::new(MemoryStorage::new()), builtin_registry())
}

/// Observer that appends its name to a shared log and succeeds.
struct RecordingObserver {
    label: &'static str,
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl TransitionObserver for RecordingObserver {
    fn name(&self) -> &str {
        self.label
    }
    async fn on_transition(&self, _record: &Record) -> Result<(), ObserverError> {
        self.log.lock().unwrap().push(self.label.to_string());
        Ok(())
    }
}

/// Observer that always fails.
struct FailingObserver;

#[async_trait]
impl TransitionObserver for FailingObserver {
    fn name(&self) -> &str {
        "failing"
    }
    async fn on_transition(&self, _record: &Record) -> Result<(), ObserverError> {
        Err(ObserverError::new("downstream write refused"))
    }
}

// ──────────────────────────────────────
// Creation
// ──────────────────────────────────────

#[tokio::test]
async fn create_assigns_start_state_and_empty_history() {
    let engine = engine();
    let record = engine
        .create(PAYMENT, "pending", serde_json::json!({"amount": 1500}))
        .await
        .unwrap();

    assert_eq!(record.status, "pending");
    assert_eq!(record.version, 0);
    assert!(record.history.is_empty());
    assert_eq!(record.created_at, record.updated_at);

    let stored = engine.get(&record.id).await.unwrap();
    assert_eq!(stored, record);
}

#[tokio::test]
async fn create_normalizes_cased_initial_status() {
    let engine = engine();
    let record = engine
        .create(PAYMENT, "  Pending ", serde_json::json!({}))
        .await
        .unwrap();
    assert_eq!(record.status, "pending");
}

#[tokio::test]
async fn create_rejects_non_start_initial_status() {
    let engine = engine();
    let err = engine
        .create(PAYMENT, "success", serde_json::json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInitialState { .. }));
}

#[tokio::test]
async fn create_rejects_unknown_type() {
    let engine = engine();
    let err = engine
        .create("invoice", "pending", serde_json::json!({}))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Workflow(provost_core::WorkflowError::UnknownType { .. })
    ));
}

#[tokio::test]
async fn create_rejects_unknown_status_literal() {
    let engine = engine();
    let err = engine
        .create(PAYMENT, "queued", serde_json::json!({}))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Workflow(provost_core::WorkflowError::UnknownStatus { .. })
    ));
}

#[tokio::test]
async fn get_unknown_record_is_not_found() {
    let engine = engine();
    let err = engine.get("ghost").await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound { .. }));
}

// ──────────────────────────────────────
// Transition legality
// ──────────────────────────────────────

#[tokio::test]
async fn moves_absent_from_table_fail_and_leave_record_unchanged() {
    let engine = engine();
    let record = engine
        .create(GRADE_SUBMISSION, "pending_approval", serde_json::json!({"grades": []}))
        .await
        .unwrap();

    // Neither skipping a step nor moving backwards is in the table.
    for illegal_to in ["published", "pending_approval"] {
        let err = engine
            .transition(&record.id, illegal_to, "examofficer1", None)
            .await
            .unwrap_err();
        assert!(
            matches!(err, EngineError::IllegalTransition { .. }),
            "expected IllegalTransition for {}, got {}",
            illegal_to,
            err
        );
    }

    let stored = engine.get(&record.id).await.unwrap();
    assert_eq!(stored.status, "pending_approval");
    assert_eq!(stored.version, 0);
    assert!(stored.history.is_empty());
}

#[tokio::test]
async fn illegal_transition_carries_current_record() {
    let engine = engine();
    let record = engine
        .create(PAYMENT, "pending", serde_json::json!({}))
        .await
        .unwrap();
    engine
        .transition(&record.id, "success", "system", None)
        .await
        .unwrap();

    let err = engine
        .transition(&record.id, "pending", "system", None)
        .await
        .unwrap_err();
    match err {
        EngineError::IllegalTransition {
            from_status,
            to_status,
            current,
            ..
        } => {
            assert_eq!(from_status, "success");
            assert_eq!(to_status, "pending");
            assert_eq!(current.status, "success");
            assert_eq!(current.version, 1);
        }
        other => panic!("expected IllegalTransition, got {}", other),
    }
}

#[tokio::test]
async fn transition_target_outside_state_set_is_unknown_status() {
    let engine = engine();
    let record = engine
        .create(PAYMENT, "pending", serde_json::json!({}))
        .await
        .unwrap();
    let err = engine
        .transition(&record.id, "published", "system", None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Workflow(provost_core::WorkflowError::UnknownStatus { .. })
    ));
}

#[tokio::test]
async fn transition_normalizes_target_status() {
    let engine = engine();
    let record = engine
        .create(DEFERMENT_REQUEST, "pending", serde_json::json!({}))
        .await
        .unwrap();
    let receipt = engine
        .transition(&record.id, "Approved", "registrar1", None)
        .await
        .unwrap();
    assert_eq!(receipt.record.status, "approved");
}

// ──────────────────────────────────────
// History integrity
// ──────────────────────────────────────

#[tokio::test]
async fn history_grows_by_one_per_transition_and_tracks_status() {
    let engine = engine();
    let record = engine
        .create(DEFERMENT_REQUEST, "pending", serde_json::json!({"reason": "medical"}))
        .await
        .unwrap();

    let receipt = engine
        .transition(&record.id, "approved", "registrar1", Some("fit to defer".to_string()))
        .await
        .unwrap();
    assert_eq!(receipt.record.history.len(), 1);

    let receipt = engine
        .transition(&record.id, "reactivated", "registrar2", None)
        .await
        .unwrap();

    let stored = engine.get(&record.id).await.unwrap();
    assert_eq!(stored, receipt.record);
    assert_eq!(stored.version, 2);
    assert_eq!(stored.history.len(), 2);

    let last = stored.history.last().unwrap();
    assert_eq!(last.to_status, stored.status);
    assert_eq!(last.actor, "registrar2");
    assert_eq!(stored.updated_at, last.at);

    let first = &stored.history[0];
    assert_eq!(first.from_status, "pending");
    assert_eq!(first.to_status, "approved");
    assert_eq!(first.note.as_deref(), Some("fit to defer"));
}

// ──────────────────────────────────────
// Scenario A: grade submission approve -> publish with fan-out
// ──────────────────────────────────────

#[tokio::test]
async fn grade_submission_publish_creates_derived_student_grades() {
    let engine = engine();
    engine
        .observers()
        .register(
            GRADE_SUBMISSION,
            "published",
            Arc::new(GradePublicationObserver::new(Arc::clone(engine.storage()))),
        )
        .await;

    let record = engine
        .create(
            GRADE_SUBMISSION,
            "pending_approval",
            serde_json::json!({"grades": [{"studentId": "S1", "total": 84, "grade": "A"}]}),
        )
        .await
        .unwrap();

    let receipt = engine
        .transition(&record.id, "approved", "examofficer1", None)
        .await
        .unwrap();
    assert_eq!(receipt.record.status, "approved");
    assert_eq!(receipt.record.history.len(), 1);
    assert!(receipt.fully_applied());

    let receipt = engine
        .transition(&record.id, "published", "examofficer1", None)
        .await
        .unwrap();
    assert_eq!(receipt.record.status, "published");
    assert_eq!(receipt.record.history.len(), 2);
    assert!(receipt.fully_applied());

    let rows = engine
        .list(provost_core::STUDENT_GRADE, &RecordFilter::default())
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].payload["studentId"], serde_json::json!("S1"));
    assert_eq!(rows[0].payload["submissionId"], serde_json::json!(record.id));
}

// ──────────────────────────────────────
// Scenario B: payment terminal back-edge
// ──────────────────────────────────────

#[tokio::test]
async fn settled_payment_cannot_return_to_pending() {
    let engine = engine();
    let record = engine
        .create(PAYMENT, "pending", serde_json::json!({"amount": 3000}))
        .await
        .unwrap();

    engine
        .transition(&record.id, "success", "system", None)
        .await
        .unwrap();

    let err = engine
        .transition(&record.id, "pending", "system", None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::IllegalTransition { .. }));
    assert_eq!(engine.get(&record.id).await.unwrap().status, "success");
}

// ──────────────────────────────────────
// Scenario C: concurrent transitions on one record
// ──────────────────────────────────────

/// Delegating storage whose first `gate_limit` outside reads rendezvous at
/// a barrier, forcing two engine calls to read the same version before
/// either writes.
struct ReadBarrierStorage {
    inner: MemoryStorage,
    barrier: tokio::sync::Barrier,
    gated: AtomicUsize,
    gate_limit: usize,
}

impl ReadBarrierStorage {
    fn new(inner: MemoryStorage, participants: usize) -> Self {
        Self {
            inner,
            barrier: tokio::sync::Barrier::new(participants),
            gated: AtomicUsize::new(0),
            gate_limit: participants,
        }
    }
}

#[async_trait]
impl RecordStorage for ReadBarrierStorage {
    type Snapshot = <MemoryStorage as RecordStorage>::Snapshot;

    async fn begin_snapshot(&self) -> Result<Self::Snapshot, StorageError> {
        self.inner.begin_snapshot().await
    }
    async fn commit_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError> {
        self.inner.commit_snapshot(snapshot).await
    }
    async fn abort_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError> {
        self.inner.abort_snapshot(snapshot).await
    }
    async fn insert_record(
        &self,
        snapshot: &mut Self::Snapshot,
        record: &Record,
    ) -> Result<(), StorageError> {
        self.inner.insert_record(snapshot, record).await
    }
    async fn get_record_for_update(
        &self,
        snapshot: &mut Self::Snapshot,
        record_id: &str,
    ) -> Result<Record, StorageError> {
        self.inner.get_record_for_update(snapshot, record_id).await
    }
    async fn apply_transition(
        &self,
        snapshot: &mut Self::Snapshot,
        record_id: &str,
        expected_version: i64,
        new_status: &str,
        entry: &TransitionEntry,
    ) -> Result<i64, StorageError> {
        self.inner
            .apply_transition(snapshot, record_id, expected_version, new_status, entry)
            .await
    }
    async fn update_payload(
        &self,
        snapshot: &mut Self::Snapshot,
        record_id: &str,
        payload: &serde_json::Value,
    ) -> Result<(), StorageError> {
        self.inner.update_payload(snapshot, record_id, payload).await
    }
    async fn delete_record(
        &self,
        snapshot: &mut Self::Snapshot,
        record_id: &str,
    ) -> Result<(), StorageError> {
        self.inner.delete_record(snapshot, record_id).await
    }
    async fn get_record(&self, record_id: &str) -> Result<Record, StorageError> {
        let result = self.inner.get_record(record_id).await;
        if self.gated.fetch_add(1, Ordering::SeqCst) < self.gate_limit {
            self.barrier.wait().await;
        }
        result
    }
    async fn list_records(
        &self,
        record_type: &str,
        filter: &RecordFilter,
    ) -> Result<Vec<Record>, StorageError> {
        self.inner.list_records(record_type, filter).await
    }
}

#[tokio::test]
async fn racing_transitions_one_winner_one_concurrent_modification() {
    let inner = MemoryStorage::new();
    let storage = Arc::new(ReadBarrierStorage::new(inner, 2));
    let engine = LifecycleEngine::new(Arc::clone(&storage), builtin_registry());

    // Seed directly so the create path does not consume a gated read.
    let seeded = Record {
        id: "def-1".to_string(),
        record_type: DEFERMENT_REQUEST.to_string(),
        status: "pending".to_string(),
        payload: serde_json::json!({"reason": "medical"}),
        created_at: "2026-01-01T00:00:00Z".to_string(),
        updated_at: "2026-01-01T00:00:00Z".to_string(),
        version: 0,
        history: vec![],
    };
    let mut snap = storage.begin_snapshot().await.unwrap();
    storage.insert_record(&mut snap, &seeded).await.unwrap();
    storage.commit_snapshot(snap).await.unwrap();

    // Both calls read version 0 before either commits.
    let (a, b) = tokio::join!(
        engine.transition("def-1", "approved", "registrar1", None),
        engine.transition("def-1", "declined", "registrar2", None),
    );

    let mut receipts = Vec::new();
    let mut errors = Vec::new();
    for result in [a, b] {
        match result {
            Ok(receipt) => receipts.push(receipt),
            Err(e) => errors.push(e),
        }
    }
    assert_eq!(receipts.len(), 1, "expected exactly one winner");
    assert_eq!(errors.len(), 1, "expected exactly one loser");
    let winner = &receipts[0];

    match &errors[0] {
        EngineError::ConcurrentModification { current, .. } => {
            assert_eq!(current.status, winner.record.status);
            assert_eq!(current.version, 1);
        }
        other => panic!("expected ConcurrentModification, got {}", other),
    }

    let stored = engine.get("def-1").await.unwrap();
    assert_eq!(stored.status, winner.record.status);
    assert_eq!(stored.version, 1);
    assert_eq!(stored.history.len(), 1);
}

// ──────────────────────────────────────
// Observers: ordering, partial success, unregistration
// ──────────────────────────────────────

#[tokio::test]
async fn observers_run_synchronously_in_registration_order() {
    let engine = engine();
    let log = Arc::new(Mutex::new(Vec::new()));
    engine
        .observers()
        .register(
            PAYMENT,
            "success",
            Arc::new(RecordingObserver {
                label: "first",
                log: Arc::clone(&log),
            }),
        )
        .await;
    engine
        .observers()
        .register(
            PAYMENT,
            "success",
            Arc::new(RecordingObserver {
                label: "second",
                log: Arc::clone(&log),
            }),
        )
        .await;

    let record = engine
        .create(PAYMENT, "pending", serde_json::json!({}))
        .await
        .unwrap();
    let receipt = engine
        .transition(&record.id, "success", "system", None)
        .await
        .unwrap();

    assert!(receipt.fully_applied());
    assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
}

#[tokio::test]
async fn observer_failure_surfaces_but_transition_stays_committed() {
    let engine = engine();
    engine
        .observers()
        .register(PAYMENT, "success", Arc::new(FailingObserver))
        .await;

    let record = engine
        .create(PAYMENT, "pending", serde_json::json!({}))
        .await
        .unwrap();
    let receipt = engine
        .transition(&record.id, "success", "system", None)
        .await
        .unwrap();

    assert!(!receipt.fully_applied());
    assert_eq!(receipt.observer_failures.len(), 1);
    assert_eq!(receipt.observer_failures[0].observer, "failing");

    // The transition itself is durable despite the failed side effect.
    assert_eq!(engine.get(&record.id).await.unwrap().status, "success");
}

#[tokio::test]
async fn unregistered_observer_is_not_invoked() {
    let engine = engine();
    let log = Arc::new(Mutex::new(Vec::new()));
    let id = engine
        .observers()
        .register(
            PAYMENT,
            "success",
            Arc::new(RecordingObserver {
                label: "ephemeral",
                log: Arc::clone(&log),
            }),
        )
        .await;
    assert!(engine.observers().unregister(id).await);

    let record = engine
        .create(PAYMENT, "pending", serde_json::json!({}))
        .await
        .unwrap();
    engine
        .transition(&record.id, "success", "system", None)
        .await
        .unwrap();

    assert!(log.lock().unwrap().is_empty());
}

// ──────────────────────────────────────
// Scenario D and delete/update policy
// ──────────────────────────────────────

#[tokio::test]
async fn budget_payload_editable_then_deletable_regardless_of_status() {
    let engine = engine();
    let record = engine
        .create(BUDGET, "pending", serde_json::json!({"allocatedAmount": 2000}))
        .await
        .unwrap();

    let updated = engine
        .update(&record.id, |payload| {
            payload["allocatedAmount"] = serde_json::json!(5000);
        })
        .await
        .unwrap();
    assert_eq!(updated.payload["allocatedAmount"], serde_json::json!(5000));
    assert_eq!(updated.version, 0);

    // Even after reaching a terminal status, budgets stay deletable.
    engine
        .transition(&record.id, "approved", "dean1", None)
        .await
        .unwrap();
    engine.delete(&record.id).await.unwrap();
    assert!(matches!(
        engine.get(&record.id).await.unwrap_err(),
        EngineError::NotFound { .. }
    ));
}

#[tokio::test]
async fn terminal_record_payload_is_frozen() {
    let engine = engine();
    let record = engine
        .create(PAYMENT, "pending", serde_json::json!({"amount": 100}))
        .await
        .unwrap();
    engine
        .transition(&record.id, "success", "system", None)
        .await
        .unwrap();

    let err = engine
        .update(&record.id, |payload| {
            payload["amount"] = serde_json::json!(999);
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden { .. }));
    assert_eq!(
        engine.get(&record.id).await.unwrap().payload["amount"],
        serde_json::json!(100)
    );
}

#[tokio::test]
async fn terminal_non_budget_record_cannot_be_deleted() {
    let engine = engine();
    let record = engine
        .create(PAYMENT, "pending", serde_json::json!({}))
        .await
        .unwrap();
    engine
        .transition(&record.id, "failed", "system", None)
        .await
        .unwrap();

    let err = engine.delete(&record.id).await.unwrap_err();
    match err {
        EngineError::Forbidden { status, action, .. } => {
            assert_eq!(status, "failed");
            assert_eq!(action, "delete");
        }
        other => panic!("expected Forbidden, got {}", other),
    }
}

#[tokio::test]
async fn non_terminal_record_can_be_deleted() {
    let engine = engine();
    let record = engine
        .create(DEFERMENT_REQUEST, "pending", serde_json::json!({}))
        .await
        .unwrap();
    engine.delete(&record.id).await.unwrap();
    assert!(matches!(
        engine.get(&record.id).await.unwrap_err(),
        EngineError::NotFound { .. }
    ));
}

// ──────────────────────────────────────
// Listing
// ──────────────────────────────────────

#[tokio::test]
async fn list_normalizes_status_filter() {
    let engine = engine();
    let record = engine
        .create(PAYMENT, "pending", serde_json::json!({}))
        .await
        .unwrap();
    engine
        .transition(&record.id, "success", "system", None)
        .await
        .unwrap();
    engine
        .create(PAYMENT, "pending", serde_json::json!({}))
        .await
        .unwrap();

    let filter = RecordFilter {
        status: Some("Success".to_string()),
        ..Default::default()
    };
    let hits = engine.list(PAYMENT, &filter).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, record.id);
}

#[tokio::test]
async fn list_rejects_status_outside_state_set() {
    let engine = engine();
    let filter = RecordFilter {
        status: Some("published".to_string()),
        ..Default::default()
    };
    let err = engine.list(PAYMENT, &filter).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Workflow(provost_core::WorkflowError::UnknownStatus { .. })
    ));
}

#[tokio::test]
async fn list_unknown_type_fails() {
    let engine = engine();
    let err = engine
        .list("invoice", &RecordFilter::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Workflow(provost_core::WorkflowError::UnknownType { .. })
    ));
}
