//! Conformance test suite for `RecordStorage` implementations.
//!
//! A backend-agnostic test suite that any `RecordStorage` implementation
//! can run to verify correctness. The suite covers:
//!
//! - **Initialization**: record insertion, duplicate detection, reads
//! - **Snapshot isolation**: uncommitted writes invisible, abort discards,
//!   all-or-nothing commit of multi-operation snapshots
//! - **Version validation / OCC**: transition bumps, stale-version
//!   conflicts, racing snapshots producing exactly one winner
//! - **Queries and non-lifecycle mutation**: filters, payload replacement
//!   leaving lifecycle fields untouched, deletion
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function
//! that creates a fresh, empty storage instance for each test:
//!
//! ```ignore
//! use provost_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn file_conformance() {
//!     let report = run_conformance_suite(|| async {
//!         create_test_file_storage().await
//!     }).await;
//!     assert_eq!(report.failed, 0, "{report}");
//! }
//! ```

mod init;
mod query;
mod snapshot;
mod version;

use std::fmt;
use std::future::Future;

use crate::record::{Record, TransitionEntry};
use crate::RecordStorage;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "init", "snapshot", "version").
    pub category: String,
    /// Test name (e.g. "insert_creates_record_at_version_0").
    pub name: String,
    /// Whether the test passed.
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self {
                category: category.to_string(),
                name: name.to_string(),
                passed: true,
                message: None,
            },
            Err(msg) => Self {
                category: category.to_string(),
                name: name.to_string(),
                passed: false,
                message: Some(msg),
            },
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a storage backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// storage instance, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: RecordStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(init::run_init_tests(&factory).await);
    results.extend(snapshot::run_snapshot_tests(&factory).await);
    results.extend(version::run_version_tests(&factory).await);
    results.extend(query::run_query_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers: record constructors with sensible defaults ──────────────

fn make_record(id: &str, record_type: &str, status: &str) -> Record {
    Record {
        id: id.to_string(),
        record_type: record_type.to_string(),
        status: status.to_string(),
        payload: serde_json::json!({"amount": 100}),
        created_at: "2026-01-01T00:00:00Z".to_string(),
        updated_at: "2026-01-01T00:00:00Z".to_string(),
        version: 0,
        history: vec![],
    }
}

fn make_entry(actor: &str, from: &str, to: &str, at: &str) -> TransitionEntry {
    TransitionEntry {
        actor: actor.to_string(),
        from_status: from.to_string(),
        to_status: to.to_string(),
        at: at.to_string(),
        note: None,
    }
}

/// Insert a record and commit, as a single-operation snapshot.
async fn seed<S: RecordStorage>(storage: &S, record: &Record) -> Result<(), String> {
    let mut snap = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    storage
        .insert_record(&mut snap, record)
        .await
        .map_err(|e| e.to_string())?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| e.to_string())
}
