use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::{Record, RecordFilter, TransitionEntry};

/// The storage trait for Provost record backends.
///
/// A `RecordStorage` implementation provides durable, transactional
/// storage for lifecycle records: creation, payload updates, deletion,
/// status transitions, and point/range queries.
///
/// ## Snapshot Semantics
///
/// All mutating operations take `&mut Self::Snapshot`, a type representing
/// an in-progress transaction. The lifecycle is:
///
/// 1. `begin_snapshot()` — start a transaction, returns a `Snapshot`
/// 2. Call mutating methods with `&mut snapshot`
/// 3. `commit_snapshot(snapshot)` — commit and consume the transaction
///    OR `abort_snapshot(snapshot)` — roll back and consume the transaction
///
/// If a `Snapshot` is dropped without committing, the underlying
/// transaction MUST be rolled back.
///
/// ## OCC Conflict Detection
///
/// `apply_transition` is conditional on `version = expected_version`. If
/// the stored version differs — at call time or when the snapshot commits —
/// the result is `Err(StorageError::ConcurrentConflict { ... })`. This is
/// the only path that writes `status`, `updated_at`, `version`, or
/// `history`, and it writes all four together: no intermediate state is
/// ever observable.
///
/// ## Consistency
///
/// Queries outside a snapshot see a fresh view on every call; no cursor
/// stability is guaranteed across concurrent writes. A caller that just
/// committed a snapshot must see its own writes on the next query
/// (read-your-writes).
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` to be shared across
/// async task boundaries and axum application state.
#[async_trait]
pub trait RecordStorage: Send + Sync + 'static {
    /// The snapshot (transaction) type used by this storage backend.
    ///
    /// Must be `Send` to allow passing across async task boundaries.
    type Snapshot: Send;

    // ── Snapshot lifecycle ───────────────────────────────────────────

    /// Begin a new snapshot (transaction).
    async fn begin_snapshot(&self) -> Result<Self::Snapshot, StorageError>;

    /// Commit a snapshot, making all staged mutations durable atomically.
    ///
    /// Preconditions staged earlier (version checks, id uniqueness) are
    /// re-validated here; on any violation nothing is applied and the
    /// corresponding error is returned.
    async fn commit_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    /// Abort (roll back) a snapshot, discarding all staged mutations.
    async fn abort_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    // ── Mutations (within snapshot) ──────────────────────────────────

    /// Stage insertion of a new record.
    ///
    /// Returns `Err(StorageError::AlreadyExists)` if a record with the
    /// same id exists.
    async fn insert_record(
        &self,
        snapshot: &mut Self::Snapshot,
        record: &Record,
    ) -> Result<(), StorageError>;

    /// Read a record with intent to modify it in this snapshot.
    ///
    /// The returned record reflects mutations already staged in this
    /// snapshot. Returns `Err(StorageError::RecordNotFound)` if it does
    /// not exist.
    async fn get_record_for_update(
        &self,
        snapshot: &mut Self::Snapshot,
        record_id: &str,
    ) -> Result<Record, StorageError>;

    /// Stage a version-validated lifecycle transition (OCC).
    ///
    /// Atomically (with respect to the commit) sets `status` to
    /// `new_status`, appends `entry` to the history, sets `updated_at` to
    /// `entry.at`, and bumps `version` by one. Conditional on
    /// `version = expected_version`; fails with `ConcurrentConflict`
    /// otherwise.
    ///
    /// Returns the version the record will have once committed.
    async fn apply_transition(
        &self,
        snapshot: &mut Self::Snapshot,
        record_id: &str,
        expected_version: i64,
        new_status: &str,
        entry: &TransitionEntry,
    ) -> Result<i64, StorageError>;

    /// Stage a replacement of the record's payload.
    ///
    /// Lifecycle fields (`status`, `updated_at`, `version`, `history`) are
    /// not touched. Policy — whether the record's status permits payload
    /// mutation at all — is the engine's job, not the store's.
    async fn update_payload(
        &self,
        snapshot: &mut Self::Snapshot,
        record_id: &str,
        payload: &serde_json::Value,
    ) -> Result<(), StorageError>;

    /// Stage deletion of a record.
    async fn delete_record(
        &self,
        snapshot: &mut Self::Snapshot,
        record_id: &str,
    ) -> Result<(), StorageError>;

    // ── Queries (outside snapshot) ───────────────────────────────────

    /// Read a record's current committed state.
    async fn get_record(&self, record_id: &str) -> Result<Record, StorageError>;

    /// List committed records of one type matching `filter`.
    ///
    /// Each call is a fresh snapshot of the store; re-querying may return
    /// a different set under concurrent writes.
    async fn list_records(
        &self,
        record_type: &str,
        filter: &RecordFilter,
    ) -> Result<Vec<Record>, StorageError>;
}
