/// All errors that can be returned by a RecordStorage implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Optimistic concurrency control conflict — another transaction moved
    /// the record concurrently. The expected version was not found.
    #[error("concurrent conflict on record {record_id}: expected version {expected_version}")]
    ConcurrentConflict {
        record_id: String,
        expected_version: i64,
    },

    /// No record with the given id.
    #[error("record not found: {record_id}")]
    RecordNotFound { record_id: String },

    /// A record with this id already exists.
    #[error("record already exists: {record_id}")]
    AlreadyExists { record_id: String },

    /// The backing store is unreachable or timed out. Surfaced to callers
    /// as-is; the engine does not retry.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A backend-specific storage error (I/O, serialization, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}
