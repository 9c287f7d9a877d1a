use std::fmt;

use provost_core::WorkflowError;
use provost_storage::{Record, StorageError};

/// Errors returned by the lifecycle engine.
///
/// `IllegalTransition` and `ConcurrentModification` carry the current
/// (refreshed) record so a caller can decide its next legal move without
/// a second round trip.
#[derive(Debug)]
pub enum EngineError {
    /// Unknown record type or status literal (closed-set violation).
    Workflow(WorkflowError),
    /// `create` was called with a status other than the type's start state.
    InvalidInitialState {
        record_type: String,
        status: String,
        expected: String,
    },
    /// No record with the given id.
    NotFound { record_id: String },
    /// The requested move is not in the type's transition table.
    IllegalTransition {
        record_id: String,
        from_status: String,
        to_status: String,
        current: Box<Record>,
    },
    /// The record moved between this call's read and its write. The engine
    /// does not retry; re-read `current` and re-decide.
    ConcurrentModification {
        record_id: String,
        current: Box<Record>,
    },
    /// The record's status forbids the requested non-lifecycle operation
    /// (payload update or delete on a terminal record).
    Forbidden {
        record_id: String,
        status: String,
        action: String,
    },
    /// A storage fault unrelated to lifecycle rules.
    Store(StorageError),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Workflow(e) => write!(f, "{}", e),
            EngineError::InvalidInitialState {
                record_type,
                status,
                expected,
            } => {
                write!(
                    f,
                    "invalid initial state '{}' for record type '{}': records start at '{}'",
                    status, record_type, expected
                )
            }
            EngineError::NotFound { record_id } => {
                write!(f, "record not found: {}", record_id)
            }
            EngineError::IllegalTransition {
                record_id,
                from_status,
                to_status,
                ..
            } => {
                write!(
                    f,
                    "illegal transition for record {}: '{}' -> '{}'",
                    record_id, from_status, to_status
                )
            }
            EngineError::ConcurrentModification { record_id, current } => {
                write!(
                    f,
                    "record {} was modified concurrently (now '{}' at version {})",
                    record_id, current.status, current.version
                )
            }
            EngineError::Forbidden {
                record_id,
                status,
                action,
            } => {
                write!(
                    f,
                    "cannot {} record {}: status '{}' is terminal",
                    action, record_id, status
                )
            }
            EngineError::Store(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<WorkflowError> for EngineError {
    fn from(e: WorkflowError) -> Self {
        EngineError::Workflow(e)
    }
}

impl From<StorageError> for EngineError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::RecordNotFound { record_id } => EngineError::NotFound { record_id },
            other => EngineError::Store(other),
        }
    }
}
