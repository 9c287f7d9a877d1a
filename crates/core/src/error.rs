use std::fmt;

/// Errors raised while constructing or consulting workflow definitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    /// No workflow definition is registered for the record type.
    UnknownType { record_type: String },
    /// A status literal is not in the record type's declared state set.
    UnknownStatus {
        record_type: String,
        status: String,
    },
    /// A definition is internally inconsistent (bad initial state,
    /// transition endpoints outside the state set, duplicates).
    InvalidDefinition {
        record_type: String,
        message: String,
    },
}

impl fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowError::UnknownType { record_type } => {
                write!(f, "unknown record type: {}", record_type)
            }
            WorkflowError::UnknownStatus {
                record_type,
                status,
            } => {
                write!(
                    f,
                    "unknown status '{}' for record type '{}'",
                    status, record_type
                )
            }
            WorkflowError::InvalidDefinition {
                record_type,
                message,
            } => {
                write!(
                    f,
                    "invalid workflow definition for '{}': {}",
                    record_type, message
                )
            }
        }
    }
}

impl std::error::Error for WorkflowError {}
