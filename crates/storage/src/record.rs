use serde::{Deserialize, Serialize};

/// A persisted unit of business data with a lifecycle status.
///
/// `status`, `updated_at`, `version`, and `history` are lifecycle fields:
/// only the lifecycle engine writes them, and only through
/// [`crate::RecordStorage::apply_transition`]. `payload` is the type-specific
/// document body (amounts, course codes, student ids) and may be replaced
/// while the record is non-terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub record_type: String,
    pub status: String,
    pub payload: serde_json::Value,
    /// RFC 3339 timestamp string. Never changes after creation.
    pub created_at: String,
    /// RFC 3339 timestamp string. Equals the last history entry's `at`,
    /// or `created_at` while the history is empty.
    pub updated_at: String,
    /// Optimistic concurrency token. Starts at 0; bumped by exactly one
    /// on each committed transition.
    pub version: i64,
    /// Append-only transition log. The last entry's `to_status` always
    /// equals the current `status`.
    pub history: Vec<TransitionEntry>,
}

impl Record {
    /// The most recent transition, if any.
    pub fn last_transition(&self) -> Option<&TransitionEntry> {
        self.history.last()
    }
}

/// One committed lifecycle move: who, from where, to where, when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionEntry {
    /// Opaque pre-authorized identity of the caller. The engine records
    /// it; authorization is the identity collaborator's job.
    pub actor: String,
    pub from_status: String,
    pub to_status: String,
    /// RFC 3339 timestamp string.
    pub at: String,
    pub note: Option<String>,
}

/// Filter for [`crate::RecordStorage::list_records`]. All fields are
/// conjunctive; `None` means "any".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFilter {
    pub status: Option<String>,
    /// Matches records whose history contains an entry by this actor.
    pub actor: Option<String>,
    /// Inclusive RFC 3339 lower bound on `created_at`. Lexicographic
    /// comparison is correct for this format.
    pub created_after: Option<String>,
    /// Inclusive RFC 3339 upper bound on `created_at`.
    pub created_before: Option<String>,
}

impl RecordFilter {
    /// True if `record` satisfies every set field.
    pub fn matches(&self, record: &Record) -> bool {
        if let Some(status) = &self.status {
            if &record.status != status {
                return false;
            }
        }
        if let Some(actor) = &self.actor {
            if !record.history.iter().any(|e| &e.actor == actor) {
                return false;
            }
        }
        if let Some(after) = &self.created_after {
            if record.created_at.as_str() < after.as_str() {
                return false;
            }
        }
        if let Some(before) = &self.created_before {
            if record.created_at.as_str() > before.as_str() {
                return false;
            }
        }
        true
    }
}

/// Current UTC time as an RFC 3339 string with second precision.
pub fn now_rfc3339() -> String {
    let now = time::OffsetDateTime::now_utc();
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        now.year(),
        now.month() as u8,
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    )
}
