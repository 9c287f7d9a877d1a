//! In-memory reference backend.
//!
//! `MemoryStorage` is the canonical `RecordStorage` implementation used by
//! engine tests, the ephemeral server mode, and as the transactional core
//! of the file-backed store. Snapshots stage mutations locally and observe
//! their own staged writes; nothing is visible to other callers until
//! `commit_snapshot`, which re-validates every staged precondition under
//! one lock and applies all staged operations or none of them. Dropping a
//! snapshot without committing discards it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::{Record, RecordFilter, TransitionEntry};
use crate::traits::RecordStorage;

/// Shared in-memory record map.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<HashMap<String, Record>>>,
}

/// Staged mutation, re-validated and applied at commit.
#[derive(Debug, Clone)]
enum PendingOp {
    Insert(Record),
    Transition {
        record_id: String,
        expected_version: i64,
        new_status: String,
        entry: TransitionEntry,
    },
    SetPayload {
        record_id: String,
        payload: serde_json::Value,
    },
    Delete {
        record_id: String,
    },
}

/// An in-progress transaction over a `MemoryStorage`.
///
/// `view` caches the snapshot's working copy of every record it has
/// touched (`None` = deleted or known-absent); `ops` is the replay log
/// applied at commit.
pub struct MemorySnapshot {
    ops: Vec<PendingOp>,
    view: HashMap<String, Option<Record>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with committed records, bypassing snapshots. Used
    /// when loading persisted state at startup.
    pub fn with_records(records: Vec<Record>) -> Self {
        let map = records.into_iter().map(|r| (r.id.clone(), r)).collect();
        Self {
            inner: Arc::new(Mutex::new(map)),
        }
    }

    /// All committed records, unordered. Used by the file backend to
    /// persist the committed state after a commit.
    pub fn dump(&self) -> Result<Vec<Record>, StorageError> {
        Ok(self.lock()?.values().cloned().collect())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Record>>, StorageError> {
        self.inner
            .lock()
            .map_err(|_| StorageError::Backend("memory store lock poisoned".to_string()))
    }

    /// Ensure the snapshot's view holds a working copy for `record_id`,
    /// seeded from committed state on first touch.
    fn materialize(
        &self,
        snapshot: &mut MemorySnapshot,
        record_id: &str,
    ) -> Result<(), StorageError> {
        if !snapshot.view.contains_key(record_id) {
            let committed = self.lock()?.get(record_id).cloned();
            snapshot.view.insert(record_id.to_string(), committed);
        }
        Ok(())
    }
}

/// Validate one staged operation against `map` and apply it. Used at
/// commit time, where `map` is a working copy of the committed state; any
/// error leaves the committed state untouched because the copy is simply
/// discarded.
fn check_and_apply(map: &mut HashMap<String, Record>, op: &PendingOp) -> Result<(), StorageError> {
    match op {
        PendingOp::Insert(record) => {
            if map.contains_key(&record.id) {
                return Err(StorageError::AlreadyExists {
                    record_id: record.id.clone(),
                });
            }
            map.insert(record.id.clone(), record.clone());
            Ok(())
        }
        PendingOp::Transition {
            record_id,
            expected_version,
            new_status,
            entry,
        } => {
            let record = map
                .get_mut(record_id)
                .ok_or_else(|| StorageError::RecordNotFound {
                    record_id: record_id.clone(),
                })?;
            if record.version != *expected_version {
                return Err(StorageError::ConcurrentConflict {
                    record_id: record_id.clone(),
                    expected_version: *expected_version,
                });
            }
            record.status = new_status.clone();
            record.updated_at = entry.at.clone();
            record.history.push(entry.clone());
            record.version += 1;
            Ok(())
        }
        PendingOp::SetPayload { record_id, payload } => {
            let record = map
                .get_mut(record_id)
                .ok_or_else(|| StorageError::RecordNotFound {
                    record_id: record_id.clone(),
                })?;
            record.payload = payload.clone();
            Ok(())
        }
        PendingOp::Delete { record_id } => map
            .remove(record_id)
            .map(|_| ())
            .ok_or_else(|| StorageError::RecordNotFound {
                record_id: record_id.clone(),
            }),
    }
}

#[async_trait]
impl RecordStorage for MemoryStorage {
    type Snapshot = MemorySnapshot;

    async fn begin_snapshot(&self) -> Result<MemorySnapshot, StorageError> {
        Ok(MemorySnapshot {
            ops: Vec::new(),
            view: HashMap::new(),
        })
    }

    async fn commit_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        if snapshot.ops.is_empty() {
            return Ok(());
        }
        let mut map = self.lock()?;
        // Replay against a working copy so a late conflict (another
        // snapshot committed since staging) applies nothing at all.
        let mut working = map.clone();
        for op in &snapshot.ops {
            check_and_apply(&mut working, op)?;
        }
        *map = working;
        Ok(())
    }

    async fn abort_snapshot(&self, _snapshot: MemorySnapshot) -> Result<(), StorageError> {
        Ok(())
    }

    async fn insert_record(
        &self,
        snapshot: &mut MemorySnapshot,
        record: &Record,
    ) -> Result<(), StorageError> {
        self.materialize(snapshot, &record.id)?;
        let slot = snapshot
            .view
            .get_mut(&record.id)
            .ok_or_else(|| StorageError::Backend("snapshot view missing slot".to_string()))?;
        if slot.is_some() {
            return Err(StorageError::AlreadyExists {
                record_id: record.id.clone(),
            });
        }
        *slot = Some(record.clone());
        snapshot.ops.push(PendingOp::Insert(record.clone()));
        Ok(())
    }

    async fn get_record_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
        record_id: &str,
    ) -> Result<Record, StorageError> {
        self.materialize(snapshot, record_id)?;
        snapshot
            .view
            .get(record_id)
            .and_then(|slot| slot.clone())
            .ok_or_else(|| StorageError::RecordNotFound {
                record_id: record_id.to_string(),
            })
    }

    async fn apply_transition(
        &self,
        snapshot: &mut MemorySnapshot,
        record_id: &str,
        expected_version: i64,
        new_status: &str,
        entry: &TransitionEntry,
    ) -> Result<i64, StorageError> {
        self.materialize(snapshot, record_id)?;
        let slot = snapshot
            .view
            .get_mut(record_id)
            .ok_or_else(|| StorageError::Backend("snapshot view missing slot".to_string()))?;
        let record = slot.as_mut().ok_or_else(|| StorageError::RecordNotFound {
            record_id: record_id.to_string(),
        })?;
        if record.version != expected_version {
            return Err(StorageError::ConcurrentConflict {
                record_id: record_id.to_string(),
                expected_version,
            });
        }
        record.status = new_status.to_string();
        record.updated_at = entry.at.clone();
        record.history.push(entry.clone());
        record.version += 1;
        let new_version = record.version;
        snapshot.ops.push(PendingOp::Transition {
            record_id: record_id.to_string(),
            expected_version,
            new_status: new_status.to_string(),
            entry: entry.clone(),
        });
        Ok(new_version)
    }

    async fn update_payload(
        &self,
        snapshot: &mut MemorySnapshot,
        record_id: &str,
        payload: &serde_json::Value,
    ) -> Result<(), StorageError> {
        self.materialize(snapshot, record_id)?;
        let slot = snapshot
            .view
            .get_mut(record_id)
            .ok_or_else(|| StorageError::Backend("snapshot view missing slot".to_string()))?;
        let record = slot.as_mut().ok_or_else(|| StorageError::RecordNotFound {
            record_id: record_id.to_string(),
        })?;
        record.payload = payload.clone();
        snapshot.ops.push(PendingOp::SetPayload {
            record_id: record_id.to_string(),
            payload: payload.clone(),
        });
        Ok(())
    }

    async fn delete_record(
        &self,
        snapshot: &mut MemorySnapshot,
        record_id: &str,
    ) -> Result<(), StorageError> {
        self.materialize(snapshot, record_id)?;
        let slot = snapshot
            .view
            .get_mut(record_id)
            .ok_or_else(|| StorageError::Backend("snapshot view missing slot".to_string()))?;
        if slot.is_none() {
            return Err(StorageError::RecordNotFound {
                record_id: record_id.to_string(),
            });
        }
        *slot = None;
        snapshot.ops.push(PendingOp::Delete {
            record_id: record_id.to_string(),
        });
        Ok(())
    }

    async fn get_record(&self, record_id: &str) -> Result<Record, StorageError> {
        self.lock()?
            .get(record_id)
            .cloned()
            .ok_or_else(|| StorageError::RecordNotFound {
                record_id: record_id.to_string(),
            })
    }

    async fn list_records(
        &self,
        record_type: &str,
        filter: &RecordFilter,
    ) -> Result<Vec<Record>, StorageError> {
        let mut records: Vec<Record> = self
            .lock()?
            .values()
            .filter(|r| r.record_type == record_type && filter.matches(r))
            .cloned()
            .collect();
        // Deterministic output: creation order, id as tie-breaker.
        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conformance::run_conformance_suite;

    #[tokio::test]
    async fn memory_conformance() {
        let report = run_conformance_suite(|| async { MemoryStorage::new() }).await;
        assert_eq!(report.failed, 0, "{}", report);
    }
}
