//! The lifecycle engine: sole writer of record lifecycle fields.
//!
//! Every status move follows the same sequence: read the current record,
//! check the workflow's transition table, stage a version-conditional
//! write (status + history entry + `updated_at`, atomically), commit, then
//! invoke observers registered for the landing status. A concurrent writer
//! that invalidates the version check surfaces as
//! `ConcurrentModification` carrying the refreshed record; the engine
//! never retries on the caller's behalf, because the legality of the
//! retried move may differ under the refreshed state.

#[cfg(test)]
mod tests;

use std::sync::Arc;

use provost_core::WorkflowRegistry;
use provost_storage::{
    now_rfc3339, Record, RecordFilter, RecordStorage, StorageError, TransitionEntry,
};
use uuid::Uuid;

use crate::error::EngineError;
use crate::observer::{ObserverFailure, ObserverRegistry};

/// Outcome of a committed transition.
///
/// A non-empty `observer_failures` list means the transition itself is
/// durable but some registered side effect did not run to completion --
/// the caller decides whether to compensate (observers are idempotent, so
/// re-running one is safe).
#[derive(Debug)]
pub struct TransitionReceipt {
    /// The record as committed.
    pub record: Record,
    /// Failures from observers invoked after the commit, in invocation
    /// order.
    pub observer_failures: Vec<ObserverFailure>,
}

impl TransitionReceipt {
    /// True when every registered observer ran cleanly.
    pub fn fully_applied(&self) -> bool {
        self.observer_failures.is_empty()
    }
}

/// The approval-lifecycle engine over a storage backend.
pub struct LifecycleEngine<S: RecordStorage> {
    storage: Arc<S>,
    registry: WorkflowRegistry,
    observers: ObserverRegistry,
}

impl<S: RecordStorage> LifecycleEngine<S> {
    pub fn new(storage: Arc<S>, registry: WorkflowRegistry) -> Self {
        Self {
            storage,
            registry,
            observers: ObserverRegistry::new(),
        }
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub fn registry(&self) -> &WorkflowRegistry {
        &self.registry
    }

    /// Observer registration point. Registrations take effect for the
    /// next transition; there is no ordering guarantee relative to
    /// transitions already in flight.
    pub fn observers(&self) -> &ObserverRegistry {
        &self.observers
    }

    // ── Creation ─────────────────────────────────────────────────────

    /// Create a record of `record_type` at its workflow's start state.
    ///
    /// `initial_status` must normalize to the type's designated start
    /// state -- the admin UIs this replaces hard-coded their initial
    /// status literals, so the engine accepts the literal and verifies it
    /// rather than silently substituting the right one.
    pub async fn create(
        &self,
        record_type: &str,
        initial_status: &str,
        payload: serde_json::Value,
    ) -> Result<Record, EngineError> {
        let def = self.registry.get(record_type)?;
        let status = def.resolve_status(initial_status)?;
        if status != def.initial {
            return Err(EngineError::InvalidInitialState {
                record_type: record_type.to_string(),
                status,
                expected: def.initial.clone(),
            });
        }

        let now = now_rfc3339();
        let record = Record {
            id: Uuid::new_v4().to_string(),
            record_type: record_type.to_string(),
            status,
            payload,
            created_at: now.clone(),
            updated_at: now,
            version: 0,
            history: vec![],
        };

        let mut snapshot = self.storage.begin_snapshot().await?;
        if let Err(e) = self.storage.insert_record(&mut snapshot, &record).await {
            let _ = self.storage.abort_snapshot(snapshot).await;
            return Err(e.into());
        }
        self.storage.commit_snapshot(snapshot).await?;
        Ok(record)
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub async fn get(&self, record_id: &str) -> Result<Record, EngineError> {
        Ok(self.storage.get_record(record_id).await?)
    }

    /// List records of one type. A status filter is normalized and
    /// checked against the type's state set, so a query for a status the
    /// type cannot hold fails instead of silently matching nothing.
    pub async fn list(
        &self,
        record_type: &str,
        filter: &RecordFilter,
    ) -> Result<Vec<Record>, EngineError> {
        let def = self.registry.get(record_type)?;
        let mut filter = filter.clone();
        if let Some(status) = &filter.status {
            filter.status = Some(def.resolve_status(status)?);
        }
        Ok(self.storage.list_records(record_type, &filter).await?)
    }

    // ── Transitions ──────────────────────────────────────────────────

    /// Apply one lifecycle transition: at most one status move per call,
    /// atomic with respect to the record's status/history/`updated_at`.
    pub async fn transition(
        &self,
        record_id: &str,
        to_status: &str,
        actor: &str,
        note: Option<String>,
    ) -> Result<TransitionReceipt, EngineError> {
        let current = self.storage.get_record(record_id).await?;
        let def = self.registry.get(&current.record_type)?;
        let to = def.resolve_status(to_status)?;

        if !def.allows(&current.status, &to) {
            return Err(EngineError::IllegalTransition {
                record_id: record_id.to_string(),
                from_status: current.status.clone(),
                to_status: to,
                current: Box::new(current),
            });
        }

        let entry = TransitionEntry {
            actor: actor.to_string(),
            from_status: current.status.clone(),
            to_status: to.clone(),
            at: now_rfc3339(),
            note,
        };

        let mut snapshot = self.storage.begin_snapshot().await?;
        if let Err(e) = self
            .storage
            .apply_transition(&mut snapshot, record_id, current.version, &to, &entry)
            .await
        {
            let _ = self.storage.abort_snapshot(snapshot).await;
            return Err(self.refresh_conflict(record_id, e).await);
        }
        if let Err(e) = self.storage.commit_snapshot(snapshot).await {
            return Err(self.refresh_conflict(record_id, e).await);
        }

        // Build the committed state locally; the staged write is exactly
        // this, and the commit succeeded.
        let mut committed = current;
        committed.status = to;
        committed.updated_at = entry.at.clone();
        committed.history.push(entry);
        committed.version += 1;

        let observers = self
            .observers
            .matching(&committed.record_type, &committed.status)
            .await;
        let mut observer_failures = Vec::new();
        for observer in observers {
            if let Err(error) = observer.on_transition(&committed).await {
                observer_failures.push(ObserverFailure {
                    observer: observer.name().to_string(),
                    error,
                });
            }
        }

        Ok(TransitionReceipt {
            record: committed,
            observer_failures,
        })
    }

    /// Map a storage failure during a transition write to its engine
    /// error, re-reading the record on OCC conflict so the caller gets
    /// the state that beat them.
    async fn refresh_conflict(&self, record_id: &str, e: StorageError) -> EngineError {
        match e {
            StorageError::ConcurrentConflict { .. } => {
                match self.storage.get_record(record_id).await {
                    Ok(current) => EngineError::ConcurrentModification {
                        record_id: record_id.to_string(),
                        current: Box::new(current),
                    },
                    Err(StorageError::RecordNotFound { record_id }) => {
                        EngineError::NotFound { record_id }
                    }
                    Err(other) => EngineError::Store(other),
                }
            }
            other => other.into(),
        }
    }

    // ── Non-lifecycle mutation ───────────────────────────────────────

    /// Apply a caller-supplied change to a record's payload.
    ///
    /// The mutator sees only the payload value, so lifecycle fields are
    /// untouchable by construction. Fails with `Forbidden` once the
    /// record's status is terminal for its type.
    pub async fn update<F>(&self, record_id: &str, mutator: F) -> Result<Record, EngineError>
    where
        F: FnOnce(&mut serde_json::Value),
    {
        let mut snapshot = self.storage.begin_snapshot().await?;
        let current = match self.storage.get_record_for_update(&mut snapshot, record_id).await {
            Ok(r) => r,
            Err(e) => {
                let _ = self.storage.abort_snapshot(snapshot).await;
                return Err(e.into());
            }
        };
        let def = match self.registry.get(&current.record_type) {
            Ok(def) => def,
            Err(e) => {
                let _ = self.storage.abort_snapshot(snapshot).await;
                return Err(e.into());
            }
        };
        if def.is_terminal(&current.status) {
            let _ = self.storage.abort_snapshot(snapshot).await;
            return Err(EngineError::Forbidden {
                record_id: record_id.to_string(),
                status: current.status,
                action: "update".to_string(),
            });
        }

        let mut payload = current.payload.clone();
        mutator(&mut payload);
        if let Err(e) = self
            .storage
            .update_payload(&mut snapshot, record_id, &payload)
            .await
        {
            let _ = self.storage.abort_snapshot(snapshot).await;
            return Err(e.into());
        }
        self.storage.commit_snapshot(snapshot).await?;
        Ok(Record { payload, ..current })
    }

    /// Delete a record outside its lifecycle.
    ///
    /// Forbidden once the status is terminal, except for types declared
    /// `unrestricted_delete` (budgets), which delete at any status.
    pub async fn delete(&self, record_id: &str) -> Result<(), EngineError> {
        let mut snapshot = self.storage.begin_snapshot().await?;
        let current = match self.storage.get_record_for_update(&mut snapshot, record_id).await {
            Ok(r) => r,
            Err(e) => {
                let _ = self.storage.abort_snapshot(snapshot).await;
                return Err(e.into());
            }
        };
        let def = match self.registry.get(&current.record_type) {
            Ok(def) => def,
            Err(e) => {
                let _ = self.storage.abort_snapshot(snapshot).await;
                return Err(e.into());
            }
        };
        if !def.unrestricted_delete && def.is_terminal(&current.status) {
            let _ = self.storage.abort_snapshot(snapshot).await;
            return Err(EngineError::Forbidden {
                record_id: record_id.to_string(),
                status: current.status,
                action: "delete".to_string(),
            });
        }

        if let Err(e) = self.storage.delete_record(&mut snapshot, record_id).await {
            let _ = self.storage.abort_snapshot(snapshot).await;
            return Err(e.into());
        }
        self.storage.commit_snapshot(snapshot).await?;
        Ok(())
    }
}
