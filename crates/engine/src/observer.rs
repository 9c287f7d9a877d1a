//! Post-transition observers.
//!
//! An observer is a registered side effect invoked after a committed
//! transition -- the engine's rendition of the source system's
//! fire-and-forget derived writes (publishing a grade sheet fans out
//! per-student rows). Invocation is synchronous, in registration order,
//! and deliberately non-transactional: a failing observer never rolls
//! back the committed transition; the failure travels back to the caller
//! in the transition receipt.
//!
//! Delivery is at-least-once -- a caller retrying a transition after
//! `ConcurrentModification` may cause a second invocation -- so handlers
//! must be idempotent.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use provost_storage::{Record, StorageError};

/// A side effect to run after a committed transition.
#[async_trait]
pub trait TransitionObserver: Send + Sync {
    /// Stable name, used in failure reports.
    fn name(&self) -> &str;

    /// Called with the record as committed, including the transition that
    /// triggered this observer as the last history entry. Must be
    /// idempotent.
    async fn on_transition(&self, record: &Record) -> Result<(), ObserverError>;
}

/// An observer's failure, surfaced in the transition receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObserverError {
    pub message: String,
}

impl ObserverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ObserverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observer error: {}", self.message)
    }
}

impl std::error::Error for ObserverError {}

impl From<StorageError> for ObserverError {
    fn from(e: StorageError) -> Self {
        ObserverError::new(e.to_string())
    }
}

/// One observer's failure paired with the observer that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObserverFailure {
    pub observer: String,
    pub error: ObserverError,
}

/// Handle returned by [`ObserverRegistry::register`], used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverId(u64);

struct Registration {
    id: u64,
    record_type: String,
    to_status: String,
    observer: Arc<dyn TransitionObserver>,
}

/// Observers keyed by `(record_type, to_status)`, invoked in registration
/// order.
#[derive(Default)]
pub struct ObserverRegistry {
    entries: RwLock<Vec<Registration>>,
    next_id: AtomicU64,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `observer` for transitions of `record_type` into
    /// `to_status`.
    pub async fn register(
        &self,
        record_type: &str,
        to_status: &str,
        observer: Arc<dyn TransitionObserver>,
    ) -> ObserverId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.write().await.push(Registration {
            id,
            record_type: record_type.to_string(),
            to_status: to_status.to_string(),
            observer,
        });
        ObserverId(id)
    }

    /// Remove a registration. Returns false if the id was already gone.
    pub async fn unregister(&self, id: ObserverId) -> bool {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|r| r.id != id.0);
        entries.len() != before
    }

    /// Observers registered for `(record_type, to_status)`, in
    /// registration order.
    pub async fn matching(
        &self,
        record_type: &str,
        to_status: &str,
    ) -> Vec<Arc<dyn TransitionObserver>> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|r| r.record_type == record_type && r.to_status == to_status)
            .map(|r| Arc::clone(&r.observer))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl TransitionObserver for Noop {
        fn name(&self) -> &str {
            "noop"
        }
        async fn on_transition(&self, _record: &Record) -> Result<(), ObserverError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn register_and_match() {
        let registry = ObserverRegistry::new();
        registry
            .register("grade_submission", "published", Arc::new(Noop))
            .await;
        assert_eq!(
            registry.matching("grade_submission", "published").await.len(),
            1
        );
        assert!(registry.matching("grade_submission", "approved").await.is_empty());
        assert!(registry.matching("payment", "published").await.is_empty());
    }

    #[tokio::test]
    async fn unregister_removes_exactly_one_registration() {
        let registry = ObserverRegistry::new();
        let a = registry
            .register("payment", "success", Arc::new(Noop))
            .await;
        registry
            .register("payment", "success", Arc::new(Noop))
            .await;
        assert!(registry.unregister(a).await);
        assert!(!registry.unregister(a).await);
        assert_eq!(registry.matching("payment", "success").await.len(), 1);
    }
}
