//! JSON-file storage backend.
//!
//! `FileStorage` gives the CLI persistence across invocations: the full
//! record set lives in one JSON document on disk. Transactional behavior
//! is delegated to an inner [`MemoryStorage`]; after every successful
//! commit (and only then) the committed state is rewritten to disk via a
//! temp-file rename, so a crash mid-write leaves the previous document
//! intact. Single-process use only -- there is no cross-process locking,
//! matching the CLI's one-shot invocation model.

use std::path::PathBuf;

use async_trait::async_trait;

use provost_storage::{
    MemoryStorage, Record, RecordFilter, RecordStorage, StorageError, TransitionEntry,
};

pub struct FileStorage {
    path: PathBuf,
    inner: MemoryStorage,
}

impl FileStorage {
    /// Open a store file, loading its records if it exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let inner = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(|e| {
                StorageError::Unavailable(format!("reading {}: {}", path.display(), e))
            })?;
            let records: Vec<Record> = serde_json::from_str(&raw).map_err(|e| {
                StorageError::Backend(format!("corrupt store {}: {}", path.display(), e))
            })?;
            MemoryStorage::with_records(records)
        } else {
            MemoryStorage::new()
        };
        Ok(Self { path, inner })
    }

    /// Write the committed state to disk. Temp file + rename keeps the
    /// previous document intact if the write dies halfway.
    fn persist(&self) -> Result<(), StorageError> {
        let mut records = self.inner.dump()?;
        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        let raw = serde_json::to_string_pretty(&records)
            .map_err(|e| StorageError::Backend(format!("serializing store: {}", e)))?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, raw).map_err(|e| {
            StorageError::Unavailable(format!("writing {}: {}", tmp.display(), e))
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            StorageError::Unavailable(format!("replacing {}: {}", self.path.display(), e))
        })
    }
}

#[async_trait]
impl RecordStorage for FileStorage {
    type Snapshot = <MemoryStorage as RecordStorage>::Snapshot;

    async fn begin_snapshot(&self) -> Result<Self::Snapshot, StorageError> {
        self.inner.begin_snapshot().await
    }

    async fn commit_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError> {
        self.inner.commit_snapshot(snapshot).await?;
        self.persist()
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
        self.inner.get_record(record_id).await
    }

    async fn list_records(
        &self,
        record_type: &str,
        filter: &RecordFilter,
    ) -> Result<Vec<Record>, StorageError> {
        self.inner.list_records(record_type, filter).await
    }
}
