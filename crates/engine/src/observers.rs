//! Shipped observers.
//!
//! The grade-publication fan-out is the one derived write the source
//! system performed on every publish: turning an approved grade sheet
//! into one row per student.

use std::sync::Arc;

use async_trait::async_trait;

use provost_storage::{now_rfc3339, Record, RecordStorage, StorageError};

use crate::observer::{ObserverError, TransitionObserver};

/// On `grade_submission -> published`, create one `student_grade` record
/// per line item of the submission's `payload.grades` array.
///
/// Derived ids are deterministic (`grade-<submission>-<student>`), so a
/// re-delivered publication finds its rows already present and skips
/// them -- the idempotency the at-least-once observer contract demands.
pub struct GradePublicationObserver<S> {
    storage: Arc<S>,
}

impl<S> GradePublicationObserver<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl<S: RecordStorage> TransitionObserver for GradePublicationObserver<S> {
    fn name(&self) -> &str {
        "grade_publication"
    }

    async fn on_transition(&self, record: &Record) -> Result<(), ObserverError> {
        let grades = record
            .payload
            .get("grades")
            .and_then(|v| v.as_array())
            .ok_or_else(|| {
                ObserverError::new(format!(
                    "grade submission {} has no 'grades' array",
                    record.id
                ))
            })?;

        for line in grades {
            let student_id = line.get("studentId").and_then(|v| v.as_str()).ok_or_else(|| {
                ObserverError::new(format!(
                    "grade submission {} has a line item without 'studentId'",
                    record.id
                ))
            })?;

            let mut payload = line.clone();
            let obj = payload.as_object_mut().ok_or_else(|| {
                ObserverError::new(format!(
                    "grade submission {} has a non-object line item",
                    record.id
                ))
            })?;
            obj.insert(
                "submissionId".to_string(),
                serde_json::Value::String(record.id.clone()),
            );

            let now = now_rfc3339();
            let derived = Record {
                id: format!("grade-{}-{}", record.id, student_id),
                record_type: provost_core::STUDENT_GRADE.to_string(),
                status: "published".to_string(),
                payload,
                created_at: now.clone(),
                updated_at: now,
                version: 0,
                history: vec![],
            };

            let mut snapshot = self.storage.begin_snapshot().await?;
            match self.storage.insert_record(&mut snapshot, &derived).await {
                Ok(()) => self.storage.commit_snapshot(snapshot).await?,
                // Row already published by an earlier delivery.
                Err(StorageError::AlreadyExists { .. }) => {
                    let _ = self.storage.abort_snapshot(snapshot).await;
                }
                Err(e) => {
                    let _ = self.storage.abort_snapshot(snapshot).await;
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provost_storage::{MemoryStorage, RecordFilter};

    fn submission(id: &str, grades: serde_json::Value) -> Record {
        Record {
            id: id.to_string(),
            record_type: provost_core::GRADE_SUBMISSION.to_string(),
            status: "published".to_string(),
            payload: serde_json::json!({ "courseCode": "CSC101", "grades": grades }),
            created_at: "2026-01-01T00:00:00Z".to_string(),
            updated_at: "2026-01-01T00:00:00Z".to_string(),
            version: 2,
            history: vec![],
        }
    }

    #[tokio::test]
    async fn publishes_one_row_per_student() {
        let storage = Arc::new(MemoryStorage::new());
        let observer = GradePublicationObserver::new(Arc::clone(&storage));
        let record = submission(
            "sub-1",
            serde_json::json!([
                {"studentId": "S1", "total": 84, "grade": "A"},
                {"studentId": "S2", "total": 61, "grade": "B"},
            ]),
        );

        observer.on_transition(&record).await.unwrap();

        let rows = storage
            .list_records(provost_core::STUDENT_GRADE, &RecordFilter::default())
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.status == "published"));
        assert!(rows
            .iter()
            .all(|r| r.payload["submissionId"] == serde_json::json!("sub-1")));
    }

    #[tokio::test]
    async fn redelivery_creates_no_duplicates() {
        let storage = Arc::new(MemoryStorage::new());
        let observer = GradePublicationObserver::new(Arc::clone(&storage));
        let record = submission(
            "sub-1",
            serde_json::json!([{"studentId": "S1", "total": 84, "grade": "A"}]),
        );

        observer.on_transition(&record).await.unwrap();
        observer.on_transition(&record).await.unwrap();

        let rows = storage
            .list_records(provost_core::STUDENT_GRADE, &RecordFilter::default())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn missing_grades_array_fails() {
        let storage = Arc::new(MemoryStorage::new());
        let observer = GradePublicationObserver::new(Arc::clone(&storage));
        let mut record = submission("sub-1", serde_json::json!([]));
        record.payload = serde_json::json!({"courseCode": "CSC101"});

        let err = observer.on_transition(&record).await.unwrap_err();
        assert!(err.message.contains("no 'grades' array"));
    }

    #[tokio::test]
    async fn line_item_without_student_id_fails() {
        let storage = Arc::new(MemoryStorage::new());
        let observer = GradePublicationObserver::new(Arc::clone(&storage));
        let record = submission("sub-1", serde_json::json!([{"total": 84}]));

        let err = observer.on_transition(&record).await.unwrap_err();
        assert!(err.message.contains("studentId"));
    }
}
