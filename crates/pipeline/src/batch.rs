use super::tracker::{Outcome, ProgressTracker};
use chrono::{DateTime, Utc};
use models::Id;
use std::collections::HashMap;
use std::sync::Mutex;

struct Batch {
    document_ids: Vec<Id>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct BatchStatus {
    pub batch_id: Id,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub pending: usize,
    pub created_at: DateTime<Utc>,
}

impl BatchStatus {
    /// A batch is done once every item reached a terminal state, successful
    /// or not.
    pub fn is_done(&self) -> bool {
        self.pending == 0
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct BatchResults {
    pub batch_id: Id,
    pub items: Vec<BatchItem>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct BatchItem {
    pub document_id: Id,
    pub status: &'static str,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded: Option<bool>,
}

/// Groups documents admitted together and aggregates their per-item
/// outcomes from the progress tracker.
#[derive(Default)]
pub struct BatchTracker {
    inner: Mutex<HashMap<Id, Batch>>,
}

impl BatchTracker {
    pub fn create(&self, document_ids: Vec<Id>) -> Id {
        let batch_id = Id::new();
        self.inner.lock().unwrap().insert(
            batch_id,
            Batch {
                document_ids,
                created_at: Utc::now(),
            },
        );
        batch_id
    }

    pub fn status(&self, batch_id: Id, tracker: &ProgressTracker) -> Option<BatchStatus> {
        let inner = self.inner.lock().unwrap();
        let batch = inner.get(&batch_id)?;

        let mut status = BatchStatus {
            batch_id,
            total: batch.document_ids.len(),
            completed: 0,
            failed: 0,
            cancelled: 0,
            pending: 0,
            created_at: batch.created_at,
        };
        for id in &batch.document_ids {
            match tracker.progress(*id).and_then(|p| p.outcome) {
                Some(Outcome::Succeeded { .. }) => status.completed += 1,
                Some(Outcome::Failed { .. }) => status.failed += 1,
                Some(Outcome::Cancelled) => status.cancelled += 1,
                None => status.pending += 1,
            }
        }
        Some(status)
    }

    pub fn results(&self, batch_id: Id, tracker: &ProgressTracker) -> Option<BatchResults> {
        let inner = self.inner.lock().unwrap();
        let batch = inner.get(&batch_id)?;

        let items = batch
            .document_ids
            .iter()
            .map(|id| match tracker.progress(*id) {
                Some(progress) => {
                    let duration_ms = progress.duration_ms();
                    match progress.outcome {
                        Some(Outcome::Succeeded { degraded, .. }) => BatchItem {
                            document_id: *id,
                            status: "succeeded",
                            duration_ms,
                            error: None,
                            degraded: Some(degraded),
                        },
                        Some(Outcome::Failed { error }) => BatchItem {
                            document_id: *id,
                            status: "failed",
                            duration_ms,
                            error: Some(error),
                            degraded: None,
                        },
                        Some(Outcome::Cancelled) => BatchItem {
                            document_id: *id,
                            status: "cancelled",
                            duration_ms,
                            error: None,
                            degraded: None,
                        },
                        None => BatchItem {
                            document_id: *id,
                            status: "processing",
                            duration_ms,
                            error: None,
                            degraded: None,
                        },
                    }
                }
                None => BatchItem {
                    document_id: *id,
                    status: "unknown",
                    duration_ms: 0,
                    error: None,
                    degraded: None,
                },
            })
            .collect();

        Some(BatchResults { batch_id, items })
    }

    /// Drop the batch and its per-document progress entries.
    pub fn delete(&self, batch_id: Id, tracker: &ProgressTracker) -> bool {
        match self.inner.lock().unwrap().remove(&batch_id) {
            Some(batch) => {
                for id in batch.document_ids {
                    tracker.remove(id);
                }
                true
            }
            None => false,
        }
    }
}
