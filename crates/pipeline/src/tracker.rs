use chrono::{DateTime, Utc};
use models::{Document, Id, QueueKind};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Terminal state of a document's trip through the pipeline.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum Outcome {
    Succeeded {
        document: Box<Document>,
        degraded: bool,
    },
    Failed {
        error: String,
    },
    Cancelled,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct DocumentProgress {
    pub document_id: Id,
    pub stage: QueueKind,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
}

impl DocumentProgress {
    pub fn is_terminal(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn duration_ms(&self) -> u64 {
        (self.updated_at - self.started_at).num_milliseconds().max(0) as u64
    }
}

/// Per-document progress, observable while in flight and awaitable until
/// terminal. Entries persist after completion so batch reports can read
/// them; deleting a batch removes its entries.
#[derive(Default)]
pub struct ProgressTracker {
    inner: Mutex<HashMap<Id, tokio::sync::watch::Sender<DocumentProgress>>>,
    degraded_total: AtomicU64,
    completed_total: AtomicU64,
    failed_total: AtomicU64,
}

impl ProgressTracker {
    pub fn admit(&self, document_id: Id) {
        let now = Utc::now();
        let (tx, _) = tokio::sync::watch::channel(DocumentProgress {
            document_id,
            stage: QueueKind::Download,
            started_at: now,
            updated_at: now,
            outcome: None,
        });
        self.inner.lock().unwrap().insert(document_id, tx);
    }

    pub fn set_stage(&self, document_id: Id, stage: QueueKind) {
        if let Some(tx) = self.inner.lock().unwrap().get(&document_id) {
            tx.send_modify(|progress| {
                progress.stage = stage;
                progress.updated_at = Utc::now();
            });
        }
    }

    // Degradation is counted where it is decided (the classify stage), not
    // here, so a degraded document is never double-counted.
    pub fn complete(&self, document: Document, degraded: bool) {
        self.completed_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("docket_pipeline_completed_total").increment(1);
        if let Some(tx) = self.inner.lock().unwrap().get(&document.id) {
            tx.send_modify(|progress| {
                progress.updated_at = Utc::now();
                progress.outcome = Some(Outcome::Succeeded {
                    document: Box::new(document),
                    degraded,
                });
            });
        }
    }

    pub fn fail(&self, document_id: Id, error: &str, cancelled: bool) {
        if !cancelled {
            self.failed_total.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("docket_pipeline_failed_total").increment(1);
        }
        if let Some(tx) = self.inner.lock().unwrap().get(&document_id) {
            tx.send_modify(|progress| {
                progress.updated_at = Utc::now();
                progress.outcome = Some(if cancelled {
                    Outcome::Cancelled
                } else {
                    Outcome::Failed {
                        error: error.to_string(),
                    }
                });
            });
        }
    }

    /// Degradations are counted separately from failures: the document still
    /// indexes.
    pub fn record_degraded(&self) {
        self.degraded_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("docket_pipeline_degraded_total").increment(1);
    }

    pub fn progress(&self, document_id: Id) -> Option<DocumentProgress> {
        self.inner
            .lock()
            .unwrap()
            .get(&document_id)
            .map(|tx| tx.borrow().clone())
    }

    /// Await the document's terminal outcome, bounded by `timeout`.
    pub async fn wait(&self, document_id: Id, timeout: Duration) -> Option<Outcome> {
        let mut rx = self.inner.lock().unwrap().get(&document_id)?.subscribe();

        let wait = async {
            loop {
                if let Some(outcome) = rx.borrow_and_update().outcome.clone() {
                    return outcome;
                }
                if rx.changed().await.is_err() {
                    return Outcome::Cancelled;
                }
            }
        };
        match tokio::time::timeout(timeout, wait).await {
            Ok(outcome) => Some(outcome),
            Err(_) => None,
        }
    }

    pub fn remove(&self, document_id: Id) {
        self.inner.lock().unwrap().remove(&document_id);
    }

    pub fn degraded_total(&self) -> u64 {
        self.degraded_total.load(Ordering::Relaxed)
    }

    pub fn completed_total(&self) -> u64 {
        self.completed_total.load(Ordering::Relaxed)
    }

    pub fn failed_total(&self) -> u64 {
        self.failed_total.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn progress_moves_through_stages_to_success() {
        let tracker = ProgressTracker::default();
        let document = Document::new("motion.pdf", "application/pdf", 10);
        let id = document.id;

        tracker.admit(id);
        assert!(matches!(
            tracker.progress(id).unwrap().stage,
            QueueKind::Download
        ));

        tracker.set_stage(id, QueueKind::Classify);
        assert!(matches!(
            tracker.progress(id).unwrap().stage,
            QueueKind::Classify
        ));
        assert!(!tracker.progress(id).unwrap().is_terminal());

        tracker.complete(document, false);
        let progress = tracker.progress(id).unwrap();
        assert!(matches!(
            progress.outcome,
            Some(Outcome::Succeeded { degraded: false, .. })
        ));
        assert_eq!(tracker.completed_total(), 1);
        assert_eq!(tracker.degraded_total(), 0);
    }

    #[tokio::test]
    async fn waiters_observe_the_terminal_outcome() {
        let tracker = std::sync::Arc::new(ProgressTracker::default());
        let document = Document::new("a.pdf", "application/pdf", 1);
        let id = document.id;
        tracker.admit(id);

        let waiter = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.wait(id, Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        tracker.complete(document, true);

        let outcome = waiter.await.unwrap().unwrap();
        assert!(matches!(outcome, Outcome::Succeeded { degraded: true, .. }));
    }

    #[tokio::test]
    async fn cancellation_is_not_a_failure() {
        let tracker = ProgressTracker::default();
        let id = Id::new();
        tracker.admit(id);
        tracker.fail(id, "shutting down", true);

        assert!(matches!(
            tracker.progress(id).unwrap().outcome,
            Some(Outcome::Cancelled)
        ));
        assert_eq!(tracker.failed_total(), 0);
    }

    #[tokio::test]
    async fn waiting_on_an_unknown_document_returns_none() {
        let tracker = ProgressTracker::default();
        assert!(tracker
            .wait(Id::new(), Duration::from_millis(10))
            .await
            .is_none());
    }
}
