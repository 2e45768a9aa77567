use crate::tracker::ProgressTracker;
use models::{IndexJob, QueueKind};
use pool::{ProcessingResult, Processor};
use queue::QueueItem;
use search::IndexClient;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Stage 4: commit the assembled document to the search index. This is the
/// terminal stage; success freezes the document.
pub struct IndexStage {
    index: Arc<IndexClient>,
    tracker: Arc<ProgressTracker>,
    cancel: CancellationToken,
}

impl IndexStage {
    pub fn new(
        index: Arc<IndexClient>,
        tracker: Arc<ProgressTracker>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            index,
            tracker,
            cancel,
        }
    }
}

#[async_trait::async_trait]
impl Processor for IndexStage {
    type Job = IndexJob;
    type Output = ();

    fn name(&self) -> &'static str {
        "index"
    }

    async fn process(&self, item: &QueueItem<IndexJob>) -> ProcessingResult<()> {
        let job = &item.payload;
        self.tracker.set_stage(job.document.id, QueueKind::Index);

        match self.index.index_document(&job.document).await {
            Ok(()) => {
                tracing::debug!(document = %job.document.id, degraded = job.degraded, "indexed");
                self.tracker.complete(job.document.clone(), job.degraded);
                ProcessingResult::done()
            }
            Err(err) => ProcessingResult::failure(err.to_string(), err.is_transient()),
        }
    }

    async fn on_terminal_failure(&self, item: &QueueItem<IndexJob>, error: &str) {
        self.tracker.fail(
            item.payload.document.id,
            error,
            self.cancel.is_cancelled(),
        );
    }
}
