use crate::tracker::ProgressTracker;
use extract::Extractor;
use models::{ClassifyJob, ExtractJob, QueueKind};
use pool::{ProcessingResult, Processor};
use queue::QueueItem;
use std::sync::Arc;
use storage::StorageClient;
use tokio_util::sync::CancellationToken;

/// Stage 2: pull the stored binary back, extract its text, and carry the
/// text (not the bytes) forward. An extraction that yields zero text still
/// succeeds; the classify stage degrades it instead of losing the document.
pub struct ExtractStage {
    storage: Arc<StorageClient>,
    extractor: Arc<Extractor>,
    tracker: Arc<ProgressTracker>,
    cancel: CancellationToken,
}

impl ExtractStage {
    pub fn new(
        storage: Arc<StorageClient>,
        extractor: Arc<Extractor>,
        tracker: Arc<ProgressTracker>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            storage,
            extractor,
            tracker,
            cancel,
        }
    }
}

#[async_trait::async_trait]
impl Processor for ExtractStage {
    type Job = ExtractJob;
    type Output = ClassifyJob;

    fn name(&self) -> &'static str {
        "extract"
    }

    async fn process(&self, item: &QueueItem<ExtractJob>) -> ProcessingResult<ClassifyJob> {
        let job = &item.payload;
        let mut document = job.document.clone();
        self.tracker.set_stage(document.id, QueueKind::Extract);

        let Some(storage_key) = document.storage_key.clone() else {
            return ProcessingResult::failure("document reached extract without a storage key", false);
        };

        let bytes = match self.storage.download(&storage_key).await {
            Ok(bytes) => bytes,
            Err(err) => return ProcessingResult::failure(err.to_string(), err.is_transient()),
        };

        let extraction = match self
            .extractor
            .extract(&bytes, &document.file_name, &document.content_type)
            .await
        {
            Ok(extraction) => extraction,
            Err(err) => return ProcessingResult::failure(err.to_string(), !err.is_terminal()),
        };
        drop(bytes);

        document.text = Some(extraction.text);
        document.touch();

        ProcessingResult::success(ClassifyJob {
            document,
            hints: job.hints.clone(),
            page_count: Some(extraction.page_count),
            word_count: Some(extraction.word_count),
            language: extraction.language,
        })
    }

    async fn on_terminal_failure(&self, item: &QueueItem<ExtractJob>, error: &str) {
        self.tracker.fail(
            item.payload.document.id,
            error,
            self.cancel.is_cancelled(),
        );
    }
}
