use crate::tracker::ProgressTracker;
use classify::{degraded_result, ClassifyError, FallbackChain};
use models::{ClassifyJob, DocumentMetadata, IndexJob, QueueKind};
use pool::{ProcessingResult, Processor};
use queue::QueueItem;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Stage 3: enrich the document through the provider chain. Provider
/// failures retry while the item has retries left; after that the document
/// degrades to the low-confidence default and continues to the index.
pub struct ClassifyStage {
    chain: Arc<FallbackChain>,
    tracker: Arc<ProgressTracker>,
    cancel: CancellationToken,
}

impl ClassifyStage {
    pub fn new(
        chain: Arc<FallbackChain>,
        tracker: Arc<ProgressTracker>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            chain,
            tracker,
            cancel,
        }
    }

    fn fold_extraction(metadata: &mut DocumentMetadata, job: &ClassifyJob) {
        metadata.pages = job.page_count.or(metadata.pages);
        metadata.word_count = job.word_count.or(metadata.word_count);
        if metadata.language.is_none() {
            metadata.language = job.language.clone();
        }
        if metadata.status.is_none() {
            metadata.status = Some("processed".to_string());
        }
    }
}

#[async_trait::async_trait]
impl Processor for ClassifyStage {
    type Job = ClassifyJob;
    type Output = IndexJob;

    fn name(&self) -> &'static str {
        "classify"
    }

    async fn process(&self, item: &QueueItem<ClassifyJob>) -> ProcessingResult<IndexJob> {
        let job = &item.payload;
        let mut document = job.document.clone();
        self.tracker.set_stage(document.id, QueueKind::Classify);

        let text = document.text.as_deref().unwrap_or_default();
        let mut hints = job.hints.clone();
        if hints.file_name.is_none() {
            hints.file_name = Some(document.file_name.clone());
        }

        match self
            .chain
            .classify(&document.file_name, text, &hints, &self.cancel)
            .await
        {
            Ok(mut metadata) => {
                Self::fold_extraction(&mut metadata, job);
                document.metadata = Some(metadata);
                document.touch();
                ProcessingResult::success(IndexJob {
                    document,
                    degraded: false,
                })
            }
            Err(ClassifyError::Cancelled) => {
                ProcessingResult::failure("classification cancelled", false)
            }
            Err(ClassifyError::AllProvidersFailed(error)) => {
                if item.retry_count < item.max_retries {
                    // Requeue with backoff; the adaptive limiter has already
                    // slowed the call rate down.
                    return ProcessingResult::failure(error, true);
                }

                tracing::warn!(
                    document = %document.id,
                    error = %error,
                    "classification exhausted; indexing with the degraded default"
                );
                let mut metadata = degraded_result(&document.file_name, &hints);
                Self::fold_extraction(&mut metadata, job);
                document.metadata = Some(metadata);
                document.touch();
                self.tracker.record_degraded();
                ProcessingResult::success(IndexJob {
                    document,
                    degraded: true,
                })
            }
        }
    }

    async fn on_terminal_failure(&self, item: &QueueItem<ClassifyJob>, error: &str) {
        self.tracker.fail(
            item.payload.document.id,
            error,
            self.cancel.is_cancelled(),
        );
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use classify::{ChainConfig, Provider, ProviderError, RuleBasedProvider};
    use limiter::{AdaptiveConfig, AdaptiveLimiter};
    use models::{ClassifyHints, Document, Priority};

    fn chain(providers: Vec<Arc<dyn Provider>>) -> Arc<FallbackChain> {
        Arc::new(FallbackChain::new(
            providers,
            Arc::new(AdaptiveLimiter::new(AdaptiveConfig {
                base_rate: 1_000.0,
                max_rate: 1_000.0,
                burst: 1_000,
                ..AdaptiveConfig::default()
            })),
            ChainConfig {
                retries_per_provider: 0,
                base_delay: std::time::Duration::from_millis(1),
            },
        ))
    }

    struct DownProvider;

    #[async_trait::async_trait]
    impl Provider for DownProvider {
        fn name(&self) -> &'static str {
            "down"
        }
        fn is_configured(&self) -> bool {
            true
        }
        async fn classify(
            &self,
            _text: &str,
            _hints: &ClassifyHints,
        ) -> Result<DocumentMetadata, ProviderError> {
            Err(ProviderError::Api {
                status: 503,
                message: "provider outage".to_string(),
            })
        }
    }

    fn classify_item(text: &str, retry_count: u32, max_retries: u32) -> QueueItem<ClassifyJob> {
        let mut document = Document::new("motion.pdf", "application/pdf", 100);
        document.text = Some(text.to_string());
        let mut item = QueueItem::new(
            Priority::Normal,
            ClassifyJob {
                document,
                hints: ClassifyHints::default(),
                page_count: Some(2),
                word_count: Some(250),
                language: Some("en".to_string()),
            },
        );
        item.retry_count = retry_count;
        item.max_retries = max_retries;
        item
    }

    #[tokio::test]
    async fn successful_classification_folds_extraction_stats() {
        let tracker = Arc::new(ProgressTracker::default());
        let stage = ClassifyStage::new(
            chain(vec![Arc::new(RuleBasedProvider)]),
            tracker,
            CancellationToken::new(),
        );

        let item = classify_item("The defendant moves this Court to suppress evidence.", 0, 2);
        let result = stage.process(&item).await;

        assert!(result.is_success());
        let job = result.output.unwrap();
        assert!(!job.degraded);
        let metadata = job.document.metadata.unwrap();
        assert!(metadata.ai_classified);
        assert_eq!(metadata.pages, Some(2));
        assert_eq!(metadata.word_count, Some(250));
        assert_eq!(metadata.status.as_deref(), Some("processed"));
    }

    #[tokio::test]
    async fn outage_with_retry_budget_requeues() {
        let tracker = Arc::new(ProgressTracker::default());
        let stage = ClassifyStage::new(
            chain(vec![Arc::new(DownProvider)]),
            tracker.clone(),
            CancellationToken::new(),
        );

        let item = classify_item("some text", 0, 2);
        let result = stage.process(&item).await;

        assert!(!result.is_success());
        assert!(result.should_retry);
        assert_eq!(tracker.degraded_total(), 0);
    }

    #[tokio::test]
    async fn exhausted_outage_degrades_instead_of_failing() {
        let tracker = Arc::new(ProgressTracker::default());
        let stage = ClassifyStage::new(
            chain(vec![Arc::new(DownProvider)]),
            tracker.clone(),
            CancellationToken::new(),
        );

        // retry_count == max_retries: the last attempt.
        let item = classify_item("some text", 2, 2);
        let result = stage.process(&item).await;

        assert!(result.is_success());
        let job = result.output.unwrap();
        assert!(job.degraded);
        let metadata = job.document.metadata.unwrap();
        assert!(!metadata.ai_classified);
        assert!(metadata.confidence < 0.2);
        assert_eq!(metadata.pages, Some(2));
        assert_eq!(tracker.degraded_total(), 1);
        assert_eq!(tracker.failed_total(), 0);
    }

    #[tokio::test]
    async fn empty_text_degrades_without_spending_a_provider_call() {
        let tracker = Arc::new(ProgressTracker::default());
        let stage = ClassifyStage::new(
            chain(vec![Arc::new(DownProvider)]),
            tracker.clone(),
            CancellationToken::new(),
        );

        let item = classify_item("", 0, 2);
        let result = stage.process(&item).await;

        // The chain short-circuits; no provider failure, no retry.
        assert!(result.is_success());
        let metadata = result.output.unwrap().document.metadata.unwrap();
        assert!(!metadata.ai_classified);
        assert!((metadata.confidence - 0.1).abs() < 1e-9);
    }
}
