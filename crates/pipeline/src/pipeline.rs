use crate::stages::{ClassifyStage, DownloadStage, ExtractStage, IndexStage};
use crate::{
    AdmitError, BatchResults, BatchStatus, BatchTracker, DocumentProgress, Outcome,
    PipelineConfig, ProgressTracker,
};
use classify::FallbackChain;
use extract::Extractor;
use models::{ClassifyHints, Document, DownloadJob, Id, IngestSource, Priority};
use pool::{PoolConfig, Processor, WorkerPool};
use queue::{PriorityQueue, QueueConfig, QueueError, QueueItem};
use search::IndexClient;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use storage::StorageClient;
use tokio_util::sync::CancellationToken;

pub struct SubmitRequest {
    pub file_name: String,
    pub content_type: String,
    pub source: IngestSource,
    pub hints: ClassifyHints,
    pub priority: Priority,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct StageStatus {
    pub name: &'static str,
    pub depth: usize,
    pub delayed: usize,
    pub queue: queue::QueueStatsSnapshot,
    pub pool: pool::PoolStatsSnapshot,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PipelineStatus {
    pub running: bool,
    pub stages: Vec<StageStatus>,
    pub completed_total: u64,
    pub failed_total: u64,
    pub degraded_total: u64,
    pub storage: storage::StorageMetricsSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cdn: Option<storage::CdnHealthSnapshot>,
}

/// The four-stage processing pipeline: download → extract → classify →
/// index, each stage a bounded priority queue drained by a worker pool.
/// External admission rejects when the first queue is full; intra-pipeline
/// handoff blocks with cancellation instead.
pub struct Pipeline {
    config: PipelineConfig,

    download_queue: Arc<PriorityQueue<models::DownloadJob>>,
    extract_queue: Arc<PriorityQueue<models::ExtractJob>>,
    classify_queue: Arc<PriorityQueue<models::ClassifyJob>>,
    index_queue: Arc<PriorityQueue<models::IndexJob>>,

    download_pool: WorkerPool<DownloadStage>,
    extract_pool: WorkerPool<ExtractStage>,
    classify_pool: WorkerPool<ClassifyStage>,
    index_pool: WorkerPool<IndexStage>,

    tracker: Arc<ProgressTracker>,
    batches: BatchTracker,
    storage: Arc<StorageClient>,
    index: Arc<IndexClient>,
    chain: Arc<FallbackChain>,

    cancel: CancellationToken,
    probe_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        storage: Arc<StorageClient>,
        extractor: Arc<Extractor>,
        chain: Arc<FallbackChain>,
        index: Arc<IndexClient>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let tracker = Arc::new(ProgressTracker::default());

        let queue_config = |name: &str, max_size: usize| QueueConfig {
            name: name.to_string(),
            max_size,
            default_max_retries: config.max_retries,
            base_retry_delay: config.base_retry_delay,
            exponential_backoff: true,
        };
        let download_queue = Arc::new(PriorityQueue::new(queue_config(
            "download",
            config.download_queue_size,
        )));
        let extract_queue = Arc::new(PriorityQueue::new(queue_config(
            "extract",
            config.extract_queue_size,
        )));
        let classify_queue = Arc::new(PriorityQueue::new(queue_config(
            "classify",
            config.classify_queue_size,
        )));
        let index_queue = Arc::new(PriorityQueue::new(queue_config(
            "index",
            config.index_queue_size,
        )));

        let pool_config = |workers: usize, item_timeout: Duration| PoolConfig {
            workers,
            channel_capacity: workers * 2,
            item_timeout,
            ..PoolConfig::default()
        };

        let download_pool = WorkerPool::new(
            "download",
            pool_config(config.download_workers, config.download_timeout),
            Arc::new(DownloadStage::new(
                storage.clone(),
                tracker.clone(),
                cancel.clone(),
                config.max_file_size,
            )),
            download_queue.clone(),
            Some(extract_queue.clone()),
        );
        let extract_pool = WorkerPool::new(
            "extract",
            pool_config(config.extract_workers, config.extract_timeout),
            Arc::new(ExtractStage::new(
                storage.clone(),
                extractor,
                tracker.clone(),
                cancel.clone(),
            )),
            extract_queue.clone(),
            Some(classify_queue.clone()),
        );
        let classify_pool = WorkerPool::new(
            "classify",
            pool_config(config.classify_workers, config.classify_timeout),
            Arc::new(ClassifyStage::new(
                chain.clone(),
                tracker.clone(),
                cancel.clone(),
            )),
            classify_queue.clone(),
            Some(index_queue.clone()),
        );
        let index_pool = WorkerPool::new(
            "index",
            pool_config(config.index_workers, config.index_timeout),
            Arc::new(IndexStage::new(
                index.clone(),
                tracker.clone(),
                cancel.clone(),
            )),
            index_queue.clone(),
            None,
        );

        Self {
            config,
            download_queue,
            extract_queue,
            classify_queue,
            index_queue,
            download_pool,
            extract_pool,
            classify_pool,
            index_pool,
            tracker,
            batches: BatchTracker::default(),
            storage,
            index,
            chain,
            cancel,
            probe_task: Mutex::new(None),
        }
    }

    /// Start every stage pool and the CDN probe task.
    pub fn start(self: &Arc<Self>) -> Result<(), pool::PoolError> {
        self.download_pool.start()?;
        self.extract_pool.start()?;
        self.classify_pool.start()?;
        self.index_pool.start()?;
        *self.probe_task.lock().unwrap() = self
            .storage
            .spawn_cdn_probe_task(self.cancel.child_token());
        tracing::info!("pipeline started");
        Ok(())
    }

    /// Stop accepting work, drain in-flight items through their retry
    /// bookkeeping, and stop the pools.
    pub async fn shutdown(&self) {
        tracing::info!("pipeline shutting down");
        self.cancel.cancel();
        self.download_queue.close();
        self.extract_queue.close();
        self.classify_queue.close();
        self.index_queue.close();

        for (name, result) in [
            ("download", self.download_pool.stop().await),
            ("extract", self.extract_pool.stop().await),
            ("classify", self.classify_pool.stop().await),
            ("index", self.index_pool.stop().await),
        ] {
            if let Err(err) = result {
                tracing::warn!(pool = name, error = %err, "pool did not stop cleanly");
            }
        }
        if let Some(task) = self.probe_task.lock().unwrap().take() {
            task.abort();
        }
    }

    /// Admit one document. Rejection (queue full) maps to HTTP 429 at the
    /// boundary; this never blocks.
    pub fn submit(&self, request: SubmitRequest) -> Result<Id, AdmitError> {
        if self.cancel.is_cancelled() {
            return Err(AdmitError::ShuttingDown);
        }
        if request.file_name.trim().is_empty() {
            return Err(AdmitError::Invalid("file name is required".to_string()));
        }

        let content_type = if request.content_type.trim().is_empty() {
            storage::content_type_for(&request.file_name).to_string()
        } else {
            request.content_type
        };
        let document = Document::new(request.file_name.clone(), content_type, 0);
        let id = document.id;

        let mut hints = request.hints;
        if hints.file_name.is_none() {
            hints.file_name = Some(request.file_name);
        }

        self.tracker.admit(id);
        let item = QueueItem::new(
            request.priority,
            DownloadJob {
                document,
                source: request.source,
                hints,
            },
        );

        match self.download_queue.enqueue(item) {
            Ok(()) => {
                metrics::counter!("docket_pipeline_admitted_total").increment(1);
                Ok(id)
            }
            Err(QueueError::Full(_)) => {
                self.tracker.remove(id);
                Err(AdmitError::QueueFull)
            }
            Err(_) => {
                self.tracker.remove(id);
                Err(AdmitError::ShuttingDown)
            }
        }
    }

    /// Admit and wait for the terminal outcome; the synchronous categorise
    /// endpoint is built on this. The wait is bounded by the worst-case
    /// processing time, so every admitted document resolves.
    pub async fn process_sync(&self, request: SubmitRequest) -> Result<Outcome, AdmitError> {
        let id = self.submit(request)?;
        let outcome = self
            .tracker
            .wait(id, self.config.max_processing_time())
            .await;
        Ok(outcome.unwrap_or(Outcome::Failed {
            error: "processing did not finish within the pipeline bound".to_string(),
        }))
    }

    /// Admit a batch; per-item admission errors are reported individually
    /// and do not fail the batch.
    pub fn submit_batch(
        &self,
        requests: Vec<SubmitRequest>,
    ) -> (Id, Vec<Result<Id, AdmitError>>) {
        let results: Vec<Result<Id, AdmitError>> =
            requests.into_iter().map(|r| self.submit(r)).collect();
        let admitted: Vec<Id> = results.iter().filter_map(|r| r.as_ref().ok().copied()).collect();
        let batch_id = self.batches.create(admitted);
        (batch_id, results)
    }

    pub fn batch_status(&self, batch_id: Id) -> Option<BatchStatus> {
        self.batches.status(batch_id, &self.tracker)
    }

    pub fn batch_results(&self, batch_id: Id) -> Option<BatchResults> {
        self.batches.results(batch_id, &self.tracker)
    }

    pub fn delete_batch(&self, batch_id: Id) -> bool {
        self.batches.delete(batch_id, &self.tracker)
    }

    pub fn progress(&self, document_id: Id) -> Option<DocumentProgress> {
        self.tracker.progress(document_id)
    }

    pub fn tracker(&self) -> &Arc<ProgressTracker> {
        &self.tracker
    }

    pub fn storage(&self) -> &Arc<StorageClient> {
        &self.storage
    }

    pub fn index(&self) -> &Arc<IndexClient> {
        &self.index
    }

    pub fn chain(&self) -> &Arc<FallbackChain> {
        &self.chain
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn status(&self) -> PipelineStatus {
        PipelineStatus {
            running: self.download_pool.is_running(),
            stages: vec![
                stage_status("download", &self.download_queue, &self.download_pool),
                stage_status("extract", &self.extract_queue, &self.extract_pool),
                stage_status("classify", &self.classify_queue, &self.classify_pool),
                stage_status("index", &self.index_queue, &self.index_pool),
            ],
            completed_total: self.tracker.completed_total(),
            failed_total: self.tracker.failed_total(),
            degraded_total: self.tracker.degraded_total(),
            storage: self.storage.metrics(),
            cdn: self.storage.cdn_snapshot(),
        }
    }
}

fn stage_status<P: Processor>(
    name: &'static str,
    queue: &PriorityQueue<P::Job>,
    pool: &WorkerPool<P>,
) -> StageStatus {
    StageStatus {
        name,
        depth: queue.size(),
        delayed: queue.delayed_len(),
        queue: queue.stats(),
        pool: pool.stats(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use classify::{ChainConfig, RuleBasedProvider};
    use limiter::{AdaptiveConfig, AdaptiveLimiter};

    async fn test_pipeline(config: PipelineConfig) -> Arc<Pipeline> {
        let storage = Arc::new(
            StorageClient::connect(storage::StorageConfig {
                bucket: "docket-test".to_string(),
                region: Some("us-east-1".to_string()),
                endpoint: Some(url::Url::parse("http://localhost:9000").unwrap()),
                cdn: None,
            })
            .await,
        );
        let index = Arc::new(IndexClient::new(search::IndexConfig {
            base_url: url::Url::parse("http://localhost:9200").unwrap(),
            index: "documents-test".to_string(),
            timeout: Duration::from_secs(5),
        }));
        let chain = Arc::new(FallbackChain::new(
            vec![Arc::new(RuleBasedProvider)],
            Arc::new(AdaptiveLimiter::new(AdaptiveConfig::default())),
            ChainConfig::default(),
        ));
        Arc::new(Pipeline::new(
            config,
            storage,
            Arc::new(Extractor::new(extract::ExtractConfig::default())),
            chain,
            index,
        ))
    }

    fn upload_request(name: &str) -> SubmitRequest {
        SubmitRequest {
            file_name: name.to_string(),
            content_type: String::new(),
            source: IngestSource::Buffer(bytes::Bytes::from_static(b"motion text")),
            hints: ClassifyHints::default(),
            priority: Priority::Normal,
        }
    }

    #[tokio::test]
    async fn admission_rejects_the_101st_document() {
        let pipeline = test_pipeline(PipelineConfig {
            download_queue_size: 100,
            ..PipelineConfig::default()
        })
        .await;

        for n in 0..100 {
            pipeline
                .submit(upload_request(&format!("doc-{n}.txt")))
                .unwrap_or_else(|err| panic!("doc {n} rejected: {err}"));
        }
        assert!(matches!(
            pipeline.submit(upload_request("doc-100.txt")),
            Err(AdmitError::QueueFull)
        ));

        let status = pipeline.status();
        assert_eq!(status.stages[0].depth, 100);
        assert!(!status.running);
    }

    #[tokio::test]
    async fn submit_infers_content_type_and_tracks_progress() {
        let pipeline = test_pipeline(PipelineConfig::default()).await;
        let id = pipeline.submit(upload_request("motion.pdf")).unwrap();

        let progress = pipeline.progress(id).unwrap();
        assert!(matches!(progress.stage, models::QueueKind::Download));
        assert!(!progress.is_terminal());
    }

    #[tokio::test]
    async fn empty_file_names_are_rejected() {
        let pipeline = test_pipeline(PipelineConfig::default()).await;
        assert!(matches!(
            pipeline.submit(upload_request("  ")),
            Err(AdmitError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn batches_report_per_item_admission() {
        let pipeline = test_pipeline(PipelineConfig {
            download_queue_size: 2,
            ..PipelineConfig::default()
        })
        .await;

        let (batch_id, results) = pipeline.submit_batch(vec![
            upload_request("a.txt"),
            upload_request("b.txt"),
            upload_request("c.txt"),
        ]);

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 2);
        assert!(matches!(results[2], Err(AdmitError::QueueFull)));

        let status = pipeline.batch_status(batch_id).unwrap();
        assert_eq!(status.total, 2);
        assert_eq!(status.pending, 2);
    }

    #[tokio::test]
    async fn shutdown_stops_admission() {
        let pipeline = test_pipeline(PipelineConfig::default()).await;
        pipeline.shutdown().await;
        assert!(matches!(
            pipeline.submit(upload_request("late.txt")),
            Err(AdmitError::ShuttingDown)
        ));
    }
}
