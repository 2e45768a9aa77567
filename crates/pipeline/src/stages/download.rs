use crate::tracker::ProgressTracker;
use models::{DownloadJob, ExtractJob, IngestSource, QueueKind};
use pool::{ProcessingResult, Processor};
use queue::QueueItem;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use storage::StorageClient;
use tokio_util::sync::CancellationToken;

/// Stage 1: acquire the document bytes, hash them, and persist the binary.
/// The raw bytes are dropped here; only the storage key travels onward.
pub struct DownloadStage {
    storage: Arc<StorageClient>,
    http: reqwest::Client,
    tracker: Arc<ProgressTracker>,
    cancel: CancellationToken,
    max_file_size: u64,
}

impl DownloadStage {
    pub fn new(
        storage: Arc<StorageClient>,
        tracker: Arc<ProgressTracker>,
        cancel: CancellationToken,
        max_file_size: u64,
    ) -> Self {
        Self {
            storage,
            http: reqwest::Client::new(),
            tracker,
            cancel,
            max_file_size,
        }
    }

    async fn fetch(&self, job: &DownloadJob) -> Result<bytes::Bytes, (String, bool)> {
        match &job.source {
            IngestSource::Buffer(bytes) => Ok(bytes.clone()),
            IngestSource::RemoteUrl(url) => {
                let response = self
                    .http
                    .get(url.clone())
                    .send()
                    .await
                    .map_err(|err| (format!("fetch failed: {err}"), true))?;

                let status = response.status();
                if status == reqwest::StatusCode::NOT_FOUND
                    || status == reqwest::StatusCode::FORBIDDEN
                    || status == reqwest::StatusCode::GONE
                {
                    // The source will never produce this document.
                    return Err((format!("source returned {status}"), false));
                }
                if !status.is_success() {
                    return Err((format!("source returned {status}"), true));
                }
                response
                    .bytes()
                    .await
                    .map_err(|err| (format!("reading source body: {err}"), true))
            }
        }
    }
}

#[async_trait::async_trait]
impl Processor for DownloadStage {
    type Job = DownloadJob;
    type Output = ExtractJob;

    fn name(&self) -> &'static str {
        "download"
    }

    async fn process(&self, item: &QueueItem<DownloadJob>) -> ProcessingResult<ExtractJob> {
        let job = &item.payload;
        let mut document = job.document.clone();
        self.tracker.set_stage(document.id, QueueKind::Download);

        let bytes = match self.fetch(job).await {
            Ok(bytes) => bytes,
            Err((error, should_retry)) => return ProcessingResult::failure(error, should_retry),
        };

        if bytes.len() as u64 > self.max_file_size {
            return ProcessingResult::failure(
                format!(
                    "file is {} bytes, over the {} byte limit",
                    bytes.len(),
                    self.max_file_size
                ),
                false,
            );
        }
        if bytes.is_empty() {
            return ProcessingResult::failure("file is empty", false);
        }

        document.content_hash = Some(hex::encode(Sha256::digest(&bytes)));
        document.size = bytes.len() as u64;

        let key = match storage::object_key(
            job.hints.category.as_deref(),
            &document.file_name,
            document.created_at,
        ) {
            Ok(key) => key,
            Err(err) => return ProcessingResult::failure(err.to_string(), false),
        };

        let content_type = if document.content_type.is_empty()
            || document.content_type == "application/octet-stream"
        {
            storage::content_type_for(&document.file_name).to_string()
        } else {
            document.content_type.clone()
        };

        match self.storage.upload(&key, bytes, &content_type).await {
            Ok(uploaded) => {
                document.content_type = content_type;
                document.storage_key = Some(uploaded.key);
                document.public_url = Some(uploaded.public_url);
                document.touch();
                ProcessingResult::success(ExtractJob {
                    document,
                    hints: job.hints.clone(),
                })
            }
            Err(err) => ProcessingResult::failure(err.to_string(), err.is_transient()),
        }
    }

    async fn on_terminal_failure(&self, item: &QueueItem<DownloadJob>, error: &str) {
        self.tracker.fail(
            item.payload.document.id,
            error,
            self.cancel.is_cancelled(),
        );
    }
}
