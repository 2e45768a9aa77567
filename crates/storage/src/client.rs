use super::{
    keys, CdnHealth, CdnHealthSnapshot, StorageConfig, StorageError, StorageMetrics,
    StorageMetricsSnapshot,
};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Maximum presigned-URL lifetime accepted by the provider.
const MAX_SIGNED_URL_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

#[derive(Debug, Clone, serde::Serialize)]
pub struct UploadInfo {
    pub key: String,
    pub public_url: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct StorageHealth {
    pub healthy: bool,
    pub checked_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cdn: Option<CdnHealthSnapshot>,
}

/// Façade over an S3-compatible bucket plus an optional CDN distribution.
/// Uploads and downloads are stateless with respect to each other; the only
/// shared mutable state is the CDN circuit and the metric counters.
pub struct StorageClient {
    s3: aws_sdk_s3::Client,
    http: reqwest::Client,
    config: StorageConfig,
    cdn: Option<CdnHealth>,
    metrics: StorageMetrics,
    bucket_healthy: AtomicBool,
    last_health_check: Mutex<Option<DateTime<Utc>>>,
}

impl StorageClient {
    pub async fn connect(config: StorageConfig) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }
        let sdk_config = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &config.endpoint {
            builder = builder
                .endpoint_url(endpoint.as_str())
                .force_path_style(true);
        }
        let s3 = aws_sdk_s3::Client::from_conf(builder.build());

        let cdn = config.cdn.clone().map(CdnHealth::new);
        Self {
            s3,
            http: reqwest::Client::new(),
            config,
            cdn,
            metrics: StorageMetrics::default(),
            bucket_healthy: AtomicBool::new(true),
            last_health_check: Mutex::new(None),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.config.bucket
    }

    pub fn cdn(&self) -> Option<&CdnHealth> {
        self.cdn.as_ref()
    }

    #[tracing::instrument(skip(self, body), fields(bucket = %self.config.bucket))]
    pub async fn upload(
        &self,
        path: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<UploadInfo, StorageError> {
        let key = keys::normalize_path(path)?;
        let size = body.len() as u64;
        let started = Instant::now();

        let result = self
            .s3
            .put_object()
            .bucket(&self.config.bucket)
            .key(&key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await;

        match result {
            Ok(output) => {
                self.metrics
                    .record_upload(size, started.elapsed().as_millis() as u64);
                tracing::debug!(key = %key, size = size, "uploaded object");
                Ok(UploadInfo {
                    public_url: self.resolve_public_url(&key),
                    key,
                    size,
                    etag: output.e_tag().map(str::to_string),
                    uploaded_at: Utc::now(),
                })
            }
            Err(err) => {
                self.metrics.record_error();
                Err(StorageError::Request(err.to_string()))
            }
        }
    }

    #[tracing::instrument(skip(self), fields(bucket = %self.config.bucket))]
    pub async fn download(&self, path: &str) -> Result<Bytes, StorageError> {
        let key = keys::normalize_path(path)?;
        let started = Instant::now();

        let output = self
            .s3
            .get_object()
            .bucket(&self.config.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|err| {
                if matches!(err.as_service_error(), Some(e) if e.is_no_such_key()) {
                    StorageError::NotFound(key.clone())
                } else {
                    self.metrics.record_error();
                    StorageError::Request(err.to_string())
                }
            })?;

        let data = output
            .body
            .collect()
            .await
            .map_err(|err| StorageError::Request(err.to_string()))?
            .into_bytes();

        self.metrics
            .record_download(data.len() as u64, started.elapsed().as_millis() as u64);
        Ok(data)
    }

    #[tracing::instrument(skip(self), fields(bucket = %self.config.bucket))]
    pub async fn delete(&self, path: &str) -> Result<(), StorageError> {
        let key = keys::normalize_path(path)?;

        self.s3
            .delete_object()
            .bucket(&self.config.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|err| {
                self.metrics.record_error();
                StorageError::Request(err.to_string())
            })?;
        self.metrics.record_delete();

        // Best-effort purge so the CDN doesn't keep serving the tombstone.
        if let Some(cdn) = &self.cdn {
            if cdn.config().purge_on_delete {
                let url = cdn.url_for(&key);
                if let Err(err) = self
                    .http
                    .request(reqwest::Method::from_bytes(b"PURGE").unwrap(), url)
                    .send()
                    .await
                {
                    tracing::debug!(key = %key, error = %err, "cdn purge failed");
                }
            }
        }
        Ok(())
    }

    pub async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let key = keys::normalize_path(path)?;

        match self
            .s3
            .head_object()
            .bucket(&self.config.bucket)
            .key(&key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if matches!(err.as_service_error(), Some(e) if e.is_not_found()) => Ok(false),
            Err(err) => {
                self.metrics.record_error();
                Err(StorageError::Request(err.to_string()))
            }
        }
    }

    pub async fn list(&self, prefix: &str, max: usize) -> Result<Vec<ObjectInfo>, StorageError> {
        let prefix = keys::normalize_path(prefix)?;

        let output = self
            .s3
            .list_objects_v2()
            .bucket(&self.config.bucket)
            .prefix(&prefix)
            .max_keys(max.min(i32::MAX as usize) as i32)
            .send()
            .await
            .map_err(|err| {
                self.metrics.record_error();
                StorageError::Request(err.to_string())
            })?;

        Ok(output
            .contents()
            .iter()
            .filter_map(|object| {
                Some(ObjectInfo {
                    key: object.key()?.to_string(),
                    size: object.size().unwrap_or_default().max(0) as u64,
                    last_modified: object
                        .last_modified()
                        .and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos())),
                })
            })
            .collect())
    }

    /// A time-limited GET URL for direct downloads. `ttl` must be in
    /// `(0, 7 days]`.
    pub async fn signed_url(&self, path: &str, ttl: Duration) -> Result<String, StorageError> {
        if ttl.is_zero() || ttl > MAX_SIGNED_URL_TTL {
            return Err(StorageError::InvalidTtl(ttl));
        }
        let key = keys::normalize_path(path)?;

        let presigning = PresigningConfig::expires_in(ttl)
            .map_err(|err| StorageError::Request(err.to_string()))?;
        let presigned = self
            .s3
            .get_object()
            .bucket(&self.config.bucket)
            .key(&key)
            .presigned(presigning)
            .await
            .map_err(|err| {
                self.metrics.record_error();
                StorageError::Request(err.to_string())
            })?;
        Ok(presigned.uri().to_string())
    }

    /// HEAD the bucket and update the cached health flag.
    pub async fn health(&self) -> StorageHealth {
        let healthy = self
            .s3
            .head_bucket()
            .bucket(&self.config.bucket)
            .send()
            .await
            .is_ok();

        self.bucket_healthy.store(healthy, Ordering::Relaxed);
        let checked_at = Utc::now();
        *self.last_health_check.lock().unwrap() = Some(checked_at);

        StorageHealth {
            healthy,
            checked_at,
            cdn: self.cdn.as_ref().map(CdnHealth::snapshot),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.bucket_healthy.load(Ordering::Relaxed)
    }

    /// Resolve the public URL for an object: the CDN when it is configured
    /// and healthy, otherwise the bucket origin.
    pub fn resolve_public_url(&self, key: &str) -> String {
        if let Some(cdn) = &self.cdn {
            if cdn.is_serving() {
                self.metrics.record_cdn_hit();
                return cdn.url_for(key);
            }
            self.metrics.record_cdn_miss();
        }
        self.origin_url(key)
    }

    pub fn origin_url(&self, key: &str) -> String {
        let key = crate::cdn::encode_key(key.trim_start_matches('/'));
        match &self.config.endpoint {
            Some(endpoint) => format!(
                "{}/{}/{}",
                endpoint.as_str().trim_end_matches('/'),
                self.config.bucket,
                key
            ),
            None => format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.config.bucket,
                self.config.region.as_deref().unwrap_or("us-east-1"),
                key
            ),
        }
    }

    pub fn metrics(&self) -> StorageMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn cdn_snapshot(&self) -> Option<CdnHealthSnapshot> {
        self.cdn.as_ref().map(CdnHealth::snapshot)
    }

    /// Background task driving periodic CDN probes: steady-state probes on
    /// the health interval, and re-probes of an open circuit after the
    /// breaker timeout.
    pub fn spawn_cdn_probe_task(
        self: &Arc<Self>,
        cancel: CancellationToken,
    ) -> Option<tokio::task::JoinHandle<()>> {
        let cdn_config = self.cdn.as_ref()?.config().clone();
        let client = self.clone();
        let tick = cdn_config
            .circuit_breaker_timeout
            .min(Duration::from_secs(5));

        Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => return,
                    () = tokio::time::sleep(tick) => {}
                }
                let Some(cdn) = client.cdn() else { return };
                if cdn.should_probe(Instant::now()) {
                    let serving = cdn.probe(&client.http).await;
                    tracing::debug!(serving = serving, "cdn probe completed");
                }
            }
        }))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::CdnConfig;
    use url::Url;

    async fn client_with_cdn() -> StorageClient {
        StorageClient::connect(StorageConfig {
            bucket: "docket-test".to_string(),
            region: Some("us-west-2".to_string()),
            endpoint: None,
            cdn: Some(CdnConfig::new(
                Url::parse("https://cdn.example.com").unwrap(),
            )),
        })
        .await
    }

    #[tokio::test]
    async fn url_resolution_prefers_a_healthy_cdn() {
        let client = client_with_cdn().await;
        let url = client.resolve_public_url("documents/criminal/2024-01-01/a.pdf");
        assert!(url.starts_with("https://cdn.example.com/"));
        assert!(client.metrics().cdn_hit_rate > 0.99);
    }

    #[tokio::test]
    async fn open_circuit_falls_back_to_origin_and_counts_a_miss() {
        let client = client_with_cdn().await;
        for _ in 0..3 {
            client.cdn().unwrap().record_failure();
        }

        let url = client.resolve_public_url("documents/criminal/2024-01-01/a.pdf");
        assert_eq!(
            url,
            "https://docket-test.s3.us-west-2.amazonaws.com/documents/criminal/2024-01-01/a.pdf"
        );
        assert!(client.metrics().cdn_hit_rate < 0.01);
    }

    #[tokio::test]
    async fn endpoint_override_builds_path_style_origin_urls() {
        let client = StorageClient::connect(StorageConfig {
            bucket: "docket-test".to_string(),
            region: None,
            endpoint: Some(Url::parse("http://localhost:9000").unwrap()),
            cdn: None,
        })
        .await;
        assert_eq!(
            client.origin_url("documents/a.pdf"),
            "http://localhost:9000/docket-test/documents/a.pdf"
        );
    }

    #[tokio::test]
    async fn signed_url_rejects_out_of_range_ttls() {
        let client = client_with_cdn().await;
        assert!(matches!(
            client.signed_url("documents/a.pdf", Duration::ZERO).await,
            Err(StorageError::InvalidTtl(_))
        ));
        assert!(matches!(
            client
                .signed_url("documents/a.pdf", Duration::from_secs(8 * 24 * 3600))
                .await,
            Err(StorageError::InvalidTtl(_))
        ));
    }
}
