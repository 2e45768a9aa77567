use std::sync::atomic::{AtomicU64, Ordering};

/// Storage counters. These back the client's `metrics()` snapshot and are
/// mirrored into the process-wide metrics recorder.
#[derive(Debug, Default)]
pub struct StorageMetrics {
    pub upload_count: AtomicU64,
    pub download_count: AtomicU64,
    pub delete_count: AtomicU64,
    pub error_count: AtomicU64,
    pub bytes_in: AtomicU64,
    pub bytes_out: AtomicU64,
    pub upload_ms: AtomicU64,
    pub download_ms: AtomicU64,
    pub cdn_hits: AtomicU64,
    pub cdn_misses: AtomicU64,
}

impl StorageMetrics {
    pub fn record_upload(&self, bytes: u64, duration_ms: u64) {
        self.upload_count.fetch_add(1, Ordering::Relaxed);
        self.bytes_in.fetch_add(bytes, Ordering::Relaxed);
        self.upload_ms.fetch_add(duration_ms, Ordering::Relaxed);
        metrics::counter!("docket_storage_uploads_total").increment(1);
        metrics::counter!("docket_storage_bytes_in_total").increment(bytes);
    }

    pub fn record_download(&self, bytes: u64, duration_ms: u64) {
        self.download_count.fetch_add(1, Ordering::Relaxed);
        self.bytes_out.fetch_add(bytes, Ordering::Relaxed);
        self.download_ms.fetch_add(duration_ms, Ordering::Relaxed);
        metrics::counter!("docket_storage_downloads_total").increment(1);
        metrics::counter!("docket_storage_bytes_out_total").increment(bytes);
    }

    pub fn record_delete(&self) {
        self.delete_count.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("docket_storage_deletes_total").increment(1);
    }

    pub fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("docket_storage_errors_total").increment(1);
    }

    pub fn record_cdn_hit(&self) {
        self.cdn_hits.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("docket_storage_cdn_hits_total").increment(1);
    }

    pub fn record_cdn_miss(&self) {
        self.cdn_misses.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("docket_storage_cdn_misses_total").increment(1);
    }

    pub fn snapshot(&self) -> StorageMetricsSnapshot {
        let uploads = self.upload_count.load(Ordering::Relaxed);
        let downloads = self.download_count.load(Ordering::Relaxed);
        let hits = self.cdn_hits.load(Ordering::Relaxed);
        let misses = self.cdn_misses.load(Ordering::Relaxed);
        StorageMetricsSnapshot {
            upload_count: uploads,
            download_count: downloads,
            delete_count: self.delete_count.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
            bytes_in: self.bytes_in.load(Ordering::Relaxed),
            bytes_out: self.bytes_out.load(Ordering::Relaxed),
            avg_upload_ms: avg(self.upload_ms.load(Ordering::Relaxed), uploads),
            avg_download_ms: avg(self.download_ms.load(Ordering::Relaxed), downloads),
            cdn_hit_rate: if hits + misses == 0 {
                0.0
            } else {
                hits as f64 / (hits + misses) as f64
            },
        }
    }
}

fn avg(total: u64, count: u64) -> u64 {
    if count == 0 {
        0
    } else {
        total / count
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct StorageMetricsSnapshot {
    pub upload_count: u64,
    pub download_count: u64,
    pub delete_count: u64,
    pub error_count: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub avg_upload_ms: u64,
    pub avg_download_ms: u64,
    pub cdn_hit_rate: f64,
}
