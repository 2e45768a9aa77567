mod cdn;
mod client;
mod config;
mod keys;
mod metrics;

pub use cdn::{CdnHealth, CdnHealthSnapshot, CircuitState};
pub use client::{ObjectInfo, StorageClient, StorageHealth, UploadInfo};
pub use config::{CdnConfig, StorageConfig};
pub use keys::{content_type_for, normalize_path, object_key, sanitize_file_name, KeyError};
pub use metrics::{StorageMetrics, StorageMetricsSnapshot};

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error(transparent)]
    InvalidKey(#[from] KeyError),
    #[error("object '{0}' was not found")]
    NotFound(String),
    #[error("signed-url ttl {0:?} is outside (0, 7 days]")]
    InvalidTtl(Duration),
    #[error("storage request failed: {0}")]
    Request(String),
}

impl StorageError {
    /// Storage failures other than key validation are retryable upstream
    /// conditions.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Request(_))
    }
}
