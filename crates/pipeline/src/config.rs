use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(deny_unknown_fields, rename_all = "camelCase", default)]
pub struct PipelineConfig {
    pub download_queue_size: usize,
    pub extract_queue_size: usize,
    pub classify_queue_size: usize,
    pub index_queue_size: usize,

    pub download_workers: usize,
    pub extract_workers: usize,
    pub classify_workers: usize,
    pub index_workers: usize,

    #[serde(with = "humantime_serde")]
    #[schemars(with = "String")]
    pub download_timeout: Duration,
    #[serde(with = "humantime_serde")]
    #[schemars(with = "String")]
    pub extract_timeout: Duration,
    #[serde(with = "humantime_serde")]
    #[schemars(with = "String")]
    pub classify_timeout: Duration,
    #[serde(with = "humantime_serde")]
    #[schemars(with = "String")]
    pub index_timeout: Duration,

    pub max_retries: u32,
    #[serde(with = "humantime_serde")]
    #[schemars(with = "String")]
    pub base_retry_delay: Duration,

    /// Upload ceiling in bytes; larger files are rejected at the download
    /// stage with a terminal error.
    pub max_file_size: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            download_queue_size: 100,
            extract_queue_size: 100,
            classify_queue_size: 100,
            index_queue_size: 200,
            download_workers: 4,
            extract_workers: 4,
            classify_workers: 2,
            index_workers: 4,
            download_timeout: Duration::from_secs(60),
            extract_timeout: Duration::from_secs(120),
            classify_timeout: Duration::from_secs(90),
            index_timeout: Duration::from_secs(30),
            max_retries: 3,
            base_retry_delay: Duration::from_secs(1),
            max_file_size: 50 * 1024 * 1024,
        }
    }
}

impl PipelineConfig {
    /// Upper bound on how long an admitted document can stay in flight:
    /// every stage timing out on every retry.
    pub fn max_processing_time(&self) -> Duration {
        let per_pass = self.download_timeout
            + self.extract_timeout
            + self.classify_timeout
            + self.index_timeout;
        per_pass * (self.max_retries + 1)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn processing_time_bound_scales_with_retries() {
        let config = PipelineConfig {
            download_timeout: Duration::from_secs(10),
            extract_timeout: Duration::from_secs(20),
            classify_timeout: Duration::from_secs(30),
            index_timeout: Duration::from_secs(40),
            max_retries: 2,
            ..Default::default()
        };
        assert_eq!(config.max_processing_time(), Duration::from_secs(300));
    }
}
