use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Storage configuration is passed explicitly to the client; there is no
/// process-global CDN state beyond the metric counters.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct StorageConfig {
    /// Target bucket. Multi-tenant deployments scope tenants by key prefix
    /// within one bucket.
    pub bucket: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// S3-compatible endpoint override (MinIO, localstack). Path-style
    /// addressing is forced when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cdn: Option<CdnConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct CdnConfig {
    /// Public base URL of the CDN distribution fronting the bucket.
    pub base_url: Url,
    /// Consecutive probe/request failures before the circuit opens.
    #[serde(default = "CdnConfig::default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
    /// Cadence of steady-state health probes.
    #[serde(default = "CdnConfig::default_health_check_interval", with = "humantime_serde")]
    #[schemars(with = "String")]
    pub health_check_interval: Duration,
    /// How long an open circuit waits before probing again.
    #[serde(default = "CdnConfig::default_circuit_breaker_timeout", with = "humantime_serde")]
    #[schemars(with = "String")]
    pub circuit_breaker_timeout: Duration,
    #[serde(default = "CdnConfig::default_probe_timeout", with = "humantime_serde")]
    #[schemars(with = "String")]
    pub probe_timeout: Duration,
    /// Issue best-effort CDN cache purges when objects are deleted.
    #[serde(default = "CdnConfig::default_purge_on_delete")]
    pub purge_on_delete: bool,
}

impl CdnConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            max_consecutive_failures: Self::default_max_consecutive_failures(),
            health_check_interval: Self::default_health_check_interval(),
            circuit_breaker_timeout: Self::default_circuit_breaker_timeout(),
            probe_timeout: Self::default_probe_timeout(),
            purge_on_delete: Self::default_purge_on_delete(),
        }
    }

    fn default_max_consecutive_failures() -> u32 {
        3
    }
    fn default_health_check_interval() -> Duration {
        Duration::from_secs(5 * 60)
    }
    fn default_circuit_breaker_timeout() -> Duration {
        Duration::from_secs(30)
    }
    fn default_probe_timeout() -> Duration {
        Duration::from_secs(10)
    }
    fn default_purge_on_delete() -> bool {
        true
    }
}
