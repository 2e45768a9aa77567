use super::CdnConfig;
use serde::Serialize;
use std::sync::Mutex;
use std::time::Instant;

/// CDN circuit state. `Healthy` serves CDN URLs; anything else falls back to
/// origin. `Unhealthy` is the counting phase between the first failure and
/// the circuit opening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CircuitState {
    Healthy,
    Unhealthy,
    Open,
}

/// The CDN health state machine of §URL resolution: a value owned by the
/// storage client, not a singleton.
pub struct CdnHealth {
    config: CdnConfig,
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    last_check: Option<Instant>,
    opened_at: Option<Instant>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CdnHealthSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub seconds_since_last_check: Option<u64>,
}

impl CdnHealth {
    pub fn new(config: CdnConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Healthy,
                consecutive_failures: 0,
                last_check: None,
                opened_at: None,
            }),
        }
    }

    pub fn config(&self) -> &CdnConfig {
        &self.config
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().unwrap().state
    }

    /// Only a fully healthy CDN serves URLs.
    pub fn is_serving(&self) -> bool {
        self.state() == CircuitState::Healthy
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state != CircuitState::Healthy {
            tracing::info!(from = ?inner.state, "cdn recovered");
        }
        inner.state = CircuitState::Healthy;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.last_check = Some(Instant::now());
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.consecutive_failures += 1;
        inner.last_check = Some(Instant::now());
        if inner.consecutive_failures >= self.config.max_consecutive_failures {
            if inner.state != CircuitState::Open {
                tracing::warn!(
                    failures = inner.consecutive_failures,
                    "cdn circuit opened; bypassing cdn"
                );
            }
            inner.state = CircuitState::Open;
            inner.opened_at.get_or_insert_with(Instant::now);
        } else {
            inner.state = CircuitState::Unhealthy;
        }
    }

    /// Whether a probe is due: every `health_check_interval` in steady state,
    /// or `circuit_breaker_timeout` after the circuit opened.
    pub fn should_probe(&self, now: Instant) -> bool {
        let inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Open => match inner.opened_at {
                Some(opened) => {
                    now.saturating_duration_since(opened) >= self.config.circuit_breaker_timeout
                }
                None => true,
            },
            CircuitState::Healthy | CircuitState::Unhealthy => match inner.last_check {
                Some(checked) => {
                    now.saturating_duration_since(checked) >= self.config.health_check_interval
                }
                None => true,
            },
        }
    }

    /// One HEAD probe against the CDN base URL, folded into the state
    /// machine. Returns the post-probe serving decision.
    pub async fn probe(&self, http: &reqwest::Client) -> bool {
        let result = http
            .head(self.config.base_url.clone())
            .timeout(self.config.probe_timeout)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() || resp.status().is_redirection() => {
                self.record_success()
            }
            Ok(resp) => {
                tracing::debug!(status = %resp.status(), "cdn probe returned an error status");
                self.record_failure();
            }
            Err(err) => {
                tracing::debug!(error = %err, "cdn probe failed");
                self.record_failure();
            }
        }
        self.is_serving()
    }

    /// The CDN URL for `key`, with per-extension optimization parameters.
    pub fn url_for(&self, key: &str) -> String {
        let base = self.config.base_url.as_str().trim_end_matches('/');
        format!(
            "{}/{}?{}&cache=max",
            base,
            encode_key(key.trim_start_matches('/')),
            optimization_params(key)
        )
    }

    pub fn snapshot(&self) -> CdnHealthSnapshot {
        let inner = self.inner.lock().unwrap();
        CdnHealthSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            seconds_since_last_check: inner.last_check.map(|at| at.elapsed().as_secs()),
        }
    }
}

/// Object keys are sanitized but may still carry non-ASCII characters;
/// encode everything a URL path can't hold. Slashes pass through.
pub(crate) fn encode_key(key: &str) -> String {
    const PATH_SET: &percent_encoding::AsciiSet = &percent_encoding::CONTROLS
        .add(b' ')
        .add(b'"')
        .add(b'<')
        .add(b'>')
        .add(b'`')
        .add(b'?')
        .add(b'#');
    percent_encoding::utf8_percent_encode(key, PATH_SET).to_string()
}

/// Per-extension CDN optimization parameters, applied on top of `cache=max`.
fn optimization_params(key: &str) -> &'static str {
    let extension = key
        .rsplit('.')
        .next()
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match extension.as_str() {
        "png" | "jpg" | "jpeg" | "gif" | "webp" | "tif" | "tiff" => "auto=compress&fm=auto",
        "pdf" => "compress=true",
        "txt" | "css" | "html" | "htm" => "minify=true&gzip=true",
        "mp4" | "mov" | "webm" => "quality=auto",
        _ => "gzip=true",
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Duration;
    use url::Url;

    fn config() -> CdnConfig {
        let mut config = CdnConfig::new(Url::parse("https://cdn.example.com").unwrap());
        config.circuit_breaker_timeout = Duration::from_millis(20);
        config.health_check_interval = Duration::from_millis(50);
        config
    }

    #[test]
    fn three_consecutive_failures_open_the_circuit() {
        let health = CdnHealth::new(config());
        assert_eq!(health.state(), CircuitState::Healthy);

        health.record_failure();
        assert_eq!(health.state(), CircuitState::Unhealthy);
        health.record_failure();
        assert_eq!(health.state(), CircuitState::Unhealthy);
        health.record_failure();
        assert_eq!(health.state(), CircuitState::Open);
        assert!(!health.is_serving());
    }

    #[test]
    fn success_resets_the_counter_and_closes_the_circuit() {
        let health = CdnHealth::new(config());
        health.record_failure();
        health.record_failure();
        health.record_success();
        assert_eq!(health.state(), CircuitState::Healthy);

        // The failure run starts over.
        health.record_failure();
        health.record_failure();
        assert_eq!(health.state(), CircuitState::Unhealthy);
    }

    #[test]
    fn open_circuit_probes_after_the_breaker_timeout() {
        let health = CdnHealth::new(config());
        for _ in 0..3 {
            health.record_failure();
        }
        let now = Instant::now();
        assert!(!health.should_probe(now));
        assert!(health.should_probe(now + Duration::from_millis(25)));
    }

    #[test]
    fn steady_state_probes_on_the_health_interval() {
        let health = CdnHealth::new(config());
        // Never checked: probe immediately.
        assert!(health.should_probe(Instant::now()));

        health.record_success();
        let now = Instant::now();
        assert!(!health.should_probe(now));
        assert!(health.should_probe(now + Duration::from_millis(60)));
    }

    #[test]
    fn urls_carry_extension_specific_params() {
        let health = CdnHealth::new(config());
        assert_eq!(
            health.url_for("documents/criminal/2024-03-09/motion.pdf"),
            "https://cdn.example.com/documents/criminal/2024-03-09/motion.pdf?compress=true&cache=max"
        );
        assert_eq!(
            health.url_for("exhibits/scan.png"),
            "https://cdn.example.com/exhibits/scan.png?auto=compress&fm=auto&cache=max"
        );
        assert_eq!(
            health.url_for("notes/readme.txt"),
            "https://cdn.example.com/notes/readme.txt?minify=true&gzip=true&cache=max"
        );
        assert_eq!(
            health.url_for("media/hearing.mp4"),
            "https://cdn.example.com/media/hearing.mp4?quality=auto&cache=max"
        );
        assert_eq!(
            health.url_for("blob.bin"),
            "https://cdn.example.com/blob.bin?gzip=true&cache=max"
        );
    }
}
