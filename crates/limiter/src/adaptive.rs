use super::{LimitError, RateLimiter};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct AdaptiveConfig {
    pub base_rate: f64,
    pub min_rate: f64,
    pub max_rate: f64,
    pub burst: u32,
    /// Length of one observation window.
    pub window: Duration,
    /// Error rate above which the rate is cut to 0.8x.
    pub error_rate_threshold: f64,
    /// Average latency above which the rate is scaled by 0.9x.
    pub latency_threshold: Duration,
    /// Error rate below which (together with healthy latency) the rate
    /// recovers by 1.1x.
    pub healthy_error_rate: f64,
    pub healthy_latency: Duration,
    /// The bucket is only rebuilt when the target drifts further than this
    /// fraction from the bucket's live rate.
    pub rebuild_threshold: f64,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            base_rate: 5.0,
            min_rate: 0.5,
            max_rate: 20.0,
            burst: 5,
            window: Duration::from_secs(30),
            error_rate_threshold: 0.10,
            latency_threshold: Duration::from_secs(5),
            healthy_error_rate: 0.05,
            healthy_latency: Duration::from_millis(2_500),
            rebuild_threshold: 0.10,
        }
    }
}

/// A token bucket whose refill rate follows observed provider health: high
/// error rates and latency push the rate down, a clean window lets it creep
/// back up. Callers report outcomes through `record_success`/`record_error`;
/// adjustment happens lazily on the next limiter call after a window closes.
pub struct AdaptiveLimiter {
    config: AdaptiveConfig,
    bucket: RateLimiter,
    /// The logical current rate. Small adjustments accumulate here without
    /// rebuilding the bucket until they drift past the rebuild threshold.
    target: Mutex<f64>,
    window: Mutex<Window>,
}

#[derive(Debug)]
struct Window {
    started: Instant,
    successes: u64,
    errors: u64,
    total_latency: Duration,
}

impl Window {
    fn reset(&mut self, now: Instant) {
        self.started = now;
        self.successes = 0;
        self.errors = 0;
        self.total_latency = Duration::ZERO;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct AdaptiveSnapshot {
    pub rate: f64,
    pub bucket_rate: f64,
    pub window_successes: u64,
    pub window_errors: u64,
}

impl AdaptiveLimiter {
    pub fn new(config: AdaptiveConfig) -> Self {
        let bucket = RateLimiter::new(config.base_rate, config.burst);
        Self {
            target: Mutex::new(config.base_rate),
            window: Mutex::new(Window {
                started: Instant::now(),
                successes: 0,
                errors: 0,
                total_latency: Duration::ZERO,
            }),
            bucket,
            config,
        }
    }

    pub fn record_success(&self, latency: Duration) {
        let mut window = self.window.lock().unwrap();
        window.successes += 1;
        window.total_latency += latency;
    }

    pub fn record_error(&self, latency: Duration) {
        let mut window = self.window.lock().unwrap();
        window.errors += 1;
        window.total_latency += latency;
    }

    pub fn allow(&self) -> bool {
        self.maybe_adjust();
        self.bucket.allow()
    }

    pub async fn wait(&self, cancel: &CancellationToken) -> Result<(), LimitError> {
        self.maybe_adjust();
        self.bucket.wait(cancel).await
    }

    /// The logical current rate, including adjustments too small to have
    /// rebuilt the bucket yet.
    pub fn current_rate(&self) -> f64 {
        *self.target.lock().unwrap()
    }

    pub fn snapshot(&self) -> AdaptiveSnapshot {
        let window = self.window.lock().unwrap();
        AdaptiveSnapshot {
            rate: *self.target.lock().unwrap(),
            bucket_rate: self.bucket.rate(),
            window_successes: window.successes,
            window_errors: window.errors,
        }
    }

    fn maybe_adjust(&self) {
        let now = Instant::now();
        let (samples, error_rate, avg_latency) = {
            let mut window = self.window.lock().unwrap();
            if now.saturating_duration_since(window.started) < self.config.window {
                return;
            }
            let samples = window.successes + window.errors;
            if samples == 0 {
                window.started = now;
                return;
            }
            let error_rate = window.errors as f64 / samples as f64;
            let avg_latency = window.total_latency / samples as u32;
            window.reset(now);
            (samples, error_rate, avg_latency)
        };

        let mut target = self.target.lock().unwrap();
        let previous = *target;
        let mut rate = previous;

        if error_rate > self.config.error_rate_threshold {
            rate = 0.8 * rate;
        }
        if avg_latency > self.config.latency_threshold {
            rate *= 0.9;
        }
        if error_rate < self.config.healthy_error_rate
            && avg_latency < self.config.healthy_latency
        {
            rate *= 1.1;
        }
        rate = rate.clamp(self.config.min_rate, self.config.max_rate);
        *target = rate;

        let bucket_rate = self.bucket.rate();
        if (rate - bucket_rate).abs() > bucket_rate * self.config.rebuild_threshold {
            self.bucket.set_rate(rate);
            tracing::info!(
                previous = previous,
                rate = rate,
                error_rate = error_rate,
                avg_latency_ms = avg_latency.as_millis() as u64,
                samples = samples,
                "adjusted adaptive rate limit"
            );
        } else {
            tracing::debug!(
                rate = rate,
                bucket_rate = bucket_rate,
                "rate drift below rebuild threshold"
            );
        }
    }
}
