use super::LimitError;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// A continuously-refilling token bucket: `rate` tokens per second with a
/// burst ceiling of `burst`. The balance may go negative through
/// reservations; callers then wait out the deficit.
pub struct RateLimiter {
    inner: Mutex<Bucket>,
}

struct Bucket {
    rate: f64,
    burst: f64,
    tokens: f64,
    last_refill: Instant,
}

/// A committed reservation: the caller owns `n` tokens once `delay` has
/// elapsed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reservation {
    pub delay: Duration,
}

impl RateLimiter {
    pub fn new(rate: f64, burst: u32) -> Self {
        assert!(rate > 0.0, "rate must be positive");
        assert!(burst > 0, "burst must be positive");
        Self {
            inner: Mutex::new(Bucket {
                rate,
                burst: burst as f64,
                tokens: burst as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn rate(&self) -> f64 {
        self.inner.lock().unwrap().rate
    }

    pub fn burst(&self) -> u32 {
        self.inner.lock().unwrap().burst as u32
    }

    /// Swap in a new refill rate, settling the balance at the old rate first.
    pub fn set_rate(&self, rate: f64) {
        assert!(rate > 0.0, "rate must be positive");
        let mut bucket = self.inner.lock().unwrap();
        bucket.refill(Instant::now());
        bucket.rate = rate;
    }

    pub fn allow(&self) -> bool {
        self.allow_n(1)
    }

    /// Non-blocking: take `n` tokens if the balance covers them.
    pub fn allow_n(&self, n: u32) -> bool {
        let mut bucket = self.inner.lock().unwrap();
        bucket.refill(Instant::now());
        if bucket.tokens >= n as f64 {
            bucket.tokens -= n as f64;
            true
        } else {
            false
        }
    }

    /// Commit to `n` tokens now, returning how long the caller must wait
    /// before acting on them. The deficit is drawn against future refill.
    pub fn reserve_n(&self, n: u32) -> Result<Reservation, LimitError> {
        let mut bucket = self.inner.lock().unwrap();
        if n as f64 > bucket.burst {
            return Err(LimitError::ExceedsBurst {
                requested: n,
                burst: bucket.burst as u32,
            });
        }
        bucket.refill(Instant::now());
        bucket.tokens -= n as f64;

        let delay = if bucket.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-bucket.tokens / bucket.rate)
        };
        Ok(Reservation { delay })
    }

    pub async fn wait(&self, cancel: &CancellationToken) -> Result<(), LimitError> {
        self.wait_n(1, cancel).await
    }

    /// Reserve and sleep out the delay, honoring cancellation. A cancelled
    /// wait returns its tokens.
    pub async fn wait_n(&self, n: u32, cancel: &CancellationToken) -> Result<(), LimitError> {
        let reservation = self.reserve_n(n)?;
        if reservation.delay.is_zero() {
            return Ok(());
        }

        tokio::select! {
            () = tokio::time::sleep(reservation.delay) => Ok(()),
            () = cancel.cancelled() => {
                let mut bucket = self.inner.lock().unwrap();
                bucket.refill(Instant::now());
                bucket.tokens = (bucket.tokens + n as f64).min(bucket.burst);
                Err(LimitError::Cancelled)
            }
        }
    }
}

impl Bucket {
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.last_refill = now;
        self.tokens = (self.tokens + elapsed.as_secs_f64() * self.rate).min(self.burst);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn burst_is_granted_immediately_then_throttled() {
        let limiter = RateLimiter::new(10.0, 5);
        for _ in 0..5 {
            assert!(limiter.allow());
        }
        assert!(!limiter.allow());
    }

    #[test]
    fn grants_never_exceed_burst_plus_refill() {
        // Over an interval dt, granted tokens must be <= burst + rate*dt.
        let limiter = RateLimiter::new(1_000.0, 10);
        let started = Instant::now();
        let mut granted = 0u64;
        while started.elapsed() < Duration::from_millis(50) {
            if limiter.allow() {
                granted += 1;
            }
        }
        let budget = 10.0 + 1_000.0 * started.elapsed().as_secs_f64();
        assert!(
            (granted as f64) <= budget + 1.0,
            "granted {granted} tokens against a budget of {budget:.1}"
        );
    }

    #[test]
    fn reservation_delay_covers_the_deficit() {
        let limiter = RateLimiter::new(2.0, 2);
        assert!(limiter.allow_n(2));

        let reservation = limiter.reserve_n(1).unwrap();
        // One token at 2/s is half a second away.
        assert!(reservation.delay >= Duration::from_millis(400));
        assert!(reservation.delay <= Duration::from_millis(600));
    }

    #[test]
    fn oversized_reservations_are_rejected() {
        let limiter = RateLimiter::new(10.0, 4);
        assert_eq!(
            limiter.reserve_n(5),
            Err(LimitError::ExceedsBurst {
                requested: 5,
                burst: 4
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn wait_sleeps_out_the_reservation() {
        let limiter = RateLimiter::new(10.0, 1);
        let cancel = CancellationToken::new();

        limiter.wait(&cancel).await.unwrap();
        let before = tokio::time::Instant::now();
        limiter.wait(&cancel).await.unwrap();
        // The paused clock auto-advances across the sleep.
        assert!(before.elapsed() >= Duration::from_millis(90));
    }

    #[tokio::test]
    async fn cancelled_wait_returns_tokens() {
        let limiter = RateLimiter::new(0.5, 1);
        let cancel = CancellationToken::new();
        assert!(limiter.allow());

        cancel.cancel();
        assert_eq!(
            limiter.wait(&cancel).await,
            Err(LimitError::Cancelled)
        );
        // The refund undid the cancelled reservation: the next reservation
        // waits ~2s (one token at 0.5/s), not ~4s.
        let reservation = limiter.reserve_n(1).unwrap();
        assert!(reservation.delay <= Duration::from_millis(2_100));
    }
}
