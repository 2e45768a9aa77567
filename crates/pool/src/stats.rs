use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct PoolStats {
    pub workers: AtomicUsize,
    pub active: AtomicUsize,
    pub processed: AtomicU64,
    pub failed: AtomicU64,
    pub total_duration_ms: AtomicU64,
}

impl PoolStats {
    pub fn record_success(&self, duration_ms: u64) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.total_duration_ms.fetch_add(duration_ms, Ordering::Relaxed);
    }

    pub fn record_failure(&self, duration_ms: u64) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.total_duration_ms.fetch_add(duration_ms, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PoolStatsSnapshot {
        let processed = self.processed.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let finished = processed + failed;
        PoolStatsSnapshot {
            workers: self.workers.load(Ordering::Relaxed),
            active: self.active.load(Ordering::Relaxed),
            processed,
            failed,
            avg_duration_ms: if finished == 0 {
                0
            } else {
                self.total_duration_ms.load(Ordering::Relaxed) / finished
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct PoolStatsSnapshot {
    pub workers: usize,
    pub active: usize,
    pub processed: u64,
    pub failed: u64,
    pub avg_duration_ms: u64,
}
