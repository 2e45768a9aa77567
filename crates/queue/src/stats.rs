use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic queue counters. Depth and delayed-item counts live on the queue
/// itself; everything here only ever increases.
#[derive(Debug, Default)]
pub struct QueueStats {
    pub enqueued: AtomicU64,
    pub dequeued: AtomicU64,
    pub completed: AtomicU64,
    pub failed: AtomicU64,
    pub retried: AtomicU64,
    pub total_wait_ms: AtomicU64,
}

impl QueueStats {
    pub fn record_wait(&self, wait_ms: u64) {
        self.dequeued.fetch_add(1, Ordering::Relaxed);
        self.total_wait_ms.fetch_add(wait_ms, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> QueueStatsSnapshot {
        let dequeued = self.dequeued.load(Ordering::Relaxed);
        let total_wait_ms = self.total_wait_ms.load(Ordering::Relaxed);
        QueueStatsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dequeued,
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            avg_wait_ms: if dequeued == 0 {
                0
            } else {
                total_wait_ms / dequeued
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct QueueStatsSnapshot {
    pub enqueued: u64,
    pub dequeued: u64,
    pub completed: u64,
    pub failed: u64,
    pub retried: u64,
    pub avg_wait_ms: u64,
}
