use super::{QueueError, QueueItem, QueueStats, QueueStatsSnapshot, RequeueError};
use chrono::{DateTime, Utc};
use models::{Id, Priority};
use std::collections::BinaryHeap;
use std::sync::atomic::Ordering;
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Backoff delays never exceed five minutes regardless of retry count.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub name: String,
    pub max_size: usize,
    pub default_max_retries: u32,
    pub base_retry_delay: Duration,
    pub exponential_backoff: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: "queue".to_string(),
            max_size: 1_000,
            default_max_retries: 3,
            base_retry_delay: Duration::from_secs(1),
            exponential_backoff: true,
        }
    }
}

/// The delay before retry `retry_count` (1-based) is dispatched again.
pub fn retry_delay(base: Duration, retry_count: u32, exponential: bool) -> Duration {
    let delay = if exponential {
        // base * 2^(n-1); the shift is clamped so large retry counts
        // saturate at the cap instead of overflowing.
        base.saturating_mul(1u32 << (retry_count.saturating_sub(1)).min(30))
    } else {
        base
    };
    delay.min(MAX_RETRY_DELAY)
}

/// A bounded in-memory priority queue. Delivery order is priority descending,
/// then creation time ascending; items whose `next_retry` lies in the future
/// are held back until it passes.
pub struct PriorityQueue<J> {
    config: QueueConfig,
    inner: Mutex<Inner<J>>,
    items_available: tokio::sync::Notify,
    space_available: tokio::sync::Notify,
    stats: QueueStats,
}

struct Inner<J> {
    heap: BinaryHeap<HeapEntry<J>>,
    closed: bool,
    next_seq: u64,
}

struct HeapEntry<J> {
    seq: u64,
    item: QueueItem<J>,
}

impl<J> PartialEq for HeapEntry<J> {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}
impl<J> Eq for HeapEntry<J> {}

impl<J> PartialOrd for HeapEntry<J> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<J> Ord for HeapEntry<J> {
    // BinaryHeap is a max-heap: "greatest" pops first. Higher priority wins;
    // within a priority the earlier created_at wins, with the enqueue
    // sequence breaking exact-timestamp ties.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.item
            .priority
            .cmp(&other.item.priority)
            .then_with(|| other.item.created_at.cmp(&self.item.created_at))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl<J> PriorityQueue<J> {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                heap: BinaryHeap::new(),
                closed: false,
                next_seq: 0,
            }),
            items_available: tokio::sync::Notify::new(),
            space_available: tokio::sync::Notify::new(),
            stats: QueueStats::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Admit an item, rejecting immediately when the queue is at capacity.
    /// This is the external-admission path: callers surface the rejection
    /// (HTTP 429/503) rather than silently delaying.
    pub fn enqueue(&self, item: QueueItem<J>) -> Result<(), QueueError> {
        self.offer(item).map_err(|rejected| match rejected {
            Rejected::Full(_) => QueueError::Full(self.config.max_size),
            Rejected::Closed => QueueError::Closed,
        })
    }

    /// Intra-pipeline handoff: wait for space instead of rejecting, bounded
    /// by the cancellation token.
    pub async fn enqueue_wait(
        &self,
        item: QueueItem<J>,
        cancel: &CancellationToken,
    ) -> Result<(), QueueError> {
        let mut item = item;
        loop {
            let space = self.space_available.notified();
            match self.offer(item) {
                Ok(()) => return Ok(()),
                Err(Rejected::Closed) => return Err(QueueError::Closed),
                Err(Rejected::Full(rejected)) => item = rejected,
            }
            tokio::select! {
                () = space => {},
                () = cancel.cancelled() => return Err(QueueError::Cancelled),
            }
        }
    }

    fn offer(&self, mut item: QueueItem<J>) -> Result<(), Rejected<J>> {
        if item.max_retries == 0 {
            item.max_retries = self.config.default_max_retries;
        }

        {
            let mut inner = self.inner.lock().unwrap();
            if inner.closed {
                return Err(Rejected::Closed);
            }
            if inner.heap.len() >= self.config.max_size {
                return Err(Rejected::Full(item));
            }
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.heap.push(HeapEntry { seq, item });
        }

        self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
        self.items_available.notify_one();
        Ok(())
    }

    /// Remove and return the highest-priority ready item, waiting while the
    /// queue is empty or every queued item is delayed. Returns `ClosedEmpty`
    /// once the queue is closed and drained, and `Cancelled` if the token
    /// fires first.
    pub async fn dequeue(&self, cancel: &CancellationToken) -> Result<QueueItem<J>, QueueError> {
        loop {
            let notified = self.items_available.notified();
            let now = Utc::now();
            let mut wake_after: Option<Duration> = None;

            {
                let mut inner = self.inner.lock().unwrap();
                match pop_ready(&mut inner.heap, now) {
                    PopOutcome::Item(item) => {
                        let waited = (now - item.created_at).num_milliseconds().max(0) as u64;
                        self.stats.record_wait(waited);
                        self.space_available.notify_one();
                        return Ok(item);
                    }
                    PopOutcome::Empty => {
                        if inner.closed {
                            return Err(QueueError::ClosedEmpty);
                        }
                    }
                    PopOutcome::AllDelayed(earliest) => {
                        wake_after = Some(
                            (earliest - now)
                                .to_std()
                                .unwrap_or(Duration::from_millis(1)),
                        );
                    }
                }
            }

            tokio::select! {
                () = notified => {},
                () = cancel.cancelled() => return Err(QueueError::Cancelled),
                () = sleep_or_forever(wake_after) => {},
            }
        }
    }

    /// Non-blocking variant of [`dequeue`]: the highest-priority ready item,
    /// if any.
    pub fn try_dequeue(&self) -> Option<QueueItem<J>> {
        let now = Utc::now();
        let mut inner = self.inner.lock().unwrap();
        match pop_ready(&mut inner.heap, now) {
            PopOutcome::Item(item) => {
                let waited = (now - item.created_at).num_milliseconds().max(0) as u64;
                self.stats.record_wait(waited);
                self.space_available.notify_one();
                Some(item)
            }
            _ => None,
        }
    }

    /// Put a failed item back with backoff. Exhausted items are counted as
    /// failed and handed back to the caller.
    pub fn requeue_for_retry(&self, mut item: QueueItem<J>) -> Result<(), RequeueError<J>> {
        if item.retry_count >= item.max_retries {
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
            return Err(RequeueError::Exhausted(item));
        }

        item.retry_count += 1;
        let delay = retry_delay(
            self.config.base_retry_delay,
            item.retry_count,
            self.config.exponential_backoff,
        );
        item.next_retry = Some(Utc::now() + chrono::Duration::from_std(delay).unwrap());
        self.stats.retried.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            queue = %self.config.name,
            item = %item.id,
            retry = item.retry_count,
            delay_ms = delay.as_millis() as u64,
            "requeued item for retry"
        );

        // A retried item re-occupies the slot it was dequeued from, so the
        // capacity check is intentionally skipped here.
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.closed {
                return Err(RequeueError::Closed(item));
            }
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.heap.push(HeapEntry { seq, item });
        }
        self.items_available.notify_one();
        Ok(())
    }

    /// Record a terminal success for an item dequeued from this queue.
    pub fn complete(&self, item: &mut QueueItem<J>) {
        item.processed_at = Some(Utc::now());
        self.stats.completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a terminal failure for an item dequeued from this queue.
    pub fn fail(&self, item: &mut QueueItem<J>) {
        item.processed_at = Some(Utc::now());
        self.stats.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// A copy of the item that would pop next, delayed or not.
    pub fn peek(&self) -> Option<QueueItem<J>>
    where
        J: Clone,
    {
        let inner = self.inner.lock().unwrap();
        inner.heap.peek().map(|entry| entry.item.clone())
    }

    pub fn size(&self) -> usize {
        self.inner.lock().unwrap().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }

    /// Drop every queued item, returning how many were discarded.
    pub fn clear(&self) -> usize {
        let cleared = {
            let mut inner = self.inner.lock().unwrap();
            let n = inner.heap.len();
            inner.heap.clear();
            n
        };
        self.space_available.notify_waiters();
        cleared
    }

    /// Close the queue. Idempotent; wakes every blocked producer and
    /// consumer so they can observe the closure.
    pub fn close(&self) {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.closed {
                return;
            }
            inner.closed = true;
        }
        self.items_available.notify_waiters();
        self.space_available.notify_waiters();
        tracing::debug!(queue = %self.config.name, "queue closed");
    }

    /// Ids of items that are dispatchable right now (delayed retries
    /// excluded).
    pub fn ready_items(&self) -> Vec<Id> {
        let now = Utc::now();
        let inner = self.inner.lock().unwrap();
        inner
            .heap
            .iter()
            .filter(|e| e.item.is_ready(now))
            .map(|e| e.item.id)
            .collect()
    }

    /// How many queued items are held back waiting out a retry delay.
    pub fn delayed_len(&self) -> usize {
        let now = Utc::now();
        let inner = self.inner.lock().unwrap();
        inner
            .heap
            .iter()
            .filter(|e| !e.item.is_ready(now))
            .count()
    }

    pub fn remove_by_id(&self, id: Id) -> Option<QueueItem<J>> {
        let removed = {
            let mut inner = self.inner.lock().unwrap();
            let mut entries = std::mem::take(&mut inner.heap).into_vec();
            let removed = entries
                .iter()
                .position(|e| e.item.id == id)
                .map(|pos| entries.swap_remove(pos).item);
            inner.heap = entries.into();
            removed
        };
        if removed.is_some() {
            self.space_available.notify_one();
        }
        removed
    }

    pub fn update_priority(&self, id: Id, priority: Priority) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let mut entries = std::mem::take(&mut inner.heap).into_vec();
        let found = match entries.iter_mut().find(|e| e.item.id == id) {
            Some(entry) => {
                entry.item.priority = priority;
                true
            }
            None => false,
        };
        inner.heap = entries.into();
        found
    }

    pub fn stats(&self) -> QueueStatsSnapshot {
        self.stats.snapshot()
    }
}

enum Rejected<J> {
    Full(QueueItem<J>),
    Closed,
}

enum PopOutcome<J> {
    Item(QueueItem<J>),
    Empty,
    /// Everything queued is delayed; the earliest `next_retry` is returned so
    /// the caller can sleep until then.
    AllDelayed(DateTime<Utc>),
}

fn pop_ready<J>(heap: &mut BinaryHeap<HeapEntry<J>>, now: DateTime<Utc>) -> PopOutcome<J> {
    if heap.is_empty() {
        return PopOutcome::Empty;
    }

    // Pop down the heap until a ready item surfaces, then restore whatever
    // was skipped over. Skips are bounded by the number of delayed items.
    let mut skipped = Vec::new();
    let mut found = None;
    while let Some(entry) = heap.pop() {
        if entry.item.is_ready(now) {
            found = Some(entry.item);
            break;
        }
        skipped.push(entry);
    }

    let earliest = skipped
        .iter()
        .filter_map(|e| e.item.next_retry)
        .min();
    for entry in skipped {
        heap.push(entry);
    }

    match (found, earliest) {
        (Some(item), _) => PopOutcome::Item(item),
        (None, Some(at)) => PopOutcome::AllDelayed(at),
        (None, None) => PopOutcome::Empty,
    }
}

async fn sleep_or_forever(after: Option<Duration>) {
    match after {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn queue(max_size: usize) -> PriorityQueue<&'static str> {
        PriorityQueue::new(QueueConfig {
            name: "test".to_string(),
            max_size,
            default_max_retries: 2,
            base_retry_delay: Duration::from_millis(10),
            exponential_backoff: true,
        })
    }

    #[tokio::test]
    async fn higher_priority_is_delivered_first() {
        let q = queue(16);

        q.enqueue(QueueItem::new(Priority::Low, "low")).unwrap();
        q.enqueue(QueueItem::new(Priority::Critical, "critical"))
            .unwrap();
        q.enqueue(QueueItem::new(Priority::Normal, "normal")).unwrap();
        q.enqueue(QueueItem::new(Priority::High, "high")).unwrap();

        // peek sees the next item without removing it.
        assert_eq!(q.peek().unwrap().payload, "critical");
        assert_eq!(q.size(), 4);

        let order: Vec<_> = (0..4).map(|_| q.try_dequeue().unwrap().payload).collect();
        assert_eq!(order, vec!["critical", "high", "normal", "low"]);
    }

    #[tokio::test]
    async fn equal_priority_is_fifo() {
        let q = queue(16);
        for payload in ["first", "second", "third"] {
            q.enqueue(QueueItem::new(Priority::Normal, payload)).unwrap();
        }
        assert_eq!(q.try_dequeue().unwrap().payload, "first");
        assert_eq!(q.try_dequeue().unwrap().payload, "second");
        assert_eq!(q.try_dequeue().unwrap().payload, "third");
    }

    #[tokio::test]
    async fn critical_item_overtakes_queued_normals() {
        let q = queue(32);
        for _ in 0..10 {
            q.enqueue(QueueItem::new(Priority::Normal, "normal")).unwrap();
        }
        q.enqueue(QueueItem::new(Priority::Critical, "critical"))
            .unwrap();
        assert_eq!(q.try_dequeue().unwrap().payload, "critical");
    }

    #[tokio::test]
    async fn full_queue_rejects_admission() {
        let q = queue(100);
        for n in 0..100 {
            assert!(q.enqueue(QueueItem::new(Priority::Normal, "doc")).is_ok(), "{n}");
        }
        assert_eq!(
            q.enqueue(QueueItem::new(Priority::Normal, "doc")),
            Err(QueueError::Full(100))
        );
        assert_eq!(q.size(), 100);
    }

    #[tokio::test]
    async fn retry_count_never_exceeds_max_retries() {
        let q = queue(16);
        let mut item = QueueItem::new(Priority::Normal, "flaky");
        item.max_retries = 2;

        for expected_retry in 1..=2u32 {
            let id = item.id;
            q.requeue_for_retry(item).unwrap();
            // remove_by_id scans the whole heap, so it sees delayed items.
            let requeued = q.remove_by_id(id).unwrap();
            assert_eq!(requeued.retry_count, expected_retry);
            assert!(requeued.next_retry.unwrap() > Utc::now());
            item = requeued;
        }

        let id = item.id;
        let failed_before = q.stats().failed;
        match q.requeue_for_retry(item) {
            Err(RequeueError::Exhausted(exhausted)) => {
                assert_eq!(exhausted.id, id);
                assert_eq!(exhausted.retry_count, 2);
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(q.stats().failed, failed_before + 1);
    }

    #[test]
    fn backoff_doubles_and_caps_at_five_minutes() {
        let base = Duration::from_secs(2);
        assert_eq!(retry_delay(base, 1, true), Duration::from_secs(2));
        assert_eq!(retry_delay(base, 2, true), Duration::from_secs(4));
        assert_eq!(retry_delay(base, 3, true), Duration::from_secs(8));
        assert_eq!(retry_delay(base, 12, true), MAX_RETRY_DELAY);
        assert_eq!(retry_delay(base, u32::MAX, true), MAX_RETRY_DELAY);
        // Linear mode ignores the retry count.
        assert_eq!(retry_delay(base, 5, false), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn delayed_items_are_not_dispatched_early() {
        let q = queue(16);
        let mut item = QueueItem::new(Priority::Critical, "delayed");
        item.max_retries = 3;
        q.requeue_for_retry(item).unwrap();

        // The item sits in the queue but is not ready.
        assert_eq!(q.size(), 1);
        assert_eq!(q.delayed_len(), 1);
        assert!(q.try_dequeue().is_none());

        // Once the backoff passes it becomes dispatchable.
        let cancel = CancellationToken::new();
        let item = q.dequeue(&cancel).await.unwrap();
        assert_eq!(item.payload, "delayed");
    }

    #[tokio::test]
    async fn dequeue_blocks_until_enqueue() {
        let q = std::sync::Arc::new(queue(16));
        let cancel = CancellationToken::new();

        let waiter = {
            let q = q.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { q.dequeue(&cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        q.enqueue(QueueItem::new(Priority::Normal, "late")).unwrap();
        let item = waiter.await.unwrap().unwrap();
        assert_eq!(item.payload, "late");
    }

    #[tokio::test]
    async fn close_wakes_waiters_and_is_idempotent() {
        let q = std::sync::Arc::new(queue(16));
        let cancel = CancellationToken::new();

        let waiter = {
            let q = q.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { q.dequeue(&cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        q.close();
        q.close();
        assert_eq!(waiter.await.unwrap(), Err(QueueError::ClosedEmpty));
        assert_eq!(
            q.enqueue(QueueItem::new(Priority::Normal, "rejected")),
            Err(QueueError::Closed)
        );
    }

    #[tokio::test]
    async fn cancellation_interrupts_dequeue() {
        let q = std::sync::Arc::new(queue(16));
        let cancel = CancellationToken::new();

        let waiter = {
            let q = q.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { q.dequeue(&cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();
        assert_eq!(waiter.await.unwrap(), Err(QueueError::Cancelled));
    }

    #[tokio::test]
    async fn update_priority_reorders_the_heap() {
        let q = queue(16);
        q.enqueue(QueueItem::new(Priority::High, "first")).unwrap();
        let buried = QueueItem::new(Priority::Low, "buried");
        let buried_id = buried.id;
        q.enqueue(buried).unwrap();

        assert!(q.update_priority(buried_id, Priority::Critical));
        assert_eq!(q.try_dequeue().unwrap().payload, "buried");
    }
}
