use super::{PoolStats, PoolStatsSnapshot, ProcessingResult, Processor};
use queue::{PriorityQueue, QueueItem, RequeueError};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub workers: usize,
    /// Internal job channel capacity; raised to `workers` if configured lower.
    pub channel_capacity: usize,
    pub item_timeout: Duration,
    pub submit_timeout: Duration,
    pub stop_timeout: Duration,
    pub slow_item_warning: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            channel_capacity: 8,
            item_timeout: Duration::from_secs(120),
            submit_timeout: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(30),
            slow_item_warning: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("pool '{0}' is already running")]
    AlreadyRunning(String),
    #[error("pool '{0}' is not running")]
    NotRunning(String),
    #[error("job submission timed out after {0:?}")]
    SubmitTimeout(Duration),
    #[error("job channel is closed")]
    ChannelClosed,
    #[error("workers did not quiesce within {0:?}")]
    StopTimeout(Duration),
}

/// A fixed-size pool of workers draining one priority queue. A feeder task
/// moves ready items from the queue into a bounded job channel; workers pull
/// from the channel, run the stage processor under the per-item timeout, and
/// hand successful output to the next stage's queue.
pub struct WorkerPool<P: Processor> {
    name: String,
    config: PoolConfig,
    processor: Arc<P>,
    source: Arc<PriorityQueue<P::Job>>,
    next: Option<Arc<PriorityQueue<P::Output>>>,
    stats: Arc<PoolStats>,
    state: Mutex<State<P::Job>>,
}

enum State<J> {
    Idle,
    Running(Running<J>),
}

struct Running<J> {
    feeder_cancel: CancellationToken,
    tx: mpsc::Sender<QueueItem<J>>,
    rx: SharedRx<J>,
    feeder: tokio::task::JoinHandle<()>,
    workers: Vec<WorkerHandle>,
    next_worker_id: usize,
}

struct WorkerHandle {
    id: usize,
    cancel: CancellationToken,
    handle: tokio::task::JoinHandle<()>,
}

type SharedRx<J> = Arc<tokio::sync::Mutex<mpsc::Receiver<QueueItem<J>>>>;

impl<P: Processor> WorkerPool<P> {
    pub fn new(
        name: impl Into<String>,
        config: PoolConfig,
        processor: Arc<P>,
        source: Arc<PriorityQueue<P::Job>>,
        next: Option<Arc<PriorityQueue<P::Output>>>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            processor,
            source,
            next,
            stats: Arc::new(PoolStats::default()),
            state: Mutex::new(State::Idle),
        }
    }

    /// Launch the feeder and `config.workers` workers. Fails if the pool is
    /// already running.
    pub fn start(&self) -> Result<(), PoolError> {
        let mut state = self.state.lock().unwrap();
        if matches!(*state, State::Running(_)) {
            return Err(PoolError::AlreadyRunning(self.name.clone()));
        }

        let capacity = self.config.channel_capacity.max(self.config.workers);
        let (tx, rx) = mpsc::channel(capacity);
        let rx: SharedRx<P::Job> = Arc::new(tokio::sync::Mutex::new(rx));
        let feeder_cancel = CancellationToken::new();

        let feeder = tokio::spawn(feed(
            self.name.clone(),
            self.source.clone(),
            tx.clone(),
            feeder_cancel.clone(),
        ));

        let mut running = Running {
            feeder_cancel,
            tx,
            rx: rx.clone(),
            feeder,
            workers: Vec::with_capacity(self.config.workers),
            next_worker_id: 0,
        };
        for _ in 0..self.config.workers {
            let id = running.next_worker_id;
            running.next_worker_id += 1;
            running.workers.push(self.spawn_worker(id, rx.clone()));
        }

        tracing::info!(pool = %self.name, workers = self.config.workers, "worker pool started");
        *state = State::Running(running);
        Ok(())
    }

    /// Close the job channel and wait for workers to quiesce, bounded by the
    /// configured stop ceiling. Workers that have not exited by the deadline
    /// are cancelled and the call reports `StopTimeout`.
    pub async fn stop(&self) -> Result<(), PoolError> {
        let running = {
            let mut state = self.state.lock().unwrap();
            match std::mem::replace(&mut *state, State::Idle) {
                State::Running(running) => running,
                State::Idle => return Err(PoolError::NotRunning(self.name.clone())),
            }
        };

        // Stop feeding and close the channel; workers drain what's buffered
        // and then observe the closed channel.
        running.feeder_cancel.cancel();
        drop(running.tx);

        let (cancels, handles): (Vec<_>, Vec<_>) = running
            .workers
            .into_iter()
            .map(|w| (w.cancel, w.handle))
            .unzip();

        let joined = tokio::time::timeout(
            self.config.stop_timeout,
            futures::future::join_all(handles),
        )
        .await;

        let _ = running.feeder.await;

        match joined {
            Ok(results) => {
                for result in results {
                    if let Err(err) = result {
                        tracing::error!(pool = %self.name, error = %err, "worker task panicked");
                    }
                }
                tracing::info!(pool = %self.name, "worker pool stopped");
                Ok(())
            }
            Err(_) => {
                for cancel in cancels {
                    cancel.cancel();
                }
                Err(PoolError::StopTimeout(self.config.stop_timeout))
            }
        }
    }

    /// Push an item directly into the job channel, bypassing the queue.
    /// Rejects when not running; fails with `SubmitTimeout` when the channel
    /// stays full past the admission timeout.
    pub async fn submit(&self, item: QueueItem<P::Job>) -> Result<(), PoolError> {
        let tx = match &*self.state.lock().unwrap() {
            State::Running(running) => running.tx.clone(),
            State::Idle => return Err(PoolError::NotRunning(self.name.clone())),
        };

        match tokio::time::timeout(self.config.submit_timeout, tx.send(item)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(PoolError::ChannelClosed),
            Err(_) => Err(PoolError::SubmitTimeout(self.config.submit_timeout)),
        }
    }

    /// Grow or shrink the worker set. Shrinking cancels the trimmed workers'
    /// tokens: each finishes its current item and exits.
    pub fn resize(&self, workers: usize) -> Result<(), PoolError> {
        let mut state = self.state.lock().unwrap();
        let running = match &mut *state {
            State::Running(running) => running,
            State::Idle => return Err(PoolError::NotRunning(self.name.clone())),
        };

        while running.workers.len() > workers {
            let worker = running.workers.pop().unwrap();
            tracing::debug!(pool = %self.name, worker = worker.id, "retiring worker");
            worker.cancel.cancel();
            // The retired task detaches and exits after its current item.
        }
        while running.workers.len() < workers {
            let id = running.next_worker_id;
            running.next_worker_id += 1;
            let rx = running.rx.clone();
            running.workers.push(self.spawn_worker(id, rx));
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.state.lock().unwrap(), State::Running(_))
    }

    pub fn worker_count(&self) -> usize {
        match &*self.state.lock().unwrap() {
            State::Running(running) => running.workers.len(),
            State::Idle => 0,
        }
    }

    pub fn stats(&self) -> PoolStatsSnapshot {
        self.stats.snapshot()
    }

    fn spawn_worker(&self, id: usize, rx: SharedRx<P::Job>) -> WorkerHandle {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(worker_loop(
            self.name.clone(),
            id,
            self.config.clone(),
            self.processor.clone(),
            self.source.clone(),
            self.next.clone(),
            self.stats.clone(),
            rx,
            cancel.clone(),
        ));
        WorkerHandle { id, cancel, handle }
    }
}

async fn feed<J: Send + 'static>(
    pool: String,
    source: Arc<PriorityQueue<J>>,
    tx: mpsc::Sender<QueueItem<J>>,
    cancel: CancellationToken,
) {
    loop {
        match source.dequeue(&cancel).await {
            Ok(item) => {
                if tx.send(item).await.is_err() {
                    return;
                }
            }
            Err(queue::QueueError::Cancelled) => return,
            Err(queue::QueueError::ClosedEmpty) => {
                tracing::debug!(pool = %pool, "source queue closed and drained");
                return;
            }
            Err(err) => {
                tracing::error!(pool = %pool, error = %err, "unexpected dequeue error");
                return;
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn worker_loop<P: Processor>(
    pool: String,
    worker_id: usize,
    config: PoolConfig,
    processor: Arc<P>,
    source: Arc<PriorityQueue<P::Job>>,
    next: Option<Arc<PriorityQueue<P::Output>>>,
    stats: Arc<PoolStats>,
    rx: SharedRx<P::Job>,
    cancel: CancellationToken,
) {
    stats.workers.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    tracing::debug!(pool = %pool, worker = worker_id, "worker started");

    loop {
        let item = tokio::select! {
            () = cancel.cancelled() => break,
            item = recv_next(&rx) => match item {
                Some(item) => item,
                None => break,
            },
        };
        process_one(
            &pool, worker_id, &config, &*processor, &source, &next, &stats, item, &cancel,
        )
        .await;
    }

    stats.workers.fetch_sub(1, std::sync::atomic::Ordering::Relaxed);
    tracing::debug!(pool = %pool, worker = worker_id, "worker exited");
}

// Workers take turns holding the receiver lock while idle; the lock is
// released before the item is processed.
async fn recv_next<J>(rx: &SharedRx<J>) -> Option<QueueItem<J>> {
    rx.lock().await.recv().await
}

#[allow(clippy::too_many_arguments)]
async fn process_one<P: Processor>(
    pool: &str,
    worker_id: usize,
    config: &PoolConfig,
    processor: &P,
    source: &Arc<PriorityQueue<P::Job>>,
    next: &Option<Arc<PriorityQueue<P::Output>>>,
    stats: &PoolStats,
    mut item: QueueItem<P::Job>,
    cancel: &CancellationToken,
) {
    stats.active.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    let started = Instant::now();
    let outcome = tokio::time::timeout(config.item_timeout, processor.process(&item)).await;
    let duration = started.elapsed();
    stats.active.fetch_sub(1, std::sync::atomic::Ordering::Relaxed);

    if duration >= config.slow_item_warning {
        tracing::warn!(
            pool = %pool,
            worker = worker_id,
            item = %item.id,
            duration_ms = duration.as_millis() as u64,
            "slow job"
        );
    }

    let mut result: ProcessingResult<P::Output> = match outcome {
        Ok(result) => result,
        Err(_) => ProcessingResult::failure(
            format!("processing timed out after {:?}", config.item_timeout),
            true,
        ),
    };
    result.duration = duration;
    let duration_ms = duration.as_millis() as u64;

    if result.is_success() {
        stats.record_success(duration_ms);
        source.complete(&mut item);

        if let (Some(next), Some(output)) = (next.as_ref(), result.output.take()) {
            let handoff = item.hand_off(output);
            if let Err(err) = next.enqueue_wait(handoff, cancel).await {
                // The next stage is closed or we're cancelled; the document
                // will not progress, so resolve it now.
                tracing::warn!(
                    pool = %pool,
                    item = %item.id,
                    error = %err,
                    "failed to hand item off to the next stage"
                );
                processor
                    .on_terminal_failure(&item, "could not hand off to the next stage")
                    .await;
            }
        }
        return;
    }

    let error = result.error.take().unwrap_or_else(|| "unknown error".to_string());
    if result.should_retry {
        match source.requeue_for_retry(item) {
            Ok(()) => {}
            Err(RequeueError::Exhausted(exhausted)) => {
                stats.record_failure(duration_ms);
                tracing::warn!(
                    pool = %pool,
                    item = %exhausted.id,
                    retries = exhausted.retry_count,
                    error = %error,
                    "item exhausted its retries"
                );
                processor.on_terminal_failure(&exhausted, &error).await;
            }
            Err(RequeueError::Closed(dropped)) => {
                tracing::warn!(pool = %pool, item = %dropped.id, "queue closed while requeueing");
            }
        }
    } else {
        stats.record_failure(duration_ms);
        source.fail(&mut item);
        tracing::warn!(pool = %pool, item = %item.id, error = %error, "item failed terminally");
        processor.on_terminal_failure(&item, &error).await;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use models::Priority;
    use queue::QueueConfig;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn source_queue(max_retries: u32) -> Arc<PriorityQueue<u64>> {
        Arc::new(PriorityQueue::new(QueueConfig {
            name: "source".to_string(),
            max_size: 64,
            default_max_retries: max_retries,
            base_retry_delay: Duration::from_millis(5),
            exponential_backoff: true,
        }))
    }

    fn fast_config(workers: usize) -> PoolConfig {
        PoolConfig {
            workers,
            channel_capacity: workers,
            item_timeout: Duration::from_millis(250),
            submit_timeout: Duration::from_millis(100),
            stop_timeout: Duration::from_secs(5),
            slow_item_warning: Duration::from_secs(30),
        }
    }

    async fn wait_until(mut check: impl FnMut() -> bool) {
        for _ in 0..500 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached within 5s");
    }

    /// Doubles its input, or fails according to the payload's low bits.
    #[derive(Default)]
    struct Doubler {
        terminal_failures: AtomicU64,
    }

    const FAIL_TERMINAL: u64 = 1_000;
    const FAIL_RETRYABLE: u64 = 2_000;
    const HANG: u64 = 3_000;

    #[async_trait::async_trait]
    impl super::Processor for Doubler {
        type Job = u64;
        type Output = u64;

        fn name(&self) -> &'static str {
            "doubler"
        }

        async fn process(&self, item: &QueueItem<u64>) -> ProcessingResult<u64> {
            match item.payload {
                FAIL_TERMINAL => ProcessingResult::failure("unsupported input", false),
                FAIL_RETRYABLE => ProcessingResult::failure("flaky upstream", true),
                HANG => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    ProcessingResult::done()
                }
                n => ProcessingResult::success(n * 2),
            }
        }

        async fn on_terminal_failure(&self, _item: &QueueItem<u64>, _error: &str) {
            self.terminal_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[tokio::test]
    async fn processes_items_and_hands_off_output() {
        let source = source_queue(2);
        let sink = Arc::new(PriorityQueue::new(QueueConfig::default()));
        let pool = WorkerPool::new(
            "test",
            fast_config(2),
            Arc::new(Doubler::default()),
            source.clone(),
            Some(sink.clone()),
        );

        for n in [1u64, 2, 3] {
            source.enqueue(QueueItem::new(Priority::Normal, n)).unwrap();
        }
        pool.start().unwrap();
        wait_until(|| sink.size() == 3).await;
        pool.stop().await.unwrap();

        let mut outputs: Vec<u64> = (0..3).map(|_| sink.try_dequeue().unwrap().payload).collect();
        outputs.sort_unstable();
        assert_eq!(outputs, vec![2, 4, 6]);
        assert_eq!(pool.stats().processed, 3);
        assert_eq!(pool.stats().failed, 0);
    }

    #[tokio::test]
    async fn terminal_failures_are_not_retried() {
        let source = source_queue(3);
        let processor = Arc::new(Doubler::default());
        let pool = WorkerPool::new(
            "test",
            fast_config(1),
            processor.clone(),
            source.clone(),
            None,
        );

        source
            .enqueue(QueueItem::new(Priority::Normal, FAIL_TERMINAL))
            .unwrap();
        pool.start().unwrap();
        wait_until(|| processor.terminal_failures.load(Ordering::Relaxed) == 1).await;
        pool.stop().await.unwrap();

        assert_eq!(pool.stats().failed, 1);
        assert_eq!(source.stats().retried, 0);
    }

    #[tokio::test]
    async fn retryable_failures_back_off_then_exhaust() {
        let source = source_queue(2);
        let processor = Arc::new(Doubler::default());
        let pool = WorkerPool::new(
            "test",
            fast_config(1),
            processor.clone(),
            source.clone(),
            None,
        );

        source
            .enqueue(QueueItem::new(Priority::Normal, FAIL_RETRYABLE))
            .unwrap();
        pool.start().unwrap();
        wait_until(|| processor.terminal_failures.load(Ordering::Relaxed) == 1).await;
        pool.stop().await.unwrap();

        // Two scheduled retries, then exhaustion counts exactly one failure.
        assert_eq!(source.stats().retried, 2);
        assert_eq!(pool.stats().failed, 1);
    }

    #[tokio::test]
    async fn timeouts_are_retryable() {
        let source = source_queue(1);
        let processor = Arc::new(Doubler::default());
        let pool = WorkerPool::new(
            "test",
            fast_config(1),
            processor.clone(),
            source.clone(),
            None,
        );

        source.enqueue(QueueItem::new(Priority::Normal, HANG)).unwrap();
        pool.start().unwrap();
        wait_until(|| processor.terminal_failures.load(Ordering::Relaxed) == 1).await;
        pool.stop().await.unwrap();

        assert_eq!(source.stats().retried, 1);
    }

    #[tokio::test]
    async fn submit_requires_a_running_pool() {
        let source = source_queue(2);
        let pool = WorkerPool::new(
            "test",
            fast_config(1),
            Arc::new(Doubler::default()),
            source.clone(),
            None,
        );

        let err = pool
            .submit(QueueItem::new(Priority::Normal, 7))
            .await
            .unwrap_err();
        assert!(matches!(err, PoolError::NotRunning(_)));

        pool.start().unwrap();
        assert!(matches!(pool.start(), Err(PoolError::AlreadyRunning(_))));
        pool.submit(QueueItem::new(Priority::Normal, 7)).await.unwrap();
        wait_until(|| pool.stats().processed == 1).await;
        pool.stop().await.unwrap();
    }

    #[tokio::test]
    async fn resize_grows_and_shrinks_the_worker_set() {
        let source = source_queue(2);
        let pool = WorkerPool::new(
            "test",
            fast_config(2),
            Arc::new(Doubler::default()),
            source.clone(),
            None,
        );

        assert!(matches!(pool.resize(4), Err(PoolError::NotRunning(_))));
        pool.start().unwrap();
        assert_eq!(pool.worker_count(), 2);

        pool.resize(4).unwrap();
        assert_eq!(pool.worker_count(), 4);

        pool.resize(1).unwrap();
        assert_eq!(pool.worker_count(), 1);

        pool.stop().await.unwrap();
    }
}
