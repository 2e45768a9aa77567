mod item;
mod queue;
mod stats;

pub use item::QueueItem;
pub use queue::{retry_delay, PriorityQueue, QueueConfig, MAX_RETRY_DELAY};
pub use stats::{QueueStats, QueueStatsSnapshot};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue is full (max size {0})")]
    Full(usize),
    #[error("queue is closed")]
    Closed,
    #[error("queue is closed and drained")]
    ClosedEmpty,
    #[error("dequeue was cancelled")]
    Cancelled,
}

/// Error of [`PriorityQueue::requeue_for_retry`]. The rejected item is handed
/// back so the caller can record its terminal state.
#[derive(Debug)]
pub enum RequeueError<J> {
    /// `retry_count` reached `max_retries`; the failed counter was bumped.
    Exhausted(QueueItem<J>),
    Closed(QueueItem<J>),
}
