mod pool;
mod result;
mod stats;

pub use pool::{PoolConfig, PoolError, WorkerPool};
pub use result::ProcessingResult;
pub use stats::{PoolStats, PoolStatsSnapshot};

use queue::QueueItem;

/// A stage processor. The pool drives one of these per dequeued item,
/// bounded by the per-item timeout, and routes the output into the next
/// stage's queue.
#[async_trait::async_trait]
pub trait Processor: Send + Sync + 'static {
    type Job: Send + 'static;
    type Output: Send + 'static;

    fn name(&self) -> &'static str;

    async fn process(&self, item: &QueueItem<Self::Job>) -> ProcessingResult<Self::Output>;

    /// Invoked once an item fails permanently: either its error was terminal
    /// or its retries are exhausted. Stages override this to record the
    /// document's terminal state (or to degrade instead of failing).
    async fn on_terminal_failure(&self, _item: &QueueItem<Self::Job>, _error: &str) {}
}
