mod batch;
mod config;
mod pipeline;
mod stages;
mod tracker;

pub use batch::{BatchItem, BatchResults, BatchStatus, BatchTracker};
pub use config::PipelineConfig;
pub use pipeline::{Pipeline, PipelineStatus, StageStatus, SubmitRequest};
pub use tracker::{DocumentProgress, Outcome, ProgressTracker};

#[derive(Debug, thiserror::Error)]
pub enum AdmitError {
    /// The download queue is at capacity; surfaces as HTTP 429.
    #[error("pipeline admission queue is full")]
    QueueFull,
    #[error("pipeline is shutting down")]
    ShuttingDown,
    #[error("invalid document: {0}")]
    Invalid(String),
}
