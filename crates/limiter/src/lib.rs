mod adaptive;
mod bucket;

pub use adaptive::{AdaptiveConfig, AdaptiveLimiter, AdaptiveSnapshot};
pub use bucket::{RateLimiter, Reservation};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LimitError {
    #[error("rate limiter wait was cancelled")]
    Cancelled,
    #[error("requested {requested} tokens exceeds burst capacity {burst}")]
    ExceedsBurst { requested: u32, burst: u32 },
}
