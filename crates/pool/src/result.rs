use std::time::Duration;

/// The outcome of one processor invocation. `duration` is stamped by the
/// pool after the call returns (or times out).
#[derive(Debug)]
pub struct ProcessingResult<Out> {
    pub output: Option<Out>,
    pub error: Option<String>,
    pub should_retry: bool,
    pub duration: Duration,
}

impl<Out> ProcessingResult<Out> {
    pub fn success(output: Out) -> Self {
        Self {
            output: Some(output),
            error: None,
            should_retry: false,
            duration: Duration::ZERO,
        }
    }

    /// Success with nothing to hand to a next stage (terminal stages).
    pub fn done() -> Self {
        Self {
            output: None,
            error: None,
            should_retry: false,
            duration: Duration::ZERO,
        }
    }

    pub fn failure(error: impl Into<String>, should_retry: bool) -> Self {
        Self {
            output: None,
            error: Some(error.into()),
            should_retry,
            duration: Duration::ZERO,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
