use std::time::Duration;

use crate::error::SinkError;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_BACKOFF_STEP: Duration = Duration::from_secs(1);

/// Per-file retry policy with linear backoff.
///
/// Attempt `n` that fails with a retryable error is followed by a pause of
/// `n * backoff_step` before attempt `n + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_step: DEFAULT_BACKOFF_STEP,
        }
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep this long, then try again.
    Retry(Duration),
    /// The error is not retryable.
    GiveUp,
    /// Retryable, but no attempts left.
    Exhausted,
}

impl RetryPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_step.saturating_mul(attempt)
    }

    /// `attempt` is 1-based and refers to the attempt that just failed.
    pub fn decide(&self, attempt: u32, error: &SinkError) -> RetryDecision {
        if !error.is_retryable() {
            RetryDecision::GiveUp
        } else if attempt >= self.max_attempts {
            RetryDecision::Exhausted
        } else {
            RetryDecision::Retry(self.backoff(attempt))
        }
    }
}
