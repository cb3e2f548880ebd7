//! Exponential backoff for rate-limited CRM calls.

use std::time::Duration;

/// Delay before the first retry.
pub const INITIAL_DELAY: Duration = Duration::from_millis(200);

/// Attempts per call (per page for paginated collections).
pub const MAX_ATTEMPTS: u32 = 10;

/// Deterministic exponential backoff: `initial_delay * 2^attempt`, no jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial_delay: Duration,
}

impl Backoff {
    pub const fn new(initial_delay: Duration) -> Self {
        Self { initial_delay }
    }

    /// Wait before retrying after `attempt` (0-based) failed.
    ///
    /// Saturates at `Duration::MAX` instead of overflowing.
    pub fn delay(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.initial_delay.checked_mul(factor))
            .unwrap_or(Duration::MAX)
    }

    /// Upper bound on time spent sleeping across `attempts` transient failures.
    pub fn total_delay(&self, attempts: u32) -> Duration {
        (0..attempts).fold(Duration::ZERO, |acc, attempt| {
            acc.saturating_add(self.delay(attempt))
        })
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(INITIAL_DELAY)
    }
}

/// Backoff with the default 200ms initial delay.
pub fn backoff_time(attempt: u32) -> Duration {
    Backoff::default().delay(attempt)
}

/// Bounded retry discipline shared by every CRM and forum call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(MAX_ATTEMPTS, Backoff::default())
    }
}
