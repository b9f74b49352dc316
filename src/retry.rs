use std::time::Duration;

/// Bounded retry with exponential backoff, shared by outbound lookups and
/// sink writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Zero is treated as one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl RetryPolicy {
    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            multiplier: 1,
        }
    }

    pub fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts,
            initial_backoff,
            multiplier: 2,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Whether another attempt is allowed after `attempt` (1-based) failed.
    pub fn allows_retry_after(&self, attempt: u32) -> bool {
        attempt < self.attempts()
    }

    /// Delay before the attempt following failed attempt number `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(self.multiplier.max(1).saturating_pow(exponent))
    }
}
