//! Pluggable retry schedules applied by backend clients.
//!
//! A policy only answers "how long before retry number N, if at all"; the
//! client owns the loop and consults the policy after each connection-loss
//! class failure. The map adapter itself never retries.

use std::time::Duration;

/// Delay used by the default one-retry policy.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// A retry schedule. `attempt` is the number of failures observed so far on
/// the current call, starting at 1.
pub trait RetryPolicy: Send + Sync {
    /// How long to wait before the next attempt, or `None` to give up.
    fn delay_before(&self, attempt: usize) -> Option<Duration>;
}

/// Exactly one retry after a fixed delay. The default policy.
#[derive(Clone, Copy, Debug)]
pub struct RetryOneTime {
    delay: Duration,
}

impl RetryOneTime {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for RetryOneTime {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_DELAY)
    }
}

impl RetryPolicy for RetryOneTime {
    fn delay_before(&self, attempt: usize) -> Option<Duration> {
        (attempt <= 1).then_some(self.delay)
    }
}

/// Up to `retries` retries, each after the same fixed delay.
#[derive(Clone, Copy, Debug)]
pub struct RetryNTimes {
    retries: usize,
    delay: Duration,
}

impl RetryNTimes {
    pub fn new(retries: usize, delay: Duration) -> Self {
        Self { retries, delay }
    }
}

impl RetryPolicy for RetryNTimes {
    fn delay_before(&self, attempt: usize) -> Option<Duration> {
        (attempt <= self.retries).then_some(self.delay)
    }
}

/// Doubling delays starting at `base_delay`, capped at `max_delay`, for up to
/// `max_retries` retries.
#[derive(Clone, Copy, Debug)]
pub struct ExponentialBackoff {
    base_delay: Duration,
    max_delay: Duration,
    max_retries: usize,
}

impl ExponentialBackoff {
    pub fn new(base_delay: Duration, max_delay: Duration, max_retries: usize) -> Self {
        Self {
            base_delay,
            max_delay,
            max_retries,
        }
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn delay_before(&self, attempt: usize) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_retries {
            return None;
        }
        let doublings = (attempt - 1).min(31) as u32;
        let factor = 1_u32.checked_shl(doublings).unwrap_or(u32::MAX);
        Some(self.base_delay.saturating_mul(factor).min(self.max_delay))
    }
}
