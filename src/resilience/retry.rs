//! Retry policy for single HTTP calls.
//!
//! The policy only answers two questions: is this failure worth another
//! attempt, and how long to wait first. The attempt loop itself lives in
//! [`crate::transport::ResilientHttpClient`].

use std::time::Duration;

/// Statuses that are retried with backoff. Everything else non-2xx is fatal.
pub const DEFAULT_RETRY_STATUSES: [u16; 4] = [429, 502, 503, 504];

/// Configuration for retry logic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub retry_on_status: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            retry_on_status: DEFAULT_RETRY_STATUSES.to_vec(),
        }
    }
}

impl RetryPolicy {
    /// Create a new policy with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n.max(1);
        self
    }

    pub fn with_base_delay(mut self, d: Duration) -> Self {
        self.base_delay = d;
        self
    }

    pub fn with_max_delay(mut self, d: Duration) -> Self {
        self.max_delay = d;
        self
    }

    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retry_on_status.contains(&status)
    }

    /// Delay before the next attempt after `attempt` (1-based) failed.
    ///
    /// Exponential: `min(base * 2^attempt, max_delay)`. A server-provided
    /// `Retry-After` can shorten that wait but never lengthen it, so
    /// [`max_cumulative_backoff`](Self::max_cumulative_backoff) always holds.
    pub fn backoff_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let base = self.base_delay.as_millis().min(u64::MAX as u128) as u64;
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let computed = Duration::from_millis(base.saturating_mul(factor)).min(self.max_delay);
        match retry_after {
            Some(hint) => hint.min(computed),
            None => computed,
        }
    }

    /// Upper bound on total sleep time across one `execute` call.
    pub fn max_cumulative_backoff(&self) -> Duration {
        (1..self.max_attempts.max(1))
            .map(|attempt| self.backoff_delay(attempt, None))
            .fold(Duration::ZERO, |acc, d| acc.saturating_add(d))
    }
}
