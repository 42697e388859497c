//! Bounded exponential backoff for vendor API requests.
//!
//! A failed request is retried only when its status is in the policy's
//! retryable set and attempts remain. Rate-limit hints replace the
//! exponential delay for that attempt.

use std::{collections::HashSet, time::Duration};

/// Statuses retried by default.
pub const DEFAULT_RETRYABLE_STATUS_CODES: [u16; 5] = [429, 500, 502, 503, 504];

/// Retry configuration shared read-only by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    pub max_retries: u32,

    /// Delay before the first retry; doubles each attempt.
    pub base_delay: Duration,

    /// Upper bound on the exponential delay.
    pub max_delay: Duration,

    /// HTTP statuses eligible for retry.
    pub retryable_status_codes: HashSet<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            retryable_status_codes: DEFAULT_RETRYABLE_STATUS_CODES.into_iter().collect(),
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn no_retry() -> Self {
        Self { max_retries: 0, ..Self::default() }
    }

    /// True when `status` is in the retryable set.
    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_status_codes.contains(&status)
    }

    /// True when a failure on zero-based `attempt` with `status` should be
    /// retried.
    pub fn should_retry(&self, attempt: u32, status: u16) -> bool {
        attempt < self.max_retries && self.is_retryable_status(status)
    }

    /// Delay to wait after a failure on zero-based `attempt`.
    ///
    /// A non-zero vendor `retry_after` is used verbatim. Otherwise the delay is
    /// `base_delay * 2^attempt`, capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(retry_after) = retry_after.filter(|wait| !wait.is_zero()) {
            return retry_after;
        }

        let multiplier = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.checked_mul(multiplier).unwrap_or(self.max_delay).min(self.max_delay)
    }
}
