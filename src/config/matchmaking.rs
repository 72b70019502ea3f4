/// Matchmaking configuration constants.
/// 
/// This module defines the retry policy applied to transient provider errors
/// and the defaults used by the join-or-create flow.
use std::time::Duration;

/// Number of retries after a transient error (directory or allocator unavailable).
pub const TRANSIENT_RETRIES: u32 = 3;

/// Backoff before the first retry (in milliseconds). Doubles on each retry.
pub const BACKOFF_BASE_MS: u64 = 100;

/// Upper bound for a single backoff delay (in milliseconds).
pub const BACKOFF_CAP_MS: u64 = 2_000;

/// How many times quick-join re-queries after hitting a stale session.
pub const STALE_REQUERIES: u32 = 1;

/// Minimum capacity asked for by the default join-or-create filter.
pub const DEFAULT_MIN_CAPACITY: u32 = 20;

/// Runtime retry policy for the matchmaker.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub retries: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: TRANSIENT_RETRIES,
            backoff_base: Duration::from_millis(BACKOFF_BASE_MS),
            backoff_cap: Duration::from_millis(BACKOFF_CAP_MS),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait before retry number `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.backoff_base.saturating_mul(factor).min(self.backoff_cap)
    }
}
