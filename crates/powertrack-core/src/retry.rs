//! Retry policy for transiently failing shards

use std::time::Duration;

/// How often and how patiently a shard is retried after a transient failure.
///
/// The attempt counter travels with the queued task; the policy only decides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per shard including the first; `None` retries forever
    pub max_attempts: Option<u32>,
    /// Delay before the first retry, doubled for each further retry
    pub base_delay: Duration,
    /// Upper bound for a single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Some(5),
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Retry forever without waiting
    pub const fn unbounded() -> Self {
        Self {
            max_attempts: None,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Whether a shard that just failed its `attempt`-th try (1-based) may run again
    pub fn should_retry(&self, attempt: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempt < max)
    }

    /// Exponential backoff before retry number `retry` (1-based): base, 2·base, 4·base, …
    pub fn backoff(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(2u32.saturating_pow(exp))
            .min(self.max_delay)
    }
}
