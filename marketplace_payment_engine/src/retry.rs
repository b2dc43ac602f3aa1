use std::time::Duration;

/// A bounded retry policy with linear backoff, applied uniformly by the transfer executor.
///
/// Attempt numbers are 1-based. There is no delay before the first attempt; attempt `n` waits
/// `(n - 1) * base_delay` first. The policy is a plain value so retry behaviour can be unit tested without any
/// network calls, and tests can shrink `base_delay` to keep themselves fast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

pub const DEFAULT_MAX_TRANSFER_ATTEMPTS: u32 = 3;
pub const DEFAULT_TRANSFER_BASE_DELAY: Duration = Duration::from_secs(2);

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: DEFAULT_MAX_TRANSFER_ATTEMPTS, base_delay: DEFAULT_TRANSFER_BASE_DELAY }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        // a policy that never attempts anything is always a configuration mistake
        let max_attempts = max_attempts.max(1);
        Self { max_attempts, base_delay }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// The delay to wait before the given 1-based attempt number.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        self.base_delay * (attempt - 1)
    }

    pub fn attempts_remain_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
