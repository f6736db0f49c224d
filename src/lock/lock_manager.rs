use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

/// Acquisition policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    /// Holder marker age after which the lock may be stolen
    pub timeout: Duration,
    /// Sleep between attempts; never slept after the final attempt
    pub retry_interval: Duration,
    /// Total attempts, including the first
    pub max_attempts: usize,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            retry_interval: Duration::from_millis(500),
            max_attempts: 5,
        }
    }
}

impl LockOptions {
    /// Same options with a single attempt, for callers that must not block
    pub fn single_attempt(self) -> Self {
        Self {
            max_attempts: 1,
            ..self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LockAcquisition {
    pub acquired: bool,
    /// At least one retry sleep happened, so a concurrent holder may have
    /// made progress meanwhile
    pub waited: bool,
}

/// Advisory mutual exclusion keyed by string.
///
/// Acquire never fails: backend errors count as a failed attempt.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DistributedLock: Send + Sync + 'static {
    async fn acquire(
        &self,
        key: &str,
        options: LockOptions,
    ) -> LockAcquisition;

    /// Unconditional delete of the lock key.
    async fn release(
        &self,
        key: &str,
    ) -> crate::Result<()>;
}

/// Holder markers are unix seconds as a decimal string
pub(super) fn parse_marker(marker: &[u8]) -> Option<i64> {
    std::str::from_utf8(marker).ok()?.trim().parse().ok()
}

pub(super) fn is_expired(
    held_since: i64,
    now_unix_secs: i64,
    timeout: Duration,
) -> bool {
    now_unix_secs.saturating_sub(held_since) > timeout.as_secs() as i64
}
