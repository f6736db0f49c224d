use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::sleep;
use tracing::debug;
use tracing::warn;

use super::is_expired;
use super::parse_marker;
use super::Clock;
use super::DistributedLock;
use super::LockAcquisition;
use super::LockOptions;
use crate::KvBucket;
use crate::Result;

/// Lock backed by a [`KvBucket`].
///
/// The lock key holds the acquisition time in unix seconds. A conditional
/// create takes a free lock; a holder older than the timeout is overwritten
/// with an unconditional put.
pub struct KvLockManager<B: KvBucket> {
    bucket: Arc<B>,
    clock: Arc<dyn Clock>,
}

impl<B: KvBucket> KvLockManager<B> {
    pub fn new(
        bucket: Arc<B>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { bucket, clock }
    }

    async fn try_once(
        &self,
        key: &str,
        timeout: std::time::Duration,
    ) -> bool {
        let now = self.clock.now_unix_secs();
        let marker = Bytes::from(now.to_string());

        match self.bucket.create(key, marker.clone()).await {
            Ok(_) => return true,
            Err(e) if e.is_conflict() => {}
            Err(e) => {
                warn!(key, "lock create failed: {}", e);
                return false;
            }
        }

        match self.bucket.get(key).await {
            // unparseable markers count as held
            Ok(Some(holder))
                if parse_marker(&holder.value)
                    .is_some_and(|held_since| is_expired(held_since, now, timeout)) =>
            {
                match self.bucket.put(key, marker).await {
                    Ok(_) => {
                        debug!(key, "stale lock stolen");
                        true
                    }
                    Err(e) => {
                        warn!(key, "stale lock overwrite failed: {}", e);
                        false
                    }
                }
            }
            Ok(_) => false,
            Err(e) => {
                warn!(key, "lock holder read failed: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl<B: KvBucket> DistributedLock for KvLockManager<B> {
    async fn acquire(
        &self,
        key: &str,
        options: LockOptions,
    ) -> LockAcquisition {
        let mut waited = false;
        for attempt in 1..=options.max_attempts {
            if self.try_once(key, options.timeout).await {
                return LockAcquisition {
                    acquired: true,
                    waited,
                };
            }
            if attempt < options.max_attempts {
                waited = true;
                sleep(options.retry_interval).await;
            }
        }
        debug!(key, attempts = options.max_attempts, "lock not acquired");
        LockAcquisition {
            acquired: false,
            waited,
        }
    }

    async fn release(
        &self,
        key: &str,
    ) -> Result<()> {
        self.bucket.delete(key).await
    }
}
