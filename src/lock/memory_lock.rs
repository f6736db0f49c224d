use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::sleep;

use super::is_expired;
use super::Clock;
use super::DistributedLock;
use super::LockAcquisition;
use super::LockOptions;
use crate::Result;

/// In-process lock running the same create / steal algorithm over a map.
///
/// Pair it with a [`ManualClock`](super::ManualClock) to exercise staleness
/// without waiting.
pub struct MemoryLock {
    holders: Mutex<HashMap<String, i64>>,
    clock: Arc<dyn Clock>,
}

impl MemoryLock {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            holders: Mutex::new(HashMap::new()),
            clock,
        }
    }

    pub fn is_held(
        &self,
        key: &str,
    ) -> bool {
        self.holders.lock().contains_key(key)
    }

    fn try_once(
        &self,
        key: &str,
        timeout: std::time::Duration,
    ) -> bool {
        let now = self.clock.now_unix_secs();
        let mut holders = self.holders.lock();
        match holders.get(key) {
            None => {
                holders.insert(key.to_string(), now);
                true
            }
            Some(&held_since) if is_expired(held_since, now, timeout) => {
                holders.insert(key.to_string(), now);
                true
            }
            Some(_) => false,
        }
    }
}

#[async_trait]
impl DistributedLock for MemoryLock {
    async fn acquire(
        &self,
        key: &str,
        options: LockOptions,
    ) -> LockAcquisition {
        let mut waited = false;
        for attempt in 1..=options.max_attempts {
            if self.try_once(key, options.timeout) {
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
        LockAcquisition {
            acquired: false,
            waited,
        }
    }

    async fn release(
        &self,
        key: &str,
    ) -> Result<()> {
        self.holders.lock().remove(key);
        Ok(())
    }
}
