use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::debug;
use tracing::warn;

use super::CacheEntry;
use super::CachedValue;
use super::Freshness;
use super::OriginFetcher;
use crate::async_task::spawn_task;
use crate::metrics::CACHE_LOOKUPS;
use crate::metrics::CACHE_REFRESH_SKIPPED;
use crate::CacheConfig;
use crate::Clock;
use crate::DistributedLock;
use crate::KvBucket;
use crate::LockOptions;
use crate::OriginError;
use crate::Result;

/// Tunables of a [`StaleWhileRevalidateCache`]
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub fresh_window: Duration,
    pub stale_window: Duration,
    pub entry_prefix: String,
    pub lock_prefix: String,
    /// Used on the expired path; the stale path makes a single attempt
    pub lock_options: LockOptions,
    pub max_background_refreshes: usize,
}

impl From<&CacheConfig> for CacheSettings {
    fn from(config: &CacheConfig) -> Self {
        Self {
            fresh_window: config.fresh_window(),
            stale_window: config.stale_window(),
            entry_prefix: config.entry_prefix.clone(),
            lock_prefix: config.lock_prefix.clone(),
            lock_options: config.lock_options(),
            max_background_refreshes: config.max_background_refreshes,
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self::from(&CacheConfig::default())
    }
}

struct CacheInner<B: KvBucket> {
    bucket: Arc<B>,
    lock: Arc<dyn DistributedLock>,
    origin: Arc<dyn OriginFetcher>,
    clock: Arc<dyn Clock>,
    settings: CacheSettings,
    tracker: TaskTracker,
    refresh_limiter: Arc<Semaphore>,
}

/// Read-through cache over an origin, with entries in a [`KvBucket`].
///
/// - fresh entries are served as-is
/// - stale entries are served immediately while one detached task refreshes
///   them under a per-identifier lock
/// - expired or missing entries are fetched inline, serialized across
///   replicas by the same lock when it can be had
///
/// Origin failures are cached as [`CachedValue::Negative`] with the same
/// windows as successes.
pub struct StaleWhileRevalidateCache<B: KvBucket> {
    inner: Arc<CacheInner<B>>,
}

impl<B: KvBucket> Clone for StaleWhileRevalidateCache<B> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<B: KvBucket> StaleWhileRevalidateCache<B> {
    pub fn new(
        bucket: Arc<B>,
        lock: Arc<dyn DistributedLock>,
        origin: Arc<dyn OriginFetcher>,
        clock: Arc<dyn Clock>,
        settings: CacheSettings,
        tracker: TaskTracker,
    ) -> Self {
        let refresh_limiter = Arc::new(Semaphore::new(settings.max_background_refreshes.max(1)));
        Self {
            inner: Arc::new(CacheInner {
                bucket,
                lock,
                origin,
                clock,
                settings,
                tracker,
                refresh_limiter,
            }),
        }
    }

    /// Resolves `id`, from cache when possible.
    ///
    /// Only an empty identifier is an error; origin failures come back as
    /// [`CachedValue::Negative`].
    pub async fn lookup(
        &self,
        id: &str,
    ) -> Result<CachedValue> {
        if id.is_empty() {
            return Err(OriginError::InvalidData {
                id: String::new(),
                reason: "identifier cannot be empty".to_string(),
            }
            .into());
        }
        let inner = &self.inner;

        match inner.read_entry(id).await {
            Some(entry) => {
                let freshness = inner.freshness(&entry);
                CACHE_LOOKUPS.with_label_values(&[freshness.label()]).inc();
                match freshness {
                    Freshness::Fresh => return Ok(entry.result),
                    Freshness::Stale => {
                        self.spawn_refresh(id);
                        return Ok(entry.result);
                    }
                    Freshness::Expired => {}
                }
            }
            None => CACHE_LOOKUPS.with_label_values(&["miss"]).inc(),
        }

        let lock_key = inner.lock_key(id);
        let acquisition = inner
            .lock
            .acquire(&lock_key, inner.settings.lock_options)
            .await;

        // someone else may have refreshed while we slept
        if acquisition.waited {
            if let Some(entry) = inner.read_entry(id).await {
                if inner.freshness(&entry) == Freshness::Fresh {
                    debug!(id, "entry refreshed by another holder");
                    if acquisition.acquired {
                        inner.release(&lock_key).await;
                    }
                    return Ok(entry.result);
                }
            }
        }

        if !acquisition.acquired {
            debug!(id, "refresh lock busy, fetching without it");
        }
        let result = inner.fetch_and_store(id).await;
        if acquisition.acquired {
            inner.release(&lock_key).await;
        }
        Ok(result)
    }

    /// Waits for in-flight background refreshes.
    pub async fn drain(&self) {
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        self.inner.tracker.reopen();
    }

    fn spawn_refresh(
        &self,
        id: &str,
    ) {
        let Ok(permit) = self.inner.refresh_limiter.clone().try_acquire_owned() else {
            CACHE_REFRESH_SKIPPED.inc();
            debug!(id, "background refresh skipped, limiter saturated");
            return;
        };

        let inner = self.inner.clone();
        let id = id.to_string();
        spawn_task(&self.inner.tracker, "cache_refresh", move || async move {
            let _permit = permit;
            inner.refresh(&id).await;
            Ok(())
        });
    }
}

impl<B: KvBucket> CacheInner<B> {
    fn entry_key(
        &self,
        id: &str,
    ) -> String {
        format!("{}{}", self.settings.entry_prefix, id)
    }

    fn lock_key(
        &self,
        id: &str,
    ) -> String {
        format!("{}{}", self.settings.lock_prefix, id)
    }

    fn freshness(
        &self,
        entry: &CacheEntry,
    ) -> Freshness {
        Freshness::classify(
            entry.age(self.clock.now_unix_secs()),
            self.settings.fresh_window,
            self.settings.stale_window,
        )
    }

    /// Unreadable entries are treated as misses.
    async fn read_entry(
        &self,
        id: &str,
    ) -> Option<CacheEntry> {
        let key = self.entry_key(id);
        match self.bucket.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_slice(&raw.value) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(%key, "discarding undecodable cache entry: {}", e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(%key, "cache read failed: {}", e);
                None
            }
        }
    }

    async fn fetch_and_store(
        &self,
        id: &str,
    ) -> CachedValue {
        let result = match self.origin.fetch(id).await {
            Ok(value) => CachedValue::Found { value },
            Err(e) => {
                warn!(id, "origin lookup failed, caching negative result: {}", e);
                CachedValue::Negative {
                    reason: e.to_string(),
                }
            }
        };

        let entry = CacheEntry {
            id: id.to_string(),
            result,
            fetched_at: self.clock.now_unix_secs(),
        };
        self.store_entry(&entry).await;
        entry.result
    }

    async fn store_entry(
        &self,
        entry: &CacheEntry,
    ) {
        let key = self.entry_key(&entry.id);
        let encoded = match serde_json::to_vec(entry) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(%key, "failed to encode cache entry: {}", e);
                return;
            }
        };
        if let Err(e) = self.bucket.put(&key, Bytes::from(encoded)).await {
            warn!(%key, "failed to store cache entry: {}", e);
        }
    }

    async fn release(
        &self,
        lock_key: &str,
    ) {
        if let Err(e) = self.lock.release(lock_key).await {
            warn!(lock_key, "failed to release cache lock: {}", e);
        }
    }

    /// Background path: one lock attempt, skip when somebody else refreshed.
    async fn refresh(
        &self,
        id: &str,
    ) {
        let lock_key = self.lock_key(id);
        let options = self.settings.lock_options.single_attempt();
        if !self.lock.acquire(&lock_key, options).await.acquired {
            debug!(id, "refresh already in flight elsewhere");
            return;
        }

        let still_stale = self
            .read_entry(id)
            .await
            .map_or(true, |entry| self.freshness(&entry) != Freshness::Fresh);
        if still_stale {
            self.fetch_and_store(id).await;
            debug!(id, "cache entry refreshed in background");
        }
        self.release(&lock_key).await;
    }
}
