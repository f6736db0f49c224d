use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde_json::json;
use tokio_util::task::TaskTracker;
use tracing_test::traced_test;

use super::*;
use crate::test_utils::CountingOrigin;
use crate::test_utils::T0;
use crate::DistributedLock;
use crate::Error;
use crate::KvBucket;
use crate::LockOptions;
use crate::ManualClock;
use crate::MemoryBucket;
use crate::MemoryLock;
use crate::MockKvBucket;
use crate::StorageError;

const MINUTE: Duration = Duration::from_secs(60);

struct Fixture {
    bucket: Arc<MemoryBucket>,
    clock: Arc<ManualClock>,
    lock: Arc<MemoryLock>,
    origin: Arc<CountingOrigin>,
    cache: StaleWhileRevalidateCache<MemoryBucket>,
}

fn settings() -> CacheSettings {
    CacheSettings {
        fresh_window: 30 * MINUTE,
        stale_window: 360 * MINUTE,
        entry_prefix: "v1_org.".to_string(),
        lock_prefix: "v1_org_lock.".to_string(),
        lock_options: LockOptions {
            timeout: Duration::from_secs(10),
            retry_interval: Duration::from_secs(1),
            max_attempts: 3,
        },
        max_background_refreshes: 4,
    }
}

fn fixture_with(settings: CacheSettings) -> Fixture {
    let bucket = Arc::new(MemoryBucket::new());
    let clock = Arc::new(ManualClock::new(T0));
    let lock = Arc::new(MemoryLock::new(clock.clone()));
    let origin = Arc::new(CountingOrigin::new().with_record("org1", json!({"Name": "Acme"})));
    let cache = StaleWhileRevalidateCache::new(
        bucket.clone(),
        lock.clone(),
        origin.clone(),
        clock.clone(),
        settings,
        TaskTracker::new(),
    );
    Fixture {
        bucket,
        clock,
        lock,
        origin,
        cache,
    }
}

fn fixture() -> Fixture {
    fixture_with(settings())
}

fn found(name: &str) -> CachedValue {
    CachedValue::Found {
        value: json!({"Name": name}),
    }
}

#[tokio::test]
async fn test_miss_fetches_and_stores() -> Result<(), Error> {
    let f = fixture();

    assert_eq!(f.cache.lookup("org1").await?, found("Acme"));
    assert_eq!(f.origin.calls(), 1);

    let raw = f.bucket.get("v1_org.org1").await?.expect("entry stored");
    let entry: CacheEntry = serde_json::from_slice(&raw.value).unwrap();
    assert_eq!(entry.fetched_at, T0);
    assert!(!f.lock.is_held("v1_org_lock.org1"));
    Ok(())
}

#[tokio::test]
async fn test_fresh_entry_never_calls_origin() -> Result<(), Error> {
    let f = fixture();
    f.cache.lookup("org1").await?;

    for _ in 0..5 {
        f.clock.advance(5 * MINUTE);
        f.cache.lookup("org1").await?;
    }
    f.cache.drain().await;

    // 25 minutes old, still fresh
    assert_eq!(f.origin.calls(), 1);
    Ok(())
}

#[tokio::test]
#[traced_test]
async fn test_stale_entry_served_then_refreshed_in_background() -> Result<(), Error> {
    let f = fixture();
    f.cache.lookup("org1").await?;
    f.origin.set_record("org1", json!({"Name": "Acme Renamed"}));

    f.clock.advance(31 * MINUTE);
    assert_eq!(f.cache.lookup("org1").await?, found("Acme"));

    f.cache.drain().await;
    assert_eq!(f.origin.calls(), 2);
    assert_eq!(f.cache.lookup("org1").await?, found("Acme Renamed"));
    assert_eq!(f.origin.calls(), 2);
    Ok(())
}

#[tokio::test]
async fn test_stale_burst_refreshes_once() -> Result<(), Error> {
    let f = fixture();
    f.cache.lookup("org1").await?;

    f.clock.advance(2 * 60 * MINUTE);
    for _ in 0..10 {
        assert_eq!(f.cache.lookup("org1").await?, found("Acme"));
    }
    f.cache.drain().await;

    assert_eq!(f.origin.calls(), 2);
    Ok(())
}

#[tokio::test]
async fn test_stale_refresh_skipped_while_lock_held_elsewhere() -> Result<(), Error> {
    let f = fixture();
    f.cache.lookup("org1").await?;
    f.clock.advance(31 * MINUTE);
    assert!(
        f.lock
            .acquire("v1_org_lock.org1", LockOptions::default().single_attempt())
            .await
            .acquired
    );

    assert_eq!(f.cache.lookup("org1").await?, found("Acme"));
    f.cache.drain().await;

    assert_eq!(f.origin.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn test_saturated_limiter_skips_refresh() -> Result<(), Error> {
    let mut s = settings();
    s.max_background_refreshes = 1;
    let f = fixture_with(s);
    f.origin.set_record("org2", json!({"Name": "Globex"}));
    f.cache.lookup("org1").await?;
    f.cache.lookup("org2").await?;

    f.clock.advance(31 * MINUTE);
    f.cache.lookup("org1").await?;
    f.cache.lookup("org2").await?;
    f.cache.drain().await;

    // two initial fetches, one background refresh
    assert_eq!(f.origin.calls(), 3);
    Ok(())
}

#[tokio::test]
async fn test_expired_entry_fetched_inline() -> Result<(), Error> {
    let f = fixture();
    f.cache.lookup("org1").await?;
    f.origin.set_record("org1", json!({"Name": "Acme Renamed"}));

    f.clock.advance(7 * 60 * MINUTE);
    assert_eq!(f.cache.lookup("org1").await?, found("Acme Renamed"));
    assert_eq!(f.origin.calls(), 2);
    Ok(())
}

#[tokio::test]
#[traced_test]
async fn test_origin_failure_cached_as_negative() -> Result<(), Error> {
    let f = fixture();

    let first = f.cache.lookup("missing-org").await?;
    assert!(first.is_negative());

    f.clock.advance(10 * MINUTE);
    let second = f.cache.lookup("missing-org").await?;
    assert_eq!(second, first);
    assert_eq!(f.origin.calls(), 1);
    assert!(logs_contain("caching negative result"));
    Ok(())
}

#[tokio::test]
async fn test_negative_entry_uses_same_windows() -> Result<(), Error> {
    let f = fixture();
    f.cache.lookup("org9").await?;
    f.origin.set_record("org9", json!({"Name": "Late Corp"}));

    f.clock.advance(31 * MINUTE);
    assert!(f.cache.lookup("org9").await?.is_negative());
    f.cache.drain().await;

    assert_eq!(f.cache.lookup("org9").await?, found("Late Corp"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_busy_lock_falls_back_to_direct_fetch() -> Result<(), Error> {
    let f = fixture();
    assert!(
        f.lock
            .acquire("v1_org_lock.org1", LockOptions::default().single_attempt())
            .await
            .acquired
    );

    let start = tokio::time::Instant::now();
    assert_eq!(f.cache.lookup("org1").await?, found("Acme"));

    assert_eq!(start.elapsed(), Duration::from_secs(2));
    assert_eq!(f.origin.calls(), 1);
    // the other holder's lock is left alone
    assert!(f.lock.is_held("v1_org_lock.org1"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_waiter_returns_entry_refreshed_by_holder() -> Result<(), Error> {
    let f = fixture();
    assert!(
        f.lock
            .acquire("v1_org_lock.org1", LockOptions::default().single_attempt())
            .await
            .acquired
    );

    // another replica refreshes the entry and releases after 1.5s
    let holder = {
        let bucket = f.bucket.clone();
        let lock = f.lock.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            let entry = CacheEntry {
                id: "org1".to_string(),
                result: found("Refreshed Elsewhere"),
                fetched_at: T0,
            };
            bucket
                .put("v1_org.org1", Bytes::from(serde_json::to_vec(&entry).unwrap()))
                .await
                .unwrap();
            lock.release("v1_org_lock.org1").await.unwrap();
        })
    };

    assert_eq!(f.cache.lookup("org1").await?, found("Refreshed Elsewhere"));
    holder.await.unwrap();

    assert_eq!(f.origin.calls(), 0);
    assert!(!f.lock.is_held("v1_org_lock.org1"));
    Ok(())
}

#[tokio::test]
async fn test_empty_identifier_rejected() {
    let f = fixture();

    assert!(f.cache.lookup("").await.is_err());
    assert_eq!(f.origin.calls(), 0);
    assert!(f.bucket.is_empty());
}

#[tokio::test]
#[traced_test]
async fn test_store_failure_still_returns_origin_result() -> Result<(), Error> {
    let mut bucket = MockKvBucket::new();
    bucket.expect_get().returning(|_| Ok(None));
    bucket
        .expect_put()
        .returning(|_, _| Err(StorageError::Backend("read-only".to_string()).into()));
    let clock = Arc::new(ManualClock::new(T0));
    let cache = StaleWhileRevalidateCache::new(
        Arc::new(bucket),
        Arc::new(MemoryLock::new(clock.clone())),
        Arc::new(CountingOrigin::new().with_record("org1", json!({"Name": "Acme"}))),
        clock,
        settings(),
        TaskTracker::new(),
    );

    assert_eq!(cache.lookup("org1").await?, found("Acme"));
    assert!(logs_contain("failed to store cache entry"));
    Ok(())
}

#[test]
fn test_settings_from_config_defaults() {
    let s = CacheSettings::default();

    assert_eq!(s.fresh_window, 30 * MINUTE);
    assert_eq!(s.stale_window, 360 * MINUTE);
    assert_eq!(s.lock_options.max_attempts, 3);
    assert_eq!(s.entry_prefix, "v1_org.");
}
