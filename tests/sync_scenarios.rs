mod common;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::join_all;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use v1_sync::CacheSettings;
use v1_sync::CachedValue;
use v1_sync::ConsumerPolicy;
use v1_sync::ConsumerPool;
use v1_sync::DispatchConfig;
use v1_sync::Dispatcher;
use v1_sync::DistributedLock;
use v1_sync::Error;
use v1_sync::EventSource;
use v1_sync::HandlerRegistry;
use v1_sync::KvBucket;
use v1_sync::KvLockManager;
use v1_sync::ListMutator;
use v1_sync::LocalMessage;
use v1_sync::LocalStream;
use v1_sync::LockOptions;
use v1_sync::LookupResponder;
use v1_sync::MembershipConfig;
use v1_sync::MembershipHandler;
use v1_sync::MemoryBucket;
use v1_sync::MemoryLock;
use v1_sync::MutationPolicy;
use v1_sync::PayloadCodec;
use v1_sync::StaleWhileRevalidateCache;
use v1_sync::StorageError;
use v1_sync::VersionedObjectStore;
use v1_sync::WriteOutcome;

use crate::common::doc;
use crate::common::manual_clock;
use crate::common::object_store;
use crate::common::ts_fields;
use crate::common::TableOrigin;

const ORDER_KEY: &str = "orders.42";

#[tokio::test]
async fn test_last_writer_wins_walkthrough() -> Result<(), Error> {
    let (_, store) = object_store();
    let fields = ts_fields();

    let created = store
        .upsert(ORDER_KEY, doc(json!({"modified_at": "2024-01-01T00:00:00Z"})), &fields, None)
        .await?;
    assert_eq!(created, WriteOutcome::Created(1));

    let older = store
        .upsert(ORDER_KEY, doc(json!({"modified_at": "2023-12-31T23:00:00Z"})), &fields, None)
        .await?;
    assert!(matches!(older, WriteOutcome::Discarded(_)));
    let record = store.read(ORDER_KEY).await?.expect("record exists");
    assert_eq!(record.revision, 1);
    assert_eq!(record.payload.get_str("modified_at"), Some("2024-01-01T00:00:00Z"));

    let newer = store
        .upsert(
            ORDER_KEY,
            doc(json!({"modified_at": "2024-02-01T00:00:00Z", "status": "shipped"})),
            &fields,
            None,
        )
        .await?;
    assert_eq!(newer, WriteOutcome::Updated(2));
    let record = store.read(ORDER_KEY).await?.expect("record exists");
    assert_eq!(record.payload.get_str("modified_at"), Some("2024-02-01T00:00:00Z"));
    assert_eq!(record.payload.get_str("status"), Some("shipped"));
    Ok(())
}

#[tokio::test]
async fn test_repeated_upsert_is_idempotent() -> Result<(), Error> {
    let (_, store) = object_store();
    let fields = ts_fields();
    let candidate = doc(json!({"modified_at": "2024-01-01T00:00:00Z", "total": 12}));

    store.upsert(ORDER_KEY, candidate.clone(), &fields, None).await?;
    let first = store.read(ORDER_KEY).await?.expect("record exists");
    for _ in 0..3 {
        let outcome = store.upsert(ORDER_KEY, candidate.clone(), &fields, None).await?;
        assert_eq!(outcome, WriteOutcome::Unchanged);
    }
    let last = store.read(ORDER_KEY).await?.expect("record exists");

    assert_eq!(first, last);
    Ok(())
}

#[tokio::test]
async fn test_delivery_order_does_not_change_winner() -> Result<(), Error> {
    let fields = ts_fields();
    let early = doc(json!({"modified_at": "2024-01-01T00:00:00Z", "v": "t1"}));
    let late = doc(json!({"modified_at": "2024-01-02T00:00:00Z", "v": "t2"}));

    for order in [[early.clone(), late.clone()], [late.clone(), early.clone()]] {
        let (_, store) = object_store();
        for candidate in order {
            store.upsert(ORDER_KEY, candidate, &fields, None).await?;
        }
        let record = store.read(ORDER_KEY).await?.expect("record exists");
        assert_eq!(record.payload.get_str("v"), Some("t2"));
    }
    Ok(())
}

#[tokio::test]
async fn test_deleted_record_is_never_resurrected() -> Result<(), Error> {
    let (_, store) = object_store();
    let fields = ts_fields();
    store
        .upsert(ORDER_KEY, doc(json!({"modified_at": "2024-01-01T00:00:00Z"})), &fields, None)
        .await?;
    store.soft_delete(ORDER_KEY, "2024-01-05T00:00:00Z", None).await?;
    let deleted = store.read(ORDER_KEY).await?.expect("record exists");

    let outcome = store
        .upsert(ORDER_KEY, doc(json!({"modified_at": "2030-01-01T00:00:00Z"})), &fields, None)
        .await?;

    assert!(matches!(outcome, WriteOutcome::Discarded(_)));
    let after = store.read(ORDER_KEY).await?.expect("record exists");
    assert!(!after.found());
    assert_eq!(deleted, after);
    Ok(())
}

#[tokio::test]
async fn test_soft_delete_of_unseen_key_leaves_a_marker() -> Result<(), Error> {
    let (_, store) = object_store();

    let outcome = store.soft_delete("orders.7", "2024-01-05T00:00:00Z", None).await?;

    assert!(matches!(outcome, WriteOutcome::Created(_)));
    let record = store.read("orders.7").await?.expect("marker exists");
    assert!(!record.found());
    Ok(())
}

#[tokio::test]
async fn test_only_one_writer_wins_a_revision() -> Result<(), Error> {
    let (bucket, store) = object_store();
    store
        .upsert(ORDER_KEY, doc(json!({"modified_at": "2024-01-01T00:00:00Z"})), &ts_fields(), None)
        .await?;
    let observed = store.read(ORDER_KEY).await?.expect("record exists").revision;

    let (a, b) = tokio::join!(
        bucket.update(ORDER_KEY, Bytes::from_static(b"{\"w\":\"a\"}"), observed),
        bucket.update(ORDER_KEY, Bytes::from_static(b"{\"w\":\"b\"}"), observed),
    );

    let results = [a, b];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let loser = results
        .into_iter()
        .find_map(|r| r.err())
        .expect("one writer loses");
    assert!(loser.is_conflict());
    Ok(())
}

#[tokio::test]
async fn test_membership_add_then_remove() -> Result<(), Error> {
    let bucket = Arc::new(MemoryBucket::new());
    let lists = ListMutator::new(bucket.clone(), TaskTracker::new(), MutationPolicy::default());

    assert_eq!(lists.mutate("list.u1", "e1", false).await?, WriteOutcome::Created(1));
    assert_eq!(lists.read_list("list.u1").await?, Some((vec!["e1".to_string()], 1)));

    assert_eq!(lists.mutate("list.u1", "e1", true).await?, WriteOutcome::Updated(2));
    assert_eq!(lists.read_list("list.u1").await?, Some((vec![], 2)));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_lock_is_stolen_once_stale() -> Result<(), Error> {
    let clock = manual_clock();
    let bucket = Arc::new(MemoryBucket::new());
    let options = LockOptions {
        timeout: Duration::from_secs(10),
        retry_interval: Duration::from_millis(100),
        max_attempts: 1,
    };
    let kv_lock = KvLockManager::new(bucket.clone(), clock.clone());
    let memory_lock = MemoryLock::new(clock.clone());

    for lock in [&kv_lock as &dyn DistributedLock, &memory_lock] {
        clock.set(common::T0);
        let a = lock.acquire("lock.x", options).await;
        assert!(a.acquired);

        clock.advance(Duration::from_secs(2));
        let b = lock.acquire("lock.x", options).await;
        assert!(!b.acquired);

        clock.advance(Duration::from_secs(9));
        let b = lock.acquire("lock.x", options).await;
        assert!(b.acquired);

        lock.release("lock.x").await?;
    }
    assert!(bucket.get("lock.x").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_cache_serves_fresh_without_origin_and_stale_with_one_refresh() -> Result<(), Error> {
    let clock = manual_clock();
    let bucket = Arc::new(MemoryBucket::new());
    let origin = Arc::new(TableOrigin::default().with_record("org1", json!({"Name": "Acme"})));
    let settings = CacheSettings {
        fresh_window: Duration::from_secs(60),
        stale_window: Duration::from_secs(600),
        ..CacheSettings::default()
    };
    let cache = StaleWhileRevalidateCache::new(
        bucket.clone(),
        Arc::new(MemoryLock::new(clock.clone())),
        origin.clone(),
        clock.clone(),
        settings,
        TaskTracker::new(),
    );

    let first = cache.lookup("org1").await?;
    assert_eq!(first.value(), Some(&json!({"Name": "Acme"})));
    assert_eq!(origin.calls(), 1);

    clock.advance(Duration::from_secs(30));
    cache.lookup("org1").await?;
    assert_eq!(origin.calls(), 1);

    clock.advance(Duration::from_secs(60));
    for _ in 0..3 {
        let stale = cache.lookup("org1").await?;
        assert_eq!(stale, first);
    }
    cache.drain().await;
    assert!(origin.calls() <= 2);
    Ok(())
}

#[tokio::test]
async fn test_cache_remembers_origin_failures() -> Result<(), Error> {
    let clock = manual_clock();
    let origin = Arc::new(TableOrigin::default());
    let cache = StaleWhileRevalidateCache::new(
        Arc::new(MemoryBucket::new()),
        Arc::new(MemoryLock::new(clock.clone())),
        origin.clone(),
        clock,
        CacheSettings::default(),
        TaskTracker::new(),
    );

    assert!(cache.lookup("missing").await?.is_negative());
    assert!(matches!(cache.lookup("missing").await?, CachedValue::Negative { .. }));
    assert_eq!(origin.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_misses_share_one_fetch() -> Result<(), Error> {
    let clock = manual_clock();
    let bucket = Arc::new(MemoryBucket::new());
    let origin = Arc::new(TableOrigin::default().with_record("org1", json!({"Name": "Acme"})));
    let cache = StaleWhileRevalidateCache::new(
        bucket.clone(),
        Arc::new(KvLockManager::new(bucket.clone(), clock.clone())),
        origin.clone(),
        clock,
        CacheSettings::default(),
        TaskTracker::new(),
    );

    let results = join_all((0..8).map(|_| cache.lookup("org1"))).await;

    for result in results {
        assert_eq!(result?.value(), Some(&json!({"Name": "Acme"})));
    }
    assert_eq!(origin.calls(), 1);
    assert!(bucket.get("v1_org_lock.org1").await?.is_none());
    Ok(())
}

fn wal_message(
    action: &str,
    modstamp: &str,
) -> LocalMessage {
    let body = json!({
        "schema": "salesforce",
        "table": "project__c",
        "action": action,
        "data": {"sfid": "a0A1", "name": "Apollo", "systemmodstamp": modstamp},
        "dataOld": {"sfid": "a0A1", "name": "Apollo", "systemmodstamp": modstamp},
        "commitTime": modstamp,
    });
    LocalMessage::new(
        "wal_listener.salesforce.project__c",
        serde_json::to_vec(&body).expect("serializable"),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pipeline_mirrors_changes_and_serves_lookups() -> Result<(), Error> {
    let objects = Arc::new(MemoryBucket::new());
    let mappings = Arc::new(MemoryBucket::new());
    let detached = TaskTracker::new();
    let membership = MembershipConfig {
        max_splay_ms: 0,
        ..MembershipConfig::default()
    };
    let lists = ListMutator::new(mappings.clone(), detached.clone(), MutationPolicy::from(&membership));
    let handler = MembershipHandler::new(lists, &membership);
    let list_key = handler.list_key("u1");
    let registry = HandlerRegistry::new().with_handler(membership.source_prefix.clone(), Arc::new(handler));
    let dispatcher = Arc::new(Dispatcher::new(
        VersionedObjectStore::new(objects.clone(), PayloadCodec::default()),
        Arc::new(registry),
        PayloadCodec::default(),
        DispatchConfig::default(),
    ));
    let policy = ConsumerPolicy {
        max_in_flight: 4,
        max_deliver: 3,
    };

    let wal = LocalStream::new("wal", policy.max_deliver);
    wal.publish(wal_message("INSERT", "2024-01-01T00:00:00Z"))?;
    wal.publish(wal_message("DELETE", "2024-01-02T00:00:00Z"))?;
    wal.close();
    ConsumerPool::new(dispatcher.clone(), EventSource::LogChange, policy)
        .run(wal.subscribe(), CancellationToken::new())
        .await?;

    let kv = LocalStream::new("kv", policy.max_deliver);
    kv.publish(LocalMessage::new(
        format!("$KV.v1-objects.{}.e1", membership.source_prefix),
        serde_json::to_vec(&json!({"sfid": "e1", "leadorcontactid": "u1"})).expect("serializable"),
    ))?;
    kv.close();
    ConsumerPool::new(dispatcher, EventSource::KeyWatch, policy)
        .run(kv.subscribe(), CancellationToken::new())
        .await?;
    detached.close();
    detached.wait().await;

    let store = VersionedObjectStore::new(objects, PayloadCodec::default());
    let project = store
        .read("salesforce-project__c.a0A1")
        .await?
        .expect("project mirrored");
    assert!(!project.found());
    assert_eq!(wal.abandoned(), 0);

    let lookups = LookupResponder::new(mappings);
    assert_eq!(lookups.respond(list_key.as_bytes()).await, Bytes::from_static(b"[\"e1\"]"));
    assert!(lookups.respond(b"unknown").await.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_backend_errors_are_not_conflicts() {
    let error: Error = StorageError::Backend("down".to_string()).into();
    assert!(!error.is_conflict());
}
