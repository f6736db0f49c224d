use std::collections::HashMap;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use v1_sync::Document;
use v1_sync::ManualClock;
use v1_sync::MemoryBucket;
use v1_sync::OriginError;
use v1_sync::OriginFetcher;
use v1_sync::PayloadCodec;
use v1_sync::VersionedObjectStore;

/// 2024-01-01T00:00:00Z
pub const T0: i64 = 1_704_067_200;

pub const TS_FIELDS: &[&str] = &["modified_at"];

#[allow(dead_code)]
pub fn ts_fields() -> Vec<String> {
    TS_FIELDS.iter().map(|f| f.to_string()).collect()
}

#[allow(dead_code)]
pub fn doc(value: Value) -> Document {
    Document::from_value(value).expect("test payloads are objects")
}

#[allow(dead_code)]
pub fn object_store() -> (Arc<MemoryBucket>, VersionedObjectStore<MemoryBucket>) {
    let bucket = Arc::new(MemoryBucket::new());
    let store = VersionedObjectStore::new(bucket.clone(), PayloadCodec::default());
    (bucket, store)
}

#[allow(dead_code)]
pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(T0))
}

/// Origin serving a fixed table and counting fetches
#[derive(Default)]
pub struct TableOrigin {
    records: Mutex<HashMap<String, Value>>,
    calls: AtomicUsize,
}

#[allow(dead_code)]
impl TableOrigin {
    pub fn with_record(
        self,
        id: &str,
        record: Value,
    ) -> Self {
        self.records.lock().insert(id.to_string(), record);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OriginFetcher for TableOrigin {
    async fn fetch(
        &self,
        id: &str,
    ) -> Result<Value, OriginError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.records
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| OriginError::Unavailable(format!("no record for {id}")))
    }
}
