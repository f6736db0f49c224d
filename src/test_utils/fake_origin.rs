use std::collections::HashMap;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::OriginError;
use crate::OriginFetcher;

/// Origin answering from a table and counting calls.
/// Unknown identifiers answer `Unavailable`.
#[derive(Default)]
pub(crate) struct CountingOrigin {
    records: Mutex<HashMap<String, Value>>,
    calls: AtomicUsize,
}

impl CountingOrigin {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_record(
        self,
        id: &str,
        record: Value,
    ) -> Self {
        self.set_record(id, record);
        self
    }

    pub(crate) fn set_record(
        &self,
        id: &str,
        record: Value,
    ) {
        self.records.lock().insert(id.to_string(), record);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OriginFetcher for CountingOrigin {
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
