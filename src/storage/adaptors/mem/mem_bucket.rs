use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::trace;

use crate::KvBucket;
use crate::KvEntry;
use crate::Result;
use crate::StorageError;

/// In-memory bucket.
///
/// Revisions come from one bucket-wide sequence, starting at 1, the way a
/// stream-backed bucket numbers its writes.
#[derive(Debug, Default)]
pub struct MemoryBucket {
    entries: DashMap<String, (u64, Bytes)>,
    last_revision: AtomicU64,
}

impl MemoryBucket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn next_revision(&self) -> u64 {
        self.last_revision.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl KvBucket for MemoryBucket {
    async fn get(
        &self,
        key: &str,
    ) -> Result<Option<KvEntry>> {
        Ok(self.entries.get(key).map(|e| KvEntry {
            key: key.to_string(),
            value: e.1.clone(),
            revision: e.0,
        }))
    }

    async fn create(
        &self,
        key: &str,
        value: Bytes,
    ) -> Result<u64> {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(_) => Err(StorageError::KeyExists {
                key: key.to_string(),
            }
            .into()),
            Entry::Vacant(slot) => {
                let revision = self.next_revision();
                slot.insert((revision, value));
                trace!(key, revision, "created");
                Ok(revision)
            }
        }
    }

    async fn update(
        &self,
        key: &str,
        value: Bytes,
        expected_revision: u64,
    ) -> Result<u64> {
        let Some(mut current) = self.entries.get_mut(key) else {
            return Err(StorageError::RevisionMismatch {
                key: key.to_string(),
                expected: expected_revision,
                current: 0,
            }
            .into());
        };
        if current.0 != expected_revision {
            return Err(StorageError::RevisionMismatch {
                key: key.to_string(),
                expected: expected_revision,
                current: current.0,
            }
            .into());
        }
        let revision = self.next_revision();
        *current = (revision, value);
        trace!(key, revision, "updated");
        Ok(revision)
    }

    async fn put(
        &self,
        key: &str,
        value: Bytes,
    ) -> Result<u64> {
        let revision = self.next_revision();
        self.entries.insert(key.to_string(), (revision, value));
        Ok(revision)
    }

    async fn delete(
        &self,
        key: &str,
    ) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}
