use async_trait::async_trait;
use bytes::Bytes;
#[cfg(test)]
use mockall::automock;

use crate::Result;

/// A stored value with the revision assigned by the bucket on its last write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvEntry {
    pub key: String,
    pub value: Bytes,
    pub revision: u64,
}

/// Keyed store shared by every replica of the service.
///
/// Revisions are assigned by the bucket and strictly increase with every
/// accepted write to a key. Conditional operations fail with
/// [`StorageError::KeyExists`](crate::StorageError::KeyExists) or
/// [`StorageError::RevisionMismatch`](crate::StorageError::RevisionMismatch)
/// when a concurrent writer got there first; every other error means the
/// store itself is unavailable.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KvBucket: Send + Sync + 'static {
    /// Returns `None` when the key is absent or was deleted.
    async fn get(
        &self,
        key: &str,
    ) -> Result<Option<KvEntry>>;

    /// Writes `value` only if `key` is absent. Returns the new revision.
    async fn create(
        &self,
        key: &str,
        value: Bytes,
    ) -> Result<u64>;

    /// Writes `value` only if the current revision equals `expected_revision`.
    async fn update(
        &self,
        key: &str,
        value: Bytes,
        expected_revision: u64,
    ) -> Result<u64>;

    /// Unconditional write.
    async fn put(
        &self,
        key: &str,
        value: Bytes,
    ) -> Result<u64>;

    /// Unconditional delete. Deleting an absent key is not an error.
    async fn delete(
        &self,
        key: &str,
    ) -> Result<()>;
}
