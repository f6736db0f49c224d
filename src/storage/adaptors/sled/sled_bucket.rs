use std::path::Path;

use ::sled::CompareAndSwapError;
use ::sled::Db;
use ::sled::IVec;
use ::sled::Tree;
use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::KvBucket;
use crate::KvEntry;
use crate::Result;
use crate::StorageError;

/// Opens (or creates) the sled database holding every bucket.
pub fn init_sled_db(
    sled_db_root_path: impl AsRef<Path> + std::fmt::Debug
) -> std::result::Result<Db, std::io::Error> {
    debug!("init_sled_db from path: {:?}", &sled_db_root_path);

    let path = sled_db_root_path.as_ref().join("buckets");
    ::sled::Config::default()
        .path(&path)
        .cache_capacity(64 * 1024 * 1024)
        .use_compression(true)
        .compression_factor(1)
        .open()
        .map_err(|e| {
            warn!("Try to open DB at this location: {:?} and failed: {:?}", path, e);
            std::io::Error::other(e)
        })
}

#[derive(Serialize, Deserialize)]
struct StoredValue {
    revision: u64,
    data: Vec<u8>,
}

/// Durable bucket: one sled tree per bucket.
///
/// Values are stored as `(revision, data)` and conditional writes are
/// compare-and-swap on the whole stored value. Revisions come from the
/// database id generator, so they increase across restarts.
#[derive(Debug, Clone)]
pub struct SledBucket {
    db: Db,
    tree: Tree,
}

impl SledBucket {
    pub fn open(
        db: &Db,
        name: &str,
    ) -> Result<Self> {
        let tree = db.open_tree(name).map_err(StorageError::Sled)?;
        Ok(Self {
            db: db.clone(),
            tree,
        })
    }

    pub fn flush(&self) -> Result<()> {
        self.tree.flush().map_err(StorageError::Sled)?;
        Ok(())
    }

    fn next_revision(&self) -> Result<u64> {
        Ok(self.db.generate_id().map_err(StorageError::Sled)? + 1)
    }

    fn encode(
        revision: u64,
        data: &[u8],
    ) -> Result<Vec<u8>> {
        let stored = StoredValue {
            revision,
            data: data.to_vec(),
        };
        Ok(bincode::serialize(&stored).map_err(StorageError::Bincode)?)
    }

    fn decode(raw: &IVec) -> Result<StoredValue> {
        Ok(bincode::deserialize(raw).map_err(StorageError::Bincode)?)
    }

    fn revision_of(raw: Option<&IVec>) -> Result<u64> {
        match raw {
            Some(raw) => Ok(Self::decode(raw)?.revision),
            None => Ok(0),
        }
    }
}

#[async_trait]
impl KvBucket for SledBucket {
    async fn get(
        &self,
        key: &str,
    ) -> Result<Option<KvEntry>> {
        let Some(raw) = self.tree.get(key).map_err(StorageError::Sled)? else {
            return Ok(None);
        };
        let stored = Self::decode(&raw)?;
        Ok(Some(KvEntry {
            key: key.to_string(),
            value: Bytes::from(stored.data),
            revision: stored.revision,
        }))
    }

    async fn create(
        &self,
        key: &str,
        value: Bytes,
    ) -> Result<u64> {
        let revision = self.next_revision()?;
        let encoded = Self::encode(revision, &value)?;
        match self
            .tree
            .compare_and_swap(key, None::<&[u8]>, Some(encoded))
            .map_err(StorageError::Sled)?
        {
            Ok(()) => {
                trace!(key, revision, "created");
                Ok(revision)
            }
            Err(CompareAndSwapError { .. }) => Err(StorageError::KeyExists {
                key: key.to_string(),
            }
            .into()),
        }
    }

    async fn update(
        &self,
        key: &str,
        value: Bytes,
        expected_revision: u64,
    ) -> Result<u64> {
        let current = self.tree.get(key).map_err(StorageError::Sled)?;
        let current_revision = Self::revision_of(current.as_ref())?;
        let mismatch = |current: u64| StorageError::RevisionMismatch {
            key: key.to_string(),
            expected: expected_revision,
            current,
        };
        if current.is_none() || current_revision != expected_revision {
            return Err(mismatch(current_revision).into());
        }

        let revision = self.next_revision()?;
        let encoded = Self::encode(revision, &value)?;
        match self
            .tree
            .compare_and_swap(key, current, Some(encoded))
            .map_err(StorageError::Sled)?
        {
            Ok(()) => {
                trace!(key, revision, "updated");
                Ok(revision)
            }
            Err(CompareAndSwapError { current, .. }) => {
                Err(mismatch(Self::revision_of(current.as_ref())?).into())
            }
        }
    }

    async fn put(
        &self,
        key: &str,
        value: Bytes,
    ) -> Result<u64> {
        let revision = self.next_revision()?;
        let encoded = Self::encode(revision, &value)?;
        self.tree.insert(key, encoded).map_err(StorageError::Sled)?;
        Ok(revision)
    }

    async fn delete(
        &self,
        key: &str,
    ) -> Result<()> {
        self.tree.remove(key).map_err(StorageError::Sled)?;
        Ok(())
    }
}
