use std::sync::Arc;

use tracing::debug;
use tracing::trace;

use super::is_candidate_newer;
use super::Document;
use super::KvBucket;
use super::PayloadCodec;
use crate::constants::FIELD_DELETED_AT;
use crate::constants::TOMBSTONE_MARKER;
use crate::metrics::STORE_WRITES;
use crate::utils::time::now_rfc3339;
use crate::Result;

/// Deletion state of a stored record. Anything but `Live` is terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletionState {
    Live,
    /// Value is the tombstone marker
    Tombstoned,
    /// `isdeleted` is true or `_sdc_deleted_at` is set
    SoftDeleted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VersionedRecord {
    pub key: String,
    pub payload: Document,
    pub revision: u64,
    pub deletion: DeletionState,
}

impl VersionedRecord {
    /// False for deleted records, which read as absent.
    pub fn found(&self) -> bool {
        self.deletion == DeletionState::Live
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Stored record is tombstoned or soft-deleted
    DeletionTerminal,
    /// Stored record carries a later or equal business timestamp
    NotNewer,
}

/// Result of a conditional write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Created(u64),
    Updated(u64),
    /// Candidate equals the stored payload; nothing written
    Unchanged,
    Discarded(DiscardReason),
    /// A concurrent writer advanced the key first; re-read and retry
    Conflict,
}

impl WriteOutcome {
    pub fn needs_retry(&self) -> bool {
        matches!(self, WriteOutcome::Conflict)
    }

    pub fn revision(&self) -> Option<u64> {
        match self {
            WriteOutcome::Created(rev) | WriteOutcome::Updated(rev) => Some(*rev),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            WriteOutcome::Created(_) => "created",
            WriteOutcome::Updated(_) => "updated",
            WriteOutcome::Unchanged => "unchanged",
            WriteOutcome::Discarded(_) => "discarded",
            WriteOutcome::Conflict => "conflict",
        }
    }
}

/// Conditional-write record store with last-writer-wins resolution.
///
/// Every write goes through a conditional create or an update keyed on the
/// revision observed by the preceding read, so two writers racing on the same
/// base revision can never both succeed. The loser gets
/// [`WriteOutcome::Conflict`] and must re-read.
pub struct VersionedObjectStore<B: KvBucket> {
    bucket: Arc<B>,
    codec: PayloadCodec,
}

impl<B: KvBucket> Clone for VersionedObjectStore<B> {
    fn clone(&self) -> Self {
        Self {
            bucket: self.bucket.clone(),
            codec: self.codec.clone(),
        }
    }
}

impl<B: KvBucket> VersionedObjectStore<B> {
    pub fn new(
        bucket: Arc<B>,
        codec: PayloadCodec,
    ) -> Self {
        Self { bucket, codec }
    }

    pub fn bucket(&self) -> &Arc<B> {
        &self.bucket
    }

    /// Reads and classifies the record at `key`.
    ///
    /// `None` means the key has never been written (or was physically
    /// removed). Bytes that decode under no known format are an error.
    pub async fn read(
        &self,
        key: &str,
    ) -> Result<Option<VersionedRecord>> {
        let Some(entry) = self.bucket.get(key).await? else {
            return Ok(None);
        };

        if entry.value.as_ref() == TOMBSTONE_MARKER {
            return Ok(Some(VersionedRecord {
                key: key.to_string(),
                payload: Document::new(),
                revision: entry.revision,
                deletion: DeletionState::Tombstoned,
            }));
        }

        let payload = self.codec.decode(key, &entry.value)?;
        let deletion = if payload.is_deletion_marked() {
            DeletionState::SoftDeleted
        } else {
            DeletionState::Live
        };
        Ok(Some(VersionedRecord {
            key: key.to_string(),
            payload,
            revision: entry.revision,
            deletion,
        }))
    }

    /// Writes `candidate` if it beats the stored record.
    ///
    /// `extracted_at` is the source commit time, stamped into the written
    /// payload when provided.
    pub async fn upsert(
        &self,
        key: &str,
        candidate: Document,
        timestamp_fields: &[String],
        extracted_at: Option<&str>,
    ) -> Result<WriteOutcome> {
        let outcome = match self.read(key).await? {
            None => {
                let mut doc = candidate;
                doc.stamp(extracted_at, now_rfc3339());
                self.create(key, &doc).await?
            }
            Some(current) if !current.found() => {
                debug!(key, revision = current.revision, "upsert on deleted record discarded");
                WriteOutcome::Discarded(DiscardReason::DeletionTerminal)
            }
            Some(current) => {
                if current.payload.same_content(&candidate) {
                    trace!(key, revision = current.revision, "payload unchanged");
                    WriteOutcome::Unchanged
                } else if !is_candidate_newer(&candidate, &current.payload, timestamp_fields) {
                    debug!(key, revision = current.revision, "stored record is newer, candidate discarded");
                    WriteOutcome::Discarded(DiscardReason::NotNewer)
                } else {
                    let mut doc = candidate;
                    doc.stamp(extracted_at, now_rfc3339());
                    self.update(key, &doc, current.revision).await?
                }
            }
        };
        STORE_WRITES.with_label_values(&[outcome.label()]).inc();
        Ok(outcome)
    }

    /// Marks the record at `key` as deleted.
    ///
    /// The latest payload is always re-read. An absent key gets a marker
    /// record, seeded with `prior_image` when the event carried one, so that
    /// "never seen" and "deleted" stay distinguishable. Records that are
    /// already deleted are left untouched.
    pub async fn soft_delete(
        &self,
        key: &str,
        marker_timestamp: &str,
        prior_image: Option<Document>,
    ) -> Result<WriteOutcome> {
        let outcome = match self.read(key).await? {
            None => {
                let mut doc = prior_image.unwrap_or_default();
                doc.insert(FIELD_DELETED_AT, marker_timestamp);
                doc.stamp(Some(marker_timestamp), now_rfc3339());
                self.create(key, &doc).await?
            }
            Some(current) if !current.found() => {
                trace!(key, "record already deleted");
                WriteOutcome::Discarded(DiscardReason::DeletionTerminal)
            }
            Some(current) => {
                let mut doc = current.payload;
                doc.insert(FIELD_DELETED_AT, marker_timestamp);
                doc.stamp(Some(marker_timestamp), now_rfc3339());
                self.update(key, &doc, current.revision).await?
            }
        };
        STORE_WRITES.with_label_values(&[outcome.label()]).inc();
        Ok(outcome)
    }

    /// Unconditionally replaces the value at `key` with the tombstone marker.
    pub async fn tombstone(
        &self,
        key: &str,
    ) -> Result<u64> {
        let revision = self
            .bucket
            .put(key, bytes::Bytes::from_static(TOMBSTONE_MARKER))
            .await?;
        debug!(key, revision, "tombstoned");
        Ok(revision)
    }

    async fn create(
        &self,
        key: &str,
        doc: &Document,
    ) -> Result<WriteOutcome> {
        let value = self.codec.encode(doc)?;
        match self.bucket.create(key, value).await {
            Ok(revision) => {
                debug!(key, revision, "record created");
                Ok(WriteOutcome::Created(revision))
            }
            Err(e) if e.is_conflict() => {
                debug!(key, "create lost a race: {}", e);
                Ok(WriteOutcome::Conflict)
            }
            Err(e) => Err(e),
        }
    }

    async fn update(
        &self,
        key: &str,
        doc: &Document,
        expected_revision: u64,
    ) -> Result<WriteOutcome> {
        let value = self.codec.encode(doc)?;
        match self.bucket.update(key, value, expected_revision).await {
            Ok(revision) => {
                debug!(key, revision, "record updated");
                Ok(WriteOutcome::Updated(revision))
            }
            Err(e) if e.is_conflict() => {
                debug!(key, expected_revision, "update lost a race: {}", e);
                Ok(WriteOutcome::Conflict)
            }
            Err(e) => Err(e),
        }
    }
}
