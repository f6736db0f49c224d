//! Keyed backing store and the versioned object store built on top of it.
//!
//! [`KvBucket`] is the seam to the shared keyed store: get, conditional
//! create, conditional update keyed on the last-observed revision,
//! unconditional put and delete. Two adaptors ship with the crate:
//! [`MemoryBucket`] for tests and embedding, [`SledBucket`] for a durable
//! single-process deployment.
//!
//! [`VersionedObjectStore`] layers last-writer-wins conflict resolution,
//! terminal deletion and dual-format decoding on any bucket.
mod adaptors;
mod bucket;
mod codec;
mod document;
mod object_store;
mod timestamp;


pub use adaptors::*;
pub use bucket::*;
pub use codec::*;
pub use document::*;
pub use object_store::*;
pub use timestamp::*;
