//! Mirrors legacy v1 change events into a versioned key-value store.
//!
//! Change events arrive from three sources (a replicated bucket watcher, a
//! write-ahead-log stream and a table change stream) through bounded
//! [`ConsumerPool`]s. The [`Dispatcher`] reconciles them into one canonical
//! record per entity with conditional writes and last-writer-wins
//! resolution in the [`VersionedObjectStore`], and feeds derived membership
//! lists through the [`ListMutator`]. Lookups are served by a
//! [`LookupResponder`] and a [`StaleWhileRevalidateCache`] whose refreshes
//! are serialized by a [`DistributedLock`].
mod cache;
mod consumer;
mod dispatch;
mod errors;
mod lock;
mod lookup;
mod mapping;
mod storage;
mod transport;

mod config;
pub mod constants;
pub mod metrics;
pub mod utils;

pub use self::config::*;
pub use cache::*;
pub use consumer::*;
pub use dispatch::*;
pub use errors::*;
pub use lock::*;
pub use lookup::*;
pub use mapping::*;
pub use storage::*;
pub use transport::*;
pub use utils::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub(crate) mod test_utils;
