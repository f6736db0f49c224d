//! Stale-while-revalidate read-through cache for an external origin.
mod entry;
mod origin;
mod swr_cache;

#[cfg(test)]
mod swr_cache_test;

pub use entry::*;
pub use origin::*;
pub use swr_cache::*;
