//! Bounded worker pools, one per event source.
mod consumer_pool;


pub use consumer_pool::*;
