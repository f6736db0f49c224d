//! Derived mapping state kept in the mappings bucket.
mod list_mutator;


pub use list_mutator::*;
