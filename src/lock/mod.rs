//! Advisory distributed locks.
//!
//! Locks reduce redundant work between replicas; they never guard
//! correctness. Two stealers can briefly both believe they hold a stale lock,
//! so protected state must still go through conditional writes.
mod clock;
mod kv_lock;
mod lock_manager;
mod memory_lock;


pub use clock::*;
pub use kv_lock::*;
pub use lock_manager::*;
pub use memory_lock::*;
