//! Message transport seam.
//!
//! The engine consumes a durable, at-least-once transport with explicit
//! per-message acknowledgement. [`Delivery`] and [`Subscription`] describe
//! what the consumer pools need from it; [`LocalStream`] is the in-process
//! implementation used by the replay binary and tests.
mod delivery;
mod local_stream;


pub use delivery::*;
pub use local_stream::*;
