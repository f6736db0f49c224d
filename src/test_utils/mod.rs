//! Shared fixtures for unit tests: fake origins, deliveries, handlers and
//! document builders.
mod common;
mod fake_delivery;
mod fake_handler;
mod fake_origin;

pub use common::*;
pub use fake_delivery::*;
pub use fake_handler::*;
pub use fake_origin::*;
