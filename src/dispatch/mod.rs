//! Ingestion dispatch: decoding, routing and ack decisions.
mod dispatcher;
mod event;
mod membership_handler;
mod registry;


pub use dispatcher::*;
pub use event::*;
pub use membership_handler::*;
pub use registry::*;
