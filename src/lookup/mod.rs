//! Request/reply mapping lookups over the mappings bucket.
mod lookup_responder;


pub use lookup_responder::*;
