mod sled_bucket;
pub use sled_bucket::*;
