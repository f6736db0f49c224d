mod mem_bucket;
pub use mem_bucket::*;
