//! Per-shard indexes and recency tracking.

mod hash_index;
mod radix_tree;
mod recency;
mod shard_index;

pub use hash_index::*;
pub use radix_tree::*;
pub use recency::*;
pub use shard_index::*;
