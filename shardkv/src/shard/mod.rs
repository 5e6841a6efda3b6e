//! Shards, key routing and cross-shard iteration.

mod cursor;
mod router;
#[allow(clippy::module_inception)]
mod shard;

pub use cursor::StoreIter;
pub(crate) use cursor::*;
pub(crate) use router::*;
pub(crate) use shard::*;
