#![allow(dead_code, unused_imports)]
//! # shardkv - embedded sharded key-value engine
//!
//! shardkv keeps named stores of byte keys and byte values in process
//! memory. Each store is split into independently locked shards, so writers
//! touching different shards never wait for each other.
//!
//! ## Key Features
//!
//! - **Ordered stores**: a path-compressed radix tree per shard answers
//!   `min`, `max`, `count(low, high)` and `lower_bound` without scanning
//! - **Unordered stores**: a hash index per shard for point workloads
//! - **Page-based memory**: keys and values live in 64 KiB pages handed out
//!   by a virtual memory manager, with per-shard arenas and defragmentation
//! - **Bounded memory**: LRU eviction keeps logical bytes under a ceiling
//! - **Expiry**: per-key deadlines, checked on read and swept by eviction
//! - **Persistence**: named-store images through a pluggable provider
//!   (in memory, files, or fjall in the adapter crate)
//! - **Stats**: VMM, eviction and per-operation counters on demand
//!
//! ## Quick Start
//!
//! ```rust
//! use shardkv::Registry;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Registry::builder().open()?;
//!
//! // parameters are read when the store is first created
//! registry.set_global_config("scores.shards", "4")?;
//! let scores = registry.open("scores")?;
//!
//! scores.put("alice", "10")?;
//! scores.put("bob", "7")?;
//! scores.incr("bob", 5.0)?;
//!
//! assert_eq!(scores.get("bob")?, Some(b"12".to_vec()));
//! assert_eq!(scores.max()?, Some(b"bob".to_vec()));
//!
//! let keys: Vec<Vec<u8>> = scores.iter()?.map(|(key, _)| key).collect();
//! assert_eq!(keys, vec![b"alice".to_vec(), b"bob".to_vec()]);
//!
//! registry.save_all()?;
//! registry.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Design Pattern
//!
//! Public handles ([`Registry`], [`Store`], [`EvictionController`],
//! [`Vmm`]) wrap an `Arc` to their implementation. Clones are cheap and
//! share state, and every handle is `Send + Sync`.
//!
//! ## Module Organization
//!
//! - [`common`] - constants, lock helpers and value parsing
//! - [`errors`] - error kinds and the crate result type
//! - [`eviction`] - memory ceiling enforcement and eviction policies
//! - [`index`] - radix tree, hash index and recency tracking
//! - [`persistence`] - store images and snapshot providers
//! - [`registry`] - the store registry, its builder and tunables
//! - [`stats`] - statistics snapshots
//! - [`store`] - store handles and their parameters
//! - [`vmm`] - the page-based virtual memory manager

pub mod common;
mod context;
pub mod errors;
pub mod eviction;
pub mod index;
pub mod persistence;
pub mod registry;
pub(crate) mod shard;
pub mod stats;
pub mod store;
pub mod vmm;

pub use errors::{ErrorKind, KvError, KvResult};
pub use eviction::{EvictionController, EvictionPolicy, EvictionSource};
pub use persistence::{
    FileSnapshotProvider, ImageMeta, InMemorySnapshotProvider, SnapshotProvider, SnapshotStore,
    StoreImage,
};
pub use registry::{GlobalConfig, Registry, RegistryBuilder};
pub use shard::StoreIter;
pub use stats::{Operation, Stats, StatsCollector};
pub use store::{Store, StoreConfig, Ttl};
pub use vmm::{SpanHandle, Vmm, VmmStats};
