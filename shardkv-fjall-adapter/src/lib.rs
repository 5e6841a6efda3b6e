//! Durable store images for shardkv on the fjall LSM engine.
//!
//! ```rust,ignore
//! use shardkv::Registry;
//! use shardkv_fjall_adapter::FjallSnapshotProvider;
//!
//! let provider = FjallSnapshotProvider::open("/var/lib/app/images")?;
//! let registry = Registry::builder().snapshot_provider(provider).open()?;
//! ```

mod config;
mod error;
mod provider;

pub use config::*;
pub use error::*;
pub use provider::*;
