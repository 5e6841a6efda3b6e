//! Store handles and their fixed configuration.

#[allow(clippy::module_inception)]
mod store;
mod store_config;

pub use store::*;
pub use store_config::*;
