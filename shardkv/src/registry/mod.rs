//! Store registry, its builder and process-wide tunables.

mod global_config;
#[allow(clippy::module_inception)]
mod registry;
mod registry_builder;

pub use global_config::*;
pub use registry::*;
pub use registry_builder::*;
