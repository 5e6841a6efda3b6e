//! Memory-bounded LRU eviction.

mod controller;
mod policy;

pub use controller::*;
pub use policy::*;
