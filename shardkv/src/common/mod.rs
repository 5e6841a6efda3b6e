//! Shared constants, lock helpers and parsing utilities.

mod constants;
mod util;

pub use constants::*;
pub use util::*;
