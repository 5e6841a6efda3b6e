mod parse_utils;
mod time_utils;
mod type_utils;

pub use parse_utils::*;
pub use time_utils::*;
pub use type_utils::*;
