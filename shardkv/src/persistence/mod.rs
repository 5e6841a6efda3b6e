//! Durable images of stores and the providers that keep them.

mod file;
mod image;
mod memory;
mod provider;

pub use file::*;
pub use image::*;
pub use memory::*;
pub use provider::*;
