//! Page-based virtual memory manager.
//!
//! Key and value bytes live in fixed-size pages handed out by a process-wide
//! [`Vmm`]. Each shard owns an [`Arena`] that carves its pages into size-class
//! spans, so allocation and free only ever touch the shard's own state; the
//! global path is limited to popping and returning whole pages.

mod arena;
mod handle;
mod page;
mod pool;

pub use arena::*;
pub use handle::*;
pub use pool::*;
