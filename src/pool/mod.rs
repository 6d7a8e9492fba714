//! Request-scoped arena allocation
//!
//! The connector creates (or resets) one pool per in-flight request; maps and
//! adapter shims draw their scratch memory from it and the whole generation is
//! reclaimed with a single `reset`.

pub mod arena;
pub mod traits;

pub use arena::{Pool, DEFAULT_POOL_CAPACITY};
pub use traits::{align_up, Arena, ARENA_ALIGN};
