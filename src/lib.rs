//! # Tally - Connector Memory and Coordination Core
//!
//! Tally is the memory and cross-process coordination layer of a web-server
//! connector: the pieces every adapter variant shares, independent of which
//! host server loads the adapter.
//!
//! ## Components
//!
//! - **Pool**: request-scoped arena allocator — bump allocation over a fixed
//!   buffer, overflow to tracked heap blocks, bulk reset per request
//! - **Map**: insertion-ordered (name, value) container for headers and
//!   attributes, with a 4-byte case-folded checksum pre-filter before full
//!   string comparison
//! - **Scoreboard**: file-backed, memory-mapped region that unrelated OS
//!   processes attach to for publishing versioned worker/load-balancer state,
//!   plus the opcode-dispatch seam a management process drives it through
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │              Connector adapters                  │
//! │    (host-server shims, excluded collaborators)   │
//! ├──────────────┬───────────────┬───────────────────┤
//! │    Pool      │     Map       │    Scoreboard     │
//! │  per-request │  headers /    │  per-process      │
//! │  arena       │  attributes   │  attach, shared   │
//! │              │  (pool-backed)│  file mapping     │
//! └──────────────┴───────────────┴───────────────────┘
//! ```
//!
//! Pool and Map are single-owner (one in-flight request each); only the
//! scoreboard is shared, and its sharing domain is separate OS processes
//! coordinating through the mapping itself.

pub mod error;
pub mod map;
pub mod pool;
pub mod scoreboard;

pub use error::{Result, TallyError};
pub use map::{checksum, Map, Name, MAP_CAPACITY_INCREMENT};
pub use pool::{align_up, Arena, Pool, ARENA_ALIGN, DEFAULT_POOL_CAPACITY};
pub use scoreboard::{
    Command, Scoreboard, ScoreboardConfig, ScoreboardService, SlotIndex, SlotRef,
};
