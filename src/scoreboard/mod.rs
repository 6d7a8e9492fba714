//! Cross-process scoreboard over a file-backed memory mapping
//!
//! Connector processes attach the same backing file and publish small,
//! versioned records into permanently name-bound slots: worker health,
//! load-balancer state, generation counters. Readers poll the region-wide
//! generation counter to detect changes without re-scanning slots.

pub mod board;
pub mod config;
pub mod dispatch;
pub mod layout;
pub mod region;

pub use board::{Scoreboard, SlotRef};
pub use config::ScoreboardConfig;
pub use dispatch::{opcode, Command, ScoreboardService};
pub use layout::{BoardHeader, SlotIndex, DEFAULT_SLOT_COUNT, DEFAULT_SLOT_SIZE, SLOT_NAME_LEN};
pub use region::SharedRegion;
