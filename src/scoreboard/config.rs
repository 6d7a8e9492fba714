//! Configuration for the shared-memory scoreboard

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::layout::{DEFAULT_SLOT_COUNT, DEFAULT_SLOT_SIZE, MIN_SLOT_SIZE};
use crate::error::{Result, TallyError};
use crate::pool::align_up;

/// Configuration for creating or attaching a scoreboard region
///
/// Mirrors the connector's environment surface: the backing file path, the
/// per-slot size and the maximum slot count. The same configuration attaches
/// every process to the same region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreboardConfig {
    /// Path of the backing file
    pub path: PathBuf,
    /// Per-slot size in bytes; rounded up to a multiple of 8 on attach
    pub slot_size: usize,
    /// Maximum number of slots, including reserved slot 0
    pub slot_max_count: u32,
}

impl ScoreboardConfig {
    /// Create a configuration with default slot geometry
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            slot_size: DEFAULT_SLOT_SIZE,
            slot_max_count: DEFAULT_SLOT_COUNT,
        }
    }

    /// Set the per-slot size
    pub fn with_slot_size(mut self, slot_size: usize) -> Self {
        self.slot_size = slot_size;
        self
    }

    /// Set the maximum slot count
    pub fn with_slot_count(mut self, slot_max_count: u32) -> Self {
        self.slot_max_count = slot_max_count;
        self
    }

    /// Per-slot size rounded up to the 8-byte alignment the slot fields need
    pub fn aligned_slot_size(&self) -> usize {
        align_up(self.slot_size)
    }

    /// Total region size implied by the slot geometry
    pub fn region_size(&self) -> usize {
        self.aligned_slot_size() * self.slot_max_count as usize
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(TallyError::invalid_parameter(
                "path",
                "Scoreboard file path must not be empty",
            ));
        }

        if self.slot_size < MIN_SLOT_SIZE {
            return Err(TallyError::invalid_parameter(
                "slot_size",
                format!(
                    "Slot size must be at least {} bytes to hold the slot fields",
                    MIN_SLOT_SIZE
                ),
            ));
        }

        if self.slot_max_count < 2 {
            return Err(TallyError::invalid_parameter(
                "slot_max_count",
                "At least 2 slots are required: slot 0 is reserved",
            ));
        }

        Ok(())
    }
}
