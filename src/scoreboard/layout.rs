//! On-region layout of the scoreboard
//!
//! The mapped region is `slot_max_count` slots of `slot_size` bytes. The
//! header occupies the first bytes of slot 0, which is why slot 0 is reserved
//! and never addressed as data.
//!
//! ```text
//! +-------------------------+-----------+-----------+---
//! | header (16B, in slot 0) |  slot 1   |  slot 2   | ...
//! +-------------------------+-----------+-----------+---
//! slot: { name: [u8; 64], version: u32, size: u32, data: [u8; slot_size - 72] }
//! ```

use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::{Result, TallyError};

/// Fixed width of a slot name, NUL-padded
pub const SLOT_NAME_LEN: usize = 64;

/// Byte offset of the version counter within a slot
pub const SLOT_VERSION_OFFSET: usize = SLOT_NAME_LEN;

/// Byte offset of the payload length within a slot
pub const SLOT_LEN_OFFSET: usize = SLOT_NAME_LEN + 4;

/// Byte offset of the payload data within a slot (name + version + size)
pub const SLOT_DATA_OFFSET: usize = SLOT_NAME_LEN + 8;

/// Size of the region header in bytes (four u32 words)
pub const HEADER_LEN: usize = 16;

/// Smallest usable slot size: fixed slot fields plus one aligned payload word
pub const MIN_SLOT_SIZE: usize = SLOT_DATA_OFFSET + 8;

/// Default per-slot size in bytes
pub const DEFAULT_SLOT_SIZE: usize = 256;

/// Default maximum slot count
pub const DEFAULT_SLOT_COUNT: u32 = 256;

/// Validated index of an allocated or addressable slot.
///
/// Slot 0 is reserved for the header and is never representable; neither is
/// an index at or beyond the region's slot capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotIndex(u32);

impl SlotIndex {
    /// Validate a raw index against the region's slot capacity
    pub fn new(raw: u32, slot_max_count: u32) -> Option<Self> {
        if raw >= 1 && raw < slot_max_count {
            Some(Self(raw))
        } else {
            None
        }
    }

    /// The raw index value
    pub fn get(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Region header, overlaid on the first [`HEADER_LEN`] bytes of the mapping.
///
/// Geometry words are written once at initialization and read-only
/// afterwards; the cursor and generation counter are shared-mutable across
/// processes and therefore atomics.
#[repr(C)]
pub struct BoardHeader {
    slot_size: u32,
    slot_max_count: u32,
    /// Allocation cursor: index of the next slot to hand out, starts at 1
    pub last_slot: AtomicU32,
    /// Region-wide generation counter, bumped on every slot write
    pub lb_ver: AtomicU32,
}

impl BoardHeader {
    /// Overlay a header on the start of a mapped region.
    ///
    /// # Safety
    /// `ptr` must point at least [`HEADER_LEN`] readable/writable bytes with
    /// 4-byte alignment, valid for `'a`.
    pub unsafe fn from_ptr<'a>(ptr: *mut u8) -> &'a BoardHeader {
        &*(ptr as *const BoardHeader)
    }

    /// Write a fresh header for a zeroed region.
    ///
    /// # Safety
    /// Same contract as [`BoardHeader::from_ptr`], plus no concurrent access.
    pub unsafe fn initialize(ptr: *mut u8, slot_size: u32, slot_max_count: u32) {
        std::ptr::write(
            ptr as *mut BoardHeader,
            BoardHeader {
                slot_size,
                slot_max_count,
                last_slot: AtomicU32::new(1),
                lb_ver: AtomicU32::new(0),
            },
        );
    }

    /// Per-slot size in bytes
    pub fn slot_size(&self) -> u32 {
        self.slot_size
    }

    /// Slot capacity of the region
    pub fn slot_max_count(&self) -> u32 {
        self.slot_max_count
    }

    /// True for an all-zero header, i.e. a freshly created backing file
    pub fn is_fresh(&self) -> bool {
        self.slot_size == 0
            && self.slot_max_count == 0
            && self.last_slot.load(Ordering::Acquire) == 0
    }

    /// Sanity-check an existing header against the mapped region size.
    ///
    /// A header that fails here is corrupt (typically after a crash); the
    /// remedy is an explicit reset, never an automatic repair.
    pub fn validate(&self, region_len: usize) -> Result<()> {
        if (self.slot_size as usize) < MIN_SLOT_SIZE {
            return Err(TallyError::corrupted(format!(
                "slot size {} below minimum {}",
                self.slot_size, MIN_SLOT_SIZE
            )));
        }
        if self.slot_max_count < 2 {
            return Err(TallyError::corrupted(format!(
                "slot count {} leaves no data slots",
                self.slot_max_count
            )));
        }
        let needed = u64::from(self.slot_size) * u64::from(self.slot_max_count);
        if needed > region_len as u64 {
            return Err(TallyError::corrupted(format!(
                "geometry needs {} bytes but region is {}",
                needed, region_len
            )));
        }
        let last = self.last_slot.load(Ordering::Acquire);
        if last < 1 || last > self.slot_max_count {
            return Err(TallyError::corrupted(format!(
                "allocation cursor {} outside 1..={}",
                last, self.slot_max_count
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_is_four_words() {
        assert_eq!(std::mem::size_of::<BoardHeader>(), HEADER_LEN);
    }

    #[test]
    fn test_slot_index_bounds() {
        assert!(SlotIndex::new(0, 8).is_none());
        assert!(SlotIndex::new(8, 8).is_none());
        assert!(SlotIndex::new(9, 8).is_none());
        assert_eq!(SlotIndex::new(1, 8).map(SlotIndex::get), Some(1));
        assert_eq!(SlotIndex::new(7, 8).map(SlotIndex::get), Some(7));
    }

    #[test]
    fn test_validate_rejects_bad_geometry() {
        let mut buf = [0u32; HEADER_LEN / 4];
        let header = unsafe {
            BoardHeader::initialize(buf.as_mut_ptr() as *mut u8, 128, 4);
            BoardHeader::from_ptr(buf.as_mut_ptr() as *mut u8)
        };
        assert!(header.validate(128 * 4).is_ok());
        // Region too small for the declared geometry.
        assert!(header.validate(128 * 3).is_err());
    }

    #[test]
    fn test_fresh_header_detected() {
        let mut buf = [0u32; HEADER_LEN / 4];
        let header = unsafe { BoardHeader::from_ptr(buf.as_mut_ptr() as *mut u8) };
        assert!(header.is_fresh());
        assert!(header.validate(1024).is_err());
    }
}
