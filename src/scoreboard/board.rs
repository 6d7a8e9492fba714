//! Scoreboard operations over the mapped region

use std::{
    fs::OpenOptions,
    io::Write,
    path::Path,
    sync::atomic::{AtomicU32, Ordering},
};

use log::{debug, error, info, warn};

use super::{
    config::ScoreboardConfig,
    layout::{BoardHeader, SlotIndex, SLOT_DATA_OFFSET, SLOT_LEN_OFFSET, SLOT_NAME_LEN, SLOT_VERSION_OFFSET},
    region::SharedRegion,
};
use crate::error::{Result, TallyError};

/// Cross-process scoreboard over a file-backed mapping
///
/// Processes attach independently and publish small versioned records into
/// permanently name-bound slots. Writes to an existing slot only touch that
/// slot's bytes plus the atomic header counters, so the common steady-state
/// case needs no cross-process locking. First-time slot creation advances the
/// shared cursor with a compare-exchange, so two processes never claim the
/// same index.
#[derive(Debug)]
pub struct Scoreboard {
    region: SharedRegion,
    slot_size: usize,
    slot_max_count: u32,
}

impl Scoreboard {
    /// Create or attach the scoreboard region described by `config`.
    ///
    /// A fresh (all-zero) region is initialized with the configured geometry;
    /// an existing region is sanity-checked and its own geometry adopted. I/O
    /// failures are logged and returned as hard errors; callers treat an
    /// unattached scoreboard as "feature disabled", not as something to retry.
    pub fn attach(config: &ScoreboardConfig) -> Result<Self> {
        config.validate()?;

        let region = SharedRegion::open(&config.path, config.region_size()).map_err(|e| {
            error!(
                "failed to attach scoreboard at {}: {}",
                config.path.display(),
                e
            );
            e
        })?;

        let base = unsafe { region.as_mut_ptr() };
        let header = unsafe { BoardHeader::from_ptr(base) };

        if header.is_fresh() {
            unsafe {
                BoardHeader::initialize(
                    base,
                    config.aligned_slot_size() as u32,
                    config.slot_max_count,
                );
            }
            debug!(
                "initialized scoreboard {} ({} slots of {} bytes)",
                config.path.display(),
                config.slot_max_count,
                config.aligned_slot_size()
            );
        } else {
            header.validate(region.len()).map_err(|e| {
                error!(
                    "scoreboard {} failed header checks: {}; reset required",
                    config.path.display(),
                    e
                );
                e
            })?;
            debug!(
                "attached existing scoreboard {} ({} slots of {} bytes)",
                config.path.display(),
                header.slot_max_count(),
                header.slot_size()
            );
        }

        let slot_size = header.slot_size() as usize;
        let slot_max_count = header.slot_max_count();

        Ok(Self {
            region,
            slot_size,
            slot_max_count,
        })
    }

    fn header(&self) -> &BoardHeader {
        unsafe { BoardHeader::from_ptr(self.region.as_mut_ptr()) }
    }

    fn slot_base(&self, index: SlotIndex) -> *mut u8 {
        // Index is validated against slot_max_count, so the arithmetic stays
        // inside the mapping.
        unsafe {
            self.region
                .as_mut_ptr()
                .add(index.get() as usize * self.slot_size)
        }
    }

    unsafe fn slot_atomic(&self, index: SlotIndex, offset: usize) -> &AtomicU32 {
        &*(self.slot_base(index).add(offset) as *const AtomicU32)
    }

    /// Per-slot size in bytes
    pub fn slot_size(&self) -> usize {
        self.slot_size
    }

    /// Slot capacity of the region, including reserved slot 0
    pub fn slot_max_count(&self) -> u32 {
        self.slot_max_count
    }

    /// Largest payload a single slot can hold
    pub fn payload_capacity(&self) -> usize {
        self.slot_size - SLOT_DATA_OFFSET
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        self.region.path()
    }

    /// Current value of the region-wide generation counter (`lb_ver`).
    ///
    /// Bumped on every slot write, so pollers detect "something changed" in
    /// O(1) without re-scanning slots.
    pub fn generation(&self) -> u32 {
        self.header().lb_ver.load(Ordering::Acquire)
    }

    /// Current allocation cursor: the index the next created slot will get
    pub fn last_slot(&self) -> u32 {
        self.header().last_slot.load(Ordering::Acquire)
    }

    /// Read view of a slot by index. Returns `None` for reserved slot 0 and
    /// for indices beyond the slot capacity.
    pub fn slot(&self, index: u32) -> Option<SlotRef<'_>> {
        let index = SlotIndex::new(index, self.slot_max_count)?;
        Some(SlotRef { board: self, index })
    }

    fn check_name<'n>(&self, name: &'n str) -> Result<&'n str> {
        if name.is_empty() {
            return Err(TallyError::invalid_parameter(
                "name",
                "Slot name must not be empty",
            ));
        }
        if name.len() >= SLOT_NAME_LEN {
            return Err(TallyError::invalid_parameter(
                "name",
                format!("Slot name must be shorter than {} bytes", SLOT_NAME_LEN),
            ));
        }
        if name.bytes().any(|b| b == 0) {
            return Err(TallyError::invalid_parameter(
                "name",
                "Slot name must not contain NUL bytes",
            ));
        }
        Ok(name)
    }

    fn scan(&self, name: &str, upto: u32) -> Option<SlotIndex> {
        (1..upto)
            .filter_map(|raw| SlotIndex::new(raw, self.slot_max_count))
            .find(|&index| SlotRef { board: self, index }.name() == name)
    }

    /// Index of the slot bound to `name`, if any
    pub fn find_slot(&self, name: &str) -> Option<SlotIndex> {
        self.scan(name, self.last_slot())
    }

    /// Resolve the slot bound to `name`, binding a new slot on first use.
    ///
    /// A binding is permanent: once a name has an index, every later call
    /// returns that same index for the lifetime of the region. The cursor is
    /// advanced with compare-exchange on the shared header word, so
    /// concurrent creators never claim the same index; losers re-scan and
    /// pick up slots the winner bound in the meantime.
    pub fn create_slot(&self, name: &str) -> Result<SlotIndex> {
        let name = self.check_name(name)?;
        let header = self.header();

        loop {
            let last = header.last_slot.load(Ordering::Acquire);
            if let Some(index) = self.scan(name, last) {
                return Ok(index);
            }

            if last >= self.slot_max_count {
                warn!(
                    "scoreboard {} is full ({} slots); cannot bind {}",
                    self.path().display(),
                    self.slot_max_count,
                    name
                );
                return Err(TallyError::insufficient_space(
                    last as usize + 1,
                    self.slot_max_count as usize,
                ));
            }

            match header.last_slot.compare_exchange(
                last,
                last + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    let index = SlotIndex::new(last, self.slot_max_count)
                        .ok_or_else(|| TallyError::corrupted("allocation cursor out of range"))?;
                    let base = self.slot_base(index);
                    unsafe {
                        std::ptr::write_bytes(base, 0, SLOT_NAME_LEN);
                        std::ptr::copy_nonoverlapping(name.as_ptr(), base, name.len());
                    }
                    debug!("bound scoreboard slot {} to {}", index, name);
                    return Ok(index);
                }
                // Lost the claim; another process took this index. Retry so
                // the re-scan covers whatever it bound.
                Err(_) => continue,
            }
        }
    }

    /// Publish `payload` into the slot bound to `name`, creating the binding
    /// on first use. Bumps the slot version and the region generation.
    pub fn write_slot(&self, name: &str, payload: &[u8]) -> Result<SlotIndex> {
        let capacity = self.payload_capacity();
        if payload.len() > capacity {
            warn!(
                "payload for slot {} is {} bytes but slots hold {}",
                name,
                payload.len(),
                capacity
            );
            return Err(TallyError::insufficient_space(payload.len(), capacity));
        }

        let index = self.create_slot(name)?;
        let base = self.slot_base(index);
        unsafe {
            std::ptr::copy_nonoverlapping(
                payload.as_ptr(),
                base.add(SLOT_DATA_OFFSET),
                payload.len(),
            );
            self.slot_atomic(index, SLOT_LEN_OFFSET)
                .store(payload.len() as u32, Ordering::Release);
            self.slot_atomic(index, SLOT_VERSION_OFFSET)
                .fetch_add(1, Ordering::AcqRel);
        }
        self.header().lb_ver.fetch_add(1, Ordering::AcqRel);
        Ok(index)
    }

    /// Destructive recovery: zero the entire region and reinitialize the
    /// header with this board's geometry. Every binding and payload is lost.
    pub fn reset(&self) {
        unsafe {
            std::ptr::write_bytes(self.region.as_mut_ptr(), 0, self.region.len());
            BoardHeader::initialize(
                self.region.as_mut_ptr(),
                self.slot_size as u32,
                self.slot_max_count,
            );
        }
        info!("scoreboard {} reset", self.path().display());
    }

    /// Log a human-readable summary of every bound slot; when `file` is
    /// given, also append the raw region bytes for offline inspection.
    pub fn dump(&self, file: Option<&Path>) -> Result<()> {
        info!(
            "scoreboard {}: {} slots of {} bytes, cursor {}, generation {}",
            self.path().display(),
            self.slot_max_count,
            self.slot_size,
            self.last_slot(),
            self.generation()
        );

        for raw in 1..self.last_slot() {
            if let Some(slot) = self.slot(raw) {
                if slot.is_bound() {
                    info!(
                        "slot {}: name={} version={} payload={} bytes",
                        raw,
                        slot.name(),
                        slot.version(),
                        slot.payload().len()
                    );
                }
            }
        }

        if let Some(path) = file {
            let mut out = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| TallyError::from_io(e, "Failed to open dump file"))?;
            out.write_all(self.region.as_slice())
                .map_err(|e| TallyError::from_io(e, "Failed to append region dump"))?;
        }

        Ok(())
    }

    /// Flush the mapping to the backing file
    pub fn flush(&self) -> Result<()> {
        self.region.flush()
    }
}

/// Read view of a single scoreboard slot
#[derive(Clone, Copy)]
pub struct SlotRef<'a> {
    board: &'a Scoreboard,
    index: SlotIndex,
}

impl<'a> SlotRef<'a> {
    /// Index of this slot
    pub fn index(&self) -> SlotIndex {
        self.index
    }

    /// True once a name has been bound to this slot
    pub fn is_bound(&self) -> bool {
        unsafe { *self.board.slot_base(self.index) != 0 }
    }

    /// The bound name, or the empty string for an unbound slot
    pub fn name(&self) -> &'a str {
        let bytes =
            unsafe { std::slice::from_raw_parts(self.board.slot_base(self.index), SLOT_NAME_LEN) };
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(SLOT_NAME_LEN);
        std::str::from_utf8(&bytes[..end]).unwrap_or("")
    }

    /// Write counter for this slot, bumped on every publish
    pub fn version(&self) -> u32 {
        unsafe {
            self.board
                .slot_atomic(self.index, SLOT_VERSION_OFFSET)
                .load(Ordering::Acquire)
        }
    }

    /// Current payload bytes, bounded by the recorded length
    pub fn payload(&self) -> &'a [u8] {
        let len = unsafe {
            self.board
                .slot_atomic(self.index, SLOT_LEN_OFFSET)
                .load(Ordering::Acquire) as usize
        };
        let len = len.min(self.board.payload_capacity());
        unsafe {
            std::slice::from_raw_parts(self.board.slot_base(self.index).add(SLOT_DATA_OFFSET), len)
        }
    }
}

impl std::fmt::Debug for SlotRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotRef")
            .field("index", &self.index)
            .field("name", &self.name())
            .field("version", &self.version())
            .field("payload_len", &self.payload().len())
            .finish()
    }
}
