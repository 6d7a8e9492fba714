//! File-backed shared memory region

use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
};

use memmap2::{MmapMut, MmapOptions};

use crate::error::{Result, TallyError};

/// A file-backed, memory-mapped region shared between unrelated processes
///
/// Every process attaching the same path sees the same bytes through its own
/// mapping. Dropping the region unmaps it; the backing file is deliberately
/// left in place so that the data survives process restarts.
#[derive(Debug)]
pub struct SharedRegion {
    mmap: MmapMut,
    _file: File,
    path: PathBuf,
    len: usize,
}

impl SharedRegion {
    /// Open (or create) the backing file, zero-extend it to at least `size`
    /// bytes, and map it.
    pub fn open(path: &Path, size: usize) -> Result<Self> {
        if size == 0 {
            return Err(TallyError::invalid_parameter(
                "size",
                "Region size must be greater than 0",
            ));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| TallyError::from_io(e, "Failed to create/open scoreboard file"))?;

        let metadata = file
            .metadata()
            .map_err(|e| TallyError::from_io(e, "Failed to stat scoreboard file"))?;

        // New files and files from a smaller configuration are zero-extended;
        // a larger existing file is left alone and mapped in full, so a
        // region created with bigger geometry stays fully addressable.
        let len = (metadata.len() as usize).max(size);
        if (metadata.len() as usize) < size {
            file.set_len(size as u64)
                .map_err(|e| TallyError::from_io(e, "Failed to extend scoreboard file"))?;
        }

        let mmap = unsafe {
            MmapOptions::new()
                .len(len)
                .map_mut(&file)
                .map_err(|e| TallyError::from_io(e, "Failed to map scoreboard file"))?
        };

        Ok(Self {
            mmap,
            _file: file,
            path: path.to_path_buf(),
            len,
        })
    }

    /// Mapped length in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The raw mapped bytes (read-only view)
    pub fn as_slice(&self) -> &[u8] {
        &self.mmap
    }

    /// Base pointer of the mapping for shared-mutable access.
    ///
    /// # Safety
    /// The region is shared with other processes; callers must confine writes
    /// to bytes they own under the scoreboard protocol (their slot, or the
    /// atomic header words).
    pub unsafe fn as_mut_ptr(&self) -> *mut u8 {
        self.mmap.as_ptr() as *mut u8
    }

    /// Flush the mapping to the backing file
    pub fn flush(&self) -> Result<()> {
        self.mmap
            .flush()
            .map_err(|e| TallyError::from_io(e, "Failed to flush scoreboard mapping"))
    }
}
