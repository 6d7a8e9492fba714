//! Pool implementation - bump allocation with overflow-to-heap and bulk reset

use std::{
    alloc::{alloc, dealloc, Layout},
    cell::{Cell, RefCell},
    ptr::NonNull,
    sync::atomic::{AtomicU64, Ordering},
};

use log::error;

use super::traits::{align_up, Arena, ARENA_ALIGN};
use crate::error::{Result, TallyError};

/// Default capacity for pools created without an explicit size hint
pub const DEFAULT_POOL_CAPACITY: usize = 8 * 1024;

/// Shared zero-cost result for duplicating the empty string
const EMPTY_STR: &str = "";

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// A heap block servicing an allocation that did not fit the backing buffer
struct OverflowBlock {
    ptr: NonNull<u8>,
    layout: Layout,
}

/// Request-scoped arena allocator
///
/// Allocations are bump-pointer serviced from a fixed backing buffer; requests
/// that no longer fit fall back to individually tracked heap blocks. `reset`
/// frees the overflow blocks and rewinds the bump offset in one step, which is
/// the steady-state operation (one reset per connector request).
///
/// A `Pool` is single-owner and deliberately neither `Send` nor `Sync`; each
/// logical unit of work owns a private pool or a dedicated child.
pub struct Pool {
    base: NonNull<u8>,
    capacity: usize,
    offset: Cell<usize>,
    overflow: RefCell<Vec<OverflowBlock>>,
    id: u64,
    parent_id: Option<u64>,
}

impl Pool {
    /// Create a pool with the given backing-buffer capacity
    pub fn new(capacity: usize) -> Result<Self> {
        Self::create(capacity, None)
    }

    /// Create a pool with [`DEFAULT_POOL_CAPACITY`]
    pub fn with_default_capacity() -> Result<Self> {
        Self::create(DEFAULT_POOL_CAPACITY, None)
    }

    fn create(capacity: usize, parent_id: Option<u64>) -> Result<Self> {
        if capacity == 0 {
            return Err(TallyError::invalid_parameter(
                "capacity",
                "Pool capacity must be greater than 0",
            ));
        }

        let capacity = align_up(capacity);
        let layout = Layout::from_size_align(capacity, ARENA_ALIGN)
            .map_err(|_| TallyError::invalid_parameter("capacity", "Pool capacity too large"))?;

        let base = NonNull::new(unsafe { alloc(layout) }).ok_or_else(|| {
            error!("pool backing buffer allocation of {} bytes failed", capacity);
            TallyError::memory("Failed to allocate pool backing buffer")
        })?;

        Ok(Self {
            base,
            capacity,
            offset: Cell::new(0),
            overflow: RefCell::new(Vec::new()),
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            parent_id,
        })
    }

    /// Create an independent child pool, recording this pool as its parent
    /// for bookkeeping only. The parent does not free or reset children.
    pub fn child(&self, capacity: usize) -> Result<Pool> {
        Self::create(capacity, Some(self.id))
    }

    /// Unique id of this pool
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Id of the creating pool, if this pool was created via [`Pool::child`]
    pub fn parent_id(&self) -> Option<u64> {
        self.parent_id
    }

    /// Number of live overflow blocks in the current generation
    pub fn overflow_count(&self) -> usize {
        self.overflow.borrow().len()
    }

    /// Invalidate every allocation made since the last reset: frees all
    /// overflow blocks and rewinds the bump offset. The backing buffer is
    /// retained and reused. O(number of overflow blocks).
    pub fn reset(&mut self) {
        let mut overflow = self.overflow.borrow_mut();
        for block in overflow.drain(..) {
            unsafe {
                dealloc(block.ptr.as_ptr(), block.layout);
            }
        }
        self.offset.set(0);
    }

    fn alloc_overflow(&self, size: usize) -> Result<NonNull<u8>> {
        let layout = Layout::from_size_align(size, ARENA_ALIGN)
            .map_err(|_| TallyError::invalid_parameter("size", "Allocation size too large"))?;

        let ptr = NonNull::new(unsafe { alloc(layout) }).ok_or_else(|| {
            error!("pool overflow allocation of {} bytes failed", size);
            TallyError::memory("Failed to allocate pool overflow block")
        })?;

        self.overflow.borrow_mut().push(OverflowBlock { ptr, layout });
        Ok(ptr)
    }
}

impl Arena for Pool {
    fn alloc(&self, size: usize) -> Result<NonNull<u8>> {
        if size == 0 {
            return Err(TallyError::invalid_parameter(
                "size",
                "Size must be greater than 0",
            ));
        }

        let size = align_up(size);
        let offset = self.offset.get();

        if size <= self.capacity - offset {
            // base is 8-aligned and every size is a multiple of 8, so the
            // bumped pointer stays 8-aligned.
            let ptr = unsafe { NonNull::new_unchecked(self.base.as_ptr().add(offset)) };
            self.offset.set(offset + size);
            return Ok(ptr);
        }

        self.alloc_overflow(size)
    }

    fn dup_str<'a>(&'a self, s: &str) -> Result<&'a str> {
        if s.is_empty() {
            return Ok(EMPTY_STR);
        }

        let len = s.len();
        let ptr = self.alloc(len + 1)?;
        unsafe {
            std::ptr::copy_nonoverlapping(s.as_ptr(), ptr.as_ptr(), len);
            *ptr.as_ptr().add(len) = 0;
            Ok(std::str::from_utf8_unchecked(std::slice::from_raw_parts(
                ptr.as_ptr(),
                len,
            )))
        }
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn used(&self) -> usize {
        self.offset.get()
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        self.reset();
        unsafe {
            // Layout construction succeeded at creation time.
            dealloc(
                self.base.as_ptr(),
                Layout::from_size_align_unchecked(self.capacity, ARENA_ALIGN),
            );
        }
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("id", &self.id)
            .field("parent_id", &self.parent_id)
            .field("capacity", &self.capacity)
            .field("used", &self.offset.get())
            .field("overflow_blocks", &self.overflow.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(Pool::new(0).is_err());
    }

    #[test]
    fn test_bump_alignment() {
        let pool = Pool::new(256).unwrap();
        let a = pool.alloc(3).unwrap();
        let b = pool.alloc(5).unwrap();
        assert_eq!(a.as_ptr() as usize % ARENA_ALIGN, 0);
        assert_eq!(b.as_ptr() as usize % ARENA_ALIGN, 0);
        assert_eq!(b.as_ptr() as usize - a.as_ptr() as usize, 8);
        assert_eq!(pool.used(), 16);
    }

    #[test]
    fn test_zero_size_rejected() {
        let pool = Pool::new(64).unwrap();
        assert!(pool.alloc(0).is_err());
    }

    #[test]
    fn test_overflow_path() {
        let mut pool = Pool::new(64).unwrap();
        pool.alloc(48).unwrap();
        // Does not fit the remaining 16 bytes; serviced from the heap.
        let big = pool.alloc(128).unwrap();
        assert_eq!(big.as_ptr() as usize % ARENA_ALIGN, 0);
        assert_eq!(pool.overflow_count(), 1);

        pool.reset();
        assert_eq!(pool.overflow_count(), 0);
        assert_eq!(pool.used(), 0);
    }

    #[test]
    fn test_dup_str_empty_is_shared() {
        let pool = Pool::new(64).unwrap();
        let s = pool.dup_str("").unwrap();
        assert_eq!(s, "");
        assert_eq!(pool.used(), 0);
    }

    #[test]
    fn test_dup_str_copies() {
        let pool = Pool::new(64).unwrap();
        let original = String::from("Content-Type");
        let copy = pool.dup_str(&original).unwrap();
        drop(original);
        assert_eq!(copy, "Content-Type");
        // len + NUL rounded up to 8
        assert_eq!(pool.used(), align_up("Content-Type".len() + 1));
    }

    #[test]
    fn test_child_bookkeeping() {
        let parent = Pool::new(64).unwrap();
        let child = parent.child(64).unwrap();
        assert_eq!(child.parent_id(), Some(parent.id()));
        assert_ne!(child.id(), parent.id());
        // Child allocations are independent of the parent.
        child.alloc(32).unwrap();
        assert_eq!(parent.used(), 0);
    }
}
