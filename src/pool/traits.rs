//! Arena trait definition

use std::ptr::NonNull;

use crate::error::Result;

/// Alignment of every arena allocation, in bytes.
pub const ARENA_ALIGN: usize = 8;

/// Round a size up to the next multiple of [`ARENA_ALIGN`].
pub fn align_up(size: usize) -> usize {
    (size + ARENA_ALIGN - 1) & !(ARENA_ALIGN - 1)
}

/// Trait for request-scoped arena allocators
///
/// This is the allocation seam the rest of the connector consumes: maps store
/// their duplicated names through it, and adapter shims use it for per-request
/// scratch memory.
///
/// # Pointer validity
///
/// Every pointer returned by an `Arena` method stays valid until the owning
/// arena is reset or dropped. Callers that retain raw pointers across a reset
/// boundary get dangling pointers; the safe surface (`dup_str` and the borrow
/// rules around `reset(&mut self)`) prevents this for references.
///
/// Arenas are single-owner: implementations carry no internal locking and one
/// logical unit of work (one in-flight request) owns an arena at a time.
pub trait Arena {
    /// Allocate `size` bytes, rounded up to a multiple of 8 and 8-aligned.
    fn alloc(&self, size: usize) -> Result<NonNull<u8>>;

    /// Allocate and zero-fill `size` bytes.
    fn alloc_zeroed(&self, size: usize) -> Result<NonNull<u8>> {
        let ptr = self.alloc(size)?;
        unsafe {
            std::ptr::write_bytes(ptr.as_ptr(), 0, align_up(size));
        }
        Ok(ptr)
    }

    /// Allocate fresh memory of `new_size` bytes and copy the old contents
    /// forward. Never grows in place; `old` must not be used afterward.
    fn realloc(&self, old: NonNull<u8>, old_size: usize, new_size: usize) -> Result<NonNull<u8>> {
        let ptr = self.alloc(new_size)?;
        unsafe {
            std::ptr::copy_nonoverlapping(old.as_ptr(), ptr.as_ptr(), old_size.min(new_size));
        }
        Ok(ptr)
    }

    /// Duplicate a string into arena-owned storage.
    ///
    /// The empty string is a distinguished zero-cost case returning a shared
    /// constant. Non-empty strings are stored with a trailing NUL so the
    /// connector shims can hand them to C hosts without re-copying; the
    /// returned `&str` excludes it.
    fn dup_str<'a>(&'a self, s: &str) -> Result<&'a str>;

    /// Total capacity of the contiguous backing buffer
    fn capacity(&self) -> usize;

    /// Bytes consumed from the backing buffer
    fn used(&self) -> usize;

    /// Bytes remaining in the backing buffer before allocations overflow
    fn available(&self) -> usize {
        self.capacity().saturating_sub(self.used())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0), 0);
        assert_eq!(align_up(1), 8);
        assert_eq!(align_up(8), 8);
        assert_eq!(align_up(9), 16);
        assert_eq!(align_up(63), 64);
    }
}
