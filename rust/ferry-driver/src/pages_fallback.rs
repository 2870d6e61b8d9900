//! Portable stand-in for page-locked host storage.
//!
//! Platforms without an `mmap`/`mlock` path get page-aligned heap memory
//! instead. The allocation is not actually locked; the addressing and
//! lifetime behavior is otherwise identical to the Linux module.

use std::alloc::{Layout, alloc_zeroed, dealloc};
use std::io;

fn capacity_for(size: usize) -> io::Result<usize> {
    size.max(1)
        .checked_next_multiple_of(page_size())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "allocation size overflow"))
}

fn layout_for(size: usize) -> io::Result<Layout> {
    Layout::from_size_align(capacity_for(size)?, page_size())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "allocation size overflow"))
}

/// Allocates `size` bytes of zeroed, page-aligned host memory.
pub fn allocate(size: usize) -> io::Result<*mut u8> {
    let layout = layout_for(size)?;
    let ptr = unsafe { alloc_zeroed(layout) };
    if ptr.is_null() {
        return Err(io::Error::new(
            io::ErrorKind::OutOfMemory,
            "failed to allocate host pages",
        ));
    }
    Ok(ptr)
}

/// Releases an allocation produced by [`allocate`] with the same `size`.
///
/// # Safety
///
/// `ptr` must have been returned by [`allocate`] with this `size`, and
/// must not be used after this call.
pub unsafe fn free(ptr: *mut u8, size: usize) -> io::Result<()> {
    let layout = layout_for(size)?;
    unsafe { dealloc(ptr, layout) };
    Ok(())
}

/// Returns the page size assumed by this module.
pub fn page_size() -> usize {
    4 * 1024
}
