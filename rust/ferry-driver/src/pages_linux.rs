//! Page-locked host storage backed by `mmap` and `mlock`.

use std::io;
use std::sync::OnceLock;

/// Rounds `size` up to whole pages; sizes within a page of `usize::MAX`
/// are unrepresentable and fail instead.
fn capacity_for(size: usize) -> io::Result<usize> {
    size.max(1)
        .checked_next_multiple_of(page_size())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "allocation size overflow"))
}

/// Allocates `size` bytes of zeroed, page-locked host memory.
///
/// The mapping is rounded up to whole pages and locked with `mlock`.
/// Lock failure is tolerated: the pinned contract this backs is enforced
/// by the typed layer, the lock itself only removes paging jitter.
pub fn allocate(size: usize) -> io::Result<*mut u8> {
    let capacity = capacity_for(size)?;
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            capacity,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };
    if ptr == libc::MAP_FAILED {
        return Err(io::Error::last_os_error());
    }
    let _ = unsafe { libc::mlock(ptr, capacity) };
    Ok(ptr as *mut u8)
}

/// Releases a mapping produced by [`allocate`] with the same `size`.
///
/// # Safety
///
/// `ptr` must have been returned by [`allocate`] with this `size`, and
/// must not be used after this call.
pub unsafe fn free(ptr: *mut u8, size: usize) -> io::Result<()> {
    let capacity = capacity_for(size)?;
    let res = unsafe { libc::munmap(ptr as *mut libc::c_void, capacity) };
    if res != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Returns the system page size.
pub fn page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
    *PAGE_SIZE.get_or_init(|| {
        let sz = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if sz > 0 { sz as usize } else { 4096 }
    })
}
