//! Table of live device and pinned host regions.
//!
//! Every allocation handed out by the driver is recorded here with its
//! address range and kind. Frees are validated against the table, and
//! copy/fill spans that resolve to a tracked region are bounds-checked.
//! Addresses the driver never produced (pageable host memory) resolve to
//! nothing and are trusted as-is.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

use crate::status::{Result, Status};

/// Kind of driver allocation an address belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerKind {
    /// Device-space storage (`device_alloc*`).
    Device,
    /// Page-locked host storage (`pinned_alloc`).
    Pinned,
}

#[derive(Debug, Clone, Copy)]
struct Region {
    len: usize,
    kind: PointerKind,
}

fn table() -> MutexGuard<'static, BTreeMap<usize, Region>> {
    static TABLE: OnceLock<Mutex<BTreeMap<usize, Region>>> = OnceLock::new();
    TABLE
        .get_or_init(Default::default)
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn register(base: *mut u8, len: usize, kind: PointerKind) {
    table().insert(base as usize, Region { len, kind });
}

/// Removes the region based at `base`. Fails when the address is not the
/// base of a live region of the requested kind; the region length is
/// returned so the caller can rebuild the original layout.
pub(crate) fn unregister(base: *mut u8, kind: PointerKind) -> Result<usize> {
    let mut table = table();
    match table.get(&(base as usize)) {
        Some(region) if region.kind == kind => {
            let len = region.len;
            table.remove(&(base as usize));
            Ok(len)
        }
        _ => Err(Status::ERROR_INVALID_POINTER),
    }
}

fn find(addr: usize) -> Option<(usize, Region)> {
    let table = table();
    let (&base, &region) = table.range(..=addr).next_back()?;
    (addr - base < region.len).then_some((base, region))
}

/// Classifies an address against the live-region table.
///
/// Returns the region kind for any address inside a live driver
/// allocation (not only the base), and `None` for everything else.
pub fn pointer_kind(ptr: *const u8) -> Option<PointerKind> {
    find(ptr as usize).map(|(_, region)| region.kind)
}

/// Resolves the span `[ptr, ptr + len)` against the live-region table.
///
/// Untracked spans resolve to `Ok(None)`. A span whose start lies in a
/// tracked region resolves to that region's kind, and fails with
/// `ERROR_OUT_OF_RANGE` when it reaches past the region's end.
pub(crate) fn span_kind(ptr: *const u8, len: usize) -> Result<Option<PointerKind>> {
    let addr = ptr as usize;
    match find(addr) {
        Some((base, region)) => {
            let end = addr.checked_add(len).ok_or(Status::ERROR_OUT_OF_RANGE)?;
            if end <= base + region.len {
                Ok(Some(region.kind))
            } else {
                Err(Status::ERROR_OUT_OF_RANGE)
            }
        }
        None => Ok(None),
    }
}
