//! Reference software driver for the `ferry` memory layer.
//!
//! This crate plays the role a vendor runtime would play on real
//! hardware: it hands out device and page-locked host allocations,
//! moves and fills bytes between them synchronously or on streams, and
//! reports every outcome as a numeric status code. "Device" storage is
//! ordinary process memory tracked in a region table, which lets the
//! driver validate frees, classify pointers, and bounds-check spans the
//! way a real driver's virtual memory bookkeeping would.
//!
//! The surface is deliberately flat and C-like: free functions over raw
//! pointers, descriptor structs built fresh per call, and a
//! status-to-string entry point. The typed, ownership-aware layer lives
//! in the `ferry` crate on top of this one.
//!
//! An independent [`transform`] status domain is included for the
//! transform library that shares the device; only its status surface
//! crosses this boundary.

#[cfg_attr(target_os = "linux", path = "pages_linux.rs")]
#[cfg_attr(not(target_os = "linux"), path = "pages_fallback.rs")]
mod pages;

mod mem;
mod registry;
mod status;
mod stream;

pub mod transform;

pub use mem::{
    Direction, Extent3, Memcpy3d, PITCH_ALIGN, PitchedPtr, Pos3, device_alloc,
    device_alloc_pitched, device_alloc_pitched_3d, device_free, memcpy, memcpy_2d,
    memcpy_2d_async, memcpy_3d, memcpy_3d_async, memcpy_async, memset, memset_2d,
    memset_2d_async, memset_3d, memset_3d_async, memset_async, pinned_alloc, pinned_free,
};
pub use registry::{PointerKind, pointer_kind};
pub use status::{Result, Status, error_string};
pub use stream::{StreamHandle, stream_create, stream_destroy, stream_synchronize};
