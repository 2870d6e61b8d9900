//! Typed buffers over host and device memory.
//!
//! `ferry` layers ownership, element typing, and geometry validation
//! on top of the raw allocation and transfer entry points exposed by
//! `ferry-driver`. A [`Buffer`] pairs an element type with an
//! allocator family ([`HostAllocator`], [`PinnedAllocator`],
//! [`DeviceAllocator`]) and a shape ([`Linear`], [`Pitched2D`],
//! [`Pitched3D`]); which copies and fills a given pairing may take
//! part in is decided by trait bounds, so a pageable buffer on an
//! asynchronous path or a pitched buffer on a flat path is a compile
//! error rather than a status code.
//!
//! ```
//! use ferry::{DeviceBuffer, HostBuffer, Pitched2D, SyncPolicy};
//!
//! # fn main() -> ferry::Result<()> {
//! let mut grid = DeviceBuffer::<u32, Pitched2D>::allocate_2d(4, 3)?;
//! SyncPolicy.fill_2d(&mut grid, 0xAB, 4, 3)?;
//!
//! let mut snapshot = HostBuffer::<u32>::allocate(12)?;
//! SyncPolicy.copy_2d(&mut snapshot, &grid, 4, 3)?;
//! assert!(snapshot.as_slice().iter().all(|&word| word == 0xABAB_ABAB));
//! # Ok(())
//! # }
//! ```

pub mod alloc;
pub mod buffer;
pub mod error;
pub mod layout;
pub mod location;
pub mod result;
pub mod transfer;

pub use alloc::{Allocation, BufferAlloc, DeviceAllocator, HostAllocator, PinnedAllocator};
pub use buffer::{Buffer, DeviceBuffer, HostBuffer, PinnedBuffer};
pub use error::{Error, ErrorKind, StatusDomain};
pub use layout::{Extents, Linear, MemoryLayout, Pitched, Pitched2D, Pitched3D, Shape};
pub use location::{DeviceSpace, HostResident, HostSpace, MemoryLocation, PinnedSpace, Space};
pub use result::Result;
pub use transfer::{
    AsyncPolicy, FillHandle, LinearSide, PlaneSide, PlaneWindow, Streamable, SyncPolicy,
    TransferSide, VolumeSide, VolumeWindow,
};
