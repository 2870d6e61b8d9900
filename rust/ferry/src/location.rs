//! Address-space descriptors.
//!
//! Where a buffer lives is part of its type: the `Space` markers tag
//! allocators and buffers at compile time, and [`MemoryLocation`] is the
//! runtime mirror used for direction selection and messages. Pinned
//! memory is host memory with an extra property, not a third location;
//! the distinction matters only to the driver and to stream eligibility.

mod sealed {
    pub trait Sealed {}
}

/// Address space an allocation lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryLocation {
    /// CPU-side memory, directly dereferenceable.
    Host,
    /// Accelerator-side memory, reachable only through transfers.
    Device,
}

impl MemoryLocation {
    #[inline]
    pub const fn is_host(self) -> bool {
        matches!(self, MemoryLocation::Host)
    }

    #[inline]
    pub const fn is_device(self) -> bool {
        matches!(self, MemoryLocation::Device)
    }
}

impl std::fmt::Display for MemoryLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            MemoryLocation::Host => "host",
            MemoryLocation::Device => "device",
        })
    }
}

/// Compile-time tag of an address space.
///
/// The set is closed: exactly [`HostSpace`], [`PinnedSpace`] and
/// [`DeviceSpace`] implement it.
pub trait Space: sealed::Sealed + Copy + Default + Send + Sync + std::fmt::Debug + 'static {
    /// Runtime location this tag denotes.
    const LOCATION: MemoryLocation;
    /// Whether host storage of this space is page-locked.
    const IS_PINNED: bool;
}

/// Pageable host memory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostSpace;

/// Page-locked host memory, eligible for stream-based transfers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PinnedSpace;

/// Device memory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceSpace;

impl sealed::Sealed for HostSpace {}
impl sealed::Sealed for PinnedSpace {}
impl sealed::Sealed for DeviceSpace {}

impl Space for HostSpace {
    const LOCATION: MemoryLocation = MemoryLocation::Host;
    const IS_PINNED: bool = false;
}

impl Space for PinnedSpace {
    const LOCATION: MemoryLocation = MemoryLocation::Host;
    const IS_PINNED: bool = true;
}

impl Space for DeviceSpace {
    const LOCATION: MemoryLocation = MemoryLocation::Device;
    const IS_PINNED: bool = false;
}

/// Address spaces whose storage the CPU can dereference directly.
///
/// Gates the slice views on host-resident buffers; device buffers never
/// expose one.
pub trait HostResident: Space {}

impl HostResident for HostSpace {}
impl HostResident for PinnedSpace {}
