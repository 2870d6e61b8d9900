//! Allocator families behind [`Buffer`](crate::buffer::Buffer).
//!
//! An allocator fixes three things at the type level: the element
//! type, the memory space, and the layout shape. Host storage comes
//! from the global allocator and is always dense. Pinned and device
//! storage come from the driver; pitched device allocations report the
//! pitch the driver chose rather than assuming the request size.
//!
//! All storage is zero-initialized. Release is infallible by contract:
//! a release the underlying space refuses leaves the process in an
//! unknown state, so it is logged and aborts rather than unwinding.

use std::alloc::Layout;
use std::marker::PhantomData;
use std::ptr::NonNull;

use bytemuck::Pod;

use crate::error::Error;
use crate::layout::{Extents, Linear, Pitched2D, Pitched3D, Shape};
use crate::location::{DeviceSpace, HostSpace, PinnedSpace, Space};
use crate::result::Result;
use crate::verify_arg;

/// Storage provider behind a [`Buffer`](crate::buffer::Buffer).
///
/// Values of one specialization are interchangeable and compare equal,
/// which is what lets a buffer be reallocated and moved between owners
/// without tracking which allocator instance produced it.
pub trait BufferAlloc: Default + PartialEq {
    /// Element type the storage holds.
    type Elem: Pod;
    /// Memory space the storage lives in.
    type Space: Space;
    /// Layout shape of the storage.
    type Shape: Shape;

    /// Allocates zero-initialized storage for `extents` elements.
    ///
    /// Fails with an invalid-argument error when any extent is zero or
    /// a size computation overflows, and with an allocation failure
    /// when the space cannot provide the storage.
    fn allocate(&self, extents: Extents) -> Result<Allocation<Self::Elem>>;

    /// Releases storage previously produced by [`allocate`].
    ///
    /// Infallible by signature: a release the space refuses is logged
    /// and aborts the process.
    ///
    /// # Safety
    ///
    /// `ptr` must come from a successful [`allocate`] of the same
    /// specialization with the same `extents`, and must not be used
    /// afterwards.
    ///
    /// [`allocate`]: BufferAlloc::allocate
    unsafe fn deallocate(&self, ptr: NonNull<Self::Elem>, extents: Extents);
}

/// Outcome of a successful allocation.
#[derive(Debug, Clone, Copy)]
pub struct Allocation<T> {
    /// Base address of the zero-initialized storage.
    pub ptr: NonNull<T>,
    /// Bytes from the start of one row to the start of the next.
    /// Equal to the row width except for pitched device storage.
    pub pitch: usize,
}

/// Dense, pageable host storage from the global allocator.
pub struct HostAllocator<T, S = Linear> {
    _marker: PhantomData<(T, S)>,
}

/// Page-locked host storage from the driver, eligible for
/// asynchronous transfers.
pub struct PinnedAllocator<T, S = Linear> {
    _marker: PhantomData<(T, S)>,
}

/// Device storage from the driver. Pitched shapes receive a pitch
/// rounded up to the driver's alignment quantum.
pub struct DeviceAllocator<T, S = Linear> {
    _marker: PhantomData<(T, S)>,
}

// The families are stateless markers; value semantics are written out
// by hand so they hold for every element type.
macro_rules! marker_allocator_impls {
    ($name:ident) => {
        impl<T, S> Default for $name<T, S> {
            fn default() -> Self {
                $name {
                    _marker: PhantomData,
                }
            }
        }

        impl<T, S> Clone for $name<T, S> {
            fn clone(&self) -> Self {
                *self
            }
        }

        impl<T, S> Copy for $name<T, S> {}

        impl<T, S> std::fmt::Debug for $name<T, S> {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(stringify!($name))
            }
        }

        impl<T, S> PartialEq for $name<T, S> {
            fn eq(&self, _other: &Self) -> bool {
                true
            }
        }

        impl<T, S> Eq for $name<T, S> {}
    };
}

marker_allocator_impls!(HostAllocator);
marker_allocator_impls!(PinnedAllocator);
marker_allocator_impls!(DeviceAllocator);

struct Dims {
    len: usize,
    row_bytes: usize,
    total_bytes: usize,
}

/// Validates `extents` for an allocation of `T` and derives its sizes.
fn checked_dims<T>(extents: &Extents) -> Result<Dims> {
    let elem_size = size_of::<T>();
    verify_arg!(elem_size, elem_size != 0);
    verify_arg!(extents, !extents.is_empty());
    let Some(len) = extents.checked_len() else {
        return Err(Error::invalid_arg("extents", "element count overflows usize"));
    };
    let Some(row_bytes) = extents.width().checked_mul(elem_size) else {
        return Err(Error::invalid_arg("extents", "row size in bytes overflows usize"));
    };
    let Some(total_bytes) = len.checked_mul(elem_size) else {
        return Err(Error::invalid_arg(
            "extents",
            "allocation size in bytes overflows usize",
        ));
    };
    Ok(Dims {
        len,
        row_bytes,
        total_bytes,
    })
}

fn host_layout<T>(len: usize) -> Result<Layout> {
    Layout::array::<T>(len)
        .map_err(|_| Error::invalid_arg("extents", "allocation size exceeds the address space"))
}

fn base_non_null<T>(ptr: *mut u8) -> Result<NonNull<T>> {
    NonNull::new(ptr.cast::<T>())
        .ok_or_else(|| Error::allocation_failure("driver returned a null base pointer"))
}

#[cold]
fn release_failed(entry_point: &str, status: ferry_driver::Status) -> ! {
    log::error!(
        "{entry_point} failed during buffer release: {}",
        ferry_driver::error_string(status)
    );
    std::process::abort()
}

fn device_release<T>(ptr: NonNull<T>) {
    if let Err(status) = ferry_driver::device_free(ptr.as_ptr().cast()) {
        release_failed("device_free", status);
    }
}

impl<T: Pod, S: Shape> BufferAlloc for HostAllocator<T, S> {
    type Elem = T;
    type Space = HostSpace;
    type Shape = S;

    fn allocate(&self, extents: Extents) -> Result<Allocation<T>> {
        let dims = checked_dims::<T>(&extents)?;
        let layout = host_layout::<T>(dims.len)?;
        let ptr = unsafe { std::alloc::alloc_zeroed(layout) };
        let Some(ptr) = NonNull::new(ptr.cast::<T>()) else {
            return Err(Error::allocation_failure(format!(
                "host allocation of {} bytes failed",
                dims.total_bytes
            )));
        };
        Ok(Allocation {
            ptr,
            pitch: dims.row_bytes,
        })
    }

    unsafe fn deallocate(&self, ptr: NonNull<T>, extents: Extents) {
        let Ok(layout) = Layout::array::<T>(extents.len()) else {
            log::error!("host buffer release with extents that never allocated");
            std::process::abort();
        };
        unsafe { std::alloc::dealloc(ptr.as_ptr().cast(), layout) };
    }
}

impl<T: Pod, S: Shape> BufferAlloc for PinnedAllocator<T, S> {
    type Elem = T;
    type Space = PinnedSpace;
    type Shape = S;

    fn allocate(&self, extents: Extents) -> Result<Allocation<T>> {
        // Page-granular mappings are at least PITCH_ALIGN aligned, so
        // this bound keeps element access on pinned storage aligned.
        verify_arg!(elem_align, align_of::<T>() <= ferry_driver::PITCH_ALIGN);
        let dims = checked_dims::<T>(&extents)?;
        let ptr = ferry_driver::pinned_alloc(dims.total_bytes)
            .map_err(|status| Error::from_runtime_status("pinned_alloc", status))?;
        Ok(Allocation {
            ptr: base_non_null(ptr)?,
            pitch: dims.row_bytes,
        })
    }

    unsafe fn deallocate(&self, ptr: NonNull<T>, _extents: Extents) {
        if let Err(status) = ferry_driver::pinned_free(ptr.as_ptr().cast()) {
            release_failed("pinned_free", status);
        }
    }
}

impl<T: Pod> BufferAlloc for DeviceAllocator<T, Linear> {
    type Elem = T;
    type Space = DeviceSpace;
    type Shape = Linear;

    fn allocate(&self, extents: Extents) -> Result<Allocation<T>> {
        let dims = checked_dims::<T>(&extents)?;
        let ptr = ferry_driver::device_alloc(dims.total_bytes)
            .map_err(|status| Error::from_runtime_status("device_alloc", status))?;
        Ok(Allocation {
            ptr: base_non_null(ptr)?,
            pitch: dims.row_bytes,
        })
    }

    unsafe fn deallocate(&self, ptr: NonNull<T>, _extents: Extents) {
        device_release(ptr);
    }
}

impl<T: Pod> BufferAlloc for DeviceAllocator<T, Pitched2D> {
    type Elem = T;
    type Space = DeviceSpace;
    type Shape = Pitched2D;

    fn allocate(&self, extents: Extents) -> Result<Allocation<T>> {
        let dims = checked_dims::<T>(&extents)?;
        let (ptr, pitch) = ferry_driver::device_alloc_pitched(dims.row_bytes, extents.height())
            .map_err(|status| Error::from_runtime_status("device_alloc_pitched", status))?;
        Ok(Allocation {
            ptr: base_non_null(ptr)?,
            pitch,
        })
    }

    unsafe fn deallocate(&self, ptr: NonNull<T>, _extents: Extents) {
        device_release(ptr);
    }
}

impl<T: Pod> BufferAlloc for DeviceAllocator<T, Pitched3D> {
    type Elem = T;
    type Space = DeviceSpace;
    type Shape = Pitched3D;

    fn allocate(&self, extents: Extents) -> Result<Allocation<T>> {
        let dims = checked_dims::<T>(&extents)?;
        let (ptr, pitch) = ferry_driver::device_alloc_pitched_3d(
            dims.row_bytes,
            extents.height(),
            extents.depth(),
        )
        .map_err(|status| Error::from_runtime_status("device_alloc_pitched_3d", status))?;
        Ok(Allocation {
            ptr: base_non_null(ptr)?,
            pitch,
        })
    }

    unsafe fn deallocate(&self, ptr: NonNull<T>, _extents: Extents) {
        device_release(ptr);
    }
}
