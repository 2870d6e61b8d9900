//! Owning, typed handles over allocations.
//!
//! A [`Buffer`] owns exactly one allocation for its whole lifetime.
//! Its element type, memory space, and layout shape are all part of
//! the buffer's type through the allocator parameter, so a transfer
//! aimed at the wrong kind of buffer fails to compile instead of at
//! run time.
//!
//! Buffers move, they are never copied. Release happens exactly once,
//! on drop or on an explicit [`reset`](Buffer::reset); afterwards the
//! buffer stays usable as an empty, released handle.

use std::ptr::NonNull;

use bytemuck::Pod;

use crate::alloc::{BufferAlloc, DeviceAllocator, HostAllocator, PinnedAllocator};
use crate::layout::{Extents, Linear, MemoryLayout, Pitched, Pitched2D, Pitched3D, Shape};
use crate::location::{HostResident, MemoryLocation, Space};
use crate::result::Result;

/// Owning handle to storage in one of the memory spaces.
pub struct Buffer<T, A>
where
    T: Pod,
    A: BufferAlloc<Elem = T>,
{
    pub(crate) ptr: Option<NonNull<T>>,
    pub(crate) extents: Extents,
    pub(crate) pitch: usize,
    pub(crate) alloc: A,
}

/// Pageable host buffer.
pub type HostBuffer<T, S = Linear> = Buffer<T, HostAllocator<T, S>>;

/// Page-locked host buffer, eligible for asynchronous transfers.
pub type PinnedBuffer<T, S = Linear> = Buffer<T, PinnedAllocator<T, S>>;

/// Device buffer, addressable only through transfer operations.
pub type DeviceBuffer<T, S = Linear> = Buffer<T, DeviceAllocator<T, S>>;

// The storage behind a buffer is uniquely owned and has no thread
// affinity in any of the spaces.
unsafe impl<T, A> Send for Buffer<T, A>
where
    T: Pod + Send,
    A: BufferAlloc<Elem = T> + Send,
{
}

unsafe impl<T, A> Sync for Buffer<T, A>
where
    T: Pod + Sync,
    A: BufferAlloc<Elem = T> + Sync,
{
}

impl<T, A> Buffer<T, A>
where
    T: Pod,
    A: BufferAlloc<Elem = T>,
{
    /// Memory space the storage lives in.
    #[inline]
    pub fn location(&self) -> MemoryLocation {
        <A::Space as Space>::LOCATION
    }

    /// Layout shape of the storage.
    #[inline]
    pub fn layout(&self) -> MemoryLayout {
        <A::Shape as Shape>::LAYOUT
    }

    /// Returns `true` when the storage is page-locked host memory.
    #[inline]
    pub fn is_pinned(&self) -> bool {
        <A::Space as Space>::IS_PINNED
    }

    /// Returns `true` once the storage has been released.
    #[inline]
    pub fn is_released(&self) -> bool {
        self.ptr.is_none()
    }

    /// Base pointer of the storage, null after release.
    pub fn as_ptr(&self) -> *const T {
        self.ptr
            .map_or(std::ptr::null(), |ptr| ptr.as_ptr().cast_const())
    }

    /// Mutable base pointer of the storage, null after release.
    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.ptr.map_or(std::ptr::null_mut(), NonNull::as_ptr)
    }

    /// Releases the storage and leaves the buffer empty.
    ///
    /// Idempotent: only the first call releases anything.
    pub fn reset(&mut self) {
        if let Some(ptr) = self.ptr.take() {
            unsafe { self.alloc.deallocate(ptr, self.extents) };
            self.extents = Extents::EMPTY;
            self.pitch = 0;
        }
    }

    pub(crate) fn with_extents_in(extents: Extents, alloc: A) -> Result<Buffer<T, A>> {
        let allocation = alloc.allocate(extents)?;
        Ok(Buffer {
            ptr: Some(allocation.ptr),
            extents,
            pitch: allocation.pitch,
            alloc,
        })
    }

    /// Swaps the storage for a fresh allocation of `extents`.
    ///
    /// The new allocation is obtained first, so on failure the buffer
    /// keeps its current storage and contents untouched. Contents are
    /// never carried over to the new storage.
    pub(crate) fn reallocate_extents(&mut self, extents: Extents) -> Result<()> {
        let allocation = self.alloc.allocate(extents)?;
        if let Some(old) = self.ptr.replace(allocation.ptr) {
            unsafe { self.alloc.deallocate(old, self.extents) };
        }
        self.extents = extents;
        self.pitch = allocation.pitch;
        Ok(())
    }
}

impl<T, A> Buffer<T, A>
where
    T: Pod,
    A: BufferAlloc<Elem = T, Shape = Linear>,
{
    /// Allocates a linear buffer of `len` elements.
    pub fn allocate(len: usize) -> Result<Buffer<T, A>> {
        Buffer::with_extents_in(Extents::linear(len), A::default())
    }

    /// Allocates a linear buffer of `len` elements from `alloc`.
    pub fn allocate_in(len: usize, alloc: A) -> Result<Buffer<T, A>> {
        Buffer::with_extents_in(Extents::linear(len), alloc)
    }

    /// Swaps the storage for a fresh allocation of `len` elements.
    /// On failure the buffer is left unchanged.
    pub fn reallocate(&mut self, len: usize) -> Result<()> {
        self.reallocate_extents(Extents::linear(len))
    }

    /// Number of elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.extents.width()
    }

    /// Returns `true` when the buffer holds no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T, A> Buffer<T, A>
where
    T: Pod,
    A: BufferAlloc<Elem = T>,
    A::Shape: Pitched,
{
    /// Elements per row.
    #[inline]
    pub fn width(&self) -> usize {
        self.extents.width()
    }

    /// Rows per slab.
    #[inline]
    pub fn height(&self) -> usize {
        self.extents.height()
    }

    /// Bytes from the start of one row to the start of the next.
    ///
    /// At least `width() * size_of::<T>()`; device storage rounds it
    /// up to the driver's alignment quantum.
    #[inline]
    pub fn pitch(&self) -> usize {
        self.pitch
    }
}

impl<T, A> Buffer<T, A>
where
    T: Pod,
    A: BufferAlloc<Elem = T, Shape = Pitched2D>,
{
    /// Allocates a pitched buffer of `height` rows of `width`
    /// elements.
    pub fn allocate_2d(width: usize, height: usize) -> Result<Buffer<T, A>> {
        Buffer::with_extents_in(Extents::plane(width, height), A::default())
    }

    /// Allocates a pitched buffer of `height` rows of `width`
    /// elements from `alloc`.
    pub fn allocate_2d_in(width: usize, height: usize, alloc: A) -> Result<Buffer<T, A>> {
        Buffer::with_extents_in(Extents::plane(width, height), alloc)
    }

    /// Swaps the storage for a fresh `width` by `height` allocation.
    /// On failure the buffer is left unchanged.
    pub fn reallocate_2d(&mut self, width: usize, height: usize) -> Result<()> {
        self.reallocate_extents(Extents::plane(width, height))
    }
}

impl<T, A> Buffer<T, A>
where
    T: Pod,
    A: BufferAlloc<Elem = T, Shape = Pitched3D>,
{
    /// Allocates a pitched buffer of `depth` slabs of `height` rows of
    /// `width` elements.
    pub fn allocate_3d(width: usize, height: usize, depth: usize) -> Result<Buffer<T, A>> {
        Buffer::with_extents_in(Extents::volume(width, height, depth), A::default())
    }

    /// Allocates a pitched buffer of `depth` slabs of `height` rows of
    /// `width` elements from `alloc`.
    pub fn allocate_3d_in(
        width: usize,
        height: usize,
        depth: usize,
        alloc: A,
    ) -> Result<Buffer<T, A>> {
        Buffer::with_extents_in(Extents::volume(width, height, depth), alloc)
    }

    /// Swaps the storage for a fresh `width` by `height` by `depth`
    /// allocation. On failure the buffer is left unchanged.
    pub fn reallocate_3d(&mut self, width: usize, height: usize, depth: usize) -> Result<()> {
        self.reallocate_extents(Extents::volume(width, height, depth))
    }

    /// Number of slabs.
    #[inline]
    pub fn depth(&self) -> usize {
        self.extents.depth()
    }
}

impl<T, A> Buffer<T, A>
where
    T: Pod,
    A: BufferAlloc<Elem = T>,
    A::Space: HostResident,
{
    /// Views the contents as a dense slice.
    ///
    /// Host storage is unpadded, so the slice covers the full logical
    /// contents row after row. Empty after release.
    pub fn as_slice(&self) -> &[T] {
        match self.ptr {
            Some(ptr) => unsafe { std::slice::from_raw_parts(ptr.as_ptr(), self.extents.len()) },
            None => &[],
        }
    }

    /// Views the contents as a dense mutable slice.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        match self.ptr {
            Some(ptr) => unsafe {
                std::slice::from_raw_parts_mut(ptr.as_ptr(), self.extents.len())
            },
            None => &mut [],
        }
    }
}

/// An empty buffer in the released state, holding no storage.
impl<T, A> Default for Buffer<T, A>
where
    T: Pod,
    A: BufferAlloc<Elem = T>,
{
    fn default() -> Self {
        Buffer {
            ptr: None,
            extents: Extents::EMPTY,
            pitch: 0,
            alloc: A::default(),
        }
    }
}

impl<T, A> std::fmt::Debug for Buffer<T, A>
where
    T: Pod,
    A: BufferAlloc<Elem = T>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("location", &self.location())
            .field("layout", &self.layout())
            .field("extents", &self.extents)
            .field("pitch", &self.pitch)
            .field("released", &self.is_released())
            .finish()
    }
}

impl<T, A> Drop for Buffer<T, A>
where
    T: Pod,
    A: BufferAlloc<Elem = T>,
{
    fn drop(&mut self) {
        self.reset();
    }
}
