//! Copy and fill policies over buffers.
//!
//! Two stateless policies expose the same operation set: [`SyncPolicy`]
//! blocks until the driver finishes each call, [`AsyncPolicy`] routes
//! copies through a transient stream (created, drained, and destroyed
//! inside the call) and backgrounds host fills on a worker thread
//! behind a [`FillHandle`].
//!
//! Which buffers may take part in which operation is expressed through
//! capability traits instead of run-time checks: one-dimensional
//! copies need [`LinearSide`] on both sides, pitched copies need
//! [`PlaneSide`] or [`VolumeSide`], and anything asynchronous needs
//! [`Streamable`], which pageable host buffers do not have. The
//! direction of a copy is likewise fixed by the side types at compile
//! time and never re-derived from pointers.
//!
//! The capability traits are sealed. Their geometry answers feed raw
//! driver calls, so implementations outside this crate could undermine
//! the validation the policies rely on.

use std::sync::mpsc;
use std::thread;

use bytemuck::Pod;

use ferry_driver::{Direction, Extent3, Memcpy3d, PitchedPtr, Pos3, StreamHandle};

use crate::alloc::{BufferAlloc, DeviceAllocator, HostAllocator, PinnedAllocator};
use crate::buffer::Buffer;
use crate::error::Error;
use crate::layout::{Extents, Linear, Pitched2D, Pitched3D, Shape};
use crate::location::{MemoryLocation, Space};
use crate::result::Result;
use crate::verify_arg;

mod sealed {
    pub trait Sealed {}
}

impl<T: Pod, S: Shape> sealed::Sealed for Buffer<T, HostAllocator<T, S>> {}

impl<T: Pod, S: Shape> sealed::Sealed for Buffer<T, PinnedAllocator<T, S>> {}

impl<T: Pod, S: Shape> sealed::Sealed for Buffer<T, DeviceAllocator<T, S>> where
    DeviceAllocator<T, S>: BufferAlloc<Elem = T>
{
}

/// One side of a transfer: its element type, residence, and base
/// address.
pub trait TransferSide: sealed::Sealed {
    /// Element type stored on this side.
    type Elem: Pod;

    /// Space this side's storage lives in.
    const LOCATION: MemoryLocation;

    /// Base address as a byte pointer, null after release.
    fn base_ptr(&self) -> *const u8;

    /// Mutable base address as a byte pointer, null after release.
    fn base_ptr_mut(&mut self) -> *mut u8;
}

impl<T, A> TransferSide for Buffer<T, A>
where
    T: Pod,
    A: BufferAlloc<Elem = T>,
    Buffer<T, A>: sealed::Sealed,
{
    type Elem = T;

    const LOCATION: MemoryLocation = <A::Space as Space>::LOCATION;

    fn base_ptr(&self) -> *const u8 {
        self.as_ptr().cast()
    }

    fn base_ptr_mut(&mut self) -> *mut u8 {
        self.as_mut_ptr().cast()
    }
}

/// Side of a one-dimensional copy or fill. Only linear buffers
/// qualify.
pub trait LinearSide: TransferSide {
    /// Element capacity of this side.
    fn linear_len(&self) -> usize;
}

impl<T: Pod> LinearSide for Buffer<T, HostAllocator<T, Linear>> {
    fn linear_len(&self) -> usize {
        self.len()
    }
}

impl<T: Pod> LinearSide for Buffer<T, PinnedAllocator<T, Linear>> {
    fn linear_len(&self) -> usize {
        self.len()
    }
}

impl<T: Pod> LinearSide for Buffer<T, DeviceAllocator<T, Linear>> {
    fn linear_len(&self) -> usize {
        self.len()
    }
}

/// Resolved geometry of one side of a two-dimensional operation.
#[derive(Debug, Clone, Copy)]
pub struct PlaneWindow {
    byte_offset: usize,
    pitch: usize,
}

/// Side of a two-dimensional copy or fill.
///
/// Pitched buffers expose a window of their row grid. Linear host
/// buffers qualify too, with rows packed at the transfer width.
/// Linear device buffers do not: pitched transfers address device
/// storage through its pitch.
pub trait PlaneSide: TransferSide {
    /// Resolves the window the operation touches on this side.
    ///
    /// `offset` is `[column, row]` in elements; the window must lie
    /// inside the side's logical extents.
    fn plane_window(
        &self,
        offset: [usize; 2],
        width: usize,
        height: usize,
    ) -> Result<PlaneWindow>;
}

fn pitched_plane_window(
    pitch: usize,
    extents: Extents,
    elem_size: usize,
    offset: [usize; 2],
    width: usize,
    height: usize,
) -> Result<PlaneWindow> {
    let [x, y] = offset;
    verify_arg!(
        offset,
        x.checked_add(width).is_some_and(|end| end <= extents.width())
    );
    verify_arg!(
        offset,
        y.checked_add(height).is_some_and(|end| end <= extents.height())
    );
    let Some(byte_offset) = y
        .checked_mul(pitch)
        .and_then(|row| row.checked_add(x.checked_mul(elem_size)?))
    else {
        return Err(Error::invalid_arg("offset", "byte offset overflows usize"));
    };
    Ok(PlaneWindow { byte_offset, pitch })
}

fn dense_plane_window(
    capacity: usize,
    elem_size: usize,
    offset: [usize; 2],
    width: usize,
    height: usize,
) -> Result<PlaneWindow> {
    let [x, y] = offset;
    let span = (|| {
        let start = y.checked_mul(width)?.checked_add(x)?;
        let end = start.checked_add(width.checked_mul(height)?)?;
        Some((start, end))
    })();
    let Some((start, end)) = span else {
        return Err(Error::invalid_arg("offset", "element offset overflows usize"));
    };
    verify_arg!(offset, end <= capacity);
    let bytes = (|| Some((start.checked_mul(elem_size)?, width.checked_mul(elem_size)?)))();
    let Some((byte_offset, pitch)) = bytes else {
        return Err(Error::invalid_arg("offset", "byte offset overflows usize"));
    };
    Ok(PlaneWindow { byte_offset, pitch })
}

impl<T: Pod> PlaneSide for Buffer<T, HostAllocator<T, Pitched2D>> {
    fn plane_window(
        &self,
        offset: [usize; 2],
        width: usize,
        height: usize,
    ) -> Result<PlaneWindow> {
        pitched_plane_window(self.pitch(), self.extents, size_of::<T>(), offset, width, height)
    }
}

impl<T: Pod> PlaneSide for Buffer<T, PinnedAllocator<T, Pitched2D>> {
    fn plane_window(
        &self,
        offset: [usize; 2],
        width: usize,
        height: usize,
    ) -> Result<PlaneWindow> {
        pitched_plane_window(self.pitch(), self.extents, size_of::<T>(), offset, width, height)
    }
}

impl<T: Pod> PlaneSide for Buffer<T, DeviceAllocator<T, Pitched2D>> {
    fn plane_window(
        &self,
        offset: [usize; 2],
        width: usize,
        height: usize,
    ) -> Result<PlaneWindow> {
        pitched_plane_window(self.pitch(), self.extents, size_of::<T>(), offset, width, height)
    }
}

impl<T: Pod> PlaneSide for Buffer<T, HostAllocator<T, Linear>> {
    fn plane_window(
        &self,
        offset: [usize; 2],
        width: usize,
        height: usize,
    ) -> Result<PlaneWindow> {
        dense_plane_window(self.len(), size_of::<T>(), offset, width, height)
    }
}

impl<T: Pod> PlaneSide for Buffer<T, PinnedAllocator<T, Linear>> {
    fn plane_window(
        &self,
        offset: [usize; 2],
        width: usize,
        height: usize,
    ) -> Result<PlaneWindow> {
        dense_plane_window(self.len(), size_of::<T>(), offset, width, height)
    }
}

/// Resolved geometry of one side of a three-dimensional operation.
#[derive(Debug, Clone, Copy)]
pub struct VolumeWindow {
    byte_offset: usize,
    pos: Pos3,
    pitch: usize,
    rows_per_slab: usize,
}

/// Side of a three-dimensional copy or fill.
///
/// The same rules as [`PlaneSide`] apply: pitched three-dimensional
/// buffers and linear host buffers qualify.
pub trait VolumeSide: TransferSide {
    /// Resolves the box the operation touches on this side.
    ///
    /// `offset` is `[column, row, slab]` in elements.
    fn volume_window(
        &self,
        offset: [usize; 3],
        width: usize,
        height: usize,
        depth: usize,
    ) -> Result<VolumeWindow>;
}

fn pitched_volume_window(
    pitch: usize,
    extents: Extents,
    elem_size: usize,
    offset: [usize; 3],
    width: usize,
    height: usize,
    depth: usize,
) -> Result<VolumeWindow> {
    let [x, y, z] = offset;
    verify_arg!(
        offset,
        x.checked_add(width).is_some_and(|end| end <= extents.width())
    );
    verify_arg!(
        offset,
        y.checked_add(height).is_some_and(|end| end <= extents.height())
    );
    verify_arg!(
        offset,
        z.checked_add(depth).is_some_and(|end| end <= extents.depth())
    );
    let Some(x_bytes) = x.checked_mul(elem_size) else {
        return Err(Error::invalid_arg("offset", "byte offset overflows usize"));
    };
    Ok(VolumeWindow {
        byte_offset: 0,
        pos: Pos3::new(x_bytes, y, z),
        pitch,
        rows_per_slab: extents.height(),
    })
}

fn dense_volume_window(
    capacity: usize,
    elem_size: usize,
    offset: [usize; 3],
    width: usize,
    height: usize,
    depth: usize,
) -> Result<VolumeWindow> {
    let [x, y, z] = offset;
    let span = (|| {
        let slab = width.checked_mul(height)?;
        let origin = z
            .checked_mul(slab)?
            .checked_add(y.checked_mul(width)?)?
            .checked_add(x)?;
        let end = origin.checked_add(slab.checked_mul(depth)?)?;
        Some((origin, end))
    })();
    let Some((origin, end)) = span else {
        return Err(Error::invalid_arg("offset", "element offset overflows usize"));
    };
    verify_arg!(offset, end <= capacity);
    let bytes = (|| Some((origin.checked_mul(elem_size)?, width.checked_mul(elem_size)?)))();
    let Some((byte_offset, pitch)) = bytes else {
        return Err(Error::invalid_arg("offset", "byte offset overflows usize"));
    };
    Ok(VolumeWindow {
        byte_offset,
        pos: Pos3::ZERO,
        pitch,
        rows_per_slab: height,
    })
}

impl<T: Pod> VolumeSide for Buffer<T, HostAllocator<T, Pitched3D>> {
    fn volume_window(
        &self,
        offset: [usize; 3],
        width: usize,
        height: usize,
        depth: usize,
    ) -> Result<VolumeWindow> {
        pitched_volume_window(
            self.pitch(),
            self.extents,
            size_of::<T>(),
            offset,
            width,
            height,
            depth,
        )
    }
}

impl<T: Pod> VolumeSide for Buffer<T, PinnedAllocator<T, Pitched3D>> {
    fn volume_window(
        &self,
        offset: [usize; 3],
        width: usize,
        height: usize,
        depth: usize,
    ) -> Result<VolumeWindow> {
        pitched_volume_window(
            self.pitch(),
            self.extents,
            size_of::<T>(),
            offset,
            width,
            height,
            depth,
        )
    }
}

impl<T: Pod> VolumeSide for Buffer<T, DeviceAllocator<T, Pitched3D>> {
    fn volume_window(
        &self,
        offset: [usize; 3],
        width: usize,
        height: usize,
        depth: usize,
    ) -> Result<VolumeWindow> {
        pitched_volume_window(
            self.pitch(),
            self.extents,
            size_of::<T>(),
            offset,
            width,
            height,
            depth,
        )
    }
}

impl<T: Pod> VolumeSide for Buffer<T, HostAllocator<T, Linear>> {
    fn volume_window(
        &self,
        offset: [usize; 3],
        width: usize,
        height: usize,
        depth: usize,
    ) -> Result<VolumeWindow> {
        dense_volume_window(self.len(), size_of::<T>(), offset, width, height, depth)
    }
}

impl<T: Pod> VolumeSide for Buffer<T, PinnedAllocator<T, Linear>> {
    fn volume_window(
        &self,
        offset: [usize; 3],
        width: usize,
        height: usize,
        depth: usize,
    ) -> Result<VolumeWindow> {
        dense_volume_window(self.len(), size_of::<T>(), offset, width, height, depth)
    }
}

/// Sides that may take part in asynchronous operations.
///
/// Page-locked and device storage qualify. Pageable host buffers do
/// not: the driver may touch them after the call site's control flow
/// has moved on, which is only sound for storage the driver tracks.
pub trait Streamable: TransferSide {}

impl<T: Pod, S: Shape> Streamable for Buffer<T, PinnedAllocator<T, S>> {}

impl<T: Pod, S: Shape> Streamable for Buffer<T, DeviceAllocator<T, S>> where
    DeviceAllocator<T, S>: BufferAlloc<Elem = T>
{
}

/// Direction of a copy, fixed by the side types.
pub(crate) const fn transfer_direction(dst: MemoryLocation, src: MemoryLocation) -> Direction {
    match (dst.is_device(), src.is_device()) {
        (false, false) => Direction::HostToHost,
        (true, false) => Direction::HostToDevice,
        (false, true) => Direction::DeviceToHost,
        (true, true) => Direction::DeviceToDevice,
    }
}

/// Blocking transfer policy: every operation completes before the
/// call returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncPolicy;

/// Stream-backed transfer policy.
///
/// Copies run on a transient stream that is drained and destroyed
/// inside the call, so the call still blocks; the stream-based driver
/// path is what requires page-locked host sides. Fills of host
/// storage run on a background worker behind a [`FillHandle`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AsyncPolicy;

impl SyncPolicy {
    /// Copies `len` elements from the front of `src` to the front of
    /// `dst`.
    ///
    /// ```compile_fail
    /// use ferry::{DeviceBuffer, HostBuffer, Pitched2D, SyncPolicy};
    ///
    /// let mut dst = HostBuffer::<u32>::allocate(12).unwrap();
    /// let src = DeviceBuffer::<u32, Pitched2D>::allocate_2d(4, 3).unwrap();
    /// SyncPolicy.copy(&mut dst, &src, 12).unwrap();
    /// ```
    pub fn copy<D, S>(&self, dst: &mut D, src: &S, len: usize) -> Result<()>
    where
        D: LinearSide,
        S: LinearSide<Elem = D::Elem>,
    {
        self.copy_at(dst, 0, src, 0, len)
    }

    /// Copies `len` elements from `src` at `src_offset` to `dst` at
    /// `dst_offset`, all in element units.
    pub fn copy_at<D, S>(
        &self,
        dst: &mut D,
        dst_offset: usize,
        src: &S,
        src_offset: usize,
        len: usize,
    ) -> Result<()>
    where
        D: LinearSide,
        S: LinearSide<Elem = D::Elem>,
    {
        if len == 0 {
            return Ok(());
        }
        verify_arg!(
            dst_offset,
            dst_offset.checked_add(len).is_some_and(|end| end <= dst.linear_len())
        );
        verify_arg!(
            src_offset,
            src_offset.checked_add(len).is_some_and(|end| end <= src.linear_len())
        );
        let elem_size = size_of::<D::Elem>();
        let direction = const { transfer_direction(D::LOCATION, S::LOCATION) };
        // The spans were checked against both capacities, so the
        // pointers below stay inside live allocations.
        let dst_ptr = unsafe { dst.base_ptr_mut().add(dst_offset * elem_size) };
        let src_ptr = unsafe { src.base_ptr().add(src_offset * elem_size) };
        unsafe { ferry_driver::memcpy(dst_ptr, src_ptr, len * elem_size, direction) }
            .map_err(|status| Error::from_runtime_status("memcpy", status))
    }

    /// Copies a `width` by `height` element rectangle between the
    /// origins of two plane sides.
    pub fn copy_2d<D, S>(&self, dst: &mut D, src: &S, width: usize, height: usize) -> Result<()>
    where
        D: PlaneSide,
        S: PlaneSide<Elem = D::Elem>,
    {
        self.copy_2d_at(dst, [0, 0], src, [0, 0], width, height)
    }

    /// Copies a `width` by `height` element rectangle from `src` at
    /// `src_offset` to `dst` at `dst_offset`.
    pub fn copy_2d_at<D, S>(
        &self,
        dst: &mut D,
        dst_offset: [usize; 2],
        src: &S,
        src_offset: [usize; 2],
        width: usize,
        height: usize,
    ) -> Result<()>
    where
        D: PlaneSide,
        S: PlaneSide<Elem = D::Elem>,
    {
        if width == 0 || height == 0 {
            return Ok(());
        }
        let dst_window = dst.plane_window(dst_offset, width, height)?;
        let src_window = src.plane_window(src_offset, width, height)?;
        let elem_size = size_of::<D::Elem>();
        let direction = const { transfer_direction(D::LOCATION, S::LOCATION) };
        let dst_ptr = unsafe { dst.base_ptr_mut().add(dst_window.byte_offset) };
        let src_ptr = unsafe { src.base_ptr().add(src_window.byte_offset) };
        unsafe {
            ferry_driver::memcpy_2d(
                dst_ptr,
                dst_window.pitch,
                src_ptr,
                src_window.pitch,
                width * elem_size,
                height,
                direction,
            )
        }
        .map_err(|status| Error::from_runtime_status("memcpy_2d", status))
    }

    /// Copies a `width` by `height` by `depth` element box between
    /// the origins of two volume sides.
    pub fn copy_3d<D, S>(
        &self,
        dst: &mut D,
        src: &S,
        width: usize,
        height: usize,
        depth: usize,
    ) -> Result<()>
    where
        D: VolumeSide,
        S: VolumeSide<Elem = D::Elem>,
    {
        self.copy_3d_at(dst, [0, 0, 0], src, [0, 0, 0], width, height, depth)
    }

    /// Copies a `width` by `height` by `depth` element box from `src`
    /// at `src_offset` to `dst` at `dst_offset`.
    pub fn copy_3d_at<D, S>(
        &self,
        dst: &mut D,
        dst_offset: [usize; 3],
        src: &S,
        src_offset: [usize; 3],
        width: usize,
        height: usize,
        depth: usize,
    ) -> Result<()>
    where
        D: VolumeSide,
        S: VolumeSide<Elem = D::Elem>,
    {
        if width == 0 || height == 0 || depth == 0 {
            return Ok(());
        }
        let dst_window = dst.volume_window(dst_offset, width, height, depth)?;
        let src_window = src.volume_window(src_offset, width, height, depth)?;
        let desc =
            volume_descriptor::<D, S>(dst, &dst_window, src, &src_window, width, height, depth);
        unsafe { ferry_driver::memcpy_3d(&desc) }
            .map_err(|status| Error::from_runtime_status("memcpy_3d", status))
    }

    /// Writes `value` into every byte of the first `len` elements.
    pub fn fill<B>(&self, buf: &mut B, value: u8, len: usize) -> Result<()>
    where
        B: LinearSide,
    {
        if len == 0 {
            return Ok(());
        }
        verify_arg!(len, len <= buf.linear_len());
        let bytes = len * size_of::<B::Elem>();
        match B::LOCATION {
            MemoryLocation::Device => {
                unsafe { ferry_driver::memset(buf.base_ptr_mut(), value, bytes) }
                    .map_err(|status| Error::from_runtime_status("memset", status))
            }
            MemoryLocation::Host => {
                unsafe { std::ptr::write_bytes(buf.base_ptr_mut(), value, bytes) };
                Ok(())
            }
        }
    }

    /// Writes `value` into every byte of the `width` by `height`
    /// element rectangle at the buffer's origin.
    pub fn fill_2d<B>(&self, buf: &mut B, value: u8, width: usize, height: usize) -> Result<()>
    where
        B: PlaneSide,
    {
        if width == 0 || height == 0 {
            return Ok(());
        }
        let window = buf.plane_window([0, 0], width, height)?;
        let row_bytes = width * size_of::<B::Elem>();
        let ptr = unsafe { buf.base_ptr_mut().add(window.byte_offset) };
        match B::LOCATION {
            MemoryLocation::Device => {
                unsafe { ferry_driver::memset_2d(ptr, window.pitch, value, row_bytes, height) }
                    .map_err(|status| Error::from_runtime_status("memset_2d", status))
            }
            MemoryLocation::Host => {
                unsafe { host_fill_rows(ptr, window.pitch, value, row_bytes, height) };
                Ok(())
            }
        }
    }

    /// Writes `value` into every byte of the `width` by `height` by
    /// `depth` element box at the buffer's origin.
    pub fn fill_3d<B>(
        &self,
        buf: &mut B,
        value: u8,
        width: usize,
        height: usize,
        depth: usize,
    ) -> Result<()>
    where
        B: VolumeSide,
    {
        if width == 0 || height == 0 || depth == 0 {
            return Ok(());
        }
        let window = buf.volume_window([0, 0, 0], width, height, depth)?;
        let row_bytes = width * size_of::<B::Elem>();
        let ptr = unsafe { buf.base_ptr_mut().add(window.byte_offset) };
        match B::LOCATION {
            MemoryLocation::Device => {
                let pitched = PitchedPtr::new(ptr, window.pitch, window.rows_per_slab);
                let extent = Extent3::new(row_bytes, height, depth);
                unsafe { ferry_driver::memset_3d(pitched, value, extent) }
                    .map_err(|status| Error::from_runtime_status("memset_3d", status))
            }
            MemoryLocation::Host => {
                let slab = window.pitch * window.rows_per_slab;
                for s in 0..depth {
                    unsafe {
                        host_fill_rows(ptr.add(s * slab), window.pitch, value, row_bytes, height)
                    };
                }
                Ok(())
            }
        }
    }
}

impl AsyncPolicy {
    /// Copies `len` elements from the front of `src` to the front of
    /// `dst` through a transient stream.
    ///
    /// Host sides must be page-locked:
    ///
    /// ```compile_fail
    /// use ferry::{AsyncPolicy, DeviceBuffer, HostBuffer};
    ///
    /// let mut dst = DeviceBuffer::<f32>::allocate(64).unwrap();
    /// let src = HostBuffer::<f32>::allocate(64).unwrap();
    /// AsyncPolicy.copy(&mut dst, &src, 64).unwrap();
    /// ```
    pub fn copy<D, S>(&self, dst: &mut D, src: &S, len: usize) -> Result<()>
    where
        D: LinearSide + Streamable,
        S: LinearSide<Elem = D::Elem> + Streamable,
    {
        self.copy_at(dst, 0, src, 0, len)
    }

    /// Copies `len` elements from `src` at `src_offset` to `dst` at
    /// `dst_offset` through a transient stream.
    pub fn copy_at<D, S>(
        &self,
        dst: &mut D,
        dst_offset: usize,
        src: &S,
        src_offset: usize,
        len: usize,
    ) -> Result<()>
    where
        D: LinearSide + Streamable,
        S: LinearSide<Elem = D::Elem> + Streamable,
    {
        if len == 0 {
            return Ok(());
        }
        verify_arg!(
            dst_offset,
            dst_offset.checked_add(len).is_some_and(|end| end <= dst.linear_len())
        );
        verify_arg!(
            src_offset,
            src_offset.checked_add(len).is_some_and(|end| end <= src.linear_len())
        );
        let elem_size = size_of::<D::Elem>();
        let direction = const { transfer_direction(D::LOCATION, S::LOCATION) };
        let dst_ptr = unsafe { dst.base_ptr_mut().add(dst_offset * elem_size) };
        let src_ptr = unsafe { src.base_ptr().add(src_offset * elem_size) };
        // The stream is drained before this returns, so the borrows on
        // both sides outlive every queued access.
        with_transient_stream("memcpy_async", |stream| unsafe {
            ferry_driver::memcpy_async(dst_ptr, src_ptr, len * elem_size, direction, stream)
        })
    }

    /// Copies a `width` by `height` element rectangle between the
    /// origins of two plane sides through a transient stream.
    pub fn copy_2d<D, S>(&self, dst: &mut D, src: &S, width: usize, height: usize) -> Result<()>
    where
        D: PlaneSide + Streamable,
        S: PlaneSide<Elem = D::Elem> + Streamable,
    {
        self.copy_2d_at(dst, [0, 0], src, [0, 0], width, height)
    }

    /// Copies a `width` by `height` element rectangle from `src` at
    /// `src_offset` to `dst` at `dst_offset` through a transient
    /// stream.
    pub fn copy_2d_at<D, S>(
        &self,
        dst: &mut D,
        dst_offset: [usize; 2],
        src: &S,
        src_offset: [usize; 2],
        width: usize,
        height: usize,
    ) -> Result<()>
    where
        D: PlaneSide + Streamable,
        S: PlaneSide<Elem = D::Elem> + Streamable,
    {
        if width == 0 || height == 0 {
            return Ok(());
        }
        let dst_window = dst.plane_window(dst_offset, width, height)?;
        let src_window = src.plane_window(src_offset, width, height)?;
        let elem_size = size_of::<D::Elem>();
        let direction = const { transfer_direction(D::LOCATION, S::LOCATION) };
        let dst_ptr = unsafe { dst.base_ptr_mut().add(dst_window.byte_offset) };
        let src_ptr = unsafe { src.base_ptr().add(src_window.byte_offset) };
        with_transient_stream("memcpy_2d_async", |stream| unsafe {
            ferry_driver::memcpy_2d_async(
                dst_ptr,
                dst_window.pitch,
                src_ptr,
                src_window.pitch,
                width * elem_size,
                height,
                direction,
                stream,
            )
        })
    }

    /// Copies a `width` by `height` by `depth` element box between
    /// the origins of two volume sides through a transient stream.
    pub fn copy_3d<D, S>(
        &self,
        dst: &mut D,
        src: &S,
        width: usize,
        height: usize,
        depth: usize,
    ) -> Result<()>
    where
        D: VolumeSide + Streamable,
        S: VolumeSide<Elem = D::Elem> + Streamable,
    {
        self.copy_3d_at(dst, [0, 0, 0], src, [0, 0, 0], width, height, depth)
    }

    /// Copies a `width` by `height` by `depth` element box from `src`
    /// at `src_offset` to `dst` at `dst_offset` through a transient
    /// stream.
    pub fn copy_3d_at<D, S>(
        &self,
        dst: &mut D,
        dst_offset: [usize; 3],
        src: &S,
        src_offset: [usize; 3],
        width: usize,
        height: usize,
        depth: usize,
    ) -> Result<()>
    where
        D: VolumeSide + Streamable,
        S: VolumeSide<Elem = D::Elem> + Streamable,
    {
        if width == 0 || height == 0 || depth == 0 {
            return Ok(());
        }
        let dst_window = dst.volume_window(dst_offset, width, height, depth)?;
        let src_window = src.volume_window(src_offset, width, height, depth)?;
        let desc =
            volume_descriptor::<D, S>(dst, &dst_window, src, &src_window, width, height, depth);
        with_transient_stream("memcpy_3d_async", |stream| unsafe {
            ferry_driver::memcpy_3d_async(&desc, stream)
        })
    }

    /// Writes `value` into every byte of the first `len` elements.
    ///
    /// Device fills run through a transient stream and the returned
    /// handle is already complete. Host fills run on a background
    /// worker: the buffer's storage travels with the worker and is
    /// handed back when the handle is waited on or dropped. Any error
    /// raised before the worker takes the storage leaves the buffer
    /// untouched.
    ///
    /// Pageable host buffers are rejected at compile time:
    ///
    /// ```compile_fail
    /// use ferry::{AsyncPolicy, HostBuffer};
    ///
    /// let mut buf = HostBuffer::<u8>::allocate(256).unwrap();
    /// AsyncPolicy.fill(&mut buf, 0, 256).unwrap();
    /// ```
    pub fn fill<'a, B>(&self, buf: &'a mut B, value: u8, len: usize) -> Result<FillHandle<'a, B>>
    where
        B: LinearSide + Streamable + Default + Send + 'static,
    {
        if len == 0 {
            return Ok(FillHandle::completed(buf));
        }
        verify_arg!(len, len <= buf.linear_len());
        let bytes = len * size_of::<B::Elem>();
        match B::LOCATION {
            MemoryLocation::Device => {
                let ptr = buf.base_ptr_mut();
                with_transient_stream("memset_async", |stream| unsafe {
                    ferry_driver::memset_async(ptr, value, bytes, stream)
                })?;
                Ok(FillHandle::completed(buf))
            }
            MemoryLocation::Host => spawn_fill(buf, move |stolen| {
                unsafe { std::ptr::write_bytes(stolen.base_ptr_mut(), value, bytes) };
            }),
        }
    }

    /// Writes `value` into every byte of the `width` by `height`
    /// element rectangle at the buffer's origin.
    pub fn fill_2d<'a, B>(
        &self,
        buf: &'a mut B,
        value: u8,
        width: usize,
        height: usize,
    ) -> Result<FillHandle<'a, B>>
    where
        B: PlaneSide + Streamable + Default + Send + 'static,
    {
        if width == 0 || height == 0 {
            return Ok(FillHandle::completed(buf));
        }
        let window = buf.plane_window([0, 0], width, height)?;
        let row_bytes = width * size_of::<B::Elem>();
        match B::LOCATION {
            MemoryLocation::Device => {
                let ptr = unsafe { buf.base_ptr_mut().add(window.byte_offset) };
                with_transient_stream("memset_2d_async", |stream| unsafe {
                    ferry_driver::memset_2d_async(
                        ptr,
                        window.pitch,
                        value,
                        row_bytes,
                        height,
                        stream,
                    )
                })?;
                Ok(FillHandle::completed(buf))
            }
            MemoryLocation::Host => spawn_fill(buf, move |stolen| {
                let base = unsafe { stolen.base_ptr_mut().add(window.byte_offset) };
                unsafe { host_fill_rows(base, window.pitch, value, row_bytes, height) };
            }),
        }
    }

    /// Writes `value` into every byte of the `width` by `height` by
    /// `depth` element box at the buffer's origin.
    pub fn fill_3d<'a, B>(
        &self,
        buf: &'a mut B,
        value: u8,
        width: usize,
        height: usize,
        depth: usize,
    ) -> Result<FillHandle<'a, B>>
    where
        B: VolumeSide + Streamable + Default + Send + 'static,
    {
        if width == 0 || height == 0 || depth == 0 {
            return Ok(FillHandle::completed(buf));
        }
        let window = buf.volume_window([0, 0, 0], width, height, depth)?;
        let row_bytes = width * size_of::<B::Elem>();
        match B::LOCATION {
            MemoryLocation::Device => {
                let ptr = unsafe { buf.base_ptr_mut().add(window.byte_offset) };
                let pitched = PitchedPtr::new(ptr, window.pitch, window.rows_per_slab);
                let extent = Extent3::new(row_bytes, height, depth);
                with_transient_stream("memset_3d_async", |stream| unsafe {
                    ferry_driver::memset_3d_async(pitched, value, extent, stream)
                })?;
                Ok(FillHandle::completed(buf))
            }
            MemoryLocation::Host => spawn_fill(buf, move |stolen| {
                let slab = window.pitch * window.rows_per_slab;
                let base = unsafe { stolen.base_ptr_mut().add(window.byte_offset) };
                for s in 0..depth {
                    unsafe {
                        host_fill_rows(base.add(s * slab), window.pitch, value, row_bytes, height)
                    };
                }
            }),
        }
    }
}

/// Join handle for a fill that may still be running on a worker.
///
/// While the worker runs it owns the buffer's storage; waiting on or
/// dropping the handle joins the worker and hands the storage back to
/// the buffer the fill was called on. A leaked handle leaves that
/// buffer in the released state and the storage is freed by the
/// worker instead, so no path observes the fill mid-write.
#[must_use = "dropping the handle blocks until the fill completes"]
pub struct FillHandle<'a, B> {
    slot: &'a mut B,
    worker: Option<thread::JoinHandle<B>>,
}

impl<'a, B> FillHandle<'a, B> {
    fn completed(slot: &'a mut B) -> FillHandle<'a, B> {
        FillHandle { slot, worker: None }
    }

    fn started(slot: &'a mut B, worker: thread::JoinHandle<B>) -> FillHandle<'a, B> {
        FillHandle {
            slot,
            worker: Some(worker),
        }
    }

    /// Returns `true` once the fill has finished running.
    pub fn is_complete(&self) -> bool {
        self.worker.as_ref().is_none_or(|worker| worker.is_finished())
    }

    /// Blocks until the fill has completed and the buffer holds its
    /// storage again.
    pub fn wait(mut self) -> Result<()> {
        self.finish()
    }

    fn finish(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        match worker.join() {
            Ok(filled) => {
                *self.slot = filled;
                Ok(())
            }
            Err(_) => Err(Error::execution_failure("fill worker panicked")),
        }
    }
}

impl<B> Drop for FillHandle<'_, B> {
    fn drop(&mut self) {
        let _ = self.finish();
    }
}

/// Moves the storage out of `buf` into a worker running `fill` and
/// returns the handle that will put it back.
///
/// The storage is handed over only once the worker is running, so a
/// spawn failure returns with `buf` exactly as it was.
fn spawn_fill<'a, B>(
    buf: &'a mut B,
    fill: impl FnOnce(&mut B) + Send + 'static,
) -> Result<FillHandle<'a, B>>
where
    B: Default + Send + 'static,
{
    let (sender, receiver) = mpsc::channel::<B>();
    let worker = thread::Builder::new()
        .name("ferry-fill".into())
        .spawn(move || match receiver.recv() {
            Ok(mut stolen) => {
                fill(&mut stolen);
                stolen
            }
            Err(_) => B::default(),
        })
        .map_err(|_| Error::execution_failure("failed to start the fill worker"))?;
    match sender.send(std::mem::take(buf)) {
        Ok(()) => Ok(FillHandle::started(buf, worker)),
        Err(returned) => {
            *buf = returned.0;
            Err(Error::execution_failure("fill worker exited early"))
        }
    }
}

/// Builds the driver descriptor for a three-dimensional copy.
fn volume_descriptor<D, S>(
    dst: &mut D,
    dst_window: &VolumeWindow,
    src: &S,
    src_window: &VolumeWindow,
    width: usize,
    height: usize,
    depth: usize,
) -> Memcpy3d
where
    D: VolumeSide,
    S: VolumeSide<Elem = D::Elem>,
{
    let elem_size = size_of::<D::Elem>();
    Memcpy3d {
        src: PitchedPtr::new(
            unsafe { src.base_ptr().cast_mut().add(src_window.byte_offset) },
            src_window.pitch,
            src_window.rows_per_slab,
        ),
        src_pos: src_window.pos,
        dst: PitchedPtr::new(
            unsafe { dst.base_ptr_mut().add(dst_window.byte_offset) },
            dst_window.pitch,
            dst_window.rows_per_slab,
        ),
        dst_pos: dst_window.pos,
        extent: Extent3::new(width * elem_size, height, depth),
        direction: const { transfer_direction(D::LOCATION, S::LOCATION) },
    }
}

/// Runs `op` against a stream created for this one call, then drains
/// and destroys the stream.
///
/// When `op` fails the stream is torn down before the error is
/// reported; a teardown failure on that path is a second fault and
/// terminates the process. After a clean run a destroy failure is an
/// ordinary error.
fn with_transient_stream(
    context: &str,
    op: impl FnOnce(StreamHandle) -> ferry_driver::Result<()>,
) -> Result<()> {
    let stream = ferry_driver::stream_create()
        .map_err(|status| Error::from_runtime_status(context, status))?;
    let outcome = op(stream).and_then(|()| ferry_driver::stream_synchronize(stream));
    match outcome {
        Ok(()) => ferry_driver::stream_destroy(stream)
            .map_err(|status| Error::from_runtime_status(context, status)),
        Err(status) => {
            if let Err(destroy_status) = ferry_driver::stream_destroy(stream) {
                fatal_stream_teardown(context, status, destroy_status);
            }
            Err(Error::from_runtime_status(context, status))
        }
    }
}

#[cold]
fn fatal_stream_teardown(
    context: &str,
    status: ferry_driver::Status,
    destroy_status: ferry_driver::Status,
) -> ! {
    log::error!(
        "{context} failed ({}) and its stream could not be destroyed ({})",
        ferry_driver::error_string(status),
        ferry_driver::error_string(destroy_status)
    );
    std::process::abort()
}

/// Writes `value` into each row of a pitched host window.
///
/// # Safety
///
/// `ptr` must be valid for writes over the whole touched span.
unsafe fn host_fill_rows(ptr: *mut u8, pitch: usize, value: u8, width: usize, height: usize) {
    for row in 0..height {
        unsafe { std::ptr::write_bytes(ptr.add(row * pitch), value, width) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{DeviceBuffer, HostBuffer};

    #[test]
    fn test_direction_lookup() {
        use MemoryLocation::{Device, Host};

        assert_eq!(transfer_direction(Host, Host), Direction::HostToHost);
        assert_eq!(transfer_direction(Device, Host), Direction::HostToDevice);
        assert_eq!(transfer_direction(Host, Device), Direction::DeviceToHost);
        assert_eq!(transfer_direction(Device, Device), Direction::DeviceToDevice);
    }

    #[test]
    fn test_pitched_plane_windows() {
        let buf = DeviceBuffer::<u32, Pitched2D>::allocate_2d(8, 4).expect("allocate");
        let window = buf.plane_window([2, 1], 4, 2).expect("window");
        assert_eq!(window.byte_offset, buf.pitch() + 2 * size_of::<u32>());
        assert_eq!(window.pitch, buf.pitch());

        assert!(buf.plane_window([6, 0], 4, 2).is_err());
        assert!(buf.plane_window([0, 3], 4, 2).is_err());
    }

    #[test]
    fn test_dense_plane_windows() {
        let host = HostBuffer::<u32>::allocate(24).expect("allocate");
        let window = host.plane_window([1, 2], 4, 3).expect("window");
        assert_eq!(window.byte_offset, (2 * 4 + 1) * size_of::<u32>());
        assert_eq!(window.pitch, 4 * size_of::<u32>());

        assert!(host.plane_window([1, 3], 4, 3).is_err());
    }

    #[test]
    fn test_pitched_volume_windows() {
        let buf = DeviceBuffer::<u8, Pitched3D>::allocate_3d(16, 4, 3).expect("allocate");
        let window = buf.volume_window([2, 1, 1], 8, 2, 2).expect("window");
        assert_eq!(window.byte_offset, 0);
        assert_eq!(window.pos, Pos3::new(2, 1, 1));
        assert_eq!(window.pitch, buf.pitch());
        assert_eq!(window.rows_per_slab, 4);

        assert!(buf.volume_window([0, 0, 2], 8, 2, 2).is_err());
    }

    #[test]
    fn test_dense_volume_windows() {
        let host = HostBuffer::<u8>::allocate(60).expect("allocate");
        let window = host.volume_window([0, 0, 0], 5, 4, 3).expect("window");
        assert_eq!(window.byte_offset, 0);
        assert_eq!(window.pitch, 5);
        assert_eq!(window.rows_per_slab, 4);

        let window = host.volume_window([1, 1, 1], 2, 2, 1).expect("window");
        assert_eq!(window.byte_offset, 2 * 2 + 2 + 1);
        assert_eq!(window.pos, Pos3::ZERO);

        assert!(host.volume_window([1, 0, 0], 5, 4, 3).is_err());
    }

    #[test]
    fn test_released_buffers_fail_validation() {
        let mut src = HostBuffer::<u32>::allocate(8).expect("allocate");
        let mut dst = HostBuffer::<u32>::allocate(8).expect("allocate");
        src.reset();
        assert!(SyncPolicy.copy(&mut dst, &src, 8).is_err());
        assert!(SyncPolicy.fill(&mut src, 0xFF, 1).is_err());
    }
}
