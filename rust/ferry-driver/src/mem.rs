//! Allocation, copy, and fill entry points.
//!
//! Device storage is modeled with ordinary heap memory tracked in the
//! region table, so every device pointer the runtime hands out can be
//! validated and bounds-checked on later calls. Host pointers that the
//! runtime never produced are trusted as-is, the same way a real driver
//! trusts pageable host memory.
//!
//! All storage handed out here is zero-initialized.

use std::alloc::{Layout, alloc_zeroed, dealloc};

use crate::pages;
use crate::registry::{self, PointerKind};
use crate::status::{Result, Status};
use crate::stream::{self, StreamHandle};

/// Alignment of device allocations and the quantum pitches are rounded
/// up to.
pub const PITCH_ALIGN: usize = 256;

/// Direction of a copy between the host and device spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    HostToHost,
    HostToDevice,
    DeviceToHost,
    DeviceToDevice,
}

impl Direction {
    /// Returns `true` when the source side of the copy is device storage.
    #[inline]
    pub const fn src_is_device(self) -> bool {
        matches!(self, Direction::DeviceToHost | Direction::DeviceToDevice)
    }

    /// Returns `true` when the destination side of the copy is device
    /// storage.
    #[inline]
    pub const fn dst_is_device(self) -> bool {
        matches!(self, Direction::HostToDevice | Direction::DeviceToDevice)
    }
}

/// Base pointer of a pitched region together with its row stride and the
/// number of rows in each slab.
#[derive(Debug, Clone, Copy)]
pub struct PitchedPtr {
    /// First byte of the region.
    pub ptr: *mut u8,
    /// Distance in bytes between the starts of consecutive rows.
    pub pitch: usize,
    /// Number of rows between the starts of consecutive slabs.
    pub rows_per_slab: usize,
}

impl PitchedPtr {
    pub const fn new(ptr: *mut u8, pitch: usize, rows_per_slab: usize) -> PitchedPtr {
        PitchedPtr {
            ptr,
            pitch,
            rows_per_slab,
        }
    }
}

/// Position inside a pitched region: `x` in bytes, `y` in rows, `z` in
/// slabs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pos3 {
    pub x: usize,
    pub y: usize,
    pub z: usize,
}

impl Pos3 {
    pub const ZERO: Pos3 = Pos3 { x: 0, y: 0, z: 0 };

    pub const fn new(x: usize, y: usize, z: usize) -> Pos3 {
        Pos3 { x, y, z }
    }
}

/// Size of a transferred box: `width` in bytes, `height` in rows,
/// `depth` in slabs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent3 {
    pub width: usize,
    pub height: usize,
    pub depth: usize,
}

impl Extent3 {
    pub const fn new(width: usize, height: usize, depth: usize) -> Extent3 {
        Extent3 {
            width,
            height,
            depth,
        }
    }
}

/// Full description of a three-dimensional copy, built fresh for each
/// call to [`memcpy_3d`] or [`memcpy_3d_async`].
#[derive(Debug, Clone, Copy)]
pub struct Memcpy3d {
    pub src: PitchedPtr,
    pub src_pos: Pos3,
    pub dst: PitchedPtr,
    pub dst_pos: Pos3,
    pub extent: Extent3,
    pub direction: Direction,
}

/// Allocates `size` bytes of device storage.
///
/// Zero-byte requests are rejected with `ERROR_INVALID_VALUE`.
pub fn device_alloc(size: usize) -> Result<*mut u8> {
    if size == 0 {
        return Err(Status::ERROR_INVALID_VALUE);
    }
    let layout =
        Layout::from_size_align(size, PITCH_ALIGN).map_err(|_| Status::ERROR_INVALID_VALUE)?;
    let ptr = unsafe { alloc_zeroed(layout) };
    if ptr.is_null() {
        return Err(Status::ERROR_OUT_OF_MEMORY);
    }
    registry::register(ptr, size, PointerKind::Device);
    Ok(ptr)
}

/// Allocates device storage for `height` rows of `width` bytes and
/// returns the base pointer together with the chosen pitch.
///
/// The pitch is `width` rounded up to a multiple of [`PITCH_ALIGN`], so
/// every row starts on an aligned boundary.
pub fn device_alloc_pitched(width: usize, height: usize) -> Result<(*mut u8, usize)> {
    device_alloc_pitched_3d(width, height, 1)
}

/// Allocates device storage for `depth` slabs of `height` rows of
/// `width` bytes and returns the base pointer together with the chosen
/// pitch.
pub fn device_alloc_pitched_3d(
    width: usize,
    height: usize,
    depth: usize,
) -> Result<(*mut u8, usize)> {
    if width == 0 || height == 0 || depth == 0 {
        return Err(Status::ERROR_INVALID_VALUE);
    }
    let pitch = width
        .checked_next_multiple_of(PITCH_ALIGN)
        .ok_or(Status::ERROR_INVALID_VALUE)?;
    let len = pitch
        .checked_mul(height)
        .and_then(|v| v.checked_mul(depth))
        .ok_or(Status::ERROR_INVALID_VALUE)?;
    let layout =
        Layout::from_size_align(len, PITCH_ALIGN).map_err(|_| Status::ERROR_INVALID_VALUE)?;
    let ptr = unsafe { alloc_zeroed(layout) };
    if ptr.is_null() {
        return Err(Status::ERROR_OUT_OF_MEMORY);
    }
    registry::register(ptr, len, PointerKind::Device);
    Ok((ptr, pitch))
}

/// Releases device storage.
///
/// `ptr` must be the base pointer of a live device allocation; anything
/// else fails with `ERROR_INVALID_POINTER` and releases nothing.
pub fn device_free(ptr: *mut u8) -> Result<()> {
    let len = registry::unregister(ptr, PointerKind::Device)?;
    let layout =
        Layout::from_size_align(len, PITCH_ALIGN).map_err(|_| Status::ERROR_INVALID_VALUE)?;
    unsafe { dealloc(ptr, layout) };
    Ok(())
}

/// Allocates `size` bytes of page-locked host storage.
///
/// The backing mapping is page-granular, but only the requested `size`
/// is tracked; spans past it fail bounds checks. Zero-byte requests are
/// rejected with `ERROR_INVALID_VALUE`.
pub fn pinned_alloc(size: usize) -> Result<*mut u8> {
    if size == 0 {
        return Err(Status::ERROR_INVALID_VALUE);
    }
    let ptr = pages::allocate(size).map_err(|_| Status::ERROR_OUT_OF_MEMORY)?;
    registry::register(ptr, size, PointerKind::Pinned);
    Ok(ptr)
}

/// Releases page-locked host storage.
///
/// `ptr` must be the base pointer of a live pinned allocation; anything
/// else fails with `ERROR_INVALID_POINTER` and releases nothing.
pub fn pinned_free(ptr: *mut u8) -> Result<()> {
    let len = registry::unregister(ptr, PointerKind::Pinned)?;
    unsafe { pages::free(ptr, len) }.map_err(|_| Status::ERROR_EXECUTION_FAILED)
}

/// Validates one side of a copy or fill against the region table.
///
/// A device side must resolve to a live device region that contains the
/// whole span. A host side must not be device storage; pinned regions
/// are bounds-checked and untracked pageable memory is trusted.
fn check_span_for(ptr: *const u8, len: usize, device: bool) -> Result<()> {
    let kind = registry::span_kind(ptr, len)?;
    match (device, kind) {
        (true, Some(PointerKind::Device)) => Ok(()),
        (true, _) => Err(Status::ERROR_INVALID_POINTER),
        (false, Some(PointerKind::Device)) => Err(Status::ERROR_INVALID_VALUE),
        (false, _) => Ok(()),
    }
}

/// Number of bytes a row-wise operation touches from its start: the
/// full pitch for all rows but the last, which only reaches `width`.
fn rows_span(pitch: usize, width: usize, height: usize) -> Result<usize> {
    if width > pitch {
        return Err(Status::ERROR_INVALID_VALUE);
    }
    height
        .checked_sub(1)
        .and_then(|rows| rows.checked_mul(pitch))
        .and_then(|v| v.checked_add(width))
        .ok_or(Status::ERROR_INVALID_VALUE)
}

/// Resolves a box against one pitched side. Returns the byte offset of
/// the box's first element, the length of the touched span, and the
/// slab stride in bytes.
fn box_span(side: &PitchedPtr, pos: Pos3, extent: Extent3) -> Result<(usize, usize, usize)> {
    fn compute(
        pitch: usize,
        rows_per_slab: usize,
        pos: Pos3,
        extent: Extent3,
    ) -> Option<(usize, usize, usize)> {
        if pos.x.checked_add(extent.width)? > pitch {
            return None;
        }
        if pos.y.checked_add(extent.height)? > rows_per_slab {
            return None;
        }
        let slab = pitch.checked_mul(rows_per_slab)?;
        let offset = pos
            .z
            .checked_mul(slab)?
            .checked_add(pos.y.checked_mul(pitch)?)?
            .checked_add(pos.x)?;
        let len = (extent.depth - 1)
            .checked_mul(slab)?
            .checked_add((extent.height - 1).checked_mul(pitch)?)?
            .checked_add(extent.width)?;
        Some((offset, len, slab))
    }
    compute(side.pitch, side.rows_per_slab, pos, extent).ok_or(Status::ERROR_INVALID_VALUE)
}

unsafe fn copy_flat(dst: *mut u8, src: *const u8, len: usize) {
    unsafe { std::ptr::copy(src, dst, len) };
}

unsafe fn copy_rows(
    dst: *mut u8,
    dst_pitch: usize,
    src: *const u8,
    src_pitch: usize,
    width: usize,
    height: usize,
) {
    for row in 0..height {
        unsafe { std::ptr::copy(src.add(row * src_pitch), dst.add(row * dst_pitch), width) };
    }
}

unsafe fn copy_box(
    dst: *mut u8,
    dst_pitch: usize,
    dst_slab: usize,
    src: *const u8,
    src_pitch: usize,
    src_slab: usize,
    extent: Extent3,
) {
    for slab in 0..extent.depth {
        unsafe {
            copy_rows(
                dst.add(slab * dst_slab),
                dst_pitch,
                src.add(slab * src_slab),
                src_pitch,
                extent.width,
                extent.height,
            )
        };
    }
}

unsafe fn fill_rows(ptr: *mut u8, pitch: usize, value: u8, width: usize, height: usize) {
    for row in 0..height {
        unsafe { std::ptr::write_bytes(ptr.add(row * pitch), value, width) };
    }
}

unsafe fn fill_box(ptr: *mut u8, pitch: usize, slab: usize, value: u8, extent: Extent3) {
    for s in 0..extent.depth {
        unsafe { fill_rows(ptr.add(s * slab), pitch, value, extent.width, extent.height) };
    }
}

/// Raw pointer that can cross into a stream worker.
///
/// The eager validation done before enqueueing is what makes the queued
/// access sound; this wrapper only carries the address.
struct SendPtr(*mut u8);

impl SendPtr {
    /// By-value read. Queued closures go through this accessor so they
    /// capture the wrapper itself; naming the field inside the closure
    /// would capture the bare pointer, which is not `Send`.
    fn get(self) -> *mut u8 {
        self.0
    }
}

unsafe impl Send for SendPtr {}

/// Copies `len` bytes from `src` to `dst`.
///
/// Device sides must lie inside live device allocations and host sides
/// must not be device storage; violations fail before any byte moves.
/// The spans may overlap.
///
/// # Safety
///
/// Host-side pointers that the runtime did not allocate must be valid
/// for the whole span.
pub unsafe fn memcpy(dst: *mut u8, src: *const u8, len: usize, direction: Direction) -> Result<()> {
    if len == 0 {
        return Ok(());
    }
    if dst.is_null() || src.is_null() {
        return Err(Status::ERROR_INVALID_VALUE);
    }
    check_span_for(dst.cast_const(), len, direction.dst_is_device())?;
    check_span_for(src, len, direction.src_is_device())?;
    unsafe { copy_flat(dst, src, len) };
    Ok(())
}

/// Queues a [`memcpy`] on `stream`.
///
/// Arguments are validated here; the queued work itself cannot fail.
///
/// # Safety
///
/// In addition to the [`memcpy`] contract, both spans must stay valid
/// until the stream has drained past this operation.
pub unsafe fn memcpy_async(
    dst: *mut u8,
    src: *const u8,
    len: usize,
    direction: Direction,
    stream: StreamHandle,
) -> Result<()> {
    if len == 0 {
        return Ok(());
    }
    if dst.is_null() || src.is_null() {
        return Err(Status::ERROR_INVALID_VALUE);
    }
    check_span_for(dst.cast_const(), len, direction.dst_is_device())?;
    check_span_for(src, len, direction.src_is_device())?;
    let dst = SendPtr(dst);
    let src = SendPtr(src.cast_mut());
    stream::enqueue(
        stream,
        Box::new(move || unsafe { copy_flat(dst.get(), src.get(), len) }),
    )
}

/// Copies a `width` x `height` byte matrix between two pitched regions.
///
/// # Safety
///
/// Host-side pointers that the runtime did not allocate must be valid
/// for the whole touched span.
pub unsafe fn memcpy_2d(
    dst: *mut u8,
    dst_pitch: usize,
    src: *const u8,
    src_pitch: usize,
    width: usize,
    height: usize,
    direction: Direction,
) -> Result<()> {
    if width == 0 || height == 0 {
        return Ok(());
    }
    if dst.is_null() || src.is_null() {
        return Err(Status::ERROR_INVALID_VALUE);
    }
    let dst_span = rows_span(dst_pitch, width, height)?;
    let src_span = rows_span(src_pitch, width, height)?;
    check_span_for(dst.cast_const(), dst_span, direction.dst_is_device())?;
    check_span_for(src, src_span, direction.src_is_device())?;
    unsafe { copy_rows(dst, dst_pitch, src, src_pitch, width, height) };
    Ok(())
}

/// Queues a [`memcpy_2d`] on `stream`.
///
/// # Safety
///
/// In addition to the [`memcpy_2d`] contract, both spans must stay
/// valid until the stream has drained past this operation.
pub unsafe fn memcpy_2d_async(
    dst: *mut u8,
    dst_pitch: usize,
    src: *const u8,
    src_pitch: usize,
    width: usize,
    height: usize,
    direction: Direction,
    stream: StreamHandle,
) -> Result<()> {
    if width == 0 || height == 0 {
        return Ok(());
    }
    if dst.is_null() || src.is_null() {
        return Err(Status::ERROR_INVALID_VALUE);
    }
    let dst_span = rows_span(dst_pitch, width, height)?;
    let src_span = rows_span(src_pitch, width, height)?;
    check_span_for(dst.cast_const(), dst_span, direction.dst_is_device())?;
    check_span_for(src, src_span, direction.src_is_device())?;
    let dst = SendPtr(dst);
    let src = SendPtr(src.cast_mut());
    stream::enqueue(
        stream,
        Box::new(move || unsafe {
            copy_rows(dst.get(), dst_pitch, src.get(), src_pitch, width, height)
        }),
    )
}

/// Copies a three-dimensional box between two pitched regions.
///
/// Each side's position and extent must fit inside the geometry its
/// [`PitchedPtr`] describes, and device sides must additionally fit in
/// their tracked allocation.
///
/// # Safety
///
/// Host-side pointers that the runtime did not allocate must be valid
/// for the whole touched span.
pub unsafe fn memcpy_3d(desc: &Memcpy3d) -> Result<()> {
    let extent = desc.extent;
    if extent.width == 0 || extent.height == 0 || extent.depth == 0 {
        return Ok(());
    }
    if desc.dst.ptr.is_null() || desc.src.ptr.is_null() {
        return Err(Status::ERROR_INVALID_VALUE);
    }
    let (dst_off, dst_len, dst_slab) = box_span(&desc.dst, desc.dst_pos, extent)?;
    let (src_off, src_len, src_slab) = box_span(&desc.src, desc.src_pos, extent)?;
    check_span_for(
        desc.dst.ptr.wrapping_add(dst_off).cast_const(),
        dst_len,
        desc.direction.dst_is_device(),
    )?;
    check_span_for(
        desc.src.ptr.wrapping_add(src_off).cast_const(),
        src_len,
        desc.direction.src_is_device(),
    )?;
    unsafe {
        copy_box(
            desc.dst.ptr.add(dst_off),
            desc.dst.pitch,
            dst_slab,
            desc.src.ptr.add(src_off),
            desc.src.pitch,
            src_slab,
            extent,
        )
    };
    Ok(())
}

/// Queues a [`memcpy_3d`] on `stream`.
///
/// # Safety
///
/// In addition to the [`memcpy_3d`] contract, both spans must stay
/// valid until the stream has drained past this operation.
pub unsafe fn memcpy_3d_async(desc: &Memcpy3d, stream: StreamHandle) -> Result<()> {
    let extent = desc.extent;
    if extent.width == 0 || extent.height == 0 || extent.depth == 0 {
        return Ok(());
    }
    if desc.dst.ptr.is_null() || desc.src.ptr.is_null() {
        return Err(Status::ERROR_INVALID_VALUE);
    }
    let (dst_off, dst_len, dst_slab) = box_span(&desc.dst, desc.dst_pos, extent)?;
    let (src_off, src_len, src_slab) = box_span(&desc.src, desc.src_pos, extent)?;
    check_span_for(
        desc.dst.ptr.wrapping_add(dst_off).cast_const(),
        dst_len,
        desc.direction.dst_is_device(),
    )?;
    check_span_for(
        desc.src.ptr.wrapping_add(src_off).cast_const(),
        src_len,
        desc.direction.src_is_device(),
    )?;
    let dst = SendPtr(unsafe { desc.dst.ptr.add(dst_off) });
    let src = SendPtr(unsafe { desc.src.ptr.add(src_off) });
    let (dst_pitch, src_pitch) = (desc.dst.pitch, desc.src.pitch);
    stream::enqueue(
        stream,
        Box::new(move || unsafe {
            copy_box(dst.get(), dst_pitch, dst_slab, src.get(), src_pitch, src_slab, extent)
        }),
    )
}

/// Writes `value` into each of the first `len` bytes of a device
/// allocation.
///
/// # Safety
///
/// The allocation must stay live for the duration of the call.
pub unsafe fn memset(ptr: *mut u8, value: u8, len: usize) -> Result<()> {
    if len == 0 {
        return Ok(());
    }
    if ptr.is_null() {
        return Err(Status::ERROR_INVALID_VALUE);
    }
    check_span_for(ptr.cast_const(), len, true)?;
    unsafe { std::ptr::write_bytes(ptr, value, len) };
    Ok(())
}

/// Queues a [`memset`] on `stream`.
///
/// # Safety
///
/// The allocation must stay live until the stream has drained past
/// this operation.
pub unsafe fn memset_async(
    ptr: *mut u8,
    value: u8,
    len: usize,
    stream: StreamHandle,
) -> Result<()> {
    if len == 0 {
        return Ok(());
    }
    if ptr.is_null() {
        return Err(Status::ERROR_INVALID_VALUE);
    }
    check_span_for(ptr.cast_const(), len, true)?;
    let ptr = SendPtr(ptr);
    stream::enqueue(
        stream,
        Box::new(move || unsafe { std::ptr::write_bytes(ptr.get(), value, len) }),
    )
}

/// Writes `value` into a `width` x `height` byte matrix of a pitched
/// device allocation. Padding between rows is left untouched.
///
/// # Safety
///
/// The allocation must stay live for the duration of the call.
pub unsafe fn memset_2d(
    ptr: *mut u8,
    pitch: usize,
    value: u8,
    width: usize,
    height: usize,
) -> Result<()> {
    if width == 0 || height == 0 {
        return Ok(());
    }
    if ptr.is_null() {
        return Err(Status::ERROR_INVALID_VALUE);
    }
    let span = rows_span(pitch, width, height)?;
    check_span_for(ptr.cast_const(), span, true)?;
    unsafe { fill_rows(ptr, pitch, value, width, height) };
    Ok(())
}

/// Queues a [`memset_2d`] on `stream`.
///
/// # Safety
///
/// The allocation must stay live until the stream has drained past
/// this operation.
pub unsafe fn memset_2d_async(
    ptr: *mut u8,
    pitch: usize,
    value: u8,
    width: usize,
    height: usize,
    stream: StreamHandle,
) -> Result<()> {
    if width == 0 || height == 0 {
        return Ok(());
    }
    if ptr.is_null() {
        return Err(Status::ERROR_INVALID_VALUE);
    }
    let span = rows_span(pitch, width, height)?;
    check_span_for(ptr.cast_const(), span, true)?;
    let ptr = SendPtr(ptr);
    stream::enqueue(
        stream,
        Box::new(move || unsafe { fill_rows(ptr.get(), pitch, value, width, height) }),
    )
}

/// Writes `value` into a three-dimensional box at the origin of a
/// pitched device allocation. Padding is left untouched.
///
/// # Safety
///
/// The allocation must stay live for the duration of the call.
pub unsafe fn memset_3d(pitched: PitchedPtr, value: u8, extent: Extent3) -> Result<()> {
    if extent.width == 0 || extent.height == 0 || extent.depth == 0 {
        return Ok(());
    }
    if pitched.ptr.is_null() {
        return Err(Status::ERROR_INVALID_VALUE);
    }
    let (offset, len, slab) = box_span(&pitched, Pos3::ZERO, extent)?;
    check_span_for(pitched.ptr.wrapping_add(offset).cast_const(), len, true)?;
    unsafe { fill_box(pitched.ptr, pitched.pitch, slab, value, extent) };
    Ok(())
}

/// Queues a [`memset_3d`] on `stream`.
///
/// # Safety
///
/// The allocation must stay live until the stream has drained past
/// this operation.
pub unsafe fn memset_3d_async(
    pitched: PitchedPtr,
    value: u8,
    extent: Extent3,
    stream: StreamHandle,
) -> Result<()> {
    if extent.width == 0 || extent.height == 0 || extent.depth == 0 {
        return Ok(());
    }
    if pitched.ptr.is_null() {
        return Err(Status::ERROR_INVALID_VALUE);
    }
    let (offset, len, slab) = box_span(&pitched, Pos3::ZERO, extent)?;
    check_span_for(pitched.ptr.wrapping_add(offset).cast_const(), len, true)?;
    let ptr = SendPtr(pitched.ptr);
    let pitch = pitched.pitch;
    stream::enqueue(
        stream,
        Box::new(move || unsafe { fill_box(ptr.get(), pitch, slab, value, extent) }),
    )
}
