use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use ferry::{
    Allocation, Buffer, BufferAlloc, DeviceAllocator, DeviceBuffer, Extents, HostAllocator,
    Linear, PinnedAllocator, Pitched2D, Pitched3D,
};

/// Delegates to an inner allocator while counting allocate and
/// deallocate calls through shared counters.
#[derive(Debug)]
struct Counting<A> {
    inner: A,
    allocs: Arc<AtomicUsize>,
    frees: Arc<AtomicUsize>,
}

impl<A: Default> Default for Counting<A> {
    fn default() -> Self {
        Counting {
            inner: A::default(),
            allocs: Arc::new(AtomicUsize::new(0)),
            frees: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl<A: PartialEq> PartialEq for Counting<A> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
            && Arc::ptr_eq(&self.allocs, &other.allocs)
            && Arc::ptr_eq(&self.frees, &other.frees)
    }
}

impl<A: BufferAlloc> BufferAlloc for Counting<A> {
    type Elem = A::Elem;
    type Space = A::Space;
    type Shape = A::Shape;

    fn allocate(&self, extents: Extents) -> ferry::Result<Allocation<A::Elem>> {
        let allocation = self.inner.allocate(extents)?;
        self.allocs.fetch_add(1, Ordering::Relaxed);
        Ok(allocation)
    }

    unsafe fn deallocate(&self, ptr: NonNull<A::Elem>, extents: Extents) {
        unsafe { self.inner.deallocate(ptr, extents) };
        self.frees.fetch_add(1, Ordering::Relaxed);
    }
}

fn counting<A: BufferAlloc>(inner: A) -> (Arc<AtomicUsize>, Arc<AtomicUsize>, Counting<A>) {
    let allocs = Arc::new(AtomicUsize::new(0));
    let frees = Arc::new(AtomicUsize::new(0));
    let alloc = Counting {
        inner,
        allocs: allocs.clone(),
        frees: frees.clone(),
    };
    (allocs, frees, alloc)
}

fn exercise_linear<A: BufferAlloc<Elem = u32, Shape = Linear>>(inner: A) {
    let (allocs, frees, alloc) = counting(inner);
    let buf = Buffer::allocate_in(16, alloc).unwrap();
    assert!(!buf.is_released());
    assert_eq!(buf.len(), 16);
    drop(buf);
    assert_eq!(allocs.load(Ordering::Relaxed), 1);
    assert_eq!(frees.load(Ordering::Relaxed), 1);
}

fn exercise_plane<A: BufferAlloc<Elem = u32, Shape = Pitched2D>>(inner: A) {
    let (allocs, frees, alloc) = counting(inner);
    let buf = Buffer::allocate_2d_in(7, 5, alloc).unwrap();
    assert_eq!((buf.width(), buf.height()), (7, 5));
    assert!(buf.pitch() >= 7 * size_of::<u32>());
    drop(buf);
    assert_eq!(allocs.load(Ordering::Relaxed), 1);
    assert_eq!(frees.load(Ordering::Relaxed), 1);
}

fn exercise_volume<A: BufferAlloc<Elem = u32, Shape = Pitched3D>>(inner: A) {
    let (allocs, frees, alloc) = counting(inner);
    let buf = Buffer::allocate_3d_in(5, 4, 3, alloc).unwrap();
    assert_eq!((buf.width(), buf.height(), buf.depth()), (5, 4, 3));
    drop(buf);
    assert_eq!(allocs.load(Ordering::Relaxed), 1);
    assert_eq!(frees.load(Ordering::Relaxed), 1);
}

#[test]
fn test_linear_buffers_release_on_drop() {
    exercise_linear(HostAllocator::<u32>::default());
    exercise_linear(PinnedAllocator::<u32>::default());
    exercise_linear(DeviceAllocator::<u32>::default());
}

#[test]
fn test_plane_buffers_release_on_drop() {
    exercise_plane(HostAllocator::<u32, Pitched2D>::default());
    exercise_plane(PinnedAllocator::<u32, Pitched2D>::default());
    exercise_plane(DeviceAllocator::<u32, Pitched2D>::default());
}

#[test]
fn test_volume_buffers_release_on_drop() {
    exercise_volume(HostAllocator::<u32, Pitched3D>::default());
    exercise_volume(PinnedAllocator::<u32, Pitched3D>::default());
    exercise_volume(DeviceAllocator::<u32, Pitched3D>::default());
}

#[test]
fn test_reset_releases_storage_once() {
    let (allocs, frees, alloc) = counting(HostAllocator::<u32>::default());
    let mut buf = Buffer::allocate_in(32, alloc).unwrap();
    buf.reset();
    assert!(buf.is_released());
    assert!(buf.as_ptr().is_null());
    assert!(buf.as_slice().is_empty());
    buf.reset();
    drop(buf);
    assert_eq!(allocs.load(Ordering::Relaxed), 1);
    assert_eq!(frees.load(Ordering::Relaxed), 1);
}

#[test]
fn test_moved_buffers_release_once() {
    let (allocs, frees, alloc) = counting(DeviceAllocator::<u32>::default());
    let buf = Buffer::allocate_in(8, alloc).unwrap();
    let moved = buf;
    let boxed = Box::new(moved);
    drop(boxed);
    assert_eq!(allocs.load(Ordering::Relaxed), 1);
    assert_eq!(frees.load(Ordering::Relaxed), 1);
}

#[test]
fn test_reallocate_swaps_storage() {
    let (allocs, frees, alloc) = counting(PinnedAllocator::<u32>::default());
    let mut buf = Buffer::allocate_in(16, alloc).unwrap();
    buf.reallocate(48).unwrap();
    assert_eq!(buf.len(), 48);
    assert_eq!(allocs.load(Ordering::Relaxed), 2);
    assert_eq!(frees.load(Ordering::Relaxed), 1);
    drop(buf);
    assert_eq!(frees.load(Ordering::Relaxed), 2);
}

#[test]
fn test_failed_reallocate_keeps_the_buffer() {
    let (allocs, frees, alloc) = counting(HostAllocator::<u32>::default());
    let mut buf = Buffer::allocate_in(4, alloc).unwrap();
    buf.as_mut_slice().copy_from_slice(&[10, 20, 30, 40]);

    assert!(buf.reallocate(usize::MAX).is_err());
    assert_eq!(buf.len(), 4);
    assert_eq!(buf.as_slice(), &[10, 20, 30, 40]);
    assert_eq!(allocs.load(Ordering::Relaxed), 1);
    assert_eq!(frees.load(Ordering::Relaxed), 0);
}

#[test]
fn test_reallocate_2d_replaces_extents() {
    let mut buf = DeviceBuffer::<u16, Pitched2D>::allocate_2d(4, 4).unwrap();
    buf.reallocate_2d(9, 2).unwrap();
    assert_eq!((buf.width(), buf.height()), (9, 2));
    assert!(buf.pitch() >= 9 * size_of::<u16>());
}
