use ferry::{
    AsyncPolicy, DeviceBuffer, ErrorKind, HostBuffer, PinnedBuffer, Pitched2D, Pitched3D,
    SyncPolicy,
};

#[test]
fn test_copy_at_leaves_the_rest_of_the_destination_alone() {
    let mut src = HostBuffer::<u32>::allocate(10).unwrap();
    fastrand::seed(118550);
    for v in src.as_mut_slice() {
        *v = fastrand::u32(..);
    }
    let mut dst = HostBuffer::<u32>::allocate(10).unwrap();
    dst.as_mut_slice().fill(0xFEED_F00D);

    SyncPolicy.copy_at(&mut dst, 3, &src, 0, 5).unwrap();

    assert_eq!(&dst.as_slice()[3..8], &src.as_slice()[..5]);
    assert!(dst.as_slice()[..3].iter().all(|&v| v == 0xFEED_F00D));
    assert!(dst.as_slice()[8..].iter().all(|&v| v == 0xFEED_F00D));
}

#[test]
fn test_device_round_trip() {
    let mut staged = HostBuffer::<u64>::allocate(256).unwrap();
    fastrand::seed(902213);
    for v in staged.as_mut_slice() {
        *v = fastrand::u64(..);
    }
    let mut device = DeviceBuffer::<u64>::allocate(256).unwrap();
    SyncPolicy.copy(&mut device, &staged, 256).unwrap();

    let mut back = HostBuffer::<u64>::allocate(256).unwrap();
    SyncPolicy.copy(&mut back, &device, 256).unwrap();
    assert_eq!(back.as_slice(), staged.as_slice());
}

#[test]
fn test_device_to_device_copy() {
    let mut first = DeviceBuffer::<u32>::allocate(32).unwrap();
    SyncPolicy.fill(&mut first, 0x44, 32).unwrap();
    let mut second = DeviceBuffer::<u32>::allocate(32).unwrap();
    SyncPolicy.copy(&mut second, &first, 32).unwrap();

    let mut host = HostBuffer::<u32>::allocate(32).unwrap();
    SyncPolicy.copy(&mut host, &second, 32).unwrap();
    assert!(host.as_slice().iter().all(|&v| v == 0x4444_4444));
}

#[test]
fn test_pitched_device_fill_lands_in_linear_host() {
    let mut grid = DeviceBuffer::<u32, Pitched2D>::allocate_2d(4, 3).unwrap();
    assert!(grid.pitch() >= 4 * size_of::<u32>());
    SyncPolicy.fill_2d(&mut grid, 0xAB, 4, 3).unwrap();

    let mut host = HostBuffer::<u32>::allocate(12).unwrap();
    SyncPolicy.copy_2d(&mut host, &grid, 4, 3).unwrap();
    assert!(host.as_slice().iter().all(|&v| v == 0xABAB_ABAB));
    assert!(bytemuck::cast_slice::<u32, u8>(host.as_slice())
        .iter()
        .all(|&b| b == 0xAB));
}

#[test]
fn test_offset_rectangles_round_trip() {
    let mut src = PinnedBuffer::<u16, Pitched2D>::allocate_2d(8, 6).unwrap();
    for (i, v) in src.as_mut_slice().iter_mut().enumerate() {
        *v = i as u16;
    }
    let mut grid = DeviceBuffer::<u16, Pitched2D>::allocate_2d(16, 8).unwrap();
    SyncPolicy.copy_2d_at(&mut grid, [5, 2], &src, [2, 1], 4, 3).unwrap();

    let mut out = PinnedBuffer::<u16, Pitched2D>::allocate_2d(4, 3).unwrap();
    SyncPolicy.copy_2d_at(&mut out, [0, 0], &grid, [5, 2], 4, 3).unwrap();
    for row in 0..3 {
        for col in 0..4 {
            let expected = ((row + 1) * 8 + col + 2) as u16;
            assert_eq!(out.as_slice()[row * 4 + col], expected);
        }
    }
}

#[test]
fn test_volume_box_round_trip() {
    let mut src = HostBuffer::<u8>::allocate(4 * 3 * 2).unwrap();
    fastrand::seed(7151);
    for v in src.as_mut_slice() {
        *v = fastrand::u8(..);
    }
    let mut volume = DeviceBuffer::<u8, Pitched3D>::allocate_3d(9, 5, 4).unwrap();
    SyncPolicy
        .copy_3d_at(&mut volume, [3, 1, 1], &src, [0, 0, 0], 4, 3, 2)
        .unwrap();

    let mut back = HostBuffer::<u8>::allocate(4 * 3 * 2).unwrap();
    SyncPolicy
        .copy_3d_at(&mut back, [0, 0, 0], &volume, [3, 1, 1], 4, 3, 2)
        .unwrap();
    assert_eq!(back.as_slice(), src.as_slice());
}

#[test]
fn test_volume_fill_reaches_every_slab() {
    let mut volume = DeviceBuffer::<u16, Pitched3D>::allocate_3d(6, 4, 3).unwrap();
    SyncPolicy.fill_3d(&mut volume, 0x7C, 6, 4, 3).unwrap();

    let mut level = HostBuffer::<u16>::allocate(6 * 4).unwrap();
    SyncPolicy
        .copy_3d_at(&mut level, [0, 0, 0], &volume, [0, 0, 2], 6, 4, 1)
        .unwrap();
    assert!(level.as_slice().iter().all(|&v| v == 0x7C7C));
}

#[test]
fn test_linear_fills() {
    let mut host = HostBuffer::<u32>::allocate(8).unwrap();
    SyncPolicy.fill(&mut host, 0x11, 6).unwrap();
    assert!(host.as_slice()[..6].iter().all(|&v| v == 0x1111_1111));
    assert_eq!(&host.as_slice()[6..], &[0, 0]);

    let mut device = DeviceBuffer::<u32>::allocate(8).unwrap();
    SyncPolicy.fill(&mut device, 0x2E, 8).unwrap();
    let mut out = HostBuffer::<u32>::allocate(8).unwrap();
    SyncPolicy.copy(&mut out, &device, 8).unwrap();
    assert!(out.as_slice().iter().all(|&v| v == 0x2E2E_2E2E));
}

#[test]
fn test_out_of_range_copies_are_rejected() {
    let src = HostBuffer::<u32>::allocate(10).unwrap();
    let mut dst = HostBuffer::<u32>::allocate(10).unwrap();

    let err = SyncPolicy.copy_at(&mut dst, 6, &src, 0, 5).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::InvalidArgument { .. }));

    let err = SyncPolicy.copy_at(&mut dst, 0, &src, usize::MAX, 5).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::InvalidArgument { .. }));
}

#[test]
fn test_out_of_range_rectangles_are_rejected() {
    let src = PinnedBuffer::<u8, Pitched2D>::allocate_2d(8, 4).unwrap();
    let mut dst = DeviceBuffer::<u8, Pitched2D>::allocate_2d(8, 4).unwrap();

    let err = SyncPolicy
        .copy_2d_at(&mut dst, [0, 0], &src, [3, 0], 6, 4)
        .unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::InvalidArgument { .. }));

    let err = SyncPolicy.fill_2d(&mut dst, 0xFF, 9, 1).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::InvalidArgument { .. }));
}

#[test]
fn test_zero_extent_operations_succeed() {
    let src = HostBuffer::<u32>::allocate(4).unwrap();
    let mut dst = DeviceBuffer::<u32>::allocate(4).unwrap();
    SyncPolicy.copy(&mut dst, &src, 0).unwrap();
    SyncPolicy.fill(&mut dst, 0xFF, 0).unwrap();

    let mut plane = DeviceBuffer::<u32, Pitched2D>::allocate_2d(4, 2).unwrap();
    SyncPolicy.copy_2d(&mut plane, &src, 0, 2).unwrap();

    let mut volume = DeviceBuffer::<u8, Pitched3D>::allocate_3d(2, 2, 2).unwrap();
    SyncPolicy.fill_3d(&mut volume, 0xFF, 0, 1, 1).unwrap();
}

#[test]
fn test_async_copies_between_pinned_and_device() {
    let mut staged = PinnedBuffer::<f32>::allocate(128).unwrap();
    fastrand::seed(40591);
    for v in staged.as_mut_slice() {
        *v = fastrand::f32();
    }
    let expected = staged.as_slice().to_vec();

    let mut device = DeviceBuffer::<f32>::allocate(128).unwrap();
    AsyncPolicy.copy(&mut device, &staged, 128).unwrap();
    let mut back = PinnedBuffer::<f32>::allocate(128).unwrap();
    AsyncPolicy.copy(&mut back, &device, 128).unwrap();
    assert_eq!(back.as_slice(), expected.as_slice());
}

#[test]
fn test_async_rectangle_copy() {
    let mut staged = PinnedBuffer::<u32, Pitched2D>::allocate_2d(5, 4).unwrap();
    for (i, v) in staged.as_mut_slice().iter_mut().enumerate() {
        *v = (i * i) as u32;
    }
    let mut grid = DeviceBuffer::<u32, Pitched2D>::allocate_2d(5, 4).unwrap();
    AsyncPolicy.copy_2d(&mut grid, &staged, 5, 4).unwrap();

    let mut back = PinnedBuffer::<u32, Pitched2D>::allocate_2d(5, 4).unwrap();
    AsyncPolicy.copy_2d(&mut back, &grid, 5, 4).unwrap();
    assert_eq!(back.as_slice(), staged.as_slice());
}

#[test]
fn test_async_volume_copy() {
    let mut staged = PinnedBuffer::<u8, Pitched3D>::allocate_3d(7, 3, 2).unwrap();
    fastrand::seed(66002);
    for v in staged.as_mut_slice() {
        *v = fastrand::u8(..);
    }
    let mut volume = DeviceBuffer::<u8, Pitched3D>::allocate_3d(7, 3, 2).unwrap();
    AsyncPolicy.copy_3d(&mut volume, &staged, 7, 3, 2).unwrap();

    let mut back = PinnedBuffer::<u8, Pitched3D>::allocate_3d(7, 3, 2).unwrap();
    AsyncPolicy.copy_3d(&mut back, &volume, 7, 3, 2).unwrap();
    assert_eq!(back.as_slice(), staged.as_slice());
}

#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
struct Sample {
    time: u32,
    level: f32,
}

#[test]
fn test_user_defined_elements_round_trip() {
    let mut src = HostBuffer::<Sample>::allocate(6).unwrap();
    for (i, s) in src.as_mut_slice().iter_mut().enumerate() {
        *s = Sample {
            time: i as u32,
            level: i as f32 * 0.5,
        };
    }
    let mut device = DeviceBuffer::<Sample>::allocate(6).unwrap();
    SyncPolicy.copy(&mut device, &src, 6).unwrap();

    let mut back = HostBuffer::<Sample>::allocate(6).unwrap();
    SyncPolicy.copy(&mut back, &device, 6).unwrap();
    assert_eq!(back.as_slice(), src.as_slice());
}
