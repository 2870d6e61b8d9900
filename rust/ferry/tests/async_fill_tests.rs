use ferry::{AsyncPolicy, DeviceBuffer, HostBuffer, PinnedBuffer, Pitched2D, Pitched3D, SyncPolicy};

#[test]
fn test_pinned_fill_hands_storage_back_on_wait() {
    let mut buf = PinnedBuffer::<u32>::allocate(1024).unwrap();
    let handle = AsyncPolicy.fill(&mut buf, 0x3D, 1024).unwrap();
    handle.wait().unwrap();

    assert!(!buf.is_released());
    assert!(buf.as_slice().iter().all(|&v| v == 0x3D3D_3D3D));
}

#[test]
fn test_dropping_the_handle_completes_the_fill() {
    let mut buf = PinnedBuffer::<u8>::allocate(512).unwrap();
    {
        let _handle = AsyncPolicy.fill(&mut buf, 0x66, 512).unwrap();
    }
    assert!(buf.as_slice().iter().all(|&b| b == 0x66));
}

#[test]
fn test_fill_workers_return_the_original_storage() {
    let mut buf = PinnedBuffer::<u32>::allocate(16).unwrap();
    for (i, slot) in buf.as_mut_slice().iter_mut().enumerate() {
        *slot = i as u32;
    }
    let base = buf.as_ptr();

    AsyncPolicy.fill(&mut buf, 0x44, 4).unwrap().wait().unwrap();

    // Same allocation comes back, with the unfilled tail intact.
    assert_eq!(buf.as_ptr(), base);
    assert!(buf.as_slice()[..4].iter().all(|&v| v == 0x4444_4444));
    let tail: Vec<u32> = (4..16).collect();
    assert_eq!(&buf.as_slice()[4..], &tail[..]);
}

#[test]
fn test_device_fill_is_complete_on_return() {
    let mut buf = DeviceBuffer::<u32>::allocate(64).unwrap();
    let handle = AsyncPolicy.fill(&mut buf, 0xA5, 64).unwrap();
    assert!(handle.is_complete());
    handle.wait().unwrap();

    let mut host = HostBuffer::<u32>::allocate(64).unwrap();
    SyncPolicy.copy(&mut host, &buf, 64).unwrap();
    assert!(host.as_slice().iter().all(|&v| v == 0xA5A5_A5A5));
}

#[test]
fn test_zero_length_fill_completes_immediately() {
    let mut buf = PinnedBuffer::<u32>::allocate(16).unwrap();
    let handle = AsyncPolicy.fill(&mut buf, 0xEE, 0).unwrap();
    assert!(handle.is_complete());
    handle.wait().unwrap();
    assert!(buf.as_slice().iter().all(|&v| v == 0));
}

#[test]
fn test_partial_rectangle_fill() {
    let mut buf = PinnedBuffer::<u16, Pitched2D>::allocate_2d(8, 4).unwrap();
    AsyncPolicy.fill_2d(&mut buf, 0x9B, 5, 2).unwrap().wait().unwrap();

    let slice = buf.as_slice();
    for row in 0..4 {
        for col in 0..8 {
            let expected = if row < 2 && col < 5 { 0x9B9B } else { 0 };
            assert_eq!(slice[row * 8 + col], expected);
        }
    }
}

#[test]
fn test_partial_volume_fill() {
    let mut buf = PinnedBuffer::<u8, Pitched3D>::allocate_3d(6, 3, 3).unwrap();
    AsyncPolicy.fill_3d(&mut buf, 0xC1, 4, 2, 2).unwrap().wait().unwrap();

    let slice = buf.as_slice();
    let slab = 6 * 3;
    for z in 0..3 {
        for y in 0..3 {
            for x in 0..6 {
                let expected = if z < 2 && y < 2 && x < 4 { 0xC1 } else { 0 };
                assert_eq!(slice[z * slab + y * 6 + x], expected);
            }
        }
    }
}

#[test]
fn test_device_rectangle_fill_through_stream() {
    let mut grid = DeviceBuffer::<u32, Pitched2D>::allocate_2d(6, 5).unwrap();
    AsyncPolicy.fill_2d(&mut grid, 0x77, 6, 5).unwrap().wait().unwrap();

    let mut host = HostBuffer::<u32>::allocate(30).unwrap();
    SyncPolicy.copy_2d(&mut host, &grid, 6, 5).unwrap();
    assert!(host.as_slice().iter().all(|&v| v == 0x7777_7777));
}

#[test]
fn test_oversized_fill_is_rejected_before_spawning() {
    let mut buf = PinnedBuffer::<u32>::allocate(8).unwrap();
    assert!(AsyncPolicy.fill(&mut buf, 0xFF, 9).is_err());
    assert!(!buf.is_released());
    assert!(buf.as_slice().iter().all(|&v| v == 0));
}
