use ndbox::{Device, DeviceKind, ElementType, ErrorKind, NdBox, backend};

#[test]
fn compiled_out_backends_are_gated() {
    for kind in [DeviceKind::Cuda, DeviceKind::OpenCl] {
        let backend = backend::backend_for(kind).unwrap();
        assert!(!backend.is_supported());
        assert_eq!(backend.device_count(), 0);
        assert_eq!(
            backend.allocate(64, 0).unwrap_err().kind(),
            ErrorKind::UnsupportedDevice
        );
    }
}

#[test]
fn unsupported_device_leaves_box_empty() {
    let mut b = NdBox::new();
    let err = b
        .allocate(ElementType::Float32, Device::cuda(0), &[10])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedDevice);
    assert!(!b.is_bound());
    assert_eq!(b.size(), 0);
    assert_eq!(b.device(), Device::UNKNOWN);
}

#[test]
fn unknown_device_kind_is_unsupported() {
    let mut b = NdBox::new();
    let err = b
        .allocate(ElementType::Int8, Device::UNKNOWN, &[1])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedDevice);
}

#[test]
fn copy_to_missing_device_fails_cleanly() {
    let source = NdBox::from_slice(&[4], &[1.0f32, 2.0, 3.0, 4.0]).unwrap();
    let err = source.device_copy(Device::opencl(0)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedDevice);
    assert_eq!(source.values::<f32>().unwrap().sum::<f32>(), 10.0);
}

#[test]
fn cpu_rejects_other_indices() {
    let mut b = NdBox::new();
    let err = b
        .allocate(ElementType::UInt8, Device::new(DeviceKind::Cpu, 1), &[1])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedDevice);
}

#[test]
fn every_supported_backend_describes_its_devices() {
    for backend in backend::backends() {
        if !backend.is_supported() {
            assert_eq!(backend.device_count(), 0);
            continue;
        }
        for index in 0..backend.device_count() {
            let info = backend.device_info(index).unwrap();
            assert_eq!(info.device, Device::new(backend.kind(), index));
            assert!(!info.name.is_empty());
        }
    }
}

#[test]
fn accel_round_trip_when_present() {
    let accel = backend::backend_for(DeviceKind::Accel).unwrap();
    if !accel.is_supported() {
        let mut b = NdBox::new();
        let err = b
            .allocate(ElementType::Float32, Device::accel(0), &[8])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedDevice);
        return;
    }

    let data: Vec<f32> = (0..64).map(|i| i as f32 * 0.5).collect();
    let host = NdBox::from_slice(&[8, 8], &data).unwrap();

    let remote = host.device_copy(Device::accel(0)).unwrap();
    assert_eq!(remote.device(), Device::accel(0));
    assert_eq!(remote.shape(), &[8, 8]);
    assert_eq!(remote.at::<f32>(&[0, 0]).unwrap_err().kind(), ErrorKind::InvalidState);
    assert_eq!(remote.get_data().unwrap(), host.get_data().unwrap());

    let twin = remote.try_clone().unwrap();
    let back = twin.device_copy(Device::CPU).unwrap();
    assert_eq!(back.values::<f32>().unwrap().collect::<Vec<_>>(), data);

    let zeros = NdBox::zeros(ElementType::Int32, Device::accel(0), &[16]).unwrap();
    assert!(zeros.get_data().unwrap().iter().all(|&b| b == 0));
}
