use crate::{
    backend::{BackendOps, handle::BufferHandle, info::DeviceInfo},
    device::DeviceKind,
    utils::error::{BoxError, BoxResult},
};

/// Stand-in for a device kind this build carries no driver bindings for.
pub struct CompiledOutBackend {
    kind: DeviceKind,
}

impl CompiledOutBackend {
    pub const fn new(kind: DeviceKind) -> Self {
        Self { kind }
    }

    fn unsupported(&self) -> BoxError {
        BoxError::UnsupportedDevice(format!(
            "{} support is not compiled into this build",
            self.kind
        ))
    }
}

impl BackendOps for CompiledOutBackend {
    fn kind(&self) -> DeviceKind {
        self.kind
    }

    fn is_supported(&self) -> bool {
        false
    }

    fn device_count(&self) -> usize {
        0
    }

    fn device_info(&self, _device_index: usize) -> BoxResult<DeviceInfo> {
        Err(self.unsupported())
    }

    fn allocate(&self, _byte_size: usize, _device_index: usize) -> BoxResult<BufferHandle> {
        Err(self.unsupported())
    }

    fn deallocate(&self, handle: &mut BufferHandle) {
        // Nothing here can ever have been allocated; only empty handles arrive.
        assert!(
            handle.is_empty(),
            "{} backend asked to free a live buffer",
            self.kind
        );
    }

    fn copy(
        &self,
        _src: &BufferHandle,
        _dst: &mut BufferHandle,
        _byte_size: usize,
    ) -> BoxResult<()> {
        Err(self.unsupported())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{device::Device, utils::error::ErrorKind};

    #[test]
    fn everything_fails_unsupported() {
        let cuda = CompiledOutBackend::new(DeviceKind::Cuda);
        assert!(!cuda.is_supported());
        assert_eq!(cuda.device_count(), 0);
        assert_eq!(cuda.allocate(4, 0).unwrap_err().kind(), ErrorKind::UnsupportedDevice);
        assert_eq!(cuda.device_info(0).unwrap_err().kind(), ErrorKind::UnsupportedDevice);

        let src = BufferHandle::empty(Device::CPU);
        let mut dst = BufferHandle::empty(Device::cuda(0));
        assert_eq!(
            cuda.set_bytes(&mut dst, 0, &[]).unwrap_err().kind(),
            ErrorKind::UnsupportedDevice
        );
        assert_eq!(
            cuda.copy(&src, &mut dst, 0).unwrap_err().kind(),
            ErrorKind::UnsupportedDevice
        );

        cuda.deallocate(&mut dst);
    }
}
