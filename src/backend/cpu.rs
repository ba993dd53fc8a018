use std::sync::Arc;

use crate::{
    backend::{
        BackendOps,
        handle::{BufferHandle, HostMemory, RawBuffer},
        info::DeviceInfo,
    },
    config::BackendConfig,
    device::{Device, DeviceKind},
    utils::{
        error::{BoxError, BoxResult},
        memory_tracker::MemoryTracker,
    },
};

/// Host memory backend. Exposes a single device, `CPU:0`.
pub struct CpuBackend {
    alignment: usize,
    tracker: Arc<MemoryTracker>,
}

impl CpuBackend {
    pub fn new(config: &BackendConfig) -> Self {
        let limit = config
            .cpu_memory_limit_bytes
            .unwrap_or_else(physical_memory_bytes);

        tracing::debug!(
            limit_bytes = limit,
            alignment = config.host_alignment,
            "cpu backend ready"
        );

        Self {
            alignment: config.host_alignment,
            tracker: Arc::new(MemoryTracker::new(limit)),
        }
    }

    pub fn memory_tracker(&self) -> &MemoryTracker {
        &self.tracker
    }

    fn check_index(&self, device_index: usize) -> BoxResult<()> {
        if device_index != 0 {
            return Err(BoxError::UnsupportedDevice(format!(
                "CPU backend has a single device, got index {}",
                device_index
            )));
        }
        Ok(())
    }
}

/// Total physical memory, or no limit when the host refuses to say.
fn physical_memory_bytes() -> u64 {
    match sys_info::mem_info() {
        Ok(mem) => mem.total.saturating_mul(1024),
        Err(e) => {
            tracing::warn!("could not read host memory size, CPU allocations are unbounded: {}", e);
            u64::MAX
        }
    }
}

impl BackendOps for CpuBackend {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Cpu
    }

    fn is_supported(&self) -> bool {
        true
    }

    fn device_count(&self) -> usize {
        1
    }

    fn device_info(&self, device_index: usize) -> BoxResult<DeviceInfo> {
        self.check_index(device_index)?;

        let mut info = DeviceInfo::new(Device::CPU, "Host CPU");
        info.global_memory = physical_memory_bytes();

        if let Ok(os) = sys_info::os_type() {
            info.vendor = os;
        }
        if let Ok(release) = sys_info::os_release() {
            info.version = release;
        }
        if let Ok(count) = sys_info::cpu_num() {
            info.insert("cpu_count", count);
        }
        if let Ok(speed) = sys_info::cpu_speed() {
            info.insert("cpu_speed_mhz", speed);
        }
        info.insert("alignment", self.alignment);
        info.insert("memory_limit", self.tracker.get_maximum());
        info.insert("memory_in_use", self.tracker.get_current());

        Ok(info)
    }

    fn allocate(&self, byte_size: usize, device_index: usize) -> BoxResult<BufferHandle> {
        self.check_index(device_index)?;

        if byte_size == 0 {
            return Ok(BufferHandle::empty(Device::CPU));
        }

        let memory = HostMemory::allocate(byte_size, self.alignment, self.tracker.clone())
            .inspect_err(|e| {
                tracing::warn!("cpu allocation of {} bytes refused: {}", byte_size, e)
            })?;

        tracing::debug!(bytes = byte_size, "cpu allocate");
        Ok(BufferHandle::new(Device::CPU, RawBuffer::Host(memory)))
    }

    fn deallocate(&self, handle: &mut BufferHandle) {
        if handle.is_empty() {
            return;
        }
        assert_eq!(
            handle.device().kind,
            DeviceKind::Cpu,
            "buffer from {} released through the CPU backend",
            handle.device()
        );
        tracing::debug!(bytes = handle.len(), "cpu deallocate");
        handle.release();
    }

    fn copy(&self, src: &BufferHandle, dst: &mut BufferHandle, byte_size: usize) -> BoxResult<()> {
        let (src_device, dst_device) = (src.device(), dst.device());
        if !src_device.is_cpu() || !dst_device.is_cpu() {
            return Err(BoxError::UnsupportedTransfer(format!(
                "CPU backend cannot copy {} -> {}",
                src_device, dst_device
            )));
        }

        if byte_size > src.len() || byte_size > dst.len() {
            return Err(BoxError::OutOfRange(format!(
                "Copy of {} bytes exceeds source ({}) or destination ({})",
                byte_size,
                src.len(),
                dst.len()
            )));
        }

        if byte_size == 0 {
            return Ok(());
        }

        let (Some(from), Some(to)) = (src.host_bytes(), dst.host_bytes_mut()) else {
            return Err(BoxError::InvalidState(
                "CPU handle without host memory".to_string(),
            ));
        };
        to[..byte_size].copy_from_slice(&from[..byte_size]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::ErrorKind;

    fn backend(limit: u64) -> CpuBackend {
        CpuBackend::new(&BackendConfig::default().with_cpu_memory_limit(limit))
    }

    #[test]
    fn single_device() {
        let cpu = backend(1024);
        assert!(cpu.is_supported());
        assert_eq!(cpu.device_count(), 1);
        assert_eq!(
            cpu.allocate(8, 1).unwrap_err().kind(),
            ErrorKind::UnsupportedDevice
        );
    }

    #[test]
    fn allocation_beyond_limit_is_out_of_memory() {
        let cpu = backend(64);
        let err = cpu.allocate(65, 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutOfMemory);
        assert_eq!(cpu.memory_tracker().get_current(), 0);
    }

    #[test]
    fn deallocate_is_idempotent() {
        let cpu = backend(64);
        let mut handle = cpu.allocate(32, 0).unwrap();
        assert_eq!(cpu.memory_tracker().get_current(), 32);
        cpu.deallocate(&mut handle);
        cpu.deallocate(&mut handle);
        assert!(handle.is_empty());
        assert_eq!(cpu.memory_tracker().get_current(), 0);
    }

    #[test]
    fn set_and_get_bytes() {
        let cpu = backend(64);
        let mut handle = cpu.allocate(4, 0).unwrap();
        cpu.set_bytes(&mut handle, 0, &[9, 8, 7, 6]).unwrap();
        let mut out = [0u8; 4];
        cpu.get_bytes(&handle, 0, &mut out).unwrap();
        assert_eq!(out, [9, 8, 7, 6]);
    }

    #[test]
    fn oversized_copy_is_out_of_range() {
        let cpu = backend(64);
        let mut handle = cpu.allocate(2, 0).unwrap();
        let err = cpu.set_bytes(&mut handle, 0, &[1, 2, 3]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutOfRange);
    }

    #[test]
    fn refuses_device_handles() {
        let cpu = backend(64);
        let src = cpu.allocate(4, 0).unwrap();
        let mut dst = BufferHandle::empty(Device::accel(0));
        let err = cpu.copy(&src, &mut dst, 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedTransfer);
    }

    #[test]
    fn info_reports_limit() {
        let cpu = backend(4096);
        let info = cpu.device_info(0).unwrap();
        assert_eq!(info.device, Device::CPU);
        assert_eq!(info.get("memory_limit"), Some("4096"));
    }
}
