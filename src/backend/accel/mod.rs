pub mod memory;
pub mod runtime;

use std::sync::OnceLock;

use crate::{
    backend::{
        BackendOps,
        handle::{BufferHandle, RawBuffer},
        info::DeviceInfo,
    },
    config::BackendConfig,
    device::{Device, DeviceKind},
    utils::error::{BoxError, BoxResult},
};

use memory::AccelMemory;
use runtime::{AccelDevice, VkRuntime};

/// Vendor-generic accelerator backend on top of Vulkan.
///
/// The loader is only touched on first use; a failed probe is cached and the
/// backend then reports itself unsupported.
pub struct AccelBackend {
    enabled: bool,
    application_name: String,
    runtime: OnceLock<Option<VkRuntime>>,
}

impl AccelBackend {
    pub fn new(config: &BackendConfig) -> Self {
        Self {
            enabled: config.accel_enabled,
            application_name: config.application_name.clone(),
            runtime: OnceLock::new(),
        }
    }

    pub fn runtime(&self) -> Option<&VkRuntime> {
        self.runtime
            .get_or_init(|| {
                if !self.enabled {
                    tracing::debug!("accel backend disabled by configuration");
                    return None;
                }

                match VkRuntime::new(&self.application_name) {
                    Ok(runtime) => {
                        tracing::info!(devices = runtime.devices().len(), "vulkan runtime ready");
                        for gpu in runtime.devices() {
                            tracing::info!(
                                index = gpu.index(),
                                name = %gpu.info().name,
                                memory = gpu.info().global_memory,
                                "accel device"
                            );
                        }
                        Some(runtime)
                    }
                    Err(e) => {
                        tracing::warn!("accel backend unavailable: {}", e);
                        None
                    }
                }
            })
            .as_ref()
    }

    fn gpu(&self, device_index: usize) -> BoxResult<&AccelDevice> {
        let runtime = self.runtime().ok_or_else(|| {
            BoxError::UnsupportedDevice("No Vulkan runtime available".to_string())
        })?;

        runtime.get_device(device_index).ok_or_else(|| {
            BoxError::UnsupportedDevice(format!(
                "ACCEL device index {} out of range ({} available)",
                device_index,
                runtime.devices().len()
            ))
        })
    }
}

impl BackendOps for AccelBackend {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Accel
    }

    fn is_supported(&self) -> bool {
        self.device_count() > 0
    }

    fn device_count(&self) -> usize {
        self.runtime().map_or(0, |r| r.devices().len())
    }

    fn device_info(&self, device_index: usize) -> BoxResult<DeviceInfo> {
        let gpu = self.gpu(device_index)?;
        let mut info = gpu.info().clone();
        info.insert("memory_in_use", gpu.memory_tracker().get_current());
        Ok(info)
    }

    fn allocate(&self, byte_size: usize, device_index: usize) -> BoxResult<BufferHandle> {
        let gpu = self.gpu(device_index)?;
        let device = Device::accel(device_index);

        if byte_size == 0 {
            return Ok(BufferHandle::empty(device));
        }

        let memory = AccelMemory::allocate(gpu, byte_size).inspect_err(|e| {
            tracing::warn!("accel allocation of {} bytes on {} refused: {}", byte_size, device, e)
        })?;

        tracing::debug!(bytes = byte_size, device = %device, "accel allocate");
        Ok(BufferHandle::new(device, RawBuffer::Accel(memory)))
    }

    fn deallocate(&self, handle: &mut BufferHandle) {
        if handle.is_empty() {
            return;
        }
        assert_eq!(
            handle.device().kind,
            DeviceKind::Accel,
            "buffer from {} released through the ACCEL backend",
            handle.device()
        );
        tracing::debug!(bytes = handle.len(), device = %handle.device(), "accel deallocate");
        handle.release();
    }

    fn copy(&self, src: &BufferHandle, dst: &mut BufferHandle, byte_size: usize) -> BoxResult<()> {
        let (src_device, dst_device) = (src.device(), dst.device());
        let reachable = |d: Device| d.kind == DeviceKind::Accel || d.is_host();

        if !(src_device.kind == DeviceKind::Accel || dst_device.kind == DeviceKind::Accel)
            || !reachable(src_device)
            || !reachable(dst_device)
        {
            return Err(BoxError::UnsupportedTransfer(format!(
                "ACCEL backend cannot copy {} -> {}",
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

        tracing::debug!(bytes = byte_size, from = %src_device, to = %dst_device, "accel copy");

        if let RawBuffer::Accel(from) = src.raw() {
            if let RawBuffer::Accel(to) = dst.raw_mut() {
                // No shared queue between devices; stage through host memory.
                let mut staging = vec![0u8; byte_size];
                from.read_into(0, &mut staging)?;
                return to.write_from(0, &staging);
            }

            let out = dst.host_bytes_mut().ok_or_else(|| {
                BoxError::InvalidState("Host handle without host memory".to_string())
            })?;
            return from.read_into(0, &mut out[..byte_size]);
        }

        let bytes = src.host_bytes().ok_or_else(|| {
            BoxError::InvalidState("Host handle without host memory".to_string())
        })?;
        match dst.raw_mut() {
            RawBuffer::Accel(to) => to.write_from(0, &bytes[..byte_size]),
            _ => Err(BoxError::InvalidState(format!(
                "{} handle without accelerator memory",
                dst_device
            ))),
        }
    }
}
