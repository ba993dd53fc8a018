use std::{ptr, sync::Arc};

use vulkanalia::{Device, vk, vk::DeviceV1_0};

use crate::{
    backend::accel::runtime::AccelDevice,
    utils::{
        error::{BoxError, BoxResult},
        memory_tracker::MemoryTracker,
    },
};

/// A storage buffer bound to host-visible, host-coherent device memory.
pub struct AccelMemory {
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
    device: Arc<Device>,
    tracker: Arc<MemoryTracker>,
    device_index: usize,
}

// Vulkan handles are plain identifiers; every access goes through the owning `Device`.
unsafe impl Send for AccelMemory {}
unsafe impl Sync for AccelMemory {}

impl AccelMemory {
    pub(crate) fn allocate(gpu: &AccelDevice, byte_size: usize) -> BoxResult<Self> {
        let size = byte_size as vk::DeviceSize;
        gpu.memory_tracker().allocate(size)?;

        match unsafe { Self::create(gpu, size) } {
            Ok((buffer, memory)) => Ok(Self {
                buffer,
                memory,
                size,
                device: gpu.device().clone(),
                tracker: gpu.tracker_handle(),
                device_index: gpu.index(),
            }),
            Err(e) => {
                gpu.memory_tracker().deallocate(size);
                Err(e)
            }
        }
    }

    unsafe fn create(
        gpu: &AccelDevice,
        size: vk::DeviceSize,
    ) -> BoxResult<(vk::Buffer, vk::DeviceMemory)> {
        let device = gpu.device();

        let buffer_info = vk::BufferCreateInfo {
            s_type: vk::StructureType::BUFFER_CREATE_INFO,
            next: ptr::null(),
            flags: vk::BufferCreateFlags::empty(),
            size,
            usage: vk::BufferUsageFlags::STORAGE_BUFFER
                | vk::BufferUsageFlags::TRANSFER_SRC
                | vk::BufferUsageFlags::TRANSFER_DST,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            queue_family_index_count: 0,
            queue_family_indices: ptr::null(),
        };

        unsafe {
            let buffer = device.create_buffer(&buffer_info, None)?;
            let requirements = device.get_buffer_memory_requirements(buffer);

            let Some(memory_type_index) = gpu.find_memory_type(
                requirements.memory_type_bits,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            ) else {
                device.destroy_buffer(buffer, None);
                return Err(BoxError::UnsupportedDevice(format!(
                    "ACCEL:{} has no host-visible coherent memory type",
                    gpu.index()
                )));
            };

            let alloc_info = vk::MemoryAllocateInfo {
                s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
                next: ptr::null(),
                allocation_size: requirements.size,
                memory_type_index,
            };

            let memory = match device.allocate_memory(&alloc_info, None) {
                Ok(memory) => memory,
                Err(e) => {
                    device.destroy_buffer(buffer, None);
                    return Err(e.into());
                }
            };

            if let Err(e) = device.bind_buffer_memory(buffer, memory, 0) {
                device.destroy_buffer(buffer, None);
                device.free_memory(memory, None);
                return Err(e.into());
            }

            Ok((buffer, memory))
        }
    }

    pub fn len(&self) -> usize {
        self.size as usize
    }

    pub fn device_index(&self) -> usize {
        self.device_index
    }

    fn check_span(&self, offset: usize, len: usize) -> BoxResult<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.len() => Ok(()),
            _ => Err(BoxError::OutOfRange(format!(
                "Span {}..{} exceeds accelerator buffer of {} bytes",
                offset,
                offset.saturating_add(len),
                self.size
            ))),
        }
    }

    /// Copy host bytes into the buffer starting at `offset`.
    pub fn write_from(&mut self, offset: usize, data: &[u8]) -> BoxResult<()> {
        self.check_span(offset, data.len())?;
        if data.is_empty() {
            return Ok(());
        }

        unsafe {
            let data_ptr = self.device.map_memory(
                self.memory,
                offset as vk::DeviceSize,
                data.len() as vk::DeviceSize,
                vk::MemoryMapFlags::empty(),
            )? as *mut u8;

            ptr::copy_nonoverlapping(data.as_ptr(), data_ptr, data.len());

            self.device.unmap_memory(self.memory);
        }

        Ok(())
    }

    /// Copy bytes starting at `offset` out into `out`.
    pub fn read_into(&self, offset: usize, out: &mut [u8]) -> BoxResult<()> {
        self.check_span(offset, out.len())?;
        if out.is_empty() {
            return Ok(());
        }

        unsafe {
            let data_ptr = self.device.map_memory(
                self.memory,
                offset as vk::DeviceSize,
                out.len() as vk::DeviceSize,
                vk::MemoryMapFlags::empty(),
            )? as *const u8;

            ptr::copy_nonoverlapping(data_ptr, out.as_mut_ptr(), out.len());

            self.device.unmap_memory(self.memory);
        }

        Ok(())
    }
}

impl Drop for AccelMemory {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
        self.tracker.deallocate(self.size);
    }
}
