use std::{ffi::CString, ptr, sync::Arc};

use vulkanalia::{
    Device, Entry, Instance,
    loader::{LIBRARY, LibloadingLoader},
    vk::{self, DeviceV1_0, InstanceV1_0},
};

use crate::{
    backend::info::DeviceInfo,
    device::Device as BoxDevice,
    utils::{
        error::{BoxError, BoxResult},
        memory_tracker::MemoryTracker,
    },
};

/// One logical Vulkan device with a compute queue family.
pub struct AccelDevice {
    index: usize,
    device: Arc<Device>,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    queue_family_index: u32,
    info: DeviceInfo,
    memory_tracker: Arc<MemoryTracker>,
}

impl AccelDevice {
    unsafe fn new(
        instance: &Instance,
        physical_device: vk::PhysicalDevice,
        index: usize,
    ) -> BoxResult<Option<Self>> {
        unsafe {
            let Some(queue_family_index) = instance
                .get_physical_device_queue_family_properties(physical_device)
                .iter()
                .position(|props| props.queue_flags.contains(vk::QueueFlags::COMPUTE))
                .map(|i| i as u32)
            else {
                return Ok(None);
            };

            let queue_priorities = [1.0f32];
            let queue_info = vk::DeviceQueueCreateInfo {
                s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
                next: ptr::null(),
                flags: vk::DeviceQueueCreateFlags::empty(),
                queue_family_index,
                queue_count: 1,
                queue_priorities: queue_priorities.as_ptr(),
            };

            let device_features = vk::PhysicalDeviceFeatures::default();

            let device_create_info = vk::DeviceCreateInfo {
                s_type: vk::StructureType::DEVICE_CREATE_INFO,
                next: ptr::null(),
                flags: vk::DeviceCreateFlags::empty(),
                queue_create_info_count: 1,
                queue_create_infos: &queue_info,
                enabled_layer_count: 0,
                enabled_layer_names: ptr::null(),
                enabled_extension_count: 0,
                enabled_extension_names: ptr::null(),
                enabled_features: &device_features,
            };

            let device = instance.create_device(physical_device, &device_create_info, None)?;
            let memory_properties = instance.get_physical_device_memory_properties(physical_device);
            let properties = instance.get_physical_device_properties(physical_device);

            let total_memory = device_local_heap_size(&memory_properties);
            let info = describe(&properties, total_memory, queue_family_index, index);

            Ok(Some(Self {
                index,
                device: Arc::new(device),
                memory_properties,
                queue_family_index,
                info,
                memory_tracker: Arc::new(MemoryTracker::new(total_memory)),
            }))
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }

    pub fn memory_tracker(&self) -> &MemoryTracker {
        &self.memory_tracker
    }

    pub(crate) fn tracker_handle(&self) -> Arc<MemoryTracker> {
        self.memory_tracker.clone()
    }

    pub fn find_memory_type(
        &self,
        type_filter: u32,
        properties: vk::MemoryPropertyFlags,
    ) -> Option<u32> {
        (0..self.memory_properties.memory_type_count).find(|&i| {
            (type_filter & (1 << i)) != 0
                && self.memory_properties.memory_types[i as usize]
                    .property_flags
                    .contains(properties)
        })
    }
}

fn device_local_heap_size(memory_properties: &vk::PhysicalDeviceMemoryProperties) -> u64 {
    let heap_index = (0..memory_properties.memory_type_count)
        .find(|&i| {
            memory_properties.memory_types[i as usize]
                .property_flags
                .contains(vk::MemoryPropertyFlags::DEVICE_LOCAL)
        })
        .map(|i| memory_properties.memory_types[i as usize].heap_index)
        .unwrap_or(0);

    memory_properties.memory_heaps[heap_index as usize].size
}

fn format_version(version: u32) -> String {
    format!(
        "{}.{}.{}",
        version >> 22,
        (version >> 12) & 0x3ff,
        version & 0xfff
    )
}

fn vendor_name(vendor_id: u32) -> String {
    match vendor_id {
        0x1002 => "AMD".to_string(),
        0x10DE => "NVIDIA".to_string(),
        0x8086 => "Intel".to_string(),
        0x13B5 => "ARM".to_string(),
        0x5143 => "Qualcomm".to_string(),
        0x106B => "Apple".to_string(),
        0x10005 => "Mesa".to_string(),
        other => format!("0x{:04X}", other),
    }
}

fn describe(
    properties: &vk::PhysicalDeviceProperties,
    total_memory: u64,
    queue_family_index: u32,
    index: usize,
) -> DeviceInfo {
    let name = String::from_utf8_lossy(
        &properties
            .device_name
            .iter()
            .take_while(|&&c| c != 0)
            .map(|&c| c as u8)
            .collect::<Vec<u8>>(),
    )
    .to_string();

    let mut info = DeviceInfo::new(BoxDevice::accel(index), name);
    info.vendor = vendor_name(properties.vendor_id);
    info.version = format_version(properties.api_version);
    info.global_memory = total_memory;

    info.insert("device_type", format!("{:?}", properties.device_type));
    info.insert("driver_version", properties.driver_version);
    info.insert("device_id", format!("0x{:04X}", properties.device_id));
    info.insert("compute_queue_family", queue_family_index);
    info.insert(
        "max_workgroup_invocations",
        properties.limits.max_compute_work_group_invocations,
    );
    info.insert(
        "max_shared_memory_size",
        properties.limits.max_compute_shared_memory_size,
    );
    info.insert(
        "max_storage_buffer_range",
        properties.limits.max_storage_buffer_range,
    );
    info
}

/// Loaded Vulkan library, instance, and every compute-capable device.
pub struct VkRuntime {
    devices: Vec<AccelDevice>,
    instance: Instance,
    _entry: Entry,
}

// The instance and devices are only read after construction; buffer work is
// externally serialised per box.
unsafe impl Send for VkRuntime {}
unsafe impl Sync for VkRuntime {}

impl VkRuntime {
    pub fn new(application_name: &str) -> BoxResult<Self> {
        let aname = CString::new(application_name).map_err(|e| {
            BoxError::InvalidArgument(format!("Application name is not a C string: {}", e))
        })?;

        unsafe {
            let loader = LibloadingLoader::new(LIBRARY).map_err(|e| {
                BoxError::UnsupportedDevice(format!("Failed to load Vulkan library: {}", e))
            })?;
            let entry = Entry::new(loader).map_err(|e| {
                BoxError::UnsupportedDevice(format!("Failed to create Vulkan entry point: {}", e))
            })?;

            let appinfo = vk::ApplicationInfo {
                s_type: vk::StructureType::APPLICATION_INFO,
                next: ptr::null(),
                application_name: aname.as_ptr(),
                application_version: vk::make_version(0, 1, 0),
                engine_name: aname.as_ptr(),
                engine_version: vk::make_version(0, 1, 0),
                api_version: vk::make_version(1, 1, 0),
            };

            let create_info = vk::InstanceCreateInfo {
                s_type: vk::StructureType::INSTANCE_CREATE_INFO,
                next: ptr::null(),
                flags: vk::InstanceCreateFlags::empty(),
                application_info: &appinfo,
                enabled_layer_count: 0,
                enabled_layer_names: ptr::null(),
                enabled_extension_count: 0,
                enabled_extension_names: ptr::null(),
            };

            let instance = entry.create_instance(&create_info, None)?;

            let physical_devices = match instance.enumerate_physical_devices() {
                Ok(devices) => devices,
                Err(e) => {
                    instance.destroy_instance(None);
                    return Err(e.into());
                }
            };

            let mut devices: Vec<AccelDevice> = Vec::with_capacity(physical_devices.len());
            for physical_device in physical_devices {
                match AccelDevice::new(&instance, physical_device, devices.len()) {
                    Ok(Some(gpu)) => devices.push(gpu),
                    Ok(None) => {
                        tracing::debug!("skipping physical device without a compute queue");
                    }
                    Err(e) => {
                        tracing::warn!("failed to open physical device: {}", e);
                    }
                }
            }

            Ok(Self {
                devices,
                instance,
                _entry: entry,
            })
        }
    }

    pub fn devices(&self) -> &[AccelDevice] {
        &self.devices
    }

    pub fn get_device(&self, index: usize) -> Option<&AccelDevice> {
        self.devices.get(index)
    }
}

impl Drop for VkRuntime {
    fn drop(&mut self) {
        unsafe {
            for gpu in &self.devices {
                gpu.device.destroy_device(None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_fields() {
        let packed = (1u32 << 22) | (3 << 12) | 250;
        assert_eq!(format_version(packed), "1.3.250");
    }

    #[test]
    fn vendor_ids() {
        assert_eq!(vendor_name(0x10DE), "NVIDIA");
        assert_eq!(vendor_name(0x1234), "0x1234");
    }
}
