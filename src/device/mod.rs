use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum DeviceKind {
    #[default]
    Unknown,
    Cpu,
    Cuda,
    OpenCl,
    /// Vendor-generic accelerator, driven through Vulkan compute.
    Accel,
}

impl DeviceKind {
    pub const ALL: [DeviceKind; 4] = [
        DeviceKind::Cpu,
        DeviceKind::Cuda,
        DeviceKind::OpenCl,
        DeviceKind::Accel,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            DeviceKind::Unknown => "NONE",
            DeviceKind::Cpu => "CPU",
            DeviceKind::Cuda => "CUDA",
            DeviceKind::OpenCl => "OPENCL",
            DeviceKind::Accel => "ACCEL",
        }
    }

    /// Whether memory of this kind can be dereferenced from host code.
    pub const fn is_host(self) -> bool {
        matches!(self, DeviceKind::Cpu)
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// Where a box's bytes live: a backend kind plus the device index within it.
///
/// The index only distinguishes devices for non-CPU kinds; `Device::CPU` always uses 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Device {
    pub kind: DeviceKind,
    pub index: usize,
}

impl Device {
    pub const CPU: Device = Device {
        kind: DeviceKind::Cpu,
        index: 0,
    };

    pub const UNKNOWN: Device = Device {
        kind: DeviceKind::Unknown,
        index: 0,
    };

    pub const fn new(kind: DeviceKind, index: usize) -> Self {
        Self { kind, index }
    }

    pub const fn cuda(index: usize) -> Self {
        Self::new(DeviceKind::Cuda, index)
    }

    pub const fn opencl(index: usize) -> Self {
        Self::new(DeviceKind::OpenCl, index)
    }

    pub const fn accel(index: usize) -> Self {
        Self::new(DeviceKind::Accel, index)
    }

    pub fn is_cpu(&self) -> bool {
        matches!(self.kind, DeviceKind::Cpu)
    }

    pub fn is_host(&self) -> bool {
        self.kind.is_host()
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.index)
    }
}
