pub mod accel;
pub mod compiled_out;
pub mod cpu;
pub mod handle;
pub mod info;

pub use accel::AccelBackend;
pub use compiled_out::CompiledOutBackend;
pub use cpu::CpuBackend;
pub use handle::BufferHandle;
pub use info::DeviceInfo;

use std::sync::OnceLock;

use crate::{
    config,
    device::DeviceKind,
    utils::error::{BoxError, BoxResult},
};

/// Capability contract every device kind implements.
///
/// All operations are synchronous. Probing methods are cheap after the first
/// call and safe to use from several threads.
pub trait BackendOps: Send + Sync {
    fn kind(&self) -> DeviceKind;

    fn is_supported(&self) -> bool;

    /// 0 whenever the backend is unsupported.
    fn device_count(&self) -> usize;

    fn device_info(&self, device_index: usize) -> BoxResult<DeviceInfo>;

    fn allocate(&self, byte_size: usize, device_index: usize) -> BoxResult<BufferHandle>;

    /// Release `handle`, leaving it empty. A no-op on empty handles.
    ///
    /// Panics if the handle belongs to another device kind.
    fn deallocate(&self, handle: &mut BufferHandle);

    /// Copy the first `byte_size` bytes of `src` into `dst`.
    fn copy(&self, src: &BufferHandle, dst: &mut BufferHandle, byte_size: usize) -> BoxResult<()>;

    fn set_bytes(
        &self,
        handle: &mut BufferHandle,
        device_index: usize,
        bytes: &[u8],
    ) -> BoxResult<()> {
        check_index(handle, device_index)?;
        let source = BufferHandle::borrow_host(bytes);
        self.copy(&source, handle, bytes.len())
    }

    fn get_bytes(
        &self,
        handle: &BufferHandle,
        device_index: usize,
        out: &mut [u8],
    ) -> BoxResult<()> {
        check_index(handle, device_index)?;
        let len = out.len();
        let mut target = BufferHandle::borrow_host_mut(out);
        self.copy(handle, &mut target, len)
    }
}

fn check_index(handle: &BufferHandle, device_index: usize) -> BoxResult<()> {
    if handle.device().index != device_index {
        return Err(BoxError::UnsupportedDevice(format!(
            "Handle lives on {} but device index {} was given",
            handle.device(),
            device_index
        )));
    }
    Ok(())
}

/// A process-wide backend instance, selected by device kind.
#[derive(Clone, Copy)]
pub enum Backend {
    Cpu(&'static CpuBackend),
    Accel(&'static AccelBackend),
    CompiledOut(&'static CompiledOutBackend),
}

static CPU: OnceLock<CpuBackend> = OnceLock::new();
static ACCEL: OnceLock<AccelBackend> = OnceLock::new();
static CUDA: CompiledOutBackend = CompiledOutBackend::new(DeviceKind::Cuda);
static OPENCL: CompiledOutBackend = CompiledOutBackend::new(DeviceKind::OpenCl);

/// The backend serving `kind`, or `None` for [`DeviceKind::Unknown`].
pub fn backend_for(kind: DeviceKind) -> Option<Backend> {
    match kind {
        DeviceKind::Cpu => Some(Backend::Cpu(
            CPU.get_or_init(|| CpuBackend::new(config::active())),
        )),
        DeviceKind::Accel => Some(Backend::Accel(
            ACCEL.get_or_init(|| AccelBackend::new(config::active())),
        )),
        DeviceKind::Cuda => Some(Backend::CompiledOut(&CUDA)),
        DeviceKind::OpenCl => Some(Backend::CompiledOut(&OPENCL)),
        DeviceKind::Unknown => None,
    }
}

/// Like [`backend_for`], failing with `UnsupportedDevice` for unknown kinds.
pub fn require(kind: DeviceKind) -> BoxResult<Backend> {
    backend_for(kind)
        .ok_or_else(|| BoxError::UnsupportedDevice(format!("No backend for device kind {}", kind)))
}

/// Every known backend, in [`DeviceKind::ALL`] order.
pub fn backends() -> impl Iterator<Item = Backend> {
    DeviceKind::ALL.into_iter().filter_map(backend_for)
}

impl Backend {
    pub fn kind(&self) -> DeviceKind {
        match self {
            Backend::Cpu(b) => b.kind(),
            Backend::Accel(b) => b.kind(),
            Backend::CompiledOut(b) => b.kind(),
        }
    }

    pub fn is_supported(&self) -> bool {
        match self {
            Backend::Cpu(b) => b.is_supported(),
            Backend::Accel(b) => b.is_supported(),
            Backend::CompiledOut(b) => b.is_supported(),
        }
    }

    pub fn device_count(&self) -> usize {
        match self {
            Backend::Cpu(b) => b.device_count(),
            Backend::Accel(b) => b.device_count(),
            Backend::CompiledOut(b) => b.device_count(),
        }
    }

    pub fn device_info(&self, device_index: usize) -> BoxResult<DeviceInfo> {
        match self {
            Backend::Cpu(b) => b.device_info(device_index),
            Backend::Accel(b) => b.device_info(device_index),
            Backend::CompiledOut(b) => b.device_info(device_index),
        }
    }

    pub fn allocate(&self, byte_size: usize, device_index: usize) -> BoxResult<BufferHandle> {
        match self {
            Backend::Cpu(b) => b.allocate(byte_size, device_index),
            Backend::Accel(b) => b.allocate(byte_size, device_index),
            Backend::CompiledOut(b) => b.allocate(byte_size, device_index),
        }
    }

    pub fn deallocate(&self, handle: &mut BufferHandle) {
        match self {
            Backend::Cpu(b) => b.deallocate(handle),
            Backend::Accel(b) => b.deallocate(handle),
            Backend::CompiledOut(b) => b.deallocate(handle),
        }
    }

    pub fn copy(
        &self,
        src: &BufferHandle,
        dst: &mut BufferHandle,
        byte_size: usize,
    ) -> BoxResult<()> {
        match self {
            Backend::Cpu(b) => b.copy(src, dst, byte_size),
            Backend::Accel(b) => b.copy(src, dst, byte_size),
            Backend::CompiledOut(b) => b.copy(src, dst, byte_size),
        }
    }

    pub fn set_bytes(
        &self,
        handle: &mut BufferHandle,
        device_index: usize,
        bytes: &[u8],
    ) -> BoxResult<()> {
        match self {
            Backend::Cpu(b) => b.set_bytes(handle, device_index, bytes),
            Backend::Accel(b) => b.set_bytes(handle, device_index, bytes),
            Backend::CompiledOut(b) => b.set_bytes(handle, device_index, bytes),
        }
    }

    pub fn get_bytes(
        &self,
        handle: &BufferHandle,
        device_index: usize,
        out: &mut [u8],
    ) -> BoxResult<()> {
        match self {
            Backend::Cpu(b) => b.get_bytes(handle, device_index, out),
            Backend::Accel(b) => b.get_bytes(handle, device_index, out),
            Backend::CompiledOut(b) => b.get_bytes(handle, device_index, out),
        }
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend").field("kind", &self.kind()).finish()
    }
}
