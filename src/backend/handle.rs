use std::alloc::{self, Layout};
use std::ptr::NonNull;
use std::sync::Arc;

use crate::{
    backend::accel::memory::AccelMemory,
    device::Device,
    utils::{
        error::{BoxError, BoxResult},
        memory_tracker::MemoryTracker,
    },
};

/// Aligned, zero-initialised heap block owned by the CPU backend.
pub struct HostMemory {
    ptr: NonNull<u8>,
    layout: Layout,
    tracker: Arc<MemoryTracker>,
}

// The block is uniquely owned; shared access only hands out `&[u8]`.
unsafe impl Send for HostMemory {}
unsafe impl Sync for HostMemory {}

impl HostMemory {
    pub(crate) fn allocate(
        byte_size: usize,
        alignment: usize,
        tracker: Arc<MemoryTracker>,
    ) -> BoxResult<Self> {
        assert!(byte_size > 0, "zero-sized host blocks are represented as empty handles");

        let layout = Layout::from_size_align(byte_size, alignment).map_err(|e| {
            BoxError::OutOfMemory(format!(
                "Cannot lay out {} bytes aligned to {}: {}",
                byte_size, alignment, e
            ))
        })?;

        tracker.allocate(byte_size as u64)?;

        let raw = unsafe { alloc::alloc_zeroed(layout) };
        match NonNull::new(raw) {
            Some(ptr) => Ok(Self {
                ptr,
                layout,
                tracker,
            }),
            None => {
                tracker.deallocate(byte_size as u64);
                Err(BoxError::OutOfMemory(format!(
                    "Host allocator refused {} bytes",
                    byte_size
                )))
            }
        }
    }

    pub fn len(&self) -> usize {
        self.layout.size()
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.layout.size()) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.layout.size()) }
    }
}

impl Drop for HostMemory {
    fn drop(&mut self) {
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) };
        self.tracker.deallocate(self.layout.size() as u64);
    }
}

/// Host memory managed by someone else. Never freed by this crate.
pub struct BorrowedMemory {
    ptr: NonNull<u8>,
    len: usize,
}

// Whoever built the view vouched for the memory staying valid and unaliased.
unsafe impl Send for BorrowedMemory {}
unsafe impl Sync for BorrowedMemory {}

impl BorrowedMemory {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

pub enum RawBuffer {
    Empty,
    Host(HostMemory),
    Borrowed(BorrowedMemory),
    Accel(AccelMemory),
}

/// A backend allocation tagged with the device it lives on.
pub struct BufferHandle {
    device: Device,
    raw: RawBuffer,
}

impl BufferHandle {
    pub fn empty(device: Device) -> Self {
        Self {
            device,
            raw: RawBuffer::Empty,
        }
    }

    pub(crate) fn new(device: Device, raw: RawBuffer) -> Self {
        Self { device, raw }
    }

    /// Wrap external host memory without taking ownership.
    ///
    /// # Safety
    /// `ptr` must be valid for reads and writes of `len` bytes for as long as the
    /// handle (or anything built from it) is alive, and must not be accessed
    /// through other references meanwhile.
    pub unsafe fn borrow_raw(ptr: *mut u8, len: usize) -> BoxResult<Self> {
        if len == 0 {
            return Ok(Self::empty(Device::CPU));
        }
        let ptr = NonNull::new(ptr).ok_or_else(|| {
            BoxError::InvalidArgument("Cannot borrow a null host pointer".to_string())
        })?;
        Ok(Self {
            device: Device::CPU,
            raw: RawBuffer::Borrowed(BorrowedMemory { ptr, len }),
        })
    }

    /// Short-lived read-only host handle over `bytes`, used as a copy source.
    pub(crate) fn borrow_host(bytes: &[u8]) -> Self {
        match NonNull::new(bytes.as_ptr() as *mut u8) {
            Some(ptr) if !bytes.is_empty() => Self {
                device: Device::CPU,
                raw: RawBuffer::Borrowed(BorrowedMemory {
                    ptr,
                    len: bytes.len(),
                }),
            },
            _ => Self::empty(Device::CPU),
        }
    }

    /// Short-lived host handle over `bytes`, used as a copy destination.
    pub(crate) fn borrow_host_mut(bytes: &mut [u8]) -> Self {
        match NonNull::new(bytes.as_mut_ptr()) {
            Some(ptr) if !bytes.is_empty() => Self {
                device: Device::CPU,
                raw: RawBuffer::Borrowed(BorrowedMemory {
                    ptr,
                    len: bytes.len(),
                }),
            },
            _ => Self::empty(Device::CPU),
        }
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn raw(&self) -> &RawBuffer {
        &self.raw
    }

    pub fn raw_mut(&mut self) -> &mut RawBuffer {
        &mut self.raw
    }

    /// Drop whatever the handle holds, leaving it empty on the same device.
    pub(crate) fn release(&mut self) {
        self.raw = RawBuffer::Empty;
    }

    pub fn len(&self) -> usize {
        match &self.raw {
            RawBuffer::Empty => 0,
            RawBuffer::Host(m) => m.len(),
            RawBuffer::Borrowed(m) => m.len(),
            RawBuffer::Accel(m) => m.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.raw, RawBuffer::Empty)
    }

    pub fn is_owned(&self) -> bool {
        !matches!(self.raw, RawBuffer::Borrowed(_))
    }

    /// Host-addressable bytes, or `None` for device memory.
    pub fn host_bytes(&self) -> Option<&[u8]> {
        match &self.raw {
            RawBuffer::Empty if self.device.is_host() => Some(&[]),
            RawBuffer::Host(m) => Some(m.as_slice()),
            RawBuffer::Borrowed(m) => Some(m.as_slice()),
            _ => None,
        }
    }

    pub fn host_bytes_mut(&mut self) -> Option<&mut [u8]> {
        match &mut self.raw {
            RawBuffer::Empty if self.device.is_host() => Some(&mut []),
            RawBuffer::Host(m) => Some(m.as_mut_slice()),
            RawBuffer::Borrowed(m) => Some(m.as_mut_slice()),
            _ => None,
        }
    }
}

impl Default for BufferHandle {
    fn default() -> Self {
        Self::empty(Device::UNKNOWN)
    }
}

impl std::fmt::Debug for BufferHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.raw {
            RawBuffer::Empty => "empty",
            RawBuffer::Host(_) => "host",
            RawBuffer::Borrowed(_) => "borrowed",
            RawBuffer::Accel(_) => "accel",
        };
        f.debug_struct("BufferHandle")
            .field("device", &self.device)
            .field("kind", &kind)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_memory_is_zeroed_aligned_and_tracked() {
        let tracker = Arc::new(MemoryTracker::new(1024));
        let mem = HostMemory::allocate(100, 64, tracker.clone()).unwrap();
        assert_eq!(mem.len(), 100);
        assert!(mem.as_slice().iter().all(|&b| b == 0));
        assert_eq!(mem.as_slice().as_ptr() as usize % 64, 0);
        assert_eq!(tracker.get_current(), 100);
        drop(mem);
        assert_eq!(tracker.get_current(), 0);
    }

    #[test]
    fn host_memory_respects_tracker_limit() {
        let tracker = Arc::new(MemoryTracker::new(16));
        assert!(HostMemory::allocate(17, 8, tracker.clone()).is_err());
        assert_eq!(tracker.get_current(), 0);
    }

    #[test]
    fn borrowed_handle_is_not_owned() {
        let mut backing = vec![1u8, 2, 3];
        let handle =
            unsafe { BufferHandle::borrow_raw(backing.as_mut_ptr(), backing.len()) }.unwrap();
        assert!(!handle.is_owned());
        assert_eq!(handle.host_bytes(), Some(&[1u8, 2, 3][..]));
        drop(handle);
        assert_eq!(backing, vec![1, 2, 3]);
    }

    #[test]
    fn null_borrow_is_rejected() {
        let err = unsafe { BufferHandle::borrow_raw(std::ptr::null_mut(), 4) }.unwrap_err();
        assert_eq!(err.kind(), crate::utils::error::ErrorKind::InvalidArgument);
    }

    #[test]
    fn empty_cpu_handle_exposes_empty_slice() {
        let handle = BufferHandle::empty(Device::CPU);
        assert_eq!(handle.host_bytes(), Some(&[][..]));
        assert!(BufferHandle::default().host_bytes().is_none());
    }
}
