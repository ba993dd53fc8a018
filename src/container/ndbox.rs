use std::fmt;

use bytemuck::Pod;

use crate::{
    backend::{self, Backend, BufferHandle},
    container::{
        cursor::{Cursor, IndexIter, OffsetIter, ValueIter},
        layout::{self, Dims},
    },
    device::Device,
    element::{Element, ElementType, Scalar, scalar::convert_elements},
    utils::error::{BoxError, BoxResult},
};

/// Type-erased N-dimensional array whose bytes live on some device.
///
/// A box is either empty (no type, no device, no buffer) or bound by a
/// successful [`allocate`](NdBox::allocate). Binding is all-or-nothing: a
/// failed call leaves the previous state untouched.
pub struct NdBox {
    element_type: ElementType,
    device: Device,
    shape: Dims,
    strides: Dims,
    buffer: BufferHandle,
    capacity: usize,
    info: Vec<u8>,
    opaque: u64,
}

impl NdBox {
    pub fn new() -> Self {
        Self {
            element_type: ElementType::Unknown,
            device: Device::UNKNOWN,
            shape: Dims::scalar(),
            strides: Dims::scalar(),
            buffer: BufferHandle::default(),
            capacity: 0,
            info: Vec::new(),
            opaque: 0,
        }
    }

    /// Bind the box to `element_type` on `device` with `shape`.
    ///
    /// The new buffer is acquired before the old one is released, so on error
    /// the box keeps whatever it held before. Info bytes and the opaque value
    /// survive reallocation.
    pub fn allocate(
        &mut self,
        element_type: ElementType,
        device: Device,
        shape: &[usize],
    ) -> BoxResult<()> {
        let dims = Dims::new(shape)?;
        if !element_type.is_supported() {
            return Err(BoxError::InvalidArgument(format!(
                "Cannot allocate elements of type {}",
                element_type
            )));
        }

        let backend = backend::require(device.kind)?;
        let byte_size = layout::byte_size(shape, element_type.byte_width())?;

        let buffer = backend
            .allocate(byte_size, device.index)
            .inspect_err(|e| {
                tracing::warn!(
                    "allocate {} {:?} on {} failed: {}",
                    element_type,
                    shape,
                    device,
                    e
                )
            })?;

        self.release_buffer();
        self.element_type = element_type;
        self.device = device;
        self.shape = dims;
        self.strides = layout::contiguous_strides(&dims, element_type.byte_width());
        self.buffer = buffer;
        self.capacity = byte_size;

        tracing::debug!(
            ty = %element_type,
            device = %device,
            shape = ?shape,
            bytes = byte_size,
            "box allocated"
        );
        self.check_invariants();
        Ok(())
    }

    /// Change the shape, keeping type and device.
    ///
    /// The existing buffer is reused when the new footprint fits its capacity;
    /// otherwise a fresh zeroed buffer replaces it and prior contents are gone.
    pub fn resize(&mut self, shape: &[usize]) -> BoxResult<()> {
        self.require_bound("resize")?;
        let width = self.element_type.byte_width();
        let dims = Dims::new(shape)?;
        let byte_size = layout::byte_size(shape, width)?;

        if byte_size <= self.capacity {
            self.shape = dims;
            self.strides = layout::contiguous_strides(&dims, width);
            self.check_invariants();
            return Ok(());
        }

        let (element_type, device) = (self.element_type, self.device);
        self.allocate(element_type, device, shape)
    }

    /// Reinterpret the same elements under a new shape of equal element count.
    pub fn reshape(&mut self, shape: &[usize]) -> BoxResult<()> {
        self.require_bound("reshape")?;
        let dims = Dims::new(shape)?;
        let count = layout::element_count(shape)?;
        let byte_size = layout::byte_size(shape, self.element_type.byte_width())?;
        if count != self.size() || byte_size > self.capacity {
            return Err(BoxError::InvalidArgument(format!(
                "Cannot reshape {:?} into {:?}",
                self.shape, dims
            )));
        }
        self.shape = dims;
        self.strides = layout::contiguous_strides(&dims, self.element_type.byte_width());
        self.check_invariants();
        Ok(())
    }

    /// Release the buffer (if owned) and return to the empty state.
    pub fn clear(&mut self) {
        self.release_buffer();
        self.element_type = ElementType::Unknown;
        self.device = Device::UNKNOWN;
        self.shape = Dims::scalar();
        self.strides = Dims::scalar();
        self.buffer = BufferHandle::default();
        self.capacity = 0;
        self.info.clear();
        self.opaque = 0;
    }

    /// Move the contents out, leaving this box empty.
    pub fn take(&mut self) -> NdBox {
        std::mem::take(self)
    }

    fn release_buffer(&mut self) {
        if self.buffer.is_empty() {
            return;
        }

        if !self.buffer.is_owned() {
            self.buffer.release();
            return;
        }

        match backend::backend_for(self.buffer.device().kind) {
            Some(backend) => backend.deallocate(&mut self.buffer),
            None => panic!("owned buffer on {} has no backend", self.buffer.device()),
        }
    }

    fn check_invariants(&self) {
        assert_eq!(
            self.shape.rank(),
            self.strides.rank(),
            "shape and strides diverged"
        );
        assert!(
            self.byte_len() <= self.capacity,
            "{} bytes in use exceed capacity {}",
            self.byte_len(),
            self.capacity
        );
        assert!(self.buffer.len() <= self.capacity || !self.buffer.is_owned());
        debug_assert!(layout::is_contiguous(
            &self.shape,
            &self.strides,
            self.element_type.byte_width()
        ));
    }

    fn backend(&self) -> BoxResult<Backend> {
        backend::require(self.device.kind)
    }

    fn require_bound(&self, operation: &str) -> BoxResult<()> {
        if !self.is_bound() {
            return Err(BoxError::InvalidState(format!(
                "{} on an empty box",
                operation
            )));
        }
        Ok(())
    }

    fn require_host(&self, operation: &str) -> BoxResult<()> {
        self.require_bound(operation)?;
        if !self.device.is_host() {
            return Err(BoxError::InvalidState(format!(
                "{} needs host memory, box lives on {}",
                operation, self.device
            )));
        }
        Ok(())
    }

    fn require_type<T: Element>(&self, operation: &str) -> BoxResult<()> {
        if T::TYPE != self.element_type {
            return Err(BoxError::InvalidArgument(format!(
                "{} as {} on a box of {}",
                operation,
                T::TYPE,
                self.element_type
            )));
        }
        Ok(())
    }

    fn require_width<T>(&self, operation: &str) -> BoxResult<()> {
        let width = std::mem::size_of::<T>();
        if width != self.element_type.byte_width() {
            return Err(BoxError::InvalidArgument(format!(
                "{} with a {}-byte type on a box of {}",
                operation, width, self.element_type
            )));
        }
        Ok(())
    }

    // Accessors

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn is_bound(&self) -> bool {
        self.element_type != ElementType::Unknown
    }

    pub fn is_owned(&self) -> bool {
        self.buffer.is_owned()
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    /// Number of elements; 0 for an empty box, 1 for a bound scalar.
    pub fn size(&self) -> usize {
        if !self.is_bound() {
            return 0;
        }
        self.shape.volume()
    }

    pub fn dim(&self, axis: usize) -> Option<usize> {
        self.shape.get(axis).copied()
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Byte strides, one per dimension.
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes covered by the current shape.
    pub fn byte_len(&self) -> usize {
        self.size() * self.element_type.byte_width()
    }

    pub fn buffer(&self) -> &BufferHandle {
        &self.buffer
    }

    // Byte interchange

    /// Copy `bytes` into the start of the buffer.
    ///
    /// An empty box is first bound to a `UINT8` vector of matching length on the CPU.
    pub fn set_data(&mut self, bytes: &[u8]) -> BoxResult<()> {
        if !self.is_bound() {
            self.allocate(ElementType::UInt8, Device::CPU, &[bytes.len()])?;
        }

        if bytes.len() > self.capacity {
            return Err(BoxError::OutOfRange(format!(
                "{} bytes do not fit a capacity of {}",
                bytes.len(),
                self.capacity
            )));
        }

        let backend = self.backend()?;
        backend.set_bytes(&mut self.buffer, self.device.index, bytes)
    }

    /// Copy of the bytes covered by the current shape.
    pub fn get_data(&self) -> BoxResult<Vec<u8>> {
        self.require_bound("get_data")?;
        let mut out = vec![0u8; self.byte_len()];
        self.backend()?
            .get_bytes(&self.buffer, self.device.index, &mut out)?;
        Ok(out)
    }

    /// Buffer contents as text, for small byte-typed diagnostic payloads.
    pub fn get_data_string(&self) -> BoxResult<String> {
        self.require_host("get_data_string")?;
        if !self.element_type.is_byte() {
            return Err(BoxError::InvalidArgument(format!(
                "get_data_string on a box of {}",
                self.element_type
            )));
        }
        Ok(String::from_utf8_lossy(self.as_bytes()?).into_owned())
    }

    /// Host bytes covered by the current shape.
    pub fn as_bytes(&self) -> BoxResult<&[u8]> {
        self.require_host("as_bytes")?;
        let len = self.byte_len();
        self.buffer
            .host_bytes()
            .map(|b| &b[..len])
            .ok_or_else(|| BoxError::InvalidState("Host box without host memory".to_string()))
    }

    pub fn as_bytes_mut(&mut self) -> BoxResult<&mut [u8]> {
        self.require_host("as_bytes_mut")?;
        let len = self.byte_len();
        self.buffer
            .host_bytes_mut()
            .map(|b| &mut b[..len])
            .ok_or_else(|| BoxError::InvalidState("Host box without host memory".to_string()))
    }

    // Element access

    pub fn offset_of(&self, indices: &[usize]) -> BoxResult<usize> {
        self.require_bound("offset_of")?;
        layout::linear_offset(&self.shape, &self.strides, indices)
    }

    /// Reference to the element at `indices`.
    ///
    /// `T` must have the element type's byte width; the bytes are reinterpreted.
    pub fn at<T: Pod>(&self, indices: &[usize]) -> BoxResult<&T> {
        self.require_host("at")?;
        self.require_width::<T>("at")?;
        let offset = self.offset_of(indices)?;
        let bytes = &self.as_bytes()?[offset..offset + std::mem::size_of::<T>()];
        bytemuck::try_from_bytes(bytes)
            .map_err(|e| BoxError::InvalidState(format!("Element at {:?}: {}", indices, e)))
    }

    pub fn at_mut<T: Pod>(&mut self, indices: &[usize]) -> BoxResult<&mut T> {
        self.require_host("at_mut")?;
        self.require_width::<T>("at_mut")?;
        let offset = self.offset_of(indices)?;
        let width = std::mem::size_of::<T>();
        let bytes = &mut self.as_bytes_mut()?[offset..offset + width];
        bytemuck::try_from_bytes_mut(bytes)
            .map_err(|e| BoxError::InvalidState(format!("Element at {:?}: {}", indices, e)))
    }

    /// Reference to the element at `indices` without any validation.
    ///
    /// # Safety
    /// The box must be bound on a host device, `T` must be valid for the
    /// element type and suitably aligned at that offset, and every index
    /// must be within its dimension.
    pub unsafe fn at_unchecked<T: Pod>(&self, indices: &[usize]) -> &T {
        debug_assert!(self.device.is_host() && indices.len() == self.rank());
        let offset: usize = indices
            .iter()
            .zip(self.strides.iter())
            .map(|(i, s)| i * s)
            .sum();
        let base = match self.buffer.host_bytes() {
            Some(bytes) => bytes.as_ptr(),
            None => std::ptr::null(),
        };
        unsafe { &*(base.add(offset) as *const T) }
    }

    /// Element at `indices`, decoded by value. `T` must match the element type exactly.
    pub fn get<T: Element>(&self, indices: &[usize]) -> BoxResult<T> {
        self.require_host("get")?;
        self.require_type::<T>("get")?;
        let offset = self.offset_of(indices)?;
        let width = self.element_type.byte_width();
        Ok(T::read_ne(&self.as_bytes()?[offset..offset + width]))
    }

    pub fn set<T: Element>(&mut self, indices: &[usize], value: T) -> BoxResult<()> {
        self.require_host("set")?;
        self.require_type::<T>("set")?;
        let offset = self.offset_of(indices)?;
        let width = self.element_type.byte_width();
        value.write_ne(&mut self.as_bytes_mut()?[offset..offset + width]);
        Ok(())
    }

    /// Element at `indices` as a widened [`Scalar`], whatever the element type.
    pub fn get_scalar(&self, indices: &[usize]) -> BoxResult<Scalar> {
        self.require_host("get_scalar")?;
        let offset = self.offset_of(indices)?;
        let width = self.element_type.byte_width();
        Scalar::decode(self.element_type, &self.as_bytes()?[offset..offset + width])
            .ok_or_else(|| BoxError::InvalidState("Box has no element type".to_string()))
    }

    // Iteration

    /// Row-major byte offsets of every element. Empty for an unbound box.
    pub fn offsets(&self) -> OffsetIter<'_> {
        if !self.is_bound() {
            return OffsetIter::empty();
        }
        OffsetIter::new(self.shape, self.strides)
    }

    pub fn indices(&self) -> IndexIter<'_> {
        if !self.is_bound() {
            return IndexIter::empty();
        }
        IndexIter::new(self.shape)
    }

    /// Offsets into this box for every element of `target`, broadcasting size-1 dimensions.
    pub fn broadcast_offsets(&self, target: &[usize]) -> BoxResult<OffsetIter<'_>> {
        self.require_bound("broadcast_offsets")?;
        let target = Dims::new(target)?;
        layout::element_count(&target)?;
        match layout::broadcast_shape(&self.shape, &target) {
            Some(shape) if shape == target => Ok(OffsetIter::new(
                target,
                layout::broadcast_strides(&self.shape, &self.strides, &target),
            )),
            _ => Err(BoxError::InvalidArgument(format!(
                "Cannot broadcast {:?} to {:?}",
                self.shape, target
            ))),
        }
    }

    pub fn values<T: Element>(&self) -> BoxResult<ValueIter<'_, T>> {
        self.require_host("values")?;
        self.require_type::<T>("values")?;
        Ok(ValueIter::new(self.as_bytes()?, self.offsets()))
    }

    /// Byte offsets along `dim`, from `begin` up to (excluding) `end` by `step`.
    pub fn cursor(
        &self,
        dim: usize,
        begin: isize,
        end: Option<isize>,
        step: isize,
    ) -> BoxResult<Cursor<'_>> {
        self.require_bound("cursor")?;
        Cursor::new(self.shape, self.strides, 0, dim, begin, end, step)
    }

    // Copies

    /// A new box with the same type, shape and contents on `target`.
    ///
    /// The source backend performs the transfer when it can reach `target`;
    /// otherwise the target's backend is asked.
    pub fn device_copy(&self, target: Device) -> BoxResult<NdBox> {
        self.require_bound("device_copy")?;

        let mut out = NdBox::new();
        out.allocate(self.element_type, target, &self.shape)?;
        transfer(&self.buffer, &mut out.buffer, self.byte_len())?;

        out.info = self.info.clone();
        out.opaque = self.opaque;
        tracing::debug!(from = %self.device, to = %target, bytes = self.byte_len(), "box copied");
        Ok(out)
    }

    /// Deep copy on the same device.
    pub fn try_clone(&self) -> BoxResult<NdBox> {
        if !self.is_bound() {
            let mut out = NdBox::new();
            out.info = self.info.clone();
            out.opaque = self.opaque;
            return Ok(out);
        }
        self.device_copy(self.device)
    }

    /// Host copy with every element converted to `element_type`.
    pub fn cast(&self, element_type: ElementType) -> BoxResult<NdBox> {
        self.require_host("cast")?;

        let mut out = NdBox::new();
        out.allocate(element_type, self.device, &self.shape)?;
        let count = self.size();
        convert_elements(
            self.as_bytes()?,
            self.element_type,
            out.as_bytes_mut()?,
            element_type,
            count,
        );
        out.info = self.info.clone();
        out.opaque = self.opaque;
        Ok(out)
    }

    /// Overwrite this box's elements with `other`'s, converting types when they differ.
    ///
    /// Shapes may differ; element counts must not.
    pub fn assign_from(&mut self, other: &NdBox) -> BoxResult<()> {
        self.require_bound("assign_from")?;
        other.require_bound("assign_from")?;
        if self.size() != other.size() {
            return Err(BoxError::InvalidArgument(format!(
                "Cannot assign {} elements into {}",
                other.size(),
                self.size()
            )));
        }

        if self.element_type == other.element_type {
            return transfer(&other.buffer, &mut self.buffer, other.byte_len());
        }

        if !self.device.is_host() || !other.device.is_host() {
            return Err(BoxError::UnsupportedTransfer(format!(
                "Converting {} on {} into {} on {} needs host memory on both sides",
                other.element_type, other.device, self.element_type, self.device
            )));
        }

        let count = self.size();
        let dst_ty = self.element_type;
        convert_elements(
            other.as_bytes()?,
            other.element_type,
            self.as_bytes_mut()?,
            dst_ty,
            count,
        );
        Ok(())
    }

    // Construction helpers

    /// CPU box of `shape` holding `data` in row-major order.
    pub fn from_slice<T: Element>(shape: &[usize], data: &[T]) -> BoxResult<NdBox> {
        let count = layout::element_count(shape)?;
        if count != data.len() {
            return Err(BoxError::InvalidArgument(format!(
                "Shape {:?} holds {} elements, got {}",
                shape,
                count,
                data.len()
            )));
        }

        let mut out = NdBox::new();
        out.allocate(T::TYPE, Device::CPU, shape)?;
        let width = T::TYPE.byte_width();
        for (chunk, &value) in out.as_bytes_mut()?.chunks_exact_mut(width).zip(data) {
            value.write_ne(chunk);
        }
        Ok(out)
    }

    pub fn scalar<T: Element>(value: T) -> BoxResult<NdBox> {
        Self::from_slice(&[], &[value])
    }

    pub fn zeros(element_type: ElementType, device: Device, shape: &[usize]) -> BoxResult<NdBox> {
        let mut out = NdBox::new();
        out.allocate(element_type, device, shape)?;
        if !device.is_host() {
            let zeros = vec![0u8; out.byte_len()];
            out.set_data(&zeros)?;
        }
        Ok(out)
    }

    pub fn ones(element_type: ElementType, device: Device, shape: &[usize]) -> BoxResult<NdBox> {
        Self::full(1u8, element_type, device, shape)
    }

    /// Box of `shape` with every element set to `value`, converted to `element_type`.
    pub fn full<T: Element>(
        value: T,
        element_type: ElementType,
        device: Device,
        shape: &[usize],
    ) -> BoxResult<NdBox> {
        let mut out = NdBox::new();
        out.allocate(element_type, device, shape)?;
        out.fill(value)?;
        Ok(out)
    }

    /// Set every element to `value`, converted with `as` semantics.
    pub fn fill<T: Element>(&mut self, value: T) -> BoxResult<()> {
        self.require_bound("fill")?;
        let width = self.element_type.byte_width();

        let mut raw = vec![0u8; T::TYPE.byte_width()];
        value.write_ne(&mut raw);
        let mut encoded = vec![0u8; width];
        if let Some(scalar) = Scalar::decode(T::TYPE, &raw) {
            scalar.encode(self.element_type, &mut encoded);
        }

        if self.device.is_host() {
            for chunk in self.as_bytes_mut()?.chunks_exact_mut(width) {
                chunk.copy_from_slice(&encoded);
            }
            return Ok(());
        }

        let pattern = encoded.repeat(self.size());
        self.set_data(&pattern)
    }

    /// New box holding the elements picked by one `(begin, end, step)` range per dimension.
    ///
    /// Ranges follow [`cursor`](NdBox::cursor); trailing dimensions without a
    /// range are taken whole. The result lives on the same device.
    pub fn slice(&self, ranges: &[(isize, Option<isize>, isize)]) -> BoxResult<NdBox> {
        self.require_bound("slice")?;
        if ranges.len() > self.rank() {
            return Err(BoxError::InvalidArgument(format!(
                "{} slice ranges for rank {}",
                ranges.len(),
                self.rank()
            )));
        }

        if !self.device.is_host() {
            return self
                .device_copy(Device::CPU)?
                .slice(ranges)?
                .device_copy(self.device);
        }

        let mut picks: Vec<Vec<usize>> = Vec::with_capacity(self.rank());
        for dim in 0..self.rank() {
            let (begin, end, step) = ranges.get(dim).copied().unwrap_or((0, None, 1));
            picks.push(self.cursor(dim, begin, end, step)?.collect());
        }
        let shape: Vec<usize> = picks.iter().map(Vec::len).collect();

        let mut out = NdBox::new();
        out.allocate(self.element_type, Device::CPU, &shape)?;
        let out_shape = out.shape;
        let width = self.element_type.byte_width();
        let src = self.as_bytes()?;
        let dst = out.as_bytes_mut()?;
        for (index, chunk) in IndexIter::new(out_shape).zip(dst.chunks_exact_mut(width)) {
            let offset: usize = index.iter().zip(&picks).map(|(&i, pick)| pick[i]).sum();
            chunk.copy_from_slice(&src[offset..offset + width]);
        }
        Ok(out)
    }

    /// Non-owning CPU view over `len` bytes at `ptr`.
    ///
    /// # Safety
    /// `ptr` must stay valid for reads and writes of `len` bytes, and unaliased,
    /// for as long as the returned box (or anything derived from it) is alive.
    pub unsafe fn from_host_raw(
        ptr: *mut u8,
        len: usize,
        element_type: ElementType,
        shape: &[usize],
    ) -> BoxResult<NdBox> {
        let dims = Dims::new(shape)?;
        if !element_type.is_supported() {
            return Err(BoxError::InvalidArgument(format!(
                "Cannot view elements of type {}",
                element_type
            )));
        }
        let byte_size = layout::byte_size(shape, element_type.byte_width())?;
        if byte_size > len {
            return Err(BoxError::OutOfRange(format!(
                "Shape {:?} of {} needs {} bytes, view has {}",
                shape, element_type, byte_size, len
            )));
        }

        let buffer = unsafe { BufferHandle::borrow_raw(ptr, len) }?;
        let out = NdBox {
            element_type,
            device: Device::CPU,
            shape: dims,
            strides: layout::contiguous_strides(&dims, element_type.byte_width()),
            buffer,
            capacity: len,
            info: Vec::new(),
            opaque: 0,
        };
        out.check_invariants();
        Ok(out)
    }

    // User metadata

    pub fn info(&self) -> &[u8] {
        &self.info
    }

    pub fn set_info(&mut self, bytes: &[u8]) {
        self.info.clear();
        self.info.extend_from_slice(bytes);
    }

    pub fn opaque(&self) -> u64 {
        self.opaque
    }

    pub fn set_opaque(&mut self, value: u64) {
        self.opaque = value;
    }
}

/// Copy `byte_size` bytes between two handles through whichever backend can.
fn transfer(src: &BufferHandle, dst: &mut BufferHandle, byte_size: usize) -> BoxResult<()> {
    let source = backend::require(src.device().kind)?;
    match source.copy(src, dst, byte_size) {
        Err(e) if e.kind() == crate::utils::error::ErrorKind::UnsupportedTransfer => {
            let target = backend::require(dst.device().kind)?;
            target.copy(src, dst, byte_size)
        }
        other => other,
    }
}

impl Default for NdBox {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for NdBox {
    fn drop(&mut self) {
        self.release_buffer();
    }
}

impl fmt::Debug for NdBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NdBox")
            .field("element_type", &self.element_type)
            .field("device", &self.device)
            .field("shape", &self.shape)
            .field("strides", &self.strides)
            .field("capacity", &self.capacity)
            .field("owned", &self.is_owned())
            .finish()
    }
}
