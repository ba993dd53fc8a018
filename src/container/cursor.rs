//! Lazy traversals over a box's logical elements.
//!
//! Every iterator here borrows the box it came from, so none of them can
//! outlive a reallocation or `clear` of that box.

use std::marker::PhantomData;

use crate::{
    container::layout::{self, Dims, MAX_RANK},
    element::Element,
    utils::error::{BoxError, BoxResult},
};

/// Row-major byte offsets, last dimension fastest.
#[derive(Clone)]
pub struct OffsetIter<'a> {
    shape: Dims,
    strides: Dims,
    index: [usize; MAX_RANK],
    offset: usize,
    remaining: usize,
    total: usize,
    _source: PhantomData<&'a ()>,
}

impl<'a> OffsetIter<'a> {
    pub(crate) fn new(shape: Dims, strides: Dims) -> Self {
        assert_eq!(shape.rank(), strides.rank(), "shape and strides diverged");
        let total = shape.volume();
        Self {
            shape,
            strides,
            index: [0; MAX_RANK],
            offset: 0,
            remaining: total,
            total,
            _source: PhantomData,
        }
    }

    pub(crate) fn empty() -> Self {
        let mut it = Self::new(Dims::scalar(), Dims::scalar());
        it.remaining = 0;
        it.total = 0;
        it
    }

    /// Start over from the first element.
    pub fn reset(&mut self) {
        self.index = [0; MAX_RANK];
        self.offset = 0;
        self.remaining = self.total;
    }

    fn advance(&mut self) {
        for axis in (0..self.shape.rank()).rev() {
            self.index[axis] += 1;
            self.offset += self.strides[axis];
            if self.index[axis] < self.shape[axis] {
                return;
            }
            self.offset -= self.strides[axis] * self.shape[axis];
            self.index[axis] = 0;
        }
    }
}

impl Iterator for OffsetIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        let current = self.offset;
        self.remaining -= 1;
        if self.remaining > 0 {
            self.advance();
        }
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for OffsetIter<'_> {}

/// Row-major multi-indices.
#[derive(Clone)]
pub struct IndexIter<'a> {
    shape: Dims,
    next: usize,
    total: usize,
    _source: PhantomData<&'a ()>,
}

impl<'a> IndexIter<'a> {
    pub(crate) fn new(shape: Dims) -> Self {
        Self {
            shape,
            next: 0,
            total: shape.volume(),
            _source: PhantomData,
        }
    }

    pub(crate) fn empty() -> Self {
        Self {
            shape: Dims::scalar(),
            next: 0,
            total: 0,
            _source: PhantomData,
        }
    }

    pub fn reset(&mut self) {
        self.next = 0;
    }
}

impl Iterator for IndexIter<'_> {
    type Item = Dims;

    fn next(&mut self) -> Option<Dims> {
        if self.next >= self.total {
            return None;
        }
        let index = layout::unravel(self.next, &self.shape);
        self.next += 1;
        Some(index)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.total - self.next;
        (n, Some(n))
    }
}

impl ExactSizeIterator for IndexIter<'_> {}

/// Decoded elements of a host box, in row-major order.
#[derive(Clone)]
pub struct ValueIter<'a, T> {
    bytes: &'a [u8],
    offsets: OffsetIter<'a>,
    _element: PhantomData<T>,
}

impl<'a, T: Element> ValueIter<'a, T> {
    pub(crate) fn new(bytes: &'a [u8], offsets: OffsetIter<'a>) -> Self {
        Self {
            bytes,
            offsets,
            _element: PhantomData,
        }
    }

    pub fn reset(&mut self) {
        self.offsets.reset();
    }
}

impl<T: Element> Iterator for ValueIter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let offset = self.offsets.next()?;
        let width = T::TYPE.byte_width();
        Some(T::read_ne(&self.bytes[offset..offset + width]))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.offsets.size_hint()
    }
}

impl<T: Element> ExactSizeIterator for ValueIter<'_, T> {}

/// Byte offsets along a single dimension, with slicing and stepping.
///
/// `begin` and `end` may be negative to count from the end of the dimension.
/// `end` is exclusive; `None` runs to the edge in the direction of `step`.
#[derive(Clone, Debug)]
pub struct Cursor<'a> {
    shape: Dims,
    strides: Dims,
    base: usize,
    stride: usize,
    forward: bool,
    first: usize,
    count: usize,
    consumed: usize,
    _source: PhantomData<&'a ()>,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(
        shape: Dims,
        strides: Dims,
        base: usize,
        dim: usize,
        begin: isize,
        end: Option<isize>,
        step: isize,
    ) -> BoxResult<Self> {
        if step == 0 {
            return Err(BoxError::InvalidArgument(
                "Cursor step cannot be zero".to_string(),
            ));
        }
        if dim >= shape.rank() {
            return Err(BoxError::OutOfRange(format!(
                "Cursor dimension {} out of range for rank {}",
                dim,
                shape.rank()
            )));
        }

        let size = shape[dim];
        let out_of_range = || {
            BoxError::OutOfRange(format!(
                "Cursor bounds {}..{:?} invalid for dimension {} of size {}",
                begin, end, dim, size
            ))
        };

        let forward = step > 0;
        let first = match layout::normalize_index(begin, size) {
            Some(i) if i < size || (size == 0 && i == 0) => i,
            _ => return Err(out_of_range()),
        };

        // Exclusive bound, shifted by one so "before index 0" is representable.
        let stop = match end {
            Some(e) => layout::normalize_index(e, size).ok_or_else(out_of_range)? + 1,
            None if forward => size + 1,
            None => 0,
        };
        let start = first + 1;

        if (forward && stop < start) || (!forward && stop > start) {
            return Err(out_of_range());
        }

        let magnitude = step.unsigned_abs();
        let count = if size == 0 {
            0
        } else {
            start.abs_diff(stop).div_ceil(magnitude)
        };

        Ok(Self {
            shape,
            strides,
            base,
            stride: strides[dim].saturating_mul(magnitude),
            forward,
            first: base + first * strides[dim],
            count,
            consumed: 0,
            _source: PhantomData,
        })
    }

    /// A cursor over `dim` rooted at `offset`, typically one this cursor yielded.
    pub fn sub_cursor(
        &self,
        offset: usize,
        dim: usize,
        begin: isize,
        end: Option<isize>,
        step: isize,
    ) -> BoxResult<Cursor<'a>> {
        Cursor::new(self.shape, self.strides, offset, dim, begin, end, step)
    }

    /// Offset the cursor started from.
    pub fn base(&self) -> usize {
        self.base
    }

    pub fn reset(&mut self) {
        self.consumed = 0;
    }
}

impl Iterator for Cursor<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.consumed == self.count {
            return None;
        }
        let distance = self.consumed * self.stride;
        self.consumed += 1;
        if self.forward {
            Some(self.first + distance)
        } else {
            Some(self.first - distance)
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.count - self.consumed;
        (n, Some(n))
    }
}

impl ExactSizeIterator for Cursor<'_> {}
