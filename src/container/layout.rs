use std::{fmt, ops::Deref};

use crate::utils::error::{BoxError, BoxResult};

/// Highest rank a box can have.
pub const MAX_RANK: usize = 8;

/// Fixed-capacity dimension list. Entries past `len` are always zero.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Dims {
    len: usize,
    values: [usize; MAX_RANK],
}

impl Dims {
    pub const fn scalar() -> Self {
        Self {
            len: 0,
            values: [0; MAX_RANK],
        }
    }

    pub fn new(values: &[usize]) -> BoxResult<Self> {
        if values.len() > MAX_RANK {
            return Err(BoxError::InvalidArgument(format!(
                "Rank {} exceeds the maximum of {}",
                values.len(),
                MAX_RANK
            )));
        }
        let mut dims = Self::scalar();
        dims.len = values.len();
        dims.values[..values.len()].copy_from_slice(values);
        Ok(dims)
    }

    fn filled(len: usize, value: usize) -> Self {
        assert!(len <= MAX_RANK);
        let mut dims = Self::scalar();
        dims.len = len;
        dims.values[..len].fill(value);
        dims
    }

    pub fn rank(&self) -> usize {
        self.len
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.values[..self.len]
    }

    /// Element count of a shape that already passed [`element_count`] or [`byte_size`].
    pub(crate) fn volume(&self) -> usize {
        self.iter().product()
    }

    fn as_mut_slice(&mut self) -> &mut [usize] {
        &mut self.values[..self.len]
    }
}

impl Deref for Dims {
    type Target = [usize];

    fn deref(&self) -> &[usize] {
        self.as_slice()
    }
}

impl TryFrom<&[usize]> for Dims {
    type Error = BoxError;

    fn try_from(values: &[usize]) -> BoxResult<Self> {
        Self::new(values)
    }
}

impl fmt::Debug for Dims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Product of all dimensions; 1 for rank 0, 0 if any dimension is 0.
///
/// `InvalidArgument` when the product does not fit in a `usize`.
pub fn element_count(shape: &[usize]) -> BoxResult<usize> {
    shape
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| {
            BoxError::InvalidArgument(format!("Shape {:?} has too many elements", shape))
        })
}

/// Bytes needed for `shape` elements of `width` bytes, or `InvalidArgument` on overflow.
pub fn byte_size(shape: &[usize], width: usize) -> BoxResult<usize> {
    shape
        .iter()
        .try_fold(width, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| {
            BoxError::InvalidArgument(format!(
                "Shape {:?} of {}-byte elements overflows the address space",
                shape, width
            ))
        })
}

/// Row-major byte strides: the last dimension steps by `width`.
pub fn contiguous_strides(shape: &Dims, width: usize) -> Dims {
    let mut strides = Dims::filled(shape.rank(), width);
    for i in (0..shape.rank().saturating_sub(1)).rev() {
        strides.values[i] = strides.values[i + 1].saturating_mul(shape.values[i + 1]);
    }
    strides
}

pub fn is_contiguous(shape: &Dims, strides: &Dims, width: usize) -> bool {
    contiguous_strides(shape, width) == *strides
}

/// Byte offset of `indices`; rank 0 with no indices is offset 0.
pub fn linear_offset(shape: &[usize], strides: &[usize], indices: &[usize]) -> BoxResult<usize> {
    debug_assert_eq!(shape.len(), strides.len());

    if indices.len() != shape.len() {
        return Err(BoxError::OutOfRange(format!(
            "{} indices given for rank {}",
            indices.len(),
            shape.len()
        )));
    }

    let mut offset = 0;
    for (axis, ((&i, &dim), &stride)) in indices.iter().zip(shape).zip(strides).enumerate() {
        if i >= dim {
            return Err(BoxError::OutOfRange(format!(
                "Index {} out of bounds for dimension {} of size {}",
                i, axis, dim
            )));
        }
        offset += i * stride;
    }
    Ok(offset)
}

/// Row-major multi-index of the `linear`-th element of `shape`.
pub fn unravel(linear: usize, shape: &Dims) -> Dims {
    let mut index = Dims::filled(shape.rank(), 0);
    let mut rem = linear;
    for (slot, &dim) in index.as_mut_slice().iter_mut().zip(shape.iter()).rev() {
        if dim == 0 {
            break;
        }
        *slot = rem % dim;
        rem /= dim;
    }
    index
}

/// Shape both operands broadcast to, aligned from the trailing dimension.
pub fn broadcast_shape(a: &[usize], b: &[usize]) -> Option<Dims> {
    let rank = a.len().max(b.len());
    if rank > MAX_RANK {
        return None;
    }

    let mut out = Dims::filled(rank, 1);
    for i in 0..rank {
        let ai = *a.get(a.len().wrapping_sub(i + 1)).unwrap_or(&1);
        let bi = *b.get(b.len().wrapping_sub(i + 1)).unwrap_or(&1);
        if ai == bi || ai == 1 || bi == 1 {
            out.values[rank - 1 - i] = if ai == 1 { bi } else { ai };
        } else {
            return None;
        }
    }
    Some(out)
}

/// Strides that read a `src`-shaped layout as if it had shape `dst`.
///
/// Broadcast dimensions get stride 0. `dst` must be a valid broadcast target of `src`.
pub fn broadcast_strides(src: &Dims, src_strides: &Dims, dst: &Dims) -> Dims {
    let mut out = Dims::filled(dst.rank(), 0);
    let lead = dst.rank().saturating_sub(src.rank());
    for i in lead..dst.rank() {
        let dim = src.values[i - lead];
        out.values[i] = if dim == 1 { 0 } else { src_strides.values[i - lead] };
    }
    out
}

/// Resolve a possibly negative index against a dimension of size `dim`.
///
/// Negative values count from the end. Returns `None` when the result is outside `0..=dim`.
pub fn normalize_index(index: isize, dim: usize) -> Option<usize> {
    let abs = if index < 0 {
        (dim as isize).checked_add(index)?
    } else {
        index
    };
    usize::try_from(abs).ok().filter(|&i| i <= dim)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims(v: &[usize]) -> Dims {
        Dims::new(v).unwrap()
    }

    #[test]
    fn rank_limit() {
        assert!(Dims::new(&[1; MAX_RANK]).is_ok());
        let err = Dims::new(&[1; MAX_RANK + 1]).unwrap_err();
        assert_eq!(err.kind(), crate::utils::error::ErrorKind::InvalidArgument);
    }

    #[test]
    fn counts() {
        assert_eq!(element_count(&[]).unwrap(), 1);
        assert_eq!(element_count(&[2, 3, 4]).unwrap(), 24);
        assert_eq!(element_count(&[5, 0, 2]).unwrap(), 0);
        let err = element_count(&[usize::MAX, 2]).unwrap_err();
        assert_eq!(err.kind(), crate::utils::error::ErrorKind::InvalidArgument);
        assert!(byte_size(&[usize::MAX, 2], 1).is_err());
        assert_eq!(byte_size(&[2, 3], 4).unwrap(), 24);
    }

    #[test]
    fn strides_are_row_major_bytes() {
        assert_eq!(contiguous_strides(&dims(&[2, 3, 4]), 4).as_slice(), &[48, 16, 4]);
        assert_eq!(contiguous_strides(&Dims::scalar(), 8).rank(), 0);
    }

    #[test]
    fn offset_of_last_element_in_2x3() {
        let shape = dims(&[2, 3]);
        let strides = contiguous_strides(&shape, 4);
        assert_eq!(linear_offset(&shape, &strides, &[1, 2]).unwrap(), 20);
    }

    #[test]
    fn offset_errors() {
        let shape = dims(&[4]);
        let strides = contiguous_strides(&shape, 1);
        assert!(linear_offset(&shape, &strides, &[4]).is_err());
        assert!(linear_offset(&shape, &strides, &[]).is_err());
        assert_eq!(linear_offset(&[], &[], &[]).unwrap(), 0);
    }

    #[test]
    fn unravel_matches_offset() {
        let shape = dims(&[2, 3, 4]);
        let strides = contiguous_strides(&shape, 1);
        for linear in 0..24 {
            let idx = unravel(linear, &shape);
            assert_eq!(linear_offset(&shape, &strides, &idx).unwrap(), linear);
        }
    }

    #[test]
    fn broadcasting() {
        assert_eq!(broadcast_shape(&[3, 1], &[4]).unwrap().as_slice(), &[3, 4]);
        assert_eq!(broadcast_shape(&[], &[2, 2]).unwrap().as_slice(), &[2, 2]);
        assert!(broadcast_shape(&[3], &[4]).is_none());

        let src = dims(&[3, 1]);
        let src_strides = contiguous_strides(&src, 4);
        let bs = broadcast_strides(&src, &src_strides, &dims(&[2, 3, 5]));
        assert_eq!(bs.as_slice(), &[0, 4, 0]);
    }

    #[test]
    fn negative_indices() {
        assert_eq!(normalize_index(-1, 4), Some(3));
        assert_eq!(normalize_index(4, 4), Some(4));
        assert_eq!(normalize_index(5, 4), None);
        assert_eq!(normalize_index(-5, 4), None);
    }
}
