use std::fmt;

use super::element::Element;
use super::element_type::ElementType;

/// A single decoded element, wide enough to hold any supported kind without loss.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Int(i128),
    Float(f64),
}

macro_rules! cast_scalar {
    ($s:expr, $t:ty) => {
        match $s {
            Scalar::Bool(b) => b as u8 as $t,
            Scalar::Int(i) => i as $t,
            Scalar::Float(f) => f as $t,
        }
    };
}

impl Scalar {
    /// Decode one element of kind `ty` from its native-endian bytes.
    ///
    /// Returns `None` for `ElementType::Unknown`.
    pub fn decode(ty: ElementType, bytes: &[u8]) -> Option<Scalar> {
        let s = match ty {
            ElementType::Unknown => return None,
            ElementType::Bool => Scalar::Bool(bool::read_ne(bytes)),
            ElementType::Int8 => Scalar::Int(i8::read_ne(bytes) as i128),
            ElementType::Int16 => Scalar::Int(i16::read_ne(bytes) as i128),
            ElementType::Int32 => Scalar::Int(i32::read_ne(bytes) as i128),
            ElementType::Int64 => Scalar::Int(i64::read_ne(bytes) as i128),
            ElementType::UInt8 => Scalar::Int(u8::read_ne(bytes) as i128),
            ElementType::UInt16 => Scalar::Int(u16::read_ne(bytes) as i128),
            ElementType::UInt32 => Scalar::Int(u32::read_ne(bytes) as i128),
            ElementType::UInt64 => Scalar::Int(u64::read_ne(bytes) as i128),
            ElementType::Float32 => Scalar::Float(f32::read_ne(bytes) as f64),
            ElementType::Float64 => Scalar::Float(f64::read_ne(bytes)),
        };
        Some(s)
    }

    /// Encode into `ty` with `as`-cast semantics (floats saturate into integers, bool is nonzero).
    pub fn encode(self, ty: ElementType, out: &mut [u8]) {
        match ty {
            ElementType::Unknown => {}
            ElementType::Bool => self.is_nonzero().write_ne(out),
            ElementType::Int8 => cast_scalar!(self, i8).write_ne(out),
            ElementType::Int16 => cast_scalar!(self, i16).write_ne(out),
            ElementType::Int32 => cast_scalar!(self, i32).write_ne(out),
            ElementType::Int64 => cast_scalar!(self, i64).write_ne(out),
            ElementType::UInt8 => cast_scalar!(self, u8).write_ne(out),
            ElementType::UInt16 => cast_scalar!(self, u16).write_ne(out),
            ElementType::UInt32 => cast_scalar!(self, u32).write_ne(out),
            ElementType::UInt64 => cast_scalar!(self, u64).write_ne(out),
            ElementType::Float32 => cast_scalar!(self, f32).write_ne(out),
            ElementType::Float64 => cast_scalar!(self, f64).write_ne(out),
        }
    }

    pub fn is_nonzero(self) -> bool {
        match self {
            Scalar::Bool(b) => b,
            Scalar::Int(i) => i != 0,
            Scalar::Float(f) => f != 0.0,
        }
    }

    /// Formatter that prints the value the way the original `ty` would print it.
    pub fn display_as(self, ty: ElementType) -> ScalarDisplay {
        ScalarDisplay { value: self, ty }
    }
}

pub struct ScalarDisplay {
    value: Scalar,
    ty: ElementType,
}

impl fmt::Display for ScalarDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.value, self.ty) {
            (Scalar::Float(v), ElementType::Float32) => write!(f, "{}", v as f32),
            (Scalar::Float(v), _) => write!(f, "{}", v),
            (Scalar::Int(v), _) => write!(f, "{}", v),
            (Scalar::Bool(v), _) => write!(f, "{}", v),
        }
    }
}

/// Convert `count` elements from `src` (of `src_ty`) into `dst` (of `dst_ty`).
///
/// Both slices must hold at least `count` elements of their kinds.
pub fn convert_elements(
    src: &[u8],
    src_ty: ElementType,
    dst: &mut [u8],
    dst_ty: ElementType,
    count: usize,
) {
    let sw = src_ty.byte_width();
    let dw = dst_ty.byte_width();
    assert!(sw > 0 && dw > 0, "cannot convert unknown element types");
    assert!(src.len() >= count * sw && dst.len() >= count * dw);

    if src_ty == dst_ty {
        dst[..count * dw].copy_from_slice(&src[..count * sw]);
        return;
    }

    for (s, d) in src
        .chunks_exact(sw)
        .zip(dst.chunks_exact_mut(dw))
        .take(count)
    {
        if let Some(value) = Scalar::decode(src_ty, s) {
            value.encode(dst_ty, d);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_of<T: Element>(v: T) -> Vec<u8> {
        let mut buf = vec![0u8; T::TYPE.byte_width()];
        v.write_ne(&mut buf);
        buf
    }

    #[test]
    fn decode_widens_integers() {
        let bytes = encode_of(u64::MAX);
        assert_eq!(
            Scalar::decode(ElementType::UInt64, &bytes),
            Some(Scalar::Int(u64::MAX as i128))
        );
        assert_eq!(Scalar::decode(ElementType::Unknown, &bytes), None);
    }

    #[test]
    fn float_to_int_saturates() {
        let mut out = [0u8; 1];
        Scalar::Float(1000.0).encode(ElementType::Int8, &mut out);
        assert_eq!(i8::read_ne(&out), i8::MAX);
    }

    #[test]
    fn bool_conversions() {
        let mut out = [0u8; 4];
        Scalar::Bool(true).encode(ElementType::Float32, &mut out);
        assert_eq!(f32::read_ne(&out), 1.0);

        let mut flag = [0u8; 1];
        Scalar::Float(-0.5).encode(ElementType::Bool, &mut flag);
        assert!(bool::read_ne(&flag));
    }

    #[test]
    fn convert_int32_to_float64() {
        let src: Vec<u8> = [1i32, -2, 3].iter().flat_map(|v| v.to_ne_bytes()).collect();
        let mut dst = vec![0u8; 3 * 8];
        convert_elements(&src, ElementType::Int32, &mut dst, ElementType::Float64, 3);
        let back: Vec<f64> = dst.chunks_exact(8).map(f64::read_ne).collect();
        assert_eq!(back, vec![1.0, -2.0, 3.0]);
    }

    #[test]
    fn float32_display_is_not_widened() {
        let s = Scalar::decode(ElementType::Float32, &encode_of(0.1f32)).unwrap();
        assert_eq!(s.display_as(ElementType::Float32).to_string(), "0.1");
    }
}
