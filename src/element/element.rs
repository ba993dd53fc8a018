use std::fmt;

use super::element_type::ElementType;

mod private {
    pub trait Sealed {}
}

/// Rust types that map one-to-one onto an [`ElementType`].
///
/// Sealed: the set of element kinds is closed, so is the set of implementors.
pub trait Element: Copy + fmt::Debug + PartialEq + Send + Sync + 'static + private::Sealed {
    const TYPE: ElementType;

    /// Decode from exactly `TYPE.byte_width()` native-endian bytes.
    fn read_ne(bytes: &[u8]) -> Self;

    /// Encode into exactly `TYPE.byte_width()` native-endian bytes.
    fn write_ne(self, out: &mut [u8]);
}

macro_rules! impl_element {
    ($t:ty, $variant:ident) => {
        impl private::Sealed for $t {}

        impl Element for $t {
            const TYPE: ElementType = ElementType::$variant;

            #[inline]
            fn read_ne(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$t>()];
                raw.copy_from_slice(bytes);
                <$t>::from_ne_bytes(raw)
            }

            #[inline]
            fn write_ne(self, out: &mut [u8]) {
                out.copy_from_slice(&self.to_ne_bytes());
            }
        }
    };
}

impl_element!(i8, Int8);
impl_element!(i16, Int16);
impl_element!(i32, Int32);
impl_element!(i64, Int64);
impl_element!(u8, UInt8);
impl_element!(u16, UInt16);
impl_element!(u32, UInt32);
impl_element!(u64, UInt64);
impl_element!(f32, Float32);
impl_element!(f64, Float64);

impl private::Sealed for bool {}

// Any nonzero byte reads as true so foreign buffers never produce an invalid bool
impl Element for bool {
    const TYPE: ElementType = ElementType::Bool;

    #[inline]
    fn read_ne(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }

    #[inline]
    fn write_ne(self, out: &mut [u8]) {
        out[0] = self as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<T: Element>(v: T) {
        let mut buf = vec![0u8; T::TYPE.byte_width()];
        v.write_ne(&mut buf);
        assert_eq!(T::read_ne(&buf), v);
    }

    #[test]
    fn widths_match_rust_types() {
        assert_eq!(<i16 as Element>::TYPE.byte_width(), std::mem::size_of::<i16>());
        assert_eq!(<f64 as Element>::TYPE.byte_width(), std::mem::size_of::<f64>());
        assert_eq!(<bool as Element>::TYPE.byte_width(), 1);
    }

    #[test]
    fn encode_decode() {
        roundtrip(-7i8);
        roundtrip(u64::MAX);
        roundtrip(-1.25f32);
        roundtrip(true);
    }

    #[test]
    fn nonzero_byte_is_true() {
        assert!(bool::read_ne(&[2]));
        assert!(!bool::read_ne(&[0]));
    }
}
