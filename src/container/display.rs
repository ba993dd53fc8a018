use std::fmt;

use crate::element::Scalar;

use super::NdBox;

/// Runs longer than twice this are shown as their ends around `...`.
const EDGE_ITEMS: usize = 3;

fn shown(len: usize) -> impl Iterator<Item = Option<usize>> {
    let summarise = len > 2 * EDGE_ITEMS;
    (0..len).filter_map(move |i| {
        if !summarise || i < EDGE_ITEMS || i >= len - EDGE_ITEMS {
            Some(Some(i))
        } else if i == EDGE_ITEMS {
            Some(None)
        } else {
            None
        }
    })
}

struct Elements<'a> {
    bytes: &'a [u8],
    owner: &'a NdBox,
}

impl Elements<'_> {
    fn write(&self, f: &mut fmt::Formatter<'_>, linear: usize) -> fmt::Result {
        let ty = self.owner.element_type();
        let width = ty.byte_width();
        let start = linear * width;
        match Scalar::decode(ty, &self.bytes[start..start + width]) {
            Some(value) => write!(f, "{}", value.display_as(ty)),
            None => f.write_str("?"),
        }
    }

    fn write_row(&self, f: &mut fmt::Formatter<'_>, start: usize, len: usize) -> fmt::Result {
        for (n, item) in shown(len).enumerate() {
            if n > 0 {
                write!(f, ", ")?;
            }
            match item {
                Some(i) => self.write(f, start + i)?,
                None => f.write_str("...")?,
            }
        }
        Ok(())
    }
}

impl fmt::Display for NdBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_bound() {
            return write!(f, "box(empty)");
        }

        let bytes = match self.as_bytes() {
            Ok(bytes) => bytes,
            Err(_) => {
                return write!(
                    f,
                    "box(type={}, device={}, shape={:?})",
                    self.element_type(),
                    self.device(),
                    self.shape()
                );
            }
        };

        if self.size() == 0 {
            return write!(f, "box([], shape={:?})", self.shape());
        }

        let elements = Elements { bytes, owner: self };

        match self.rank() {
            0 => {
                write!(f, "box(")?;
                elements.write(f, 0)?;
                write!(f, ")")
            }
            1 => {
                write!(f, "box([")?;
                elements.write_row(f, 0, self.size())?;
                write!(f, "])")
            }
            2 => {
                let rows = self.shape()[0];
                let cols = self.shape()[1];
                writeln!(f, "box([")?;
                for row in shown(rows) {
                    match row {
                        Some(r) => {
                            write!(f, "  [")?;
                            elements.write_row(f, r * cols, cols)?;
                            write!(f, "]")?;
                            if r < rows - 1 {
                                writeln!(f, ",")?;
                            } else {
                                writeln!(f)?;
                            }
                        }
                        None => writeln!(f, "  ...,")?,
                    }
                }
                write!(f, "])")
            }
            _ => {
                let n = self.size();
                write!(f, "box(shape={:?}, data=[", self.shape())?;
                if n <= 3 {
                    for i in 0..n {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        elements.write(f, i)?;
                    }
                } else {
                    elements.write(f, 0)?;
                    write!(f, ", ")?;
                    elements.write(f, 1)?;
                    write!(f, ", ..., ")?;
                    elements.write(f, n - 1)?;
                }
                write!(f, "])")
            }
        }
    }
}
