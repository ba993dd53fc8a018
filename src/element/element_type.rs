use std::fmt;

/// Scalar element kinds a box can hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ElementType {
    #[default]
    Unknown,
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
}

impl ElementType {
    pub const ALL: [ElementType; 11] = [
        ElementType::Bool,
        ElementType::Int8,
        ElementType::Int16,
        ElementType::Int32,
        ElementType::Int64,
        ElementType::UInt8,
        ElementType::UInt16,
        ElementType::UInt32,
        ElementType::UInt64,
        ElementType::Float32,
        ElementType::Float64,
    ];

    /// Width of one element in bytes, 0 for `Unknown`.
    pub const fn byte_width(self) -> usize {
        match self {
            ElementType::Unknown => 0,
            ElementType::Bool | ElementType::Int8 | ElementType::UInt8 => 1,
            ElementType::Int16 | ElementType::UInt16 => 2,
            ElementType::Int32 | ElementType::UInt32 | ElementType::Float32 => 4,
            ElementType::Int64 | ElementType::UInt64 | ElementType::Float64 => 8,
        }
    }

    pub const fn is_supported(self) -> bool {
        !matches!(self, ElementType::Unknown)
    }

    pub const fn is_signed(self) -> bool {
        matches!(
            self,
            ElementType::Int8
                | ElementType::Int16
                | ElementType::Int32
                | ElementType::Int64
                | ElementType::Float32
                | ElementType::Float64
        )
    }

    pub const fn is_integer(self) -> bool {
        matches!(
            self,
            ElementType::Int8
                | ElementType::Int16
                | ElementType::Int32
                | ElementType::Int64
                | ElementType::UInt8
                | ElementType::UInt16
                | ElementType::UInt32
                | ElementType::UInt64
        )
    }

    pub const fn is_floating(self) -> bool {
        matches!(self, ElementType::Float32 | ElementType::Float64)
    }

    /// True for single-byte kinds whose buffers can be read back as text.
    pub const fn is_byte(self) -> bool {
        matches!(self, ElementType::Int8 | ElementType::UInt8)
    }

    pub const fn name(self) -> &'static str {
        match self {
            ElementType::Unknown => "NONE",
            ElementType::Bool => "BOOL",
            ElementType::Int8 => "INT8",
            ElementType::Int16 => "INT16",
            ElementType::Int32 => "INT32",
            ElementType::Int64 => "INT64",
            ElementType::UInt8 => "UINT8",
            ElementType::UInt16 => "UINT16",
            ElementType::UInt32 => "UINT32",
            ElementType::UInt64 => "UINT64",
            ElementType::Float32 => "FLOAT32",
            ElementType::Float64 => "FLOAT64",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}
