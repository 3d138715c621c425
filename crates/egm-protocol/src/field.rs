use egm_core::constants::MAX_FIELD_BITS;

/// Semantic type of a report field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// Single boolean bit.
    Flag,
    /// Unsigned integer.
    Unsigned,
    /// Code of a [`crate::WireEnum`].
    Enumerated,
    /// Padding. Always encoded as zero and never surfaced as a value.
    Reserved,
}

/// Wire width of a field.
///
/// `Bits` fields pack into shared bytes, least significant bit first, in
/// declaration order. `Bytes` fields start on a byte boundary and are
/// little endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    Bits(u8),
    Bytes(u8),
}

/// One entry of a report's ordered layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub ty: FieldType,
    pub width: Width,
}

impl Field {
    pub const fn flag(name: &'static str) -> Self {
        Self {
            name,
            ty: FieldType::Flag,
            width: Width::Bits(1),
        }
    }

    pub const fn bits(name: &'static str, bits: u8) -> Self {
        Self {
            name,
            ty: FieldType::Unsigned,
            width: Width::Bits(bits),
        }
    }

    pub const fn enum_bits(name: &'static str, bits: u8) -> Self {
        Self {
            name,
            ty: FieldType::Enumerated,
            width: Width::Bits(bits),
        }
    }

    pub const fn enum_u8(name: &'static str) -> Self {
        Self {
            name,
            ty: FieldType::Enumerated,
            width: Width::Bytes(1),
        }
    }

    pub const fn u8(name: &'static str) -> Self {
        Self {
            name,
            ty: FieldType::Unsigned,
            width: Width::Bytes(1),
        }
    }

    pub const fn u16(name: &'static str) -> Self {
        Self {
            name,
            ty: FieldType::Unsigned,
            width: Width::Bytes(2),
        }
    }

    pub const fn u32(name: &'static str) -> Self {
        Self {
            name,
            ty: FieldType::Unsigned,
            width: Width::Bytes(4),
        }
    }

    pub const fn reserved(bits: u8) -> Self {
        Self {
            name: "reserved",
            ty: FieldType::Reserved,
            width: Width::Bits(bits),
        }
    }

    /// Width of the field in bits.
    #[inline]
    pub const fn bit_width(&self) -> u8 {
        match self.width {
            Width::Bits(n) => n,
            Width::Bytes(n) => n * 8,
        }
    }

    /// Returns `true` if the field starts on a byte boundary.
    #[inline]
    pub const fn is_byte_aligned(&self) -> bool {
        matches!(self.width, Width::Bytes(_))
    }

    /// Returns `true` for fields that carry a value (everything but padding).
    #[inline]
    pub const fn carries_value(&self) -> bool {
        !matches!(self.ty, FieldType::Reserved)
    }

    /// Mask selecting the low-order bits that fit the field.
    #[inline]
    pub const fn mask(&self) -> u64 {
        let width = self.bit_width();
        if width >= MAX_FIELD_BITS {
            u64::MAX
        } else {
            (1u64 << width) - 1
        }
    }

    /// Truncate `value` to the field width, keeping the low-order bits.
    #[inline]
    pub const fn truncate(&self, value: u64) -> u64 {
        value & self.mask()
    }
}

/// Number of fields in `layout` that carry a value.
pub fn value_count(layout: &[Field]) -> usize {
    layout.iter().filter(|f| f.carries_value()).count()
}
