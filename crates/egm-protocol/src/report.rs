use crate::field::Field;
use egm_core::{Error, ReportId, Result};
use std::fmt;

/// A fixed-shape message tagged with a report id.
///
/// Implementors declare their wire layout in [`Report::LAYOUT`] and convert
/// between themselves and the ordered list of field values. Reserved fields
/// in the layout are skipped by both conversions.
///
/// # Example
///
/// ```
/// use egm_core::{ReportId, Result};
/// use egm_protocol::{Field, FieldCursor, FieldValues, Report, decode_as, encode};
///
/// #[derive(Debug, Clone, PartialEq)]
/// struct Motor {
///     run: bool,
///     limit: u16,
/// }
///
/// impl Report for Motor {
///     const ID: ReportId = ReportId::new(0x70);
///     const NAME: &'static str = "Motor";
///     const LAYOUT: &'static [Field] =
///         &[Field::flag("run"), Field::reserved(7), Field::u16("limit")];
///
///     fn write_fields(&self, out: &mut FieldValues) {
///         out.flag(self.run);
///         out.push(self.limit);
///     }
///
///     fn read_fields(fields: &mut FieldCursor<'_>) -> Result<Self> {
///         Ok(Self { run: fields.flag()?, limit: fields.u16()? })
///     }
/// }
///
/// let frame = encode(&Motor { run: true, limit: 300 }).unwrap();
/// assert_eq!(&frame[..], &[0x70, 0x01, 0x2C, 0x01]);
/// assert_eq!(decode_as::<Motor>(&frame).unwrap(), Motor { run: true, limit: 300 });
/// ```
pub trait Report: fmt::Debug + Clone + PartialEq + Send + Sync + 'static {
    const ID: ReportId;
    const NAME: &'static str;
    const LAYOUT: &'static [Field];

    fn write_fields(&self, out: &mut FieldValues);

    fn read_fields(fields: &mut FieldCursor<'_>) -> Result<Self>;
}

/// Enum carried on the wire as a numeric code.
pub trait WireEnum: Copy + Sized {
    fn to_code(self) -> u8;

    fn from_code(code: u8) -> Option<Self>;
}

/// Ordered field values produced by [`Report::write_fields`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FieldValues(Vec<u64>);

impl FieldValues {
    pub fn with_capacity(capacity: usize) -> Self {
        Self(Vec::with_capacity(capacity))
    }

    pub fn push(&mut self, value: impl Into<u64>) {
        self.0.push(value.into());
    }

    pub fn flag(&mut self, value: bool) {
        self.0.push(u64::from(value));
    }

    pub fn code<E: WireEnum>(&mut self, value: E) {
        self.0.push(u64::from(value.to_code()));
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Cursor over decoded field values, consumed by [`Report::read_fields`].
#[derive(Debug)]
pub struct FieldCursor<'a> {
    fields: std::slice::Iter<'a, (Field, u64)>,
}

impl<'a> FieldCursor<'a> {
    pub fn new(fields: &'a [(Field, u64)]) -> Self {
        Self {
            fields: fields.iter(),
        }
    }

    /// Next raw value with its field declaration.
    pub fn next_raw(&mut self) -> Result<(Field, u64)> {
        self.fields
            .next()
            .copied()
            .ok_or(Error::InvalidFieldValue {
                field: "<missing>",
                value: 0,
            })
    }

    pub fn flag(&mut self) -> Result<bool> {
        let (_, value) = self.next_raw()?;
        Ok(value != 0)
    }

    pub fn u8(&mut self) -> Result<u8> {
        let (field, value) = self.next_raw()?;
        u8::try_from(value).map_err(|_| Error::InvalidFieldValue {
            field: field.name,
            value,
        })
    }

    pub fn u16(&mut self) -> Result<u16> {
        let (field, value) = self.next_raw()?;
        u16::try_from(value).map_err(|_| Error::InvalidFieldValue {
            field: field.name,
            value,
        })
    }

    pub fn u32(&mut self) -> Result<u32> {
        let (field, value) = self.next_raw()?;
        u32::try_from(value).map_err(|_| Error::InvalidFieldValue {
            field: field.name,
            value,
        })
    }

    pub fn code<E: WireEnum>(&mut self) -> Result<E> {
        let (field, value) = self.next_raw()?;
        u8::try_from(value)
            .ok()
            .and_then(E::from_code)
            .ok_or(Error::InvalidFieldValue {
                field: field.name,
                value,
            })
    }
}
