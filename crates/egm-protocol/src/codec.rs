//! Report encoding and decoding.
//!
//! # Wire layout
//!
//! ```text
//! byte 0      report id
//! byte 1..    fields, in declared order
//! ```
//!
//! - `Bits` fields are packed least significant bit first and share bytes
//!   with their neighbours.
//! - `Bytes` fields start on a byte boundary (a partial byte is closed with
//!   zero padding) and are little endian.
//! - Reserved fields are always zero.
//!
//! # Truncation
//!
//! A value wider than its field is truncated to the low-order bits. This is
//! a policy, not an error: a 1-bit field given `3` encodes as `1`.
//!
//! # Decoding
//!
//! [`decode_as`] decodes a known type; [`decode`] resolves the type from the
//! leading report id through a [`ReportTable`]. Both fail with a format error
//! on an empty frame, a foreign report id or too few bytes. Trailing bytes
//! past the declared length are ignored.

use crate::bits::{BitReader, BitWriter};
use crate::field::{Field, value_count};
use crate::report::{FieldCursor, FieldValues, Report};
use crate::table::{DecodedReport, ReportTable};
use bytes::Bytes;
use egm_core::constants::REPORT_ID_LEN;
use egm_core::{Error, ReportId, Result};
use tracing::trace;

/// Encoded length in bytes of a report with `layout`, report id included.
pub fn wire_len(layout: &[Field]) -> usize {
    let bits = layout.iter().fold(0usize, |bits, field| {
        let start = if field.is_byte_aligned() {
            bits.div_ceil(8) * 8
        } else {
            bits
        };
        start + usize::from(field.bit_width())
    });
    REPORT_ID_LEN + bits.div_ceil(8)
}

/// Encode a report into a frame.
///
/// # Errors
///
/// Returns `Error::FieldCountMismatch` if the report produced a different
/// number of values than its layout declares.
pub fn encode<R: Report>(report: &R) -> Result<Bytes> {
    let mut values = FieldValues::with_capacity(R::LAYOUT.len());
    report.write_fields(&mut values);

    let expected = value_count(R::LAYOUT);
    if values.len() != expected {
        return Err(Error::FieldCountMismatch {
            report: R::NAME,
            expected,
            actual: values.len(),
        });
    }

    let mut writer = BitWriter::with_capacity(wire_len(R::LAYOUT));
    writer.put_u8(R::ID.as_u8());

    let mut values = values.as_slice().iter();
    for field in R::LAYOUT {
        if field.is_byte_aligned() {
            writer.align();
        }

        let raw = if field.carries_value() {
            values.next().copied().unwrap_or_default()
        } else {
            0
        };
        let value = field.truncate(raw);
        if value != raw {
            trace!(
                report = R::NAME,
                field = field.name,
                raw,
                value,
                "Truncated field value to declared width"
            );
        }
        writer.write_bits(value, field.bit_width());
    }

    Ok(writer.finish())
}

/// Decode a frame known to carry report `R`.
///
/// # Errors
///
/// Returns a format error if the frame is empty, carries another report id,
/// is shorter than `R`'s layout, or holds an out-of-range enumerated code.
pub fn decode_as<R: Report>(frame: &[u8]) -> Result<R> {
    let id = leading_id(frame)?;
    if id != R::ID {
        return Err(Error::ReportIdMismatch {
            expected: R::ID,
            actual: id,
        });
    }

    let fields = read_values(&frame[REPORT_ID_LEN..], R::LAYOUT, R::NAME)?;
    R::read_fields(&mut FieldCursor::new(&fields))
}

/// Decode a frame, resolving its type from the leading report id.
///
/// # Errors
///
/// Returns `Error::UnknownReportId` if `table` has no type for the id, or
/// any error of [`decode_as`].
pub fn decode(frame: &[u8], table: &ReportTable) -> Result<DecodedReport> {
    table.decode(frame)
}

/// Read the report id of a frame.
pub fn leading_id(frame: &[u8]) -> Result<ReportId> {
    frame
        .first()
        .copied()
        .map(ReportId::new)
        .ok_or(Error::EmptyFrame)
}

fn read_values(payload: &[u8], layout: &[Field], name: &'static str) -> Result<Vec<(Field, u64)>> {
    let needed = wire_len(layout) - REPORT_ID_LEN;
    if payload.len() < needed {
        return Err(Error::Truncated {
            report: name,
            needed: needed + REPORT_ID_LEN,
            available: payload.len() + REPORT_ID_LEN,
        });
    }

    let mut reader = BitReader::new(payload);
    let mut fields = Vec::with_capacity(layout.len());

    for field in layout {
        if field.is_byte_aligned() {
            reader.align();
        }
        let value = reader
            .read_bits(field.bit_width())
            .ok_or(Error::Truncated {
                report: name,
                needed: needed + REPORT_ID_LEN,
                available: payload.len() + REPORT_ID_LEN,
            })?;
        if field.carries_value() {
            fields.push((*field, value));
        }
    }

    if payload.len() > reader.consumed() {
        trace!(
            report = name,
            trailing = payload.len() - reader.consumed(),
            "Ignoring trailing bytes"
        );
    }

    Ok(fields)
}
