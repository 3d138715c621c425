//! Bit-level packing for report fields.
//!
//! Bits are laid out least significant first. A field narrower than a byte
//! shares its byte with the fields declared next to it:
//!
//! ```text
//! layout: flag a, flag b, bits(3) c, reserved(3)
//!
//! bit:    7 6 5 4 3 2 1 0
//!         0 0 0 c c c b a
//! ```
//!
//! [`BitWriter::align`] closes a partially filled byte; its remaining bits
//! stay zero.

use bytes::{BufMut, Bytes, BytesMut};

/// Packs values into a byte buffer, bit by bit.
#[derive(Debug, Default)]
pub struct BitWriter {
    buf: BytesMut,
    /// Bits already used in the last byte of `buf`; `0` when aligned.
    bit_offset: u8,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            bit_offset: 0,
        }
    }

    /// Append a whole byte, closing any partially filled byte first.
    pub fn put_u8(&mut self, value: u8) {
        self.align();
        self.buf.put_u8(value);
    }

    /// Append the low `width` bits of `value`.
    pub fn write_bits(&mut self, value: u64, width: u8) {
        let mut value = value;
        let mut remaining = width;

        while remaining > 0 {
            if self.bit_offset == 0 {
                self.buf.put_u8(0);
            }

            let free = 8 - self.bit_offset;
            let take = free.min(remaining);
            let chunk = (value & ((1u64 << take) - 1)) as u8;

            let last = self.buf.len() - 1;
            self.buf[last] |= chunk << self.bit_offset;

            self.bit_offset = (self.bit_offset + take) % 8;
            value = value.checked_shr(u32::from(take)).unwrap_or(0);
            remaining -= take;
        }
    }

    /// Move to the next byte boundary.
    pub fn align(&mut self) {
        self.bit_offset = 0;
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Reads values back out of a packed byte slice.
#[derive(Debug)]
pub struct BitReader<'a> {
    data: &'a [u8],
    /// Absolute bit position.
    pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Read the next `width` bits, or `None` if the slice is exhausted.
    pub fn read_bits(&mut self, width: u8) -> Option<u64> {
        let width = usize::from(width);
        if self.pos + width > self.data.len() * 8 {
            return None;
        }

        let mut value = 0u64;
        let mut filled = 0usize;

        while filled < width {
            let byte = self.data[self.pos / 8];
            let offset = self.pos % 8;
            let take = (8 - offset).min(width - filled);
            let chunk = (u64::from(byte) >> offset) & ((1u64 << take) - 1);

            value |= chunk << filled;
            filled += take;
            self.pos += take;
        }

        Some(value)
    }

    /// Skip to the next byte boundary.
    pub fn align(&mut self) {
        self.pos = self.pos.div_ceil(8) * 8;
    }

    /// Bytes touched so far, counting a partially read byte as consumed.
    pub fn consumed(&self) -> usize {
        self.pos.div_ceil(8)
    }
}
