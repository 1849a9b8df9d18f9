//! Bit-level access to vehicle-state payloads.
//!
//! Fields are packed MSB-first with no byte alignment. Reads past the end are
//! clamped to whatever is left, so a truncated payload still decodes to a
//! deterministic (partial) value instead of failing.

/// Reads variable-width big-endian bit fields from a byte slice.
#[derive(Debug, Clone)]
pub struct BitCursor<'a> {
    data: &'a [u8],
    /// Byte holding the next unread bit.
    byte_offset: usize,
    /// Bits of `data[byte_offset]` already consumed (0..8).
    bits_into: u32,
    /// Next bits of the stream, left-aligned.
    buffer: u32,
    /// Valid bits in `buffer`.
    buffer_used: u32,
}

impl<'a> BitCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte_offset: 0,
            bits_into: 0,
            buffer: 0,
            buffer_used: 0,
        }
    }

    /// Bit position of the cursor from the start of the data.
    #[inline]
    pub fn tell(&self) -> usize {
        self.byte_offset * 8 + self.bits_into as usize
    }

    /// Bits left to read.
    #[inline]
    pub fn bits_remaining(&self) -> usize {
        self.data.len() * 8 - self.tell()
    }

    /// Read up to 32 bits as an unsigned big-endian value.
    ///
    /// When fewer than `count` bits are left the read is clamped to what is
    /// available; the result then holds only those bits.
    pub fn read_bits(&mut self, count: u32) -> u32 {
        let count = count.min(32).min(self.bits_remaining() as u32);
        if count == 0 {
            return 0;
        }

        if self.buffer_used < count {
            self.fill();
        }

        let bits = self.buffer.checked_shr(32 - count).unwrap_or(0);
        self.buffer = self.buffer.checked_shl(count).unwrap_or(0);
        self.buffer_used -= count;

        let advanced = self.bits_into + count;
        self.byte_offset += (advanced / 8) as usize;
        self.bits_into = advanced % 8;

        bits
    }

    #[inline]
    pub fn read_bit(&mut self) -> bool {
        self.read_bits(1) != 0
    }

    /// Inspect the next bit without consuming it. `false` at end of data.
    pub fn peek_bit(&self) -> bool {
        match self.data.get(self.byte_offset) {
            Some(byte) => (byte >> (7 - self.bits_into)) & 1 == 1,
            None => false,
        }
    }

    /// Reload the lookahead buffer with the next 32 bits of the stream.
    fn fill(&mut self) {
        let mut window = 0u64;
        for i in 0..5 {
            let byte = self.data.get(self.byte_offset + i).copied().unwrap_or(0);
            window = (window << 8) | byte as u64;
        }
        // 40 bits starting at byte_offset; drop the consumed ones and keep 32.
        self.buffer = ((window << (24 + self.bits_into)) >> 32) as u32;
        self.buffer_used = self.bits_remaining().min(32) as u32;
    }
}

/// Packs big-endian bit fields into bytes. The last byte is zero-padded.
#[derive(Debug, Default, Clone)]
pub struct BitWriter {
    bytes: Vec<u8>,
    bit_len: usize,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write the low `count` bits of `value` (count clamped to 32).
    pub fn write_bits(&mut self, count: u32, value: u32) {
        let count = count.min(32);
        for i in (0..count).rev() {
            let bit = (value >> i) & 1;
            if self.bit_len % 8 == 0 {
                self.bytes.push(0);
            }
            if bit == 1 {
                let last = self.bytes.len() - 1;
                self.bytes[last] |= 0x80 >> (self.bit_len % 8);
            }
            self.bit_len += 1;
        }
    }

    pub fn write_bit(&mut self, bit: bool) {
        self.write_bits(1, bit as u32);
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// How the escape bit of a quantized float is taken from the stream.
///
/// Two client revisions disagree: one consumes the extra bit, the other only
/// looks at it and leaves it for the next field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EscapeBit {
    #[default]
    Consume,
    Peek,
}

/// A quantized float field: `numBits` raw bits with an escape above
/// `max_value`, scaled by `(raw + add1) * mul1 + add2`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantizedFloat {
    pub bits: u32,
    pub max_value: u32,
    pub add1: f64,
    pub mul1: f64,
    pub add2: f64,
}

impl QuantizedFloat {
    pub const fn new(bits: u32, max_value: u32, add1: f64, mul1: f64, add2: f64) -> Self {
        Self {
            bits,
            max_value,
            add1,
            mul1,
            add2,
        }
    }

    /// Largest adjusted raw value the field can carry.
    pub fn max_raw(&self) -> u64 {
        let top = (1u64 << self.bits) - 1;
        (2 * top + 1).saturating_sub(self.max_value as u64)
    }

    /// Smallest and largest value this field can decode to.
    pub fn range(&self) -> (f64, f64) {
        (self.scale(0), self.scale(self.max_raw()))
    }

    #[inline]
    fn scale(&self, raw: u64) -> f64 {
        (raw as f64 + self.add1) * self.mul1 + self.add2
    }

    /// Decode one value from the cursor.
    pub fn decode(&self, cursor: &mut BitCursor<'_>, escape: EscapeBit) -> f64 {
        let mut raw = cursor.read_bits(self.bits) as u64;
        if raw >= self.max_value as u64 {
            let extra = match escape {
                EscapeBit::Consume => cursor.read_bit(),
                EscapeBit::Peek => cursor.peek_bit(),
            };
            raw = extra as u64 + 2 * raw - self.max_value as u64;
        }
        self.scale(raw)
    }

    /// Quantize `value` to the nearest representable step and write it,
    /// using the escape bit for values past `max_value`.
    ///
    /// Streams written this way decode with [`EscapeBit::Consume`].
    pub fn encode(&self, writer: &mut BitWriter, value: f64) {
        let steps = ((value - self.add2) / self.mul1 - self.add1).round();
        let raw = if steps.is_nan() || steps <= 0.0 {
            0
        } else {
            (steps as u64).min(self.max_raw())
        };

        if raw < self.max_value as u64 {
            writer.write_bits(self.bits, raw as u32);
        } else {
            let folded = raw + self.max_value as u64;
            writer.write_bits(self.bits, (folded >> 1) as u32);
            writer.write_bit(folded & 1 == 1);
        }
    }
}
