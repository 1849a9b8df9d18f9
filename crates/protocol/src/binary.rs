//! Byte-level reading and writing for datagram headers and subpackets.
//!
//! Header fields are big-endian; the few little-endian fields (persona id)
//! have explicit `_le` accessors.

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// A reader for parsing datagram framing.
#[derive(Debug)]
pub struct BinaryReader {
    buf: Bytes,
}

impl BinaryReader {
    /// Create a new reader from raw bytes.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { buf: data.into() }
    }

    /// Returns remaining bytes.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    /// Skip `n` bytes.
    #[inline]
    pub fn skip(&mut self, n: usize) {
        self.buf.advance(n.min(self.buf.remaining()));
    }

    /// Safe version that returns None if not enough data
    #[inline]
    pub fn try_get_u8(&mut self) -> Option<u8> {
        if self.buf.remaining() >= 1 {
            Some(self.buf.get_u8())
        } else {
            None
        }
    }

    /// Safe version that returns None if not enough data
    #[inline]
    pub fn try_get_u16(&mut self) -> Option<u16> {
        if self.buf.remaining() >= 2 {
            Some(self.buf.get_u16())
        } else {
            None
        }
    }

    /// Little-endian u32, None if not enough data.
    #[inline]
    pub fn try_get_u32_le(&mut self) -> Option<u32> {
        if self.buf.remaining() >= 4 {
            Some(self.buf.get_u32_le())
        } else {
            None
        }
    }

    /// Split off the next `n` bytes without copying.
    pub fn try_take(&mut self, n: usize) -> Option<Bytes> {
        if self.buf.remaining() >= n {
            Some(self.buf.split_to(n))
        } else {
            None
        }
    }

    /// Read a fixed-width, NUL-padded string field.
    ///
    /// Reads exactly `width` bytes (or whatever is left) and stops the string
    /// at the first NUL.
    pub fn get_fixed_string(&mut self, width: usize) -> String {
        let field = self.buf.split_to(width.min(self.buf.remaining()));
        let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
        String::from_utf8_lossy(&field[..end]).into_owned()
    }
}

/// A writer for building outbound datagrams.
#[derive(Debug, Default)]
pub struct BinaryWriter {
    buf: BytesMut,
}

impl BinaryWriter {
    /// Create a new writer with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    /// Create a new writer with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Reuse an existing buffer (its contents are discarded).
    pub fn from_buf(mut buf: BytesMut) -> Self {
        buf.clear();
        Self { buf }
    }

    /// Returns the current length.
    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[inline]
    pub fn put_u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    #[inline]
    pub fn put_u16(&mut self, v: u16) {
        self.buf.put_u16(v);
    }

    /// Write raw bytes.
    pub fn put_slice(&mut self, data: &[u8]) {
        self.buf.put_slice(data);
    }

    /// Consume the writer and return the underlying buffer.
    pub fn into_inner(self) -> BytesMut {
        self.buf
    }

    /// Consume the writer and return the built buffer.
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }

    /// Get current buffer as a slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }
}
