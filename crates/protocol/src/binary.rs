//! Binary reading and writing utilities for the arena wire format.
//!
//! All values are little-endian. Strings are null-terminated UTF-8.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::ProtocolError;

/// A bounds-checked reader over one inbound frame.
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

    #[inline]
    fn need(&self, n: usize) -> Result<(), ProtocolError> {
        if self.buf.remaining() >= n {
            Ok(())
        } else {
            Err(ProtocolError::UnexpectedEof)
        }
    }

    #[inline]
    pub fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    #[inline]
    pub fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        self.need(4)?;
        Ok(self.buf.get_u32_le())
    }

    #[inline]
    pub fn read_u64(&mut self) -> Result<u64, ProtocolError> {
        self.need(8)?;
        Ok(self.buf.get_u64_le())
    }

    #[inline]
    pub fn read_f32(&mut self) -> Result<f32, ProtocolError> {
        self.need(4)?;
        Ok(self.buf.get_f32_le())
    }

    /// Read a null-terminated UTF-8 string of at most `max_len` bytes.
    pub fn read_string(&mut self, max_len: usize) -> Result<String, ProtocolError> {
        let mut bytes = Vec::new();
        loop {
            if !self.buf.has_remaining() {
                return Err(ProtocolError::UnterminatedString);
            }
            let b = self.buf.get_u8();
            if b == 0 {
                break;
            }
            if bytes.len() == max_len {
                return Err(ProtocolError::StringTooLong(max_len));
            }
            bytes.push(b);
        }
        String::from_utf8(bytes).map_err(|_| ProtocolError::InvalidUtf8)
    }

    /// Fail if the frame carries bytes past the end of the packet.
    pub fn finish(&self) -> Result<(), ProtocolError> {
        match self.buf.remaining() {
            0 => Ok(()),
            n => Err(ProtocolError::TrailingBytes(n)),
        }
    }
}

/// A writer for building binary protocol messages.
#[derive(Debug, Default)]
pub struct BinaryWriter {
    buf: BytesMut,
}

impl BinaryWriter {
    /// Create a new writer with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(64)
    }

    /// Create a new writer with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

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
        self.buf.put_u16_le(v);
    }

    #[inline]
    pub fn put_u32(&mut self, v: u32) {
        self.buf.put_u32_le(v);
    }

    #[inline]
    pub fn put_u64(&mut self, v: u64) {
        self.buf.put_u64_le(v);
    }

    #[inline]
    pub fn put_f32(&mut self, v: f32) {
        self.buf.put_f32_le(v);
    }

    /// Write a null-terminated UTF-8 string. Interior nulls are dropped.
    pub fn put_string(&mut self, s: &str) {
        for b in s.bytes().filter(|&b| b != 0) {
            self.buf.put_u8(b);
        }
        self.buf.put_u8(0);
    }

    /// Consume the writer and return the built buffer.
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_past_end_are_errors() {
        let mut r = BinaryReader::new(vec![1u8, 2, 3]);
        assert_eq!(r.read_u8().unwrap(), 1);
        assert!(matches!(r.read_u32(), Err(ProtocolError::UnexpectedEof)));
        // The failed read must not consume anything.
        assert_eq!(r.read_u8().unwrap(), 2);
    }

    #[test]
    fn string_limits() {
        let mut w = BinaryWriter::new();
        w.put_string("snake\0y");
        let mut r = BinaryReader::new(w.finish());
        assert_eq!(r.read_string(16).unwrap(), "snakey");
        r.finish().unwrap();

        let mut r = BinaryReader::new(b"toolong\0".to_vec());
        assert!(matches!(r.read_string(3), Err(ProtocolError::StringTooLong(3))));

        let mut r = BinaryReader::new(b"open".to_vec());
        assert!(matches!(r.read_string(16), Err(ProtocolError::UnterminatedString)));
    }
}
