//! Position-tracking reader over an encoded byte slice.

use crate::error::{Result, StateError};
use std::io::Read;

/// A forward-only cursor over a borrowed byte slice.
///
/// Element codecs read from the cursor and must leave it positioned exactly
/// after the bytes they consumed; list decoding relies on that to find the
/// delimiter between elements.
#[derive(Clone, Debug)]
pub struct ByteCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Offset of the next unread byte.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// The whole underlying buffer, regardless of position.
    pub fn buffer(&self) -> &'a [u8] {
        self.buf
    }

    /// Unread suffix of the buffer.
    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let byte = self.read_bytes(1)?[0];
        Ok(byte)
    }

    /// Read exactly `len` bytes, failing if the input is shorter.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(StateError::CorruptEncoding(format!(
                "unexpected end of input at offset {}: needed {} bytes, {} remaining",
                self.pos,
                len,
                self.remaining()
            )));
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut arr = [0u8; N];
        arr.copy_from_slice(self.read_bytes(N)?);
        Ok(arr)
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64_be(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.read_array()?))
    }

    pub fn read_i64_be(&mut self) -> Result<i64> {
        Ok(i64::from_be_bytes(self.read_array()?))
    }
}

impl Read for ByteCursor<'_> {
    fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
        let n = out.len().min(self.remaining());
        out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_advances_position() {
        let data = [1u8, 0, 0, 0, 9, 9];
        let mut cursor = ByteCursor::new(&data);

        assert_eq!(cursor.read_u32_le().unwrap(), 1);
        assert_eq!(cursor.position(), 4);
        assert_eq!(cursor.rest(), &[9, 9]);
        assert_eq!(cursor.read_u8().unwrap(), 9);
        assert_eq!(cursor.remaining(), 1);
    }

    #[test]
    fn test_short_read_is_corrupt() {
        let data = [1u8, 2];
        let mut cursor = ByteCursor::new(&data);

        let err = cursor.read_u64_be().unwrap_err();
        assert!(matches!(err, StateError::CorruptEncoding(_)));
        // Failed read does not consume.
        assert_eq!(cursor.position(), 0);
    }
}
