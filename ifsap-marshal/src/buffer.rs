//! Growable byte buffer with a single read/write offset.

use crate::error::MarshalError;
use bytes::Bytes;
use std::io::SeekFrom;

/// Initial capacity of a writing cursor.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Slack added on top of the required size whenever the buffer grows.
const GROWTH_SLACK: usize = 1024;

/// Byte buffer with an offset used for both reading and writing.
///
/// Writes past the end grow the backing store; reads past the written
/// length fail with [`MarshalError::OutOfRange`].
#[derive(Debug, Clone)]
pub struct ByteCursor {
    data: Vec<u8>,
    pos: usize,
    len: usize,
}

impl ByteCursor {
    /// Creates an empty cursor for writing.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates an empty cursor with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
            pos: 0,
            len: 0,
        }
    }

    /// Wraps existing bytes for reading from offset 0.
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        let len = data.len();
        Self { data, pos: 0, len }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Number of bytes written (or readable).
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_eof(&self) -> bool {
        self.pos >= self.len
    }

    pub fn remaining(&self) -> usize {
        self.len.saturating_sub(self.pos)
    }

    /// Size of the backing store.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Moves the offset; the target must lie within the written bytes.
    pub fn seek(&mut self, target: SeekFrom) -> Result<usize, MarshalError> {
        let next = match target {
            SeekFrom::Start(n) => i64::try_from(n).unwrap_or(i64::MAX),
            SeekFrom::Current(delta) => self.pos as i64 + delta,
            SeekFrom::End(delta) => self.len as i64 + delta,
        };
        if next < 0 || next as usize > self.len {
            return Err(MarshalError::InvalidSeek(next));
        }
        self.pos = next as usize;
        Ok(self.pos)
    }

    // =========================================================================
    // Writing
    // =========================================================================

    fn grow_for(&mut self, additional: usize) {
        let needed = self.pos + additional;
        if needed > self.data.len() {
            let new_len = needed.max(self.data.len() * 2) + GROWTH_SLACK;
            self.data.resize(new_len, 0);
        }
    }

    fn advance_written(&mut self, n: usize) {
        self.pos += n;
        self.len = self.len.max(self.pos);
    }

    pub fn put_u8(&mut self, value: u8) {
        self.grow_for(1);
        self.data[self.pos] = value;
        self.advance_written(1);
    }

    pub fn put_i8(&mut self, value: i8) {
        self.put_u8(value as u8);
    }

    pub fn put_slice(&mut self, bytes: &[u8]) {
        self.grow_for(bytes.len());
        self.data[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.advance_written(bytes.len());
    }

    /// Writes the UTF-8 bytes of `text`.
    pub fn put_str(&mut self, text: &str) {
        self.put_slice(text.as_bytes());
    }

    /// Writes a 4-byte big-endian integer.
    pub fn put_u32(&mut self, value: u32) {
        self.put_slice(&value.to_be_bytes());
    }

    /// Reserves `n` zeroed bytes and returns the offset where they start.
    pub fn reserve_zeroed(&mut self, n: usize) -> usize {
        let start = self.pos;
        self.grow_for(n);
        self.data[start..start + n].fill(0);
        self.advance_written(n);
        start
    }

    /// Overwrites four bytes at `at` with a big-endian integer.
    pub fn patch_u32(&mut self, at: usize, value: u32) -> Result<(), MarshalError> {
        if at + 4 > self.len {
            return Err(MarshalError::OutOfRange {
                offset: at,
                needed: 4,
                available: self.len.saturating_sub(at),
            });
        }
        self.data[at..at + 4].copy_from_slice(&value.to_be_bytes());
        Ok(())
    }

    /// Returns a copy of the written prefix.
    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.data[..self.len])
    }

    /// Consumes the cursor, returning the written prefix.
    pub fn into_bytes(mut self) -> Bytes {
        self.data.truncate(self.len);
        Bytes::from(self.data)
    }

    // =========================================================================
    // Reading
    // =========================================================================

    fn check_available(&self, needed: usize) -> Result<(), MarshalError> {
        if needed > self.remaining() {
            return Err(MarshalError::OutOfRange {
                offset: self.pos,
                needed,
                available: self.remaining(),
            });
        }
        Ok(())
    }

    pub fn get_u8(&mut self) -> Result<u8, MarshalError> {
        self.check_available(1)?;
        let value = self.data[self.pos];
        self.pos += 1;
        Ok(value)
    }

    pub fn get_i8(&mut self) -> Result<i8, MarshalError> {
        Ok(self.get_u8()? as i8)
    }

    /// Returns the next byte without consuming it.
    pub fn peek_u8(&self) -> Option<u8> {
        (self.pos < self.len).then(|| self.data[self.pos])
    }

    /// Reads a 4-byte big-endian integer.
    pub fn get_u32(&mut self) -> Result<u32, MarshalError> {
        let raw = self.read_slice(4)?;
        Ok(u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    /// Reads `n` bytes, borrowing them from the buffer.
    pub fn read_slice(&mut self, n: usize) -> Result<&[u8], MarshalError> {
        self.check_available(n)?;
        let start = self.pos;
        self.pos += n;
        Ok(&self.data[start..start + n])
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>, MarshalError> {
        Ok(self.read_slice(n)?.to_vec())
    }

    /// Reads `n` bytes and decodes them as UTF-8.
    pub fn read_utf8(&mut self, n: usize) -> Result<String, MarshalError> {
        Ok(crate::text::decode_utf8(self.read_slice(n)?))
    }

    /// Advances the read offset by `n` bytes.
    pub fn skip(&mut self, n: usize) -> Result<(), MarshalError> {
        self.check_available(n)?;
        self.pos += n;
        Ok(())
    }
}

impl Default for ByteCursor {
    fn default() -> Self {
        Self::new()
    }
}
