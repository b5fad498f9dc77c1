//! # Byte Cursors
//!
//! Append-only writer and sequential reader for packet payloads.
//!
//! ## Layout Rules
//!
//! - Little-endian for every multi-byte integer
//! - 64-bit values are written as two 32-bit halves (low, then high) so
//!   32-bit oriented transports can relay them untouched
//! - Readers never panic on short input, they return [`DecodeError`]
//!
//! ## Peeking
//!
//! ```text
//! bytes:  [tag][type-id: 4][request-id: 2][payload ...]
//!           ^
//!           reader (tell = 0)
//!
//! reader.view()  -> independent cursor at the same position,
//!                   advance it freely, the original stays put
//! ```

use bytemuck::Pod;
use thiserror::Error;

/// Errors produced while reading from a [`ReadCursor`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Not enough bytes left to read the requested value.
    #[error("unexpected end of input: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEnd {
        /// Bytes the read required.
        needed: usize,
        /// Bytes that were left.
        remaining: usize,
    },

    /// A string payload was not valid UTF-8.
    #[error("invalid utf-8 in string payload")]
    InvalidUtf8,

    /// An enum discriminant that no variant maps to.
    #[error("invalid tag {tag} for {what}")]
    InvalidTag {
        /// The offending discriminant.
        tag: u32,
        /// Name of the decoded type.
        what: &'static str,
    },

    /// A length prefix larger than the bytes that follow it.
    #[error("length prefix {declared} exceeds remaining input {remaining}")]
    LengthOverflow {
        /// Length declared on the wire.
        declared: usize,
        /// Bytes actually left.
        remaining: usize,
    },

    /// Seek target outside the backing buffer.
    #[error("seek to {position} outside buffer of {len} bytes")]
    SeekOutOfBounds {
        /// Requested position.
        position: usize,
        /// Buffer length.
        len: usize,
    },
}

/// Result type for decoding operations.
pub type DecodeResult<T> = Result<T, DecodeError>;

// =============================================================================
// WRITER
// =============================================================================

/// Append-only byte writer.
///
/// The buffer only grows; there is no way to rewrite bytes already emitted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteCursor {
    buffer: Vec<u8>,
}

impl WriteCursor {
    /// Creates an empty writer.
    #[must_use]
    pub const fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Creates an empty writer with room for `capacity` bytes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Returns the number of bytes written.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if no bytes have been written.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Returns a slice of the written data.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Consumes the writer and returns the bytes.
    #[inline]
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Writes a single byte.
    #[inline]
    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Writes a u16 in little-endian format.
    #[inline]
    pub fn write_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a u32 in little-endian format.
    #[inline]
    pub fn write_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a u64 as two u32 halves, low half first.
    #[inline]
    pub fn write_u64(&mut self, value: u64) {
        #[allow(clippy::cast_possible_truncation)]
        let low = value as u32;
        let high = (value >> 32) as u32;
        self.write_u32(low);
        self.write_u32(high);
    }

    /// Writes raw bytes without a length prefix.
    #[inline]
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Writes a `u32` length prefix followed by the bytes.
    pub fn write_blob(&mut self, bytes: &[u8]) {
        #[allow(clippy::cast_possible_truncation)]
        self.write_u32(bytes.len() as u32);
        self.write_bytes(bytes);
    }

    /// Writes a Pod slice directly (no length prefix).
    #[inline]
    pub fn write_pod_slice<T: Pod>(&mut self, values: &[T]) {
        self.buffer.extend_from_slice(bytemuck::cast_slice(values));
    }
}

// =============================================================================
// READER
// =============================================================================

/// Sequential reader over a borrowed byte slice.
///
/// Cheap to copy: [`ReadCursor::view`] hands out an independent cursor over
/// the same bytes for peeking.
#[derive(Clone, Copy, Debug)]
pub struct ReadCursor<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> ReadCursor<'a> {
    /// Creates a reader positioned at the start of `buffer`.
    #[must_use]
    pub const fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            position: 0,
        }
    }

    /// Current read position.
    #[inline]
    #[must_use]
    pub const fn tell(&self) -> usize {
        self.position
    }

    /// Moves the read position.
    ///
    /// Seeking to exactly the end of the buffer is allowed.
    pub fn seek(&mut self, position: usize) -> DecodeResult<()> {
        if position > self.buffer.len() {
            return Err(DecodeError::SeekOutOfBounds {
                position,
                len: self.buffer.len(),
            });
        }
        self.position = position;
        Ok(())
    }

    /// Returns an independent cursor at the current position.
    #[inline]
    #[must_use]
    pub const fn view(&self) -> ReadCursor<'a> {
        ReadCursor {
            buffer: self.buffer,
            position: self.position,
        }
    }

    /// Returns the number of bytes remaining.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.position)
    }

    /// Returns true once every byte has been consumed.
    #[inline]
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// Returns the unread tail without advancing.
    #[inline]
    #[must_use]
    pub fn rest(&self) -> &'a [u8] {
        &self.buffer[self.position..]
    }

    /// Reads exactly `len` raw bytes.
    pub fn read_bytes(&mut self, len: usize) -> DecodeResult<&'a [u8]> {
        if len > self.remaining() {
            return Err(DecodeError::UnexpectedEnd {
                needed: len,
                remaining: self.remaining(),
            });
        }
        let slice = &self.buffer[self.position..self.position + len];
        self.position += len;
        Ok(slice)
    }

    /// Reads a fixed-size array of raw bytes.
    #[inline]
    fn read_array<const N: usize>(&mut self) -> DecodeResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    /// Reads a single byte.
    #[inline]
    pub fn read_u8(&mut self) -> DecodeResult<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    /// Reads a u16 in little-endian format.
    #[inline]
    pub fn read_u16(&mut self) -> DecodeResult<u16> {
        self.read_array().map(u16::from_le_bytes)
    }

    /// Reads a u32 in little-endian format.
    #[inline]
    pub fn read_u32(&mut self) -> DecodeResult<u32> {
        self.read_array().map(u32::from_le_bytes)
    }

    /// Reads a u64 written as two u32 halves.
    #[inline]
    pub fn read_u64(&mut self) -> DecodeResult<u64> {
        let low = u64::from(self.read_u32()?);
        let high = u64::from(self.read_u32()?);
        Ok(low | (high << 32))
    }

    /// Reads a `u32` length prefix and the bytes it announces.
    pub fn read_blob(&mut self) -> DecodeResult<&'a [u8]> {
        let declared = self.read_u32()? as usize;
        if declared > self.remaining() {
            return Err(DecodeError::LengthOverflow {
                declared,
                remaining: self.remaining(),
            });
        }
        self.read_bytes(declared)
    }

    /// Reads `count` Pod values (no length prefix).
    pub fn read_pod_vec<T: Pod>(&mut self, count: usize) -> DecodeResult<Vec<T>> {
        let size = std::mem::size_of::<T>();
        let total = count.checked_mul(size).ok_or(DecodeError::LengthOverflow {
            declared: usize::MAX,
            remaining: self.remaining(),
        })?;
        let bytes = self.read_bytes(total)?;
        Ok(bytes
            .chunks_exact(size.max(1))
            .take(count)
            .map(bytemuck::pod_read_unaligned)
            .collect())
    }
}
