//! # Wire Codec
//!
//! Explicit per-type marshalling for packet payloads.
//!
//! Every payload type implements [`Wire`] by hand (or through the impls
//! below for primitives and containers). There is no reflection: a packet
//! schema pairs a type id with the `encode`/`decode` functions of one
//! concrete type.
//!
//! ## Shapes
//!
//! | Shape            | Encoding                                   |
//! |------------------|--------------------------------------------|
//! | `()`             | nothing                                    |
//! | `bool`           | 1 byte, 0 or 1                             |
//! | integers         | little-endian, 64-bit split in two halves  |
//! | `String`         | `u32` length + UTF-8                       |
//! | `Vec<T>`         | `u32` count + elements                     |
//! | `Option<T>`      | 1 byte presence + element                  |
//! | `[T; N]`         | N elements, no prefix                      |
//! | `(A, B)`         | A then B                                   |
//! | [`Blob`]         | `u32` length + raw bytes                   |

use crate::cursor::{DecodeError, DecodeResult, ReadCursor, WriteCursor};

/// A value that can be written to and read back from the wire.
pub trait Wire: Sized {
    /// Appends the encoded value.
    fn encode(&self, writer: &mut WriteCursor);

    /// Reads a value, advancing the cursor.
    fn decode(reader: &mut ReadCursor<'_>) -> DecodeResult<Self>;
}

/// Encodes a value into a fresh byte vector.
#[must_use]
pub fn to_bytes<T: Wire>(value: &T) -> Vec<u8> {
    let mut writer = WriteCursor::new();
    value.encode(&mut writer);
    writer.into_bytes()
}

/// Decodes a value from a byte slice, ignoring any trailing bytes.
pub fn from_bytes<T: Wire>(bytes: &[u8]) -> DecodeResult<T> {
    T::decode(&mut ReadCursor::new(bytes))
}

/// Length-prefixed opaque bytes, copied in one step.
///
/// Carries payloads whose concrete type only one side knows (replicated
/// collection items, join registration data).
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Blob(pub Vec<u8>);

impl Blob {
    /// Encodes `value` into a new blob.
    #[must_use]
    pub fn encode_from<T: Wire>(value: &T) -> Self {
        Self(to_bytes(value))
    }

    /// Decodes the blob's contents as `T`.
    pub fn decode_as<T: Wire>(&self) -> DecodeResult<T> {
        from_bytes(&self.0)
    }

    /// Returns true if the blob carries no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Wire for Blob {
    fn encode(&self, writer: &mut WriteCursor) {
        writer.write_blob(&self.0);
    }

    fn decode(reader: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        reader.read_blob().map(|bytes| Self(bytes.to_vec()))
    }
}

impl Wire for () {
    #[inline]
    fn encode(&self, _writer: &mut WriteCursor) {}

    #[inline]
    fn decode(_reader: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        Ok(())
    }
}

impl Wire for bool {
    fn encode(&self, writer: &mut WriteCursor) {
        writer.write_u8(u8::from(*self));
    }

    fn decode(reader: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        match reader.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            tag => Err(DecodeError::InvalidTag {
                tag: u32::from(tag),
                what: "bool",
            }),
        }
    }
}

impl Wire for u8 {
    #[inline]
    fn encode(&self, writer: &mut WriteCursor) {
        writer.write_u8(*self);
    }

    #[inline]
    fn decode(reader: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        reader.read_u8()
    }
}

impl Wire for u16 {
    #[inline]
    fn encode(&self, writer: &mut WriteCursor) {
        writer.write_u16(*self);
    }

    #[inline]
    fn decode(reader: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        reader.read_u16()
    }
}

impl Wire for u32 {
    #[inline]
    fn encode(&self, writer: &mut WriteCursor) {
        writer.write_u32(*self);
    }

    #[inline]
    fn decode(reader: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        reader.read_u32()
    }
}

impl Wire for u64 {
    #[inline]
    fn encode(&self, writer: &mut WriteCursor) {
        writer.write_u64(*self);
    }

    #[inline]
    fn decode(reader: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        reader.read_u64()
    }
}

// Signed integers travel as their two's-complement bit patterns.
#[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
mod signed {
    use super::{DecodeResult, ReadCursor, Wire, WriteCursor};

    impl Wire for i8 {
        fn encode(&self, writer: &mut WriteCursor) {
            writer.write_u8(*self as u8);
        }

        fn decode(reader: &mut ReadCursor<'_>) -> DecodeResult<Self> {
            Ok(reader.read_u8()? as i8)
        }
    }

    impl Wire for i16 {
        fn encode(&self, writer: &mut WriteCursor) {
            writer.write_u16(*self as u16);
        }

        fn decode(reader: &mut ReadCursor<'_>) -> DecodeResult<Self> {
            Ok(reader.read_u16()? as i16)
        }
    }

    impl Wire for i32 {
        fn encode(&self, writer: &mut WriteCursor) {
            writer.write_u32(*self as u32);
        }

        fn decode(reader: &mut ReadCursor<'_>) -> DecodeResult<Self> {
            Ok(reader.read_u32()? as i32)
        }
    }

    impl Wire for i64 {
        fn encode(&self, writer: &mut WriteCursor) {
            writer.write_u64(*self as u64);
        }

        fn decode(reader: &mut ReadCursor<'_>) -> DecodeResult<Self> {
            Ok(reader.read_u64()? as i64)
        }
    }
}

impl Wire for f32 {
    fn encode(&self, writer: &mut WriteCursor) {
        writer.write_u32(self.to_bits());
    }

    fn decode(reader: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        reader.read_u32().map(f32::from_bits)
    }
}

impl Wire for String {
    fn encode(&self, writer: &mut WriteCursor) {
        writer.write_blob(self.as_bytes());
    }

    fn decode(reader: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        let bytes = reader.read_blob()?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| DecodeError::InvalidUtf8)
    }
}

impl<T: Wire> Wire for Vec<T> {
    fn encode(&self, writer: &mut WriteCursor) {
        #[allow(clippy::cast_possible_truncation)]
        writer.write_u32(self.len() as u32);
        for item in self {
            item.encode(writer);
        }
    }

    fn decode(reader: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        let count = reader.read_u32()? as usize;
        // Preallocation is capped by the bytes actually present.
        let mut items = Vec::with_capacity(count.min(reader.remaining()));
        for _ in 0..count {
            items.push(T::decode(reader)?);
        }
        Ok(items)
    }
}

impl<T: Wire> Wire for Option<T> {
    fn encode(&self, writer: &mut WriteCursor) {
        match self {
            None => writer.write_u8(0),
            Some(value) => {
                writer.write_u8(1);
                value.encode(writer);
            }
        }
    }

    fn decode(reader: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        if bool::decode(reader)? {
            T::decode(reader).map(Some)
        } else {
            Ok(None)
        }
    }
}

impl<A: Wire, B: Wire> Wire for (A, B) {
    fn encode(&self, writer: &mut WriteCursor) {
        self.0.encode(writer);
        self.1.encode(writer);
    }

    fn decode(reader: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        Ok((A::decode(reader)?, B::decode(reader)?))
    }
}

impl<T: Wire, const N: usize> Wire for [T; N] {
    fn encode(&self, writer: &mut WriteCursor) {
        for item in self {
            item.encode(writer);
        }
    }

    fn decode(reader: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        let mut items = Vec::with_capacity(N);
        for _ in 0..N {
            items.push(T::decode(reader)?);
        }
        items.try_into().map_err(|_| DecodeError::LengthOverflow {
            declared: N,
            remaining: reader.remaining(),
        })
    }
}
