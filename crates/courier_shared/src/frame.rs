//! # Frame Layout
//!
//! Every frame starts with a one-byte tag. The rest of the header depends
//! on the tag:
//!
//! ```text
//! message:              [tag:1][packet-type-id:4][payload...]
//! request:              [tag:1][packet-type-id:4][request-id:2][payload...]
//! answer / failure /
//! missing_credentials /
//! unhandled:            [tag:1][request-id:2][payload...]
//! ```
//!
//! All integers are little-endian.

use std::fmt;

use courier_core::{DecodeError, DecodeResult, ReadCursor, Wire, WriteCursor};

use crate::protocol::{PacketTypeId, RequestId};

/// The frame tag.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// Fire-and-forget message.
    Message = 0,
    /// Request expecting one terminal reply.
    Request = 1,
    /// Successful reply.
    Answer = 2,
    /// Handler-level failure reply.
    Failure = 3,
    /// The sender lacked credentials the request requires.
    MissingCredentials = 4,
    /// Nobody on the receiving end handled the request.
    Unhandled = 5,
}

impl FrameKind {
    /// Converts from the wire tag.
    #[must_use]
    pub const fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Message),
            1 => Some(Self::Request),
            2 => Some(Self::Answer),
            3 => Some(Self::Failure),
            4 => Some(Self::MissingCredentials),
            5 => Some(Self::Unhandled),
            _ => None,
        }
    }

    /// True for the four tags that resolve a pending request.
    #[inline]
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        (self as u8) >= (Self::Answer as u8)
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Message => "message",
            Self::Request => "request",
            Self::Answer => "answer",
            Self::Failure => "failure",
            Self::MissingCredentials => "missing_credentials",
            Self::Unhandled => "unhandled",
        };
        f.write_str(text)
    }
}

impl Wire for FrameKind {
    fn encode(&self, writer: &mut WriteCursor) {
        writer.write_u8(*self as u8);
    }

    fn decode(reader: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        let tag = reader.read_u8()?;
        Self::from_u8(tag).ok_or(DecodeError::InvalidTag {
            tag: u32::from(tag),
            what: "FrameKind",
        })
    }
}

/// A decoded frame header. The payload follows it in the same buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameHeader {
    /// Message of the given type.
    Message {
        /// Payload type.
        packet: PacketTypeId,
    },
    /// Request of the given type.
    Request {
        /// Payload type.
        packet: PacketTypeId,
        /// Id the terminal reply must echo.
        request: RequestId,
    },
    /// Terminal reply to one of our requests.
    Terminal {
        /// Answer, failure, missing credentials or unhandled.
        kind: FrameKind,
        /// The request being resolved.
        request: RequestId,
    },
}

impl FrameHeader {
    /// Builds a terminal header. `kind` must be terminal.
    #[must_use]
    pub fn terminal(kind: FrameKind, request: RequestId) -> Self {
        debug_assert!(kind.is_terminal());
        Self::Terminal { kind, request }
    }

    /// The frame tag this header is written with.
    #[must_use]
    pub const fn kind(&self) -> FrameKind {
        match self {
            Self::Message { .. } => FrameKind::Message,
            Self::Request { .. } => FrameKind::Request,
            Self::Terminal { kind, .. } => *kind,
        }
    }

    /// Encodes a whole frame: header followed by the payload.
    #[must_use]
    pub fn frame<T: Wire>(self, payload: &T) -> Vec<u8> {
        let mut writer = WriteCursor::new();
        self.encode(&mut writer);
        payload.encode(&mut writer);
        writer.into_bytes()
    }
}

impl Wire for FrameHeader {
    fn encode(&self, writer: &mut WriteCursor) {
        self.kind().encode(writer);
        match self {
            Self::Message { packet } => packet.encode(writer),
            Self::Request { packet, request } => {
                packet.encode(writer);
                request.encode(writer);
            }
            Self::Terminal { request, .. } => request.encode(writer),
        }
    }

    fn decode(reader: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        let kind = FrameKind::decode(reader)?;
        Ok(match kind {
            FrameKind::Message => Self::Message {
                packet: PacketTypeId::decode(reader)?,
            },
            FrameKind::Request => Self::Request {
                packet: PacketTypeId::decode(reader)?,
                request: RequestId::decode(reader)?,
            },
            kind => Self::Terminal {
                kind,
                request: RequestId::decode(reader)?,
            },
        })
    }
}
