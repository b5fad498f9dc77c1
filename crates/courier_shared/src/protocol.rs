//! Identifiers and packet traits shared by every endpoint.
//!
//! These types are serialized and sent over the network.
//! Both ends must agree on these definitions.

use std::borrow::Borrow;
use std::fmt;

use courier_core::{DecodeError, DecodeResult, ReadCursor, Wire, WriteCursor};
use serde::{Deserialize, Serialize};

// =============================================================================
// ACTORS
// =============================================================================

/// Address of an endpoint: ourselves, a peer, the server, or everyone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub u32);

impl ActorId {
    /// Nobody. Never a valid destination.
    pub const INVALID: Self = Self(0);
    /// The local endpoint.
    pub const SELF: Self = Self(1);
    /// Broadcast to every connected peer.
    pub const ALL: Self = Self(2);
    /// The server of a client/server topology.
    pub const SERVER: Self = Self(3);
    /// First id handed out to dynamically connected peers.
    pub const FIRST_DYNAMIC: Self = Self(16);

    /// Returns the `index`-th dynamic peer id.
    #[must_use]
    pub const fn dynamic(index: u32) -> Self {
        Self(Self::FIRST_DYNAMIC.0 + index)
    }

    /// True for addresses that name exactly one remote endpoint.
    #[inline]
    #[must_use]
    pub const fn is_peer(self) -> bool {
        self.0 == Self::SERVER.0 || self.0 >= Self::FIRST_DYNAMIC.0
    }
}

impl Default for ActorId {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::INVALID => f.write_str("invalid"),
            Self::SELF => f.write_str("self"),
            Self::ALL => f.write_str("all"),
            Self::SERVER => f.write_str("server"),
            Self(id) => write!(f, "actor#{id}"),
        }
    }
}

impl Wire for ActorId {
    fn encode(&self, writer: &mut WriteCursor) {
        writer.write_u32(self.0);
    }

    fn decode(reader: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        reader.read_u32().map(Self)
    }
}

// =============================================================================
// PACKET TYPE IDS
// =============================================================================

/// Stable hash of a packet's fully-qualified name.
///
/// Computed at compile time with 32-bit FNV-1a. Two names hashing to the
/// same id are rejected when the packet registry is built.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PacketTypeId(pub u32);

impl PacketTypeId {
    const FNV_OFFSET: u32 = 0x811c_9dc5;
    const FNV_PRIME: u32 = 0x0100_0193;

    /// Hashes a packet name.
    #[must_use]
    pub const fn from_name(name: &str) -> Self {
        let bytes = name.as_bytes();
        let mut hash = Self::FNV_OFFSET;
        let mut i = 0;
        while i < bytes.len() {
            hash ^= bytes[i] as u32;
            hash = hash.wrapping_mul(Self::FNV_PRIME);
            i += 1;
        }
        Self(hash)
    }
}

impl fmt::Display for PacketTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

impl Wire for PacketTypeId {
    fn encode(&self, writer: &mut WriteCursor) {
        writer.write_u32(self.0);
    }

    fn decode(reader: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        reader.read_u32().map(Self)
    }
}

// =============================================================================
// REQUEST & COLLECTION IDS
// =============================================================================

/// Correlates a request with its terminal reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(pub u16);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req#{}", self.0)
    }
}

impl Wire for RequestId {
    fn encode(&self, writer: &mut WriteCursor) {
        writer.write_u16(self.0);
    }

    fn decode(reader: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        reader.read_u16().map(Self)
    }
}

/// Names a shared collection on its owner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CollectionId(pub u16);

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "col#{}", self.0)
    }
}

impl Wire for CollectionId {
    fn encode(&self, writer: &mut WriteCursor) {
        writer.write_u16(self.0);
    }

    fn decode(reader: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        reader.read_u16().map(Self)
    }
}

// =============================================================================
// CREDENTIALS
// =============================================================================

/// A named capability token ("admin", "moderator", ...).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    /// Creates a token from its name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The token's name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Credential {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl Borrow<str> for Credential {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<&str> for Credential {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Wire for Credential {
    fn encode(&self, writer: &mut WriteCursor) {
        self.0.encode(writer);
    }

    fn decode(reader: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        String::decode(reader).map(Self)
    }
}

/// Payload of a `missing_credentials` frame: `[count:u16][token...]`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MissingCredentials(pub Vec<Credential>);

impl Wire for MissingCredentials {
    fn encode(&self, writer: &mut WriteCursor) {
        let count = u16::try_from(self.0.len()).unwrap_or(u16::MAX);
        writer.write_u16(count);
        for token in self.0.iter().take(usize::from(count)) {
            token.encode(writer);
        }
    }

    fn decode(reader: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        let count = usize::from(reader.read_u16()?);
        let mut tokens = Vec::with_capacity(count.min(reader.remaining()));
        for _ in 0..count {
            tokens.push(Credential::decode(reader)?);
        }
        Ok(Self(tokens))
    }
}

// =============================================================================
// CONNECTION OUTCOMES
// =============================================================================

/// Why a connection (and every request riding on it) failed.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionFailure {
    /// The peer refused our credentials during the handshake.
    CannotAuthenticate = 0,
    /// The link went down.
    Disconnected = 1,
    /// The peer could not be reached at all.
    Unreachable = 2,
    /// The transport gave up waiting.
    TimedOut = 3,
    /// The peer is at its client limit.
    TooManyClients = 4,
    /// The peer sent something we could not make sense of.
    UnexpectedPacket = 5,
}

impl ConnectionFailure {
    /// Converts from the wire discriminant.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::CannotAuthenticate),
            1 => Some(Self::Disconnected),
            2 => Some(Self::Unreachable),
            3 => Some(Self::TimedOut),
            4 => Some(Self::TooManyClients),
            5 => Some(Self::UnexpectedPacket),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::CannotAuthenticate => "cannot_authenticate",
            Self::Disconnected => "disconnected",
            Self::Unreachable => "unreachable",
            Self::TimedOut => "timed_out",
            Self::TooManyClients => "too_many_clients",
            Self::UnexpectedPacket => "unexpected_packet",
        };
        f.write_str(text)
    }
}

impl Wire for ConnectionFailure {
    fn encode(&self, writer: &mut WriteCursor) {
        writer.write_u8(*self as u8);
    }

    fn decode(reader: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        let tag = reader.read_u8()?;
        Self::from_u8(tag).ok_or(DecodeError::InvalidTag {
            tag: u32::from(tag),
            what: "ConnectionFailure",
        })
    }
}

// =============================================================================
// PACKET TRAITS
// =============================================================================

/// A payload type with a stable, hashed type id.
pub trait Packet: Wire + 'static {
    /// Fully-qualified name the type id is derived from.
    const NAME: &'static str;

    /// Hash of [`Packet::NAME`].
    const TYPE_ID: PacketTypeId = PacketTypeId::from_name(Self::NAME);
}

/// A fire-and-forget packet.
pub trait Message: Packet {
    /// Local bookkeeping messages never cross the wire.
    const LOCAL_ONLY: bool = false;
}

/// A packet expecting exactly one terminal reply.
pub trait Request: Packet {
    /// Payload of a successful answer.
    type Answer: Wire + 'static;

    /// Payload of a failure reply.
    type Failure: Wire + 'static;

    /// Tokens the sender must hold before the handler runs.
    const REQUIRED_CREDENTIALS: &'static [&'static str] = &[];
}
