//! Local bookkeeping notifications.
//!
//! The dispatcher raises these on the processing thread when a frame could
//! not be delivered, or when the transport reports a peer coming or going.
//! They are ordinary messages as far as watchers are concerned, but they
//! are LOCAL ONLY: the dispatcher refuses to send them to a remote actor
//! and drops them if a peer ever sends one.

use courier_core::{DecodeResult, ReadCursor, Wire, WriteCursor};

use crate::frame::FrameKind;
use crate::protocol::{ActorId, ConnectionFailure, Message, Packet, PacketTypeId, RequestId};

/// A message arrived that no watcher handles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnhandledMessage {
    /// Sender of the original message.
    pub from: ActorId,
    /// Type of the original message.
    pub packet: PacketTypeId,
}

/// A request arrived that no responder handles. The sender has already
/// been told `unhandled`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnhandledRequest {
    /// Sender of the original request.
    pub from: ActorId,
    /// Type of the original request.
    pub packet: PacketTypeId,
}

/// A terminal frame arrived for a request we are no longer waiting on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnhandledRequestAnswer {
    /// Sender of the terminal frame.
    pub from: ActorId,
    /// The request id it referred to.
    pub request: RequestId,
    /// Answer, failure, missing credentials or unhandled.
    pub kind: FrameKind,
}

/// The transport connected a peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeerConnected {
    /// The new peer.
    pub actor: ActorId,
}

/// The transport lost a peer. Requests pending on it have already been
/// resolved with `reason`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeerDisconnected {
    /// The peer that went away.
    pub actor: ActorId,
    /// Why.
    pub reason: ConnectionFailure,
}

/// Type ids that never produce a further "unhandled" notification.
pub const BOOKKEEPING_TYPE_IDS: [PacketTypeId; 3] = [
    UnhandledMessage::TYPE_ID,
    UnhandledRequest::TYPE_ID,
    UnhandledRequestAnswer::TYPE_ID,
];

/// Returns true for the three `Unhandled*` notification types.
#[inline]
#[must_use]
pub fn is_bookkeeping(packet: PacketTypeId) -> bool {
    BOOKKEEPING_TYPE_IDS.contains(&packet)
}

// =============================================================================
// PACKET IMPLS
// =============================================================================

impl Packet for UnhandledMessage {
    const NAME: &'static str = "courier.UnhandledMessage";
}

impl Message for UnhandledMessage {
    const LOCAL_ONLY: bool = true;
}

impl Wire for UnhandledMessage {
    fn encode(&self, writer: &mut WriteCursor) {
        self.from.encode(writer);
        self.packet.encode(writer);
    }

    fn decode(reader: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        Ok(Self {
            from: ActorId::decode(reader)?,
            packet: PacketTypeId::decode(reader)?,
        })
    }
}

impl Packet for UnhandledRequest {
    const NAME: &'static str = "courier.UnhandledRequest";
}

impl Message for UnhandledRequest {
    const LOCAL_ONLY: bool = true;
}

impl Wire for UnhandledRequest {
    fn encode(&self, writer: &mut WriteCursor) {
        self.from.encode(writer);
        self.packet.encode(writer);
    }

    fn decode(reader: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        Ok(Self {
            from: ActorId::decode(reader)?,
            packet: PacketTypeId::decode(reader)?,
        })
    }
}

impl Packet for UnhandledRequestAnswer {
    const NAME: &'static str = "courier.UnhandledRequestAnswer";
}

impl Message for UnhandledRequestAnswer {
    const LOCAL_ONLY: bool = true;
}

impl Wire for UnhandledRequestAnswer {
    fn encode(&self, writer: &mut WriteCursor) {
        self.from.encode(writer);
        self.request.encode(writer);
        self.kind.encode(writer);
    }

    fn decode(reader: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        Ok(Self {
            from: ActorId::decode(reader)?,
            request: RequestId::decode(reader)?,
            kind: FrameKind::decode(reader)?,
        })
    }
}

impl Packet for PeerConnected {
    const NAME: &'static str = "courier.PeerConnected";
}

impl Message for PeerConnected {
    const LOCAL_ONLY: bool = true;
}

impl Wire for PeerConnected {
    fn encode(&self, writer: &mut WriteCursor) {
        self.actor.encode(writer);
    }

    fn decode(reader: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        ActorId::decode(reader).map(|actor| Self { actor })
    }
}

impl Packet for PeerDisconnected {
    const NAME: &'static str = "courier.PeerDisconnected";
}

impl Message for PeerDisconnected {
    const LOCAL_ONLY: bool = true;
}

impl Wire for PeerDisconnected {
    fn encode(&self, writer: &mut WriteCursor) {
        self.actor.encode(writer);
        self.reason.encode(writer);
    }

    fn decode(reader: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        Ok(Self {
            actor: ActorId::decode(reader)?,
            reason: ConnectionFailure::decode(reader)?,
        })
    }
}
