//! # Protocol Error Types
//!
//! Programmer mistakes and boundary violations. Expected conditions
//! (a peer lacking credentials, nobody handling a request, a dropped
//! connection) are not errors: they arrive as
//! [`RequestOutcome`](crate::dispatcher::RequestOutcome) values.

use courier_core::DecodeError;
use courier_shared::{ActorId, PacketTypeId};
use thiserror::Error;

use crate::config::ConfigError;

/// Errors raised by the dispatcher and the collection layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A second responder was registered for a request type.
    #[error("request {name} already has a responder")]
    DuplicateResponder {
        /// Name of the request type.
        name: &'static str,
    },

    /// Every request id is in flight.
    #[error("request id space exhausted ({capacity} in flight)")]
    RequestIdsExhausted {
        /// Configured request id capacity.
        capacity: usize,
    },

    /// Every collection id is bound.
    #[error("collection id space exhausted ({capacity} bound)")]
    CollectionIdsExhausted {
        /// Configured collection id capacity.
        capacity: usize,
    },

    /// A peer sent a type id no schema is registered for.
    #[error("unknown packet type {packet} from {from}")]
    UnknownPacketType {
        /// Sender.
        from: ActorId,
        /// The unknown id.
        packet: PacketTypeId,
    },

    /// A packet type was used without being registered first.
    #[error("packet {name} is not registered")]
    UnregisteredPacket {
        /// Name of the packet type.
        name: &'static str,
    },

    /// Two packet names hash to the same type id.
    #[error("type id {packet} shared by {first} and {second}")]
    TypeIdCollision {
        /// The colliding id.
        packet: PacketTypeId,
        /// Name registered first.
        first: &'static str,
        /// Name that collided.
        second: &'static str,
    },

    /// A responder was dropped without answering.
    #[error("request {name} from {from} was never resolved")]
    UnresolvedRequest {
        /// Name of the request type.
        name: &'static str,
        /// Who sent it.
        from: ActorId,
    },

    /// A frame could not be decoded.
    #[error("malformed frame from {from}: {source}")]
    MalformedFrame {
        /// Sender.
        from: ActorId,
        /// Decoder failure.
        source: DecodeError,
    },

    /// A request was issued while the dispatcher was terminating.
    #[error("dispatcher is terminating, request {name} refused")]
    Terminating {
        /// Name of the request type.
        name: &'static str,
    },

    /// Requests need exactly one recipient.
    #[error("cannot send a request to {0}")]
    InvalidDestination(ActorId),

    /// Bookkeeping packets never leave the process.
    #[error("packet {name} is local only and cannot be sent to {to}")]
    LocalOnlyPacket {
        /// Name of the packet type.
        name: &'static str,
        /// Attempted destination.
        to: ActorId,
    },

    /// The outbound queue refused a frame.
    #[error("outbound queue {reason} while sending to {to}")]
    OutboundQueue {
        /// Destination of the dropped frame.
        to: ActorId,
        /// "full" or "disconnected".
        reason: &'static str,
    },

    /// A component was attached with an invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
