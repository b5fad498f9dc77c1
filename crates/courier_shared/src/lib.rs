//! # Courier Shared
//!
//! Protocol types both ends of a connection agree on.
//!
//! ## CRITICAL RULE
//!
//! This crate must NEVER depend on:
//! - the transport
//! - dispatcher state (registries, pending requests, watches)
//!
//! If you need either, put it in `courier_net`.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod collection;
pub mod constants;
pub mod events;
pub mod frame;
pub mod protocol;

pub use collection::{
    CollectionAdd, CollectionClear, CollectionClosed, CollectionRemove, CollectionSnapshot,
    JoinRejection, LeaveCollection, ObserveCollection, ResolveCollection,
};
pub use events::{
    is_bookkeeping, PeerConnected, PeerDisconnected, UnhandledMessage, UnhandledRequest,
    UnhandledRequestAnswer,
};
pub use frame::{FrameHeader, FrameKind};
pub use protocol::{
    ActorId, CollectionId, ConnectionFailure, Credential, Message, MissingCredentials, Packet,
    PacketTypeId, Request, RequestId,
};
