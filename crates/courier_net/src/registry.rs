//! # Packet Registry
//!
//! The schema table both peers are built with. Maps a [`PacketTypeId`] to
//! the name, kind and required credentials of one concrete packet type.
//!
//! Built once before the dispatcher starts and never modified afterwards.
//! Type ids are hashes, so collisions are possible in principle: they are
//! rejected here, at registration time, never resolved while running.

use std::collections::HashMap;

use courier_shared::{
    CollectionAdd, CollectionClear, CollectionClosed, CollectionRemove, LeaveCollection, Message,
    ObserveCollection, Packet, PacketTypeId, PeerConnected, PeerDisconnected, Request,
    ResolveCollection, UnhandledMessage, UnhandledRequest, UnhandledRequestAnswer,
};

use crate::error::{ProtocolError, ProtocolResult};

/// What kind of packet a schema describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchemaKind {
    /// Fire-and-forget message.
    Message {
        /// Never crosses the wire.
        local_only: bool,
    },
    /// Request with one terminal reply.
    Request {
        /// Tokens the sender must hold.
        required: &'static [&'static str],
    },
}

/// One registered packet type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacketSchema {
    /// Fully-qualified name.
    pub name: &'static str,
    /// Message or request.
    pub kind: SchemaKind,
}

impl PacketSchema {
    /// True for local bookkeeping messages.
    #[inline]
    #[must_use]
    pub const fn is_local_only(&self) -> bool {
        matches!(self.kind, SchemaKind::Message { local_only: true })
    }

    /// True for request schemas.
    #[inline]
    #[must_use]
    pub const fn is_request(&self) -> bool {
        matches!(self.kind, SchemaKind::Request { .. })
    }

    /// Credentials a request requires. Empty for messages.
    #[must_use]
    pub const fn required_credentials(&self) -> &'static [&'static str] {
        match self.kind {
            SchemaKind::Request { required } => required,
            SchemaKind::Message { .. } => &[],
        }
    }
}

/// Type id → schema.
///
/// # Example
///
/// ```rust,ignore
/// let mut registry = PacketRegistry::new();
/// registry.register_message::<Ping>()?;
/// registry.register_request::<AdminRights>()?;
/// ```
#[derive(Clone, Debug)]
pub struct PacketRegistry {
    schemas: HashMap<PacketTypeId, PacketSchema>,
}

impl PacketRegistry {
    /// Creates a registry holding the bookkeeping and collection packets.
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self {
            schemas: HashMap::new(),
        };
        registry.insert_builtin::<UnhandledMessage>();
        registry.insert_builtin::<UnhandledRequest>();
        registry.insert_builtin::<UnhandledRequestAnswer>();
        registry.insert_builtin::<PeerConnected>();
        registry.insert_builtin::<PeerDisconnected>();
        registry.insert_builtin::<LeaveCollection>();
        registry.insert_builtin::<CollectionAdd>();
        registry.insert_builtin::<CollectionRemove>();
        registry.insert_builtin::<CollectionClear>();
        registry.insert_builtin::<CollectionClosed>();
        registry.insert_request_builtin::<ResolveCollection>();
        registry.insert_request_builtin::<ObserveCollection>();
        registry
    }

    fn insert_builtin<M: Message>(&mut self) {
        self.schemas.insert(
            M::TYPE_ID,
            PacketSchema {
                name: M::NAME,
                kind: SchemaKind::Message {
                    local_only: M::LOCAL_ONLY,
                },
            },
        );
    }

    fn insert_request_builtin<R: Request>(&mut self) {
        self.schemas.insert(
            R::TYPE_ID,
            PacketSchema {
                name: R::NAME,
                kind: SchemaKind::Request {
                    required: R::REQUIRED_CREDENTIALS,
                },
            },
        );
    }

    /// Registers a message type.
    ///
    /// Registering the same type twice is harmless. A different name with
    /// the same type id is a [`ProtocolError::TypeIdCollision`].
    pub fn register_message<M: Message>(&mut self) -> ProtocolResult<()> {
        self.insert(
            M::TYPE_ID,
            PacketSchema {
                name: M::NAME,
                kind: SchemaKind::Message {
                    local_only: M::LOCAL_ONLY,
                },
            },
        )
    }

    /// Registers a request type, copying its required credentials.
    pub fn register_request<R: Request>(&mut self) -> ProtocolResult<()> {
        self.insert(
            R::TYPE_ID,
            PacketSchema {
                name: R::NAME,
                kind: SchemaKind::Request {
                    required: R::REQUIRED_CREDENTIALS,
                },
            },
        )
    }

    fn insert(&mut self, packet: PacketTypeId, schema: PacketSchema) -> ProtocolResult<()> {
        match self.schemas.get(&packet) {
            Some(existing) if *existing != schema => Err(ProtocolError::TypeIdCollision {
                packet,
                first: existing.name,
                second: schema.name,
            }),
            Some(_) => Ok(()),
            None => {
                self.schemas.insert(packet, schema);
                Ok(())
            }
        }
    }

    /// Looks up a schema by type id.
    #[inline]
    #[must_use]
    pub fn get(&self, packet: PacketTypeId) -> Option<&PacketSchema> {
        self.schemas.get(&packet)
    }

    /// True if the type id is known.
    #[inline]
    #[must_use]
    pub fn contains(&self, packet: PacketTypeId) -> bool {
        self.schemas.contains_key(&packet)
    }

    /// Checks that `P` is registered under its own name.
    pub fn expect<P: Packet>(&self) -> ProtocolResult<&PacketSchema> {
        self.schemas
            .get(&P::TYPE_ID)
            .filter(|schema| schema.name == P::NAME)
            .ok_or(ProtocolError::UnregisteredPacket { name: P::NAME })
    }

    /// Number of registered types, built-ins included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Always false: the built-ins are registered on construction.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

impl Default for PacketRegistry {
    fn default() -> Self {
        Self::new()
    }
}
