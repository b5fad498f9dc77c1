//! Packets and helpers shared by the integration tests.

#![allow(dead_code)]

use courier_core::{DecodeError, DecodeResult, ReadCursor, Wire, WriteCursor};
use courier_net::{endpoint, CourierConfig, Dispatcher, MemoryNetwork, PacketRegistry};
use courier_shared::{ActorId, Message, Packet, Request};

/// Liveness probe with no payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ping;

impl Wire for Ping {
    fn encode(&self, _writer: &mut WriteCursor) {}
    fn decode(_reader: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        Ok(Self)
    }
}
impl Packet for Ping {
    const NAME: &'static str = "demo.Ping";
}
impl Request for Ping {
    type Answer = ();
    type Failure = ();
}

/// Asks for the `admin` credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminRights {
    pub password: String,
}

/// Why [`AdminRights`] was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminRightsFailure {
    WrongPassword,
}

impl std::fmt::Display for AdminRightsFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WrongPassword => f.write_str("wrong_password"),
        }
    }
}

impl Wire for AdminRights {
    fn encode(&self, writer: &mut WriteCursor) {
        self.password.encode(writer);
    }
    fn decode(reader: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        String::decode(reader).map(|password| Self { password })
    }
}
impl Wire for AdminRightsFailure {
    fn encode(&self, writer: &mut WriteCursor) {
        writer.write_u8(0);
    }
    fn decode(reader: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        match reader.read_u8()? {
            0 => Ok(Self::WrongPassword),
            tag => Err(DecodeError::InvalidTag {
                tag: u32::from(tag),
                what: "AdminRightsFailure",
            }),
        }
    }
}
impl Packet for AdminRights {
    const NAME: &'static str = "demo.AdminRights";
}
impl Request for AdminRights {
    type Answer = ();
    type Failure = AdminRightsFailure;
}

/// Only admins may shut the server down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shutdown;

impl Wire for Shutdown {
    fn encode(&self, _writer: &mut WriteCursor) {}
    fn decode(_reader: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        Ok(Self)
    }
}
impl Packet for Shutdown {
    const NAME: &'static str = "demo.Shutdown";
}
impl Request for Shutdown {
    type Answer = ();
    type Failure = ();
    const REQUIRED_CREDENTIALS: &'static [&'static str] = &["admin"];
}

/// A line of chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chat {
    pub text: String,
}

impl Wire for Chat {
    fn encode(&self, writer: &mut WriteCursor) {
        self.text.encode(writer);
    }
    fn decode(reader: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        String::decode(reader).map(|text| Self { text })
    }
}
impl Packet for Chat {
    const NAME: &'static str = "demo.Chat";
}
impl Message for Chat {}

/// The schema table every test node shares.
pub fn registry() -> PacketRegistry {
    let mut registry = PacketRegistry::new();
    registry.register_request::<Ping>().unwrap();
    registry.register_request::<AdminRights>().unwrap();
    registry.register_request::<Shutdown>().unwrap();
    registry.register_message::<Chat>().unwrap();
    registry
}

/// Creates a dispatcher attached to `network` under `actor`.
pub fn node(network: &mut MemoryNetwork, actor: ActorId) -> Dispatcher {
    let config = CourierConfig::default();
    let (port, transport) = endpoint(&config);
    network.attach(actor, transport);
    Dispatcher::new(&config, registry(), port).unwrap()
}

/// Alternates processing and pumping until nothing moves.
pub fn settle(network: &MemoryNetwork, nodes: &[&Dispatcher]) {
    for _ in 0..64 {
        let mut moved = network.pump();
        for node in nodes {
            moved += node.process_packets().unwrap();
        }
        if moved == 0 {
            return;
        }
    }
    panic!("network did not settle");
}
