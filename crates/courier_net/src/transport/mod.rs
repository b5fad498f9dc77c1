//! # Transport Contract
//!
//! The dispatcher never touches a socket. It talks to whatever transport
//! sits on the other thread through two bounded queues and three flags.
//!
//! ```text
//! ┌──────────────────────┐   InboundEvent    ┌──────────────────────┐
//! │  TRANSPORT THREAD    │ ────────────────► │  PROCESSING THREAD   │
//! │  (TransportPort)     │                   │  (DispatcherPort)    │
//! │                      │ ◄──────────────── │  Dispatcher, handlers│
//! └──────────────────────┘   OutboundFrame   └──────────────────────┘
//!            │                                          │
//!            └──────────── Arc<LinkFlags> ──────────────┘
//!                 running / connected / terminate_requested
//! ```
//!
//! Neither side ever blocks on the other.

mod memory;

pub use memory::{MemoryNetwork, MemoryNetworkThread, TransportStats, IDLE_WAIT};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use courier_core::sync::{channel, Consumer, Producer, QueueError};
use courier_shared::{ActorId, ConnectionFailure};

use crate::config::CourierConfig;

/// Something the transport hands to the processing side.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundEvent {
    /// A frame from a peer.
    Frame {
        /// Sender.
        from: ActorId,
        /// The frame bytes.
        bytes: Vec<u8>,
    },
    /// A peer came up.
    PeerConnected(ActorId),
    /// A peer went away.
    PeerDisconnected(ActorId, ConnectionFailure),
}

/// A frame for the transport to deliver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundFrame {
    /// Destination. May be [`ActorId::ALL`].
    pub to: ActorId,
    /// The frame bytes.
    pub bytes: Vec<u8>,
}

/// Flags shared by both sides of an endpoint.
#[derive(Debug, Default)]
pub struct LinkFlags {
    running: AtomicBool,
    connected: AtomicBool,
    terminate_requested: AtomicBool,
}

impl LinkFlags {
    /// True while a dispatcher owns the processing side.
    #[inline]
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Set by the processing side.
    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    /// True while the transport has at least one live peer.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Set by the transport side.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    /// Asks the processing side to terminate on its next poll.
    pub fn request_terminate(&self) {
        self.terminate_requested.store(true, Ordering::Release);
    }

    /// Clears and returns the terminate request.
    pub fn take_terminate_request(&self) -> bool {
        self.terminate_requested.swap(false, Ordering::AcqRel)
    }

    /// True if a terminate request is pending.
    #[must_use]
    pub fn is_terminate_requested(&self) -> bool {
        self.terminate_requested.load(Ordering::Acquire)
    }
}

/// The processing side's half of an endpoint.
#[derive(Debug)]
pub struct DispatcherPort {
    /// Transport → processing.
    pub inbound: Consumer<InboundEvent>,
    /// Processing → transport.
    pub outbound: Producer<OutboundFrame>,
    /// Shared flags.
    pub flags: Arc<LinkFlags>,
}

/// The transport side's half of an endpoint.
#[derive(Debug)]
pub struct TransportPort {
    /// Transport → processing.
    pub inbound: Producer<InboundEvent>,
    /// Processing → transport.
    pub outbound: Consumer<OutboundFrame>,
    /// Shared flags.
    pub flags: Arc<LinkFlags>,
}

impl TransportPort {
    /// Hands a received frame to the processing side.
    pub fn deliver(&self, from: ActorId, bytes: Vec<u8>) -> Result<(), QueueError<InboundEvent>> {
        self.inbound.try_push(InboundEvent::Frame { from, bytes })
    }

    /// Reports a new peer.
    pub fn peer_connected(&self, actor: ActorId) -> Result<(), QueueError<InboundEvent>> {
        self.inbound.try_push(InboundEvent::PeerConnected(actor))
    }

    /// Reports a lost peer.
    pub fn peer_disconnected(
        &self,
        actor: ActorId,
        reason: ConnectionFailure,
    ) -> Result<(), QueueError<InboundEvent>> {
        self.inbound
            .try_push(InboundEvent::PeerDisconnected(actor, reason))
    }

    /// Takes the next frame to send, if any.
    #[inline]
    pub fn next_outbound(&self) -> Option<OutboundFrame> {
        self.outbound.try_pop()
    }
}

/// Creates a connected port pair sized by `config`.
#[must_use]
pub fn endpoint(config: &CourierConfig) -> (DispatcherPort, TransportPort) {
    let (inbound_tx, inbound_rx) = channel(config.inbound_capacity.max(1));
    let (outbound_tx, outbound_rx) = channel(config.outbound_capacity.max(1));
    let flags = Arc::new(LinkFlags::default());

    (
        DispatcherPort {
            inbound: inbound_rx,
            outbound: outbound_tx,
            flags: Arc::clone(&flags),
        },
        TransportPort {
            inbound: inbound_tx,
            outbound: outbound_rx,
            flags,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_pair_is_connected() {
        let (dispatcher, transport) = endpoint(&CourierConfig::default());

        transport.deliver(ActorId::SERVER, vec![1, 2, 3]).unwrap();
        transport.peer_connected(ActorId::dynamic(0)).unwrap();
        assert_eq!(
            dispatcher.inbound.try_pop(),
            Some(InboundEvent::Frame {
                from: ActorId::SERVER,
                bytes: vec![1, 2, 3]
            })
        );
        assert_eq!(
            dispatcher.inbound.try_pop(),
            Some(InboundEvent::PeerConnected(ActorId::dynamic(0)))
        );

        dispatcher
            .outbound
            .try_push(OutboundFrame {
                to: ActorId::ALL,
                bytes: vec![9],
            })
            .unwrap();
        assert_eq!(transport.next_outbound().unwrap().to, ActorId::ALL);
        assert!(transport.next_outbound().is_none());
    }

    #[test]
    fn test_flags_shared() {
        let (dispatcher, transport) = endpoint(&CourierConfig::default());
        transport.flags.request_terminate();
        assert!(dispatcher.flags.is_terminate_requested());
        assert!(dispatcher.flags.take_terminate_request());
        assert!(!dispatcher.flags.take_terminate_request());

        transport.flags.set_connected(true);
        assert!(dispatcher.flags.is_connected());
    }

    #[test]
    fn test_full_inbound_returns_event() {
        let config = CourierConfig {
            inbound_capacity: 1,
            ..CourierConfig::default()
        };
        let (_dispatcher, transport) = endpoint(&config);
        transport.peer_connected(ActorId::SERVER).unwrap();
        let rejected = transport.peer_connected(ActorId::SERVER).unwrap_err();
        assert_eq!(rejected.into_inner(), InboundEvent::PeerConnected(ActorId::SERVER));
    }
}
