//! In-process transport.
//!
//! Routes outbound frames between attached endpoints without sockets.
//! Endpoints are attached under the actor id their peers address them by,
//! and frames only flow across links opened with [`MemoryNetwork::connect`].
//!
//! Pumping is explicit ([`MemoryNetwork::pump`]) for deterministic tests,
//! or continuous on a background thread ([`MemoryNetwork::spawn`]).

use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use courier_core::QueueError;
use courier_shared::{ActorId, ConnectionFailure};
use crossbeam_channel::{bounded, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;

use super::{InboundEvent, OutboundFrame, TransportPort};

/// Transport statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Frames handed to a recipient's inbound queue.
    pub frames_delivered: u64,
    /// Bytes handed to recipients.
    pub bytes_delivered: u64,
    /// Frames addressed to [`ActorId::ALL`].
    pub broadcasts: u64,
    /// Frames with no reachable recipient, or refused by a full queue.
    pub frames_dropped: u64,
    /// Connection notifications delivered.
    pub notifications: u64,
}

struct Attached {
    actor: ActorId,
    port: TransportPort,
}

/// How long an idle pump thread waits before polling again.
pub const IDLE_WAIT: Duration = Duration::from_micros(200);

/// A switchboard for endpoints living in one process.
pub struct MemoryNetwork {
    endpoints: Vec<Attached>,
    links: BTreeSet<(ActorId, ActorId)>,
    stats: Arc<Mutex<TransportStats>>,
}

impl MemoryNetwork {
    /// Creates an empty network.
    #[must_use]
    pub fn new() -> Self {
        Self {
            endpoints: Vec::new(),
            links: BTreeSet::new(),
            stats: Arc::new(Mutex::new(TransportStats::default())),
        }
    }

    /// Attaches an endpoint under `actor`. Replaces any previous endpoint
    /// with the same id.
    pub fn attach(&mut self, actor: ActorId, port: TransportPort) {
        self.endpoints.retain(|attached| attached.actor != actor);
        self.endpoints.push(Attached { actor, port });
    }

    /// Removes an endpoint, disconnecting every link it had.
    pub fn detach(&mut self, actor: ActorId, reason: ConnectionFailure) {
        let peers: Vec<ActorId> = self.peers_of(actor).collect();
        for peer in peers {
            self.disconnect(actor, peer, reason);
        }
        self.endpoints.retain(|attached| attached.actor != actor);
    }

    /// Opens a link and tells both ends about each other.
    ///
    /// Returns false if either end is not attached or the link exists.
    pub fn connect(&mut self, a: ActorId, b: ActorId) -> bool {
        if a == b || self.find(a).is_none() || self.find(b).is_none() {
            return false;
        }
        if !self.links.insert(Self::link(a, b)) {
            return false;
        }
        self.notify(a, InboundEvent::PeerConnected(b));
        self.notify(b, InboundEvent::PeerConnected(a));
        self.refresh_connected(a);
        self.refresh_connected(b);
        tracing::debug!("memory link up: {} <-> {}", a, b);
        true
    }

    /// Links `hub` to every other attached endpoint.
    pub fn connect_star(&mut self, hub: ActorId) {
        let spokes: Vec<ActorId> = self
            .endpoints
            .iter()
            .map(|attached| attached.actor)
            .filter(|actor| *actor != hub)
            .collect();
        for spoke in spokes {
            self.connect(hub, spoke);
        }
    }

    /// Closes a link and tells both ends why.
    ///
    /// Returns false if the link did not exist.
    pub fn disconnect(&mut self, a: ActorId, b: ActorId, reason: ConnectionFailure) -> bool {
        if !self.links.remove(&Self::link(a, b)) {
            return false;
        }
        self.notify(a, InboundEvent::PeerDisconnected(b, reason));
        self.notify(b, InboundEvent::PeerDisconnected(a, reason));
        self.refresh_connected(a);
        self.refresh_connected(b);
        tracing::debug!("memory link down: {} <-> {} ({})", a, b, reason);
        true
    }

    /// True if `a` and `b` are linked.
    #[must_use]
    pub fn is_linked(&self, a: ActorId, b: ActorId) -> bool {
        self.links.contains(&Self::link(a, b))
    }

    /// Asks the dispatcher behind `actor` to terminate.
    pub fn request_terminate(&self, actor: ActorId) -> bool {
        if let Some(attached) = self.find(actor) {
            attached.port.flags.request_terminate();
            true
        } else {
            false
        }
    }

    /// Routes every frame currently queued by every endpoint.
    ///
    /// Returns the number of outbound frames taken.
    pub fn pump(&self) -> usize {
        let mut taken = 0;
        for attached in &self.endpoints {
            let budget = attached.port.outbound.len();
            for _ in 0..budget {
                let Some(frame) = attached.port.next_outbound() else {
                    break;
                };
                self.route(attached.actor, frame);
                taken += 1;
            }
        }
        taken
    }

    /// Pumps until no endpoint has anything queued, or `rounds` pumps ran.
    pub fn pump_until_idle(&self, rounds: usize) -> usize {
        let mut total = 0;
        for _ in 0..rounds {
            let taken = self.pump();
            if taken == 0 {
                break;
            }
            total += taken;
        }
        total
    }

    /// A snapshot of the statistics.
    #[must_use]
    pub fn stats(&self) -> TransportStats {
        *self.stats.lock()
    }

    /// Moves the network onto a background thread that pumps continuously.
    ///
    /// The thread parks for [`IDLE_WAIT`] whenever a pump finds nothing
    /// queued, and wakes at once when stopped.
    #[must_use]
    pub fn spawn(self) -> MemoryNetworkThread {
        let (shutdown, stop) = bounded::<()>(1);
        let stats = Arc::clone(&self.stats);

        let handle = thread::spawn(move || {
            loop {
                // A message or a dropped sender both mean stop
                let stopped = if self.pump() == 0 {
                    !matches!(stop.recv_timeout(IDLE_WAIT), Err(RecvTimeoutError::Timeout))
                } else {
                    !matches!(stop.try_recv(), Err(TryRecvError::Empty))
                };
                if stopped {
                    break;
                }
            }
            self
        });

        MemoryNetworkThread {
            handle: Some(handle),
            shutdown: Some(shutdown),
            stats,
        }
    }

    fn route(&self, from: ActorId, frame: OutboundFrame) {
        if frame.to == ActorId::ALL {
            self.stats.lock().broadcasts += 1;
            let peers: Vec<ActorId> = self.peers_of(from).collect();
            for peer in peers {
                self.deliver(from, peer, frame.bytes.clone());
            }
        } else if self.is_linked(from, frame.to) {
            self.deliver(from, frame.to, frame.bytes);
        } else {
            tracing::debug!("no link {} -> {}, frame dropped", from, frame.to);
            self.stats.lock().frames_dropped += 1;
        }
    }

    fn deliver(&self, from: ActorId, to: ActorId, bytes: Vec<u8>) {
        let Some(target) = self.find(to) else {
            self.stats.lock().frames_dropped += 1;
            return;
        };
        let len = bytes.len() as u64;
        match target.port.deliver(from, bytes) {
            Ok(()) => {
                let mut stats = self.stats.lock();
                stats.frames_delivered += 1;
                stats.bytes_delivered += len;
            }
            Err(QueueError::Full(_) | QueueError::Disconnected(_)) => {
                tracing::warn!("inbound queue of {} refused a frame from {}", to, from);
                self.stats.lock().frames_dropped += 1;
            }
        }
    }

    fn notify(&self, to: ActorId, event: InboundEvent) {
        if let Some(target) = self.find(to) {
            if target.port.inbound.try_push(event).is_ok() {
                self.stats.lock().notifications += 1;
            } else {
                tracing::warn!("inbound queue of {} refused a notification", to);
            }
        }
    }

    fn refresh_connected(&self, actor: ActorId) {
        if let Some(attached) = self.find(actor) {
            let connected = self.peers_of(actor).next().is_some();
            attached.port.flags.set_connected(connected);
        }
    }

    fn find(&self, actor: ActorId) -> Option<&Attached> {
        self.endpoints.iter().find(|attached| attached.actor == actor)
    }

    fn peers_of(&self, actor: ActorId) -> impl Iterator<Item = ActorId> + '_ {
        self.links.iter().filter_map(move |&(a, b)| {
            if a == actor {
                Some(b)
            } else if b == actor {
                Some(a)
            } else {
                None
            }
        })
    }

    const fn link(a: ActorId, b: ActorId) -> (ActorId, ActorId) {
        if a.0 <= b.0 {
            (a, b)
        } else {
            (b, a)
        }
    }
}

impl Default for MemoryNetwork {
    fn default() -> Self {
        Self::new()
    }
}

/// A [`MemoryNetwork`] pumping on its own thread.
pub struct MemoryNetworkThread {
    handle: Option<JoinHandle<MemoryNetwork>>,
    shutdown: Option<Sender<()>>,
    stats: Arc<Mutex<TransportStats>>,
}

impl MemoryNetworkThread {
    /// A snapshot of the statistics.
    #[must_use]
    pub fn stats(&self) -> TransportStats {
        *self.stats.lock()
    }

    /// Stops pumping and hands the network back.
    ///
    /// Returns `None` if the pump thread panicked.
    pub fn stop(mut self) -> Option<MemoryNetwork> {
        self.signal_stop();
        self.handle.take().and_then(|handle| handle.join().ok())
    }

    fn signal_stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.try_send(());
        }
    }
}

impl Drop for MemoryNetworkThread {
    fn drop(&mut self) {
        self.signal_stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
