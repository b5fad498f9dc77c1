//! # Dispatcher
//!
//! The processing-side core: correlates requests with their terminal
//! replies, fans messages out to watchers and gates requests behind the
//! sender's credentials.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         DISPATCHER                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │  send_message / send_request ──► loopback (SELF) | outbound  │
//! │                                                              │
//! │  process_packets():                                          │
//! │    loopback + inbound (bounded to what was queued at start)  │
//! │      message  ──► watchers[type]        (0..n)               │
//! │      request  ──► credential gate ──► responder[type] (0..1) │
//! │      terminal ──► pending[request id]   (then freed)         │
//! │                                                              │
//! │  Nothing here ever blocks. Handlers run only inside          │
//! │  process_packets().                                          │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Ownership
//!
//! Watches and pending requests are owned by the caller through RAII
//! handles ([`WatchHandle`], [`PendingRequest`]). Handles carry a serial
//! that is never reused, so dropping a stale handle can never remove a
//! newer registration that happens to share its request id.
//!
//! The dispatcher is single-threaded (`!Send`). Clones share one state.

mod handles;
mod outcome;
mod responder;

pub use handles::{PendingRequest, WatchHandle};
pub use outcome::RequestOutcome;
pub use responder::Responder;

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::sync::Arc;

use courier_core::{
    from_bytes, to_bytes, DecodeError, DecodeResult, IdPool, QueueError, ReadCursor, Wire,
};
use courier_shared::{
    is_bookkeeping, ActorId, ConnectionFailure, Credential, FrameHeader, FrameKind, Message,
    MissingCredentials, PacketTypeId, PeerConnected, PeerDisconnected, Request, RequestId,
    UnhandledMessage, UnhandledRequest, UnhandledRequestAnswer,
};

use crate::config::{ConfigResult, CourierConfig};
use crate::credentials::{CredentialList, CredentialStore, ImplicationTable};
use crate::error::{ProtocolError, ProtocolResult};
use crate::registry::PacketRegistry;
use crate::transport::{DispatcherPort, InboundEvent, LinkFlags, OutboundFrame};

use handles::WatchKind;
use outcome::Resolution;

type MessageFn = dyn FnMut(&Dispatcher, ActorId, &[u8]) -> DecodeResult<()>;
type RequestFn = dyn FnMut(&Dispatcher, ActorId, RequestId, &[u8]) -> DecodeResult<()>;
type ResolveFn = Box<dyn FnOnce(&Dispatcher, Resolution<'_>)>;

fn resolver<F>(resolve: F) -> ResolveFn
where
    F: FnOnce(&Dispatcher, Resolution<'_>) + 'static,
{
    Box::new(resolve)
}

struct MessageSlot {
    serial: u64,
    active: Cell<bool>,
    handler: RefCell<Box<MessageFn>>,
}

struct RequestSlot {
    serial: u64,
    handler: RefCell<Box<RequestFn>>,
}

struct PendingEntry {
    serial: u64,
    to: ActorId,
    name: &'static str,
    resolve: ResolveFn,
}

struct State {
    request_ids: IdPool,
    pending: HashMap<u16, PendingEntry>,
    message_watches: HashMap<PacketTypeId, Vec<Rc<MessageSlot>>>,
    request_watches: HashMap<PacketTypeId, Rc<RequestSlot>>,
    credentials: CredentialStore,
    loopback: VecDeque<Vec<u8>>,
    deferred: VecDeque<ProtocolError>,
    next_serial: u64,
    processing: bool,
    terminating: bool,
    terminate_deferred: bool,
}

impl State {
    fn next_serial(&mut self) -> u64 {
        self.next_serial += 1;
        self.next_serial
    }

    /// Removes every pending entry addressed to `actor`, oldest first.
    fn take_pending_for(&mut self, actor: Option<ActorId>) -> Vec<PendingEntry> {
        let ids: Vec<u16> = self
            .pending
            .iter()
            .filter(|(_, entry)| actor.map_or(true, |actor| entry.to == actor))
            .map(|(id, _)| *id)
            .collect();

        let mut taken: Vec<PendingEntry> = ids
            .into_iter()
            .filter_map(|id| {
                self.request_ids.free(id);
                self.pending.remove(&id)
            })
            .collect();
        taken.sort_by_key(|entry| entry.serial);
        taken
    }
}

pub(crate) struct Inner {
    registry: PacketRegistry,
    port: DispatcherPort,
    state: RefCell<State>,
}

impl Inner {
    /// Queues a frame for `to`: the loopback for [`ActorId::SELF`], the
    /// outbound queue for everyone else.
    fn route(&self, to: ActorId, bytes: Vec<u8>) -> ProtocolResult<()> {
        if to == ActorId::SELF {
            self.state.borrow_mut().loopback.push_back(bytes);
            return Ok(());
        }
        self.port
            .outbound
            .try_push(OutboundFrame { to, bytes })
            .map_err(|err| ProtocolError::OutboundQueue {
                to,
                reason: match err {
                    QueueError::Full(_) => "full",
                    QueueError::Disconnected(_) => "disconnected",
                },
            })
    }

    /// Records an error for the next `process_packets()` to return.
    fn defer(&self, err: ProtocolError) {
        self.state.borrow_mut().deferred.push_back(err);
    }

    fn is_pending(&self, id: RequestId, serial: u64) -> bool {
        self.state
            .borrow()
            .pending
            .get(&id.0)
            .is_some_and(|entry| entry.serial == serial)
    }

    fn cancel_request(&self, id: RequestId, serial: u64) -> bool {
        let removed = {
            let mut state = self.state.borrow_mut();
            let live = state
                .pending
                .get(&id.0)
                .is_some_and(|entry| entry.serial == serial);
            if live {
                state.request_ids.free(id.0);
                state.pending.remove(&id.0)
            } else {
                None
            }
        };

        match removed {
            Some(entry) => {
                tracing::debug!("{} {} to {} cancelled", entry.name, id, entry.to);
                // Handler dropped here, outside the state borrow
                drop(entry);
                true
            }
            None => false,
        }
    }

    fn is_watching(&self, kind: WatchKind, packet: PacketTypeId, serial: u64) -> bool {
        let state = self.state.borrow();
        match kind {
            WatchKind::Message => state
                .message_watches
                .get(&packet)
                .is_some_and(|slots| slots.iter().any(|slot| slot.serial == serial)),
            WatchKind::Request => state
                .request_watches
                .get(&packet)
                .is_some_and(|slot| slot.serial == serial),
        }
    }

    fn unwatch(&self, kind: WatchKind, packet: PacketTypeId, serial: u64) -> bool {
        let mut state = self.state.borrow_mut();
        match kind {
            WatchKind::Message => {
                let Some(slots) = state.message_watches.get_mut(&packet) else {
                    return false;
                };
                let Some(index) = slots.iter().position(|slot| slot.serial == serial) else {
                    return false;
                };
                let slot = slots.remove(index);
                slot.active.set(false);
                if slots.is_empty() {
                    state.message_watches.remove(&packet);
                }
                drop(state);
                drop(slot);
                true
            }
            WatchKind::Request => {
                let live = state
                    .request_watches
                    .get(&packet)
                    .is_some_and(|slot| slot.serial == serial);
                let slot = if live {
                    state.request_watches.remove(&packet)
                } else {
                    None
                };
                drop(state);
                slot.is_some()
            }
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.port.flags.set_running(false);
    }
}

/// Handle to the processing-side core. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Rc<Inner>,
}

impl Dispatcher {
    /// Creates a dispatcher over the processing half of an endpoint.
    pub fn new(
        config: &CourierConfig,
        registry: PacketRegistry,
        port: DispatcherPort,
    ) -> ConfigResult<Self> {
        config.validate()?;
        port.flags.set_running(true);

        let state = State {
            request_ids: IdPool::new(config.request_id_capacity),
            pending: HashMap::new(),
            message_watches: HashMap::new(),
            request_watches: HashMap::new(),
            credentials: CredentialStore::new(ImplicationTable::from_pairs(&config.implications)),
            loopback: VecDeque::new(),
            deferred: VecDeque::new(),
            next_serial: 0,
            processing: false,
            terminating: false,
            terminate_deferred: false,
        };

        Ok(Self {
            inner: Rc::new(Inner {
                registry,
                port,
                state: RefCell::new(state),
            }),
        })
    }

    // =========================================================================
    // SENDING
    // =========================================================================

    /// Sends a fire-and-forget message.
    ///
    /// `to` may be a peer, [`ActorId::ALL`] or [`ActorId::SELF`]. Messages
    /// to `SELF` are delivered by the next `process_packets()`.
    pub fn send_message<M: Message>(&self, to: ActorId, message: &M) -> ProtocolResult<()> {
        if to == ActorId::INVALID {
            return Err(ProtocolError::InvalidDestination(to));
        }
        self.inner.registry.expect::<M>()?;
        if M::LOCAL_ONLY && to != ActorId::SELF {
            return Err(ProtocolError::LocalOnlyPacket { name: M::NAME, to });
        }

        let bytes = FrameHeader::Message { packet: M::TYPE_ID }.frame(message);
        self.inner.route(to, bytes)
    }

    /// Sends a request. `handler` runs exactly once, inside a later
    /// `process_packets()`, with the request's outcome.
    ///
    /// Dropping the returned handle cancels the request: the handler is
    /// discarded and a late reply surfaces as [`UnhandledRequestAnswer`].
    ///
    /// Handlers run by [`terminate`](Self::terminate) cannot issue new
    /// requests: those fail with [`ProtocolError::Terminating`].
    pub fn send_request<R, F>(&self, to: ActorId, request: &R, handler: F) -> ProtocolResult<PendingRequest>
    where
        R: Request,
        F: FnOnce(&Self, RequestOutcome<R>) + 'static,
    {
        if to == ActorId::ALL || to == ActorId::INVALID {
            return Err(ProtocolError::InvalidDestination(to));
        }
        self.inner.registry.expect::<R>()?;

        let id = {
            let mut state = self.inner.state.borrow_mut();
            if state.terminating {
                tracing::debug!("{} to {} refused: terminating", R::NAME, to);
                return Err(ProtocolError::Terminating { name: R::NAME });
            }
            match state.request_ids.allocate() {
                Some(id) => id,
                None => {
                    let capacity = state.request_ids.capacity();
                    tracing::warn!("{} to {} refused: request ids exhausted", R::NAME, to);
                    return Err(ProtocolError::RequestIdsExhausted { capacity });
                }
            }
        };

        let header = FrameHeader::Request {
            packet: R::TYPE_ID,
            request: RequestId(id),
        };
        if let Err(err) = self.inner.route(to, header.frame(request)) {
            self.inner.state.borrow_mut().request_ids.free(id);
            return Err(err);
        }

        let serial = {
            let mut state = self.inner.state.borrow_mut();
            let serial = state.next_serial();
            state.pending.insert(
                id,
                PendingEntry {
                    serial,
                    to,
                    name: R::NAME,
                    resolve: resolver(move |dispatcher, resolution| {
                        handler(dispatcher, RequestOutcome::<R>::from_resolution(resolution));
                    }),
                },
            );
            serial
        };

        Ok(PendingRequest::new(Rc::downgrade(&self.inner), RequestId(id), serial))
    }

    // =========================================================================
    // WATCHING
    // =========================================================================

    /// Registers a handler for every message of type `M`.
    pub fn watch_message<M, F>(&self, mut handler: F) -> ProtocolResult<WatchHandle>
    where
        M: Message,
        F: FnMut(&Self, ActorId, M) + 'static,
    {
        self.inner.registry.expect::<M>()?;

        let erased: Box<MessageFn> = Box::new(move |dispatcher: &Self, from, payload: &[u8]| {
            let message = from_bytes::<M>(payload)?;
            handler(dispatcher, from, message);
            Ok(())
        });

        let serial = {
            let mut state = self.inner.state.borrow_mut();
            let serial = state.next_serial();
            state
                .message_watches
                .entry(M::TYPE_ID)
                .or_default()
                .push(Rc::new(MessageSlot {
                    serial,
                    active: Cell::new(true),
                    handler: RefCell::new(erased),
                }));
            serial
        };

        Ok(WatchHandle::new(
            Rc::downgrade(&self.inner),
            WatchKind::Message,
            M::TYPE_ID,
            serial,
        ))
    }

    /// Registers THE responder for requests of type `R`.
    ///
    /// Fails with [`ProtocolError::DuplicateResponder`] if one exists.
    pub fn watch_request<R, F>(&self, mut handler: F) -> ProtocolResult<WatchHandle>
    where
        R: Request,
        F: FnMut(&Self, ActorId, R, Responder<R>) + 'static,
    {
        self.inner.registry.expect::<R>()?;

        let erased: Box<RequestFn> =
            Box::new(move |dispatcher: &Self, from, request_id, payload: &[u8]| {
                let request = from_bytes::<R>(payload)?;
                let responder = Responder::new(Rc::downgrade(&dispatcher.inner), from, request_id);
                handler(dispatcher, from, request, responder);
                Ok(())
            });

        let serial = {
            let mut state = self.inner.state.borrow_mut();
            if state.request_watches.contains_key(&R::TYPE_ID) {
                return Err(ProtocolError::DuplicateResponder { name: R::NAME });
            }
            let serial = state.next_serial();
            state.request_watches.insert(
                R::TYPE_ID,
                Rc::new(RequestSlot {
                    serial,
                    handler: RefCell::new(erased),
                }),
            );
            serial
        };

        Ok(WatchHandle::new(
            Rc::downgrade(&self.inner),
            WatchKind::Request,
            R::TYPE_ID,
            serial,
        ))
    }

    // =========================================================================
    // CREDENTIALS
    // =========================================================================

    /// Grants `token` to `actor`. Returns false if already held.
    pub fn grant_credential(&self, actor: ActorId, token: impl Into<Credential>) -> bool {
        let token = token.into();
        tracing::debug!("granting {} to {}", token, actor);
        self.inner.state.borrow_mut().credentials.grant(actor, token)
    }

    /// Revokes `token` from `actor`. Returns false if not held.
    pub fn revoke_credential(&self, actor: ActorId, token: &str) -> bool {
        self.inner.state.borrow_mut().credentials.revoke(actor, token)
    }

    /// Tokens `actor` holds directly.
    #[must_use]
    pub fn credentials_of(&self, actor: ActorId) -> CredentialList {
        self.inner.state.borrow().credentials.list(actor)
    }

    // =========================================================================
    // PROCESSING
    // =========================================================================

    /// Runs every handler due, for the frames queued when the call starts.
    ///
    /// Returns the number of frames and transport events consumed. Stops
    /// at the first protocol error; frames after it stay queued. A call
    /// made from inside a handler does nothing.
    pub fn process_packets(&self) -> ProtocolResult<usize> {
        let (loopback_budget, deferred) = {
            let mut state = self.inner.state.borrow_mut();
            if state.processing {
                return Ok(0);
            }
            (state.loopback.len(), state.deferred.pop_front())
        };
        if let Some(err) = deferred {
            return Err(err);
        }
        if self.inner.port.flags.take_terminate_request() {
            tracing::info!("terminate requested by transport");
            self.terminate_now();
            return Ok(0);
        }

        let inbound_budget = self.inner.port.inbound.len();
        self.inner.state.borrow_mut().processing = true;
        let result = self.drain(loopback_budget, inbound_budget);

        let terminate = {
            let mut state = self.inner.state.borrow_mut();
            state.processing = false;
            std::mem::take(&mut state.terminate_deferred)
        };
        if terminate {
            self.terminate_now();
        }
        result
    }

    fn drain(&self, loopback_budget: usize, inbound_budget: usize) -> ProtocolResult<usize> {
        let mut handled = 0;
        for _ in 0..loopback_budget {
            let Some(bytes) = self.inner.state.borrow_mut().loopback.pop_front() else {
                break;
            };
            handled += 1;
            self.handle_frame(ActorId::SELF, &bytes)?;
        }
        for _ in 0..inbound_budget {
            let Some(event) = self.inner.port.inbound.try_pop() else {
                break;
            };
            handled += 1;
            self.handle_event(event)?;
        }
        Ok(handled)
    }

    /// Empties every registry, returning to the freshly-constructed state.
    ///
    /// Pending requests are resolved with
    /// `ConnectionFailed(Disconnected)` first. Called from inside a
    /// handler, the termination happens once processing finishes.
    pub fn terminate(&self) {
        {
            let mut state = self.inner.state.borrow_mut();
            if state.processing {
                state.terminate_deferred = true;
                return;
            }
        }
        self.terminate_now();
    }

    fn terminate_now(&self) {
        let orphaned = {
            let mut state = self.inner.state.borrow_mut();
            state.processing = true;
            state.terminating = true;
            state.take_pending_for(None)
        };
        for entry in orphaned {
            (entry.resolve)(self, Resolution::ConnectionFailed(ConnectionFailure::Disconnected));
        }

        let (pending, message_watches, request_watches) = {
            let mut state = self.inner.state.borrow_mut();
            state.request_ids.clear();
            state.credentials.clear();
            state.loopback.clear();
            state.deferred.clear();
            state.processing = false;
            state.terminating = false;
            state.terminate_deferred = false;
            for slot in state.message_watches.values().flatten() {
                slot.active.set(false);
            }
            (
                std::mem::take(&mut state.pending),
                std::mem::take(&mut state.message_watches),
                std::mem::take(&mut state.request_watches),
            )
        };
        // Handlers are dropped outside the state borrow
        drop((pending, message_watches, request_watches));
        tracing::info!("dispatcher terminated");
    }

    // =========================================================================
    // INBOUND
    // =========================================================================

    fn handle_event(&self, event: InboundEvent) -> ProtocolResult<()> {
        match event {
            InboundEvent::Frame { from, bytes } => self.handle_frame(from, &bytes),
            InboundEvent::PeerConnected(actor) => {
                tracing::info!("peer connected: {}", actor);
                self.dispatch_local(&PeerConnected { actor })
            }
            InboundEvent::PeerDisconnected(actor, reason) => {
                tracing::info!("peer disconnected: {} ({})", actor, reason);
                let orphaned = {
                    let mut state = self.inner.state.borrow_mut();
                    state.credentials.forget(actor);
                    state.take_pending_for(Some(actor))
                };
                for entry in orphaned {
                    (entry.resolve)(self, Resolution::ConnectionFailed(reason));
                }
                self.dispatch_local(&PeerDisconnected { actor, reason })
            }
        }
    }

    fn handle_frame(&self, from: ActorId, bytes: &[u8]) -> ProtocolResult<()> {
        let mut reader = ReadCursor::new(bytes);
        let header = FrameHeader::decode(&mut reader)
            .map_err(|source| ProtocolError::MalformedFrame { from, source })?;
        let payload = reader.rest();

        match header {
            FrameHeader::Message { packet } => self.deliver_message(from, packet, payload),
            FrameHeader::Request { packet, request } => {
                self.deliver_request(from, packet, request, payload)
            }
            FrameHeader::Terminal { kind, request } => {
                self.deliver_terminal(from, kind, request, payload)
            }
        }
    }

    /// Delivers a bookkeeping notification to local watchers.
    fn dispatch_local<M: Message>(&self, message: &M) -> ProtocolResult<()> {
        let bytes = to_bytes(message);
        self.deliver_message(ActorId::SELF, M::TYPE_ID, &bytes)
    }

    fn deliver_message(&self, from: ActorId, packet: PacketTypeId, payload: &[u8]) -> ProtocolResult<()> {
        let Some(schema) = self.inner.registry.get(packet).copied() else {
            tracing::error!("unknown message type {} from {}", packet, from);
            return Err(ProtocolError::UnknownPacketType { from, packet });
        };
        if schema.is_request() {
            return Err(ProtocolError::MalformedFrame {
                from,
                source: DecodeError::InvalidTag {
                    tag: packet.0,
                    what: "message type id",
                },
            });
        }
        if schema.is_local_only() && from != ActorId::SELF {
            tracing::warn!("dropped local-only {} sent by {}", schema.name, from);
            return Ok(());
        }

        let slots: Vec<Rc<MessageSlot>> = self
            .inner
            .state
            .borrow()
            .message_watches
            .get(&packet)
            .cloned()
            .unwrap_or_default();

        if slots.is_empty() {
            if is_bookkeeping(packet) {
                tracing::debug!("{} dropped, nobody watching", schema.name);
                return Ok(());
            }
            tracing::debug!("no watcher for {} from {}", schema.name, from);
            return self.dispatch_local(&UnhandledMessage { from, packet });
        }

        for slot in slots {
            if !slot.active.get() {
                continue;
            }
            let Ok(mut handler) = slot.handler.try_borrow_mut() else {
                continue;
            };
            (&mut **handler)(self, from, payload)
                .map_err(|source| ProtocolError::MalformedFrame { from, source })?;
        }
        Ok(())
    }

    fn deliver_request(
        &self,
        from: ActorId,
        packet: PacketTypeId,
        request: RequestId,
        payload: &[u8],
    ) -> ProtocolResult<()> {
        let Some(schema) = self.inner.registry.get(packet).copied() else {
            tracing::error!("unknown request type {} from {}", packet, from);
            self.reply_unhandled(from, request);
            return Err(ProtocolError::UnknownPacketType { from, packet });
        };
        if !schema.is_request() {
            self.reply_unhandled(from, request);
            return Err(ProtocolError::MalformedFrame {
                from,
                source: DecodeError::InvalidTag {
                    tag: packet.0,
                    what: "request type id",
                },
            });
        }

        let slot = self.inner.state.borrow().request_watches.get(&packet).cloned();
        let Some(slot) = slot else {
            tracing::debug!("no responder for {} from {}", schema.name, from);
            self.reply_unhandled(from, request);
            return self.dispatch_local(&UnhandledRequest { from, packet });
        };

        if from != ActorId::SELF {
            let missing = self
                .inner
                .state
                .borrow()
                .credentials
                .missing(from, schema.required_credentials());
            if !missing.is_empty() {
                tracing::debug!("{} from {} lacks {:?}", schema.name, from, missing);
                let header = FrameHeader::terminal(FrameKind::MissingCredentials, request);
                return self
                    .inner
                    .route(from, header.frame(&MissingCredentials(missing)));
            }
        }

        let Ok(mut handler) = slot.handler.try_borrow_mut() else {
            tracing::warn!("responder for {} is busy", schema.name);
            self.reply_unhandled(from, request);
            return Ok(());
        };
        if let Err(source) = (&mut **handler)(self, from, request, payload) {
            drop(handler);
            self.reply_unhandled(from, request);
            return Err(ProtocolError::MalformedFrame { from, source });
        }
        Ok(())
    }

    fn deliver_terminal(
        &self,
        from: ActorId,
        kind: FrameKind,
        request: RequestId,
        payload: &[u8],
    ) -> ProtocolResult<()> {
        let entry = {
            let mut state = self.inner.state.borrow_mut();
            let ours = state
                .pending
                .get(&request.0)
                .is_some_and(|entry| entry.to == from);
            if ours {
                state.request_ids.free(request.0);
                state.pending.remove(&request.0)
            } else {
                None
            }
        };

        match entry {
            Some(entry) => {
                (entry.resolve)(self, Resolution::Frame { kind, payload });
                Ok(())
            }
            None => {
                tracing::debug!("{} for {} from {} has no pending request", kind, request, from);
                self.dispatch_local(&UnhandledRequestAnswer {
                    from,
                    request,
                    kind,
                })
            }
        }
    }

    fn reply_unhandled(&self, to: ActorId, request: RequestId) {
        let header = FrameHeader::terminal(FrameKind::Unhandled, request);
        if let Err(err) = self.inner.route(to, header.frame(&())) {
            tracing::warn!("could not report unhandled {}: {}", request, err);
        }
    }

    // =========================================================================
    // INTROSPECTION
    // =========================================================================

    /// The schema table this dispatcher was built with.
    #[must_use]
    pub fn registry(&self) -> &PacketRegistry {
        &self.inner.registry
    }

    /// Flags shared with the transport.
    #[must_use]
    pub fn flags(&self) -> &Arc<LinkFlags> {
        &self.inner.port.flags
    }

    /// Requests awaiting a terminal reply.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.inner.state.borrow().pending.len()
    }

    /// Request ids currently allocated.
    #[must_use]
    pub fn request_ids_in_use(&self) -> usize {
        self.inner.state.borrow().request_ids.allocated_count()
    }

    /// Message handlers registered for `M`.
    #[must_use]
    pub fn message_watchers<M: Message>(&self) -> usize {
        self.inner
            .state
            .borrow()
            .message_watches
            .get(&M::TYPE_ID)
            .map_or(0, Vec::len)
    }

    /// True if a responder for `R` is registered.
    #[must_use]
    pub fn has_responder<R: Request>(&self) -> bool {
        self.inner
            .state
            .borrow()
            .request_watches
            .contains_key(&R::TYPE_ID)
    }

    /// True while `process_packets()` is running.
    #[must_use]
    pub fn is_processing(&self) -> bool {
        self.inner.state.borrow().processing
    }

    /// Frames sent to `SELF` and not yet processed.
    #[must_use]
    pub fn loopback_len(&self) -> usize {
        self.inner.state.borrow().loopback.len()
    }

    /// True if both handles drive the same dispatcher.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.try_borrow();
        let mut out = f.debug_struct("Dispatcher");
        if let Ok(state) = state {
            out.field("pending", &state.pending.len())
                .field("message_types", &state.message_watches.len())
                .field("responders", &state.request_watches.len())
                .field("loopback", &state.loopback.len());
        }
        out.finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests;
