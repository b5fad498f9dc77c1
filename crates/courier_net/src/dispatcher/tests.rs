use std::cell::{Cell, RefCell};
use std::rc::Rc;

use courier_core::{to_bytes, DecodeResult, ReadCursor, Wire, WriteCursor};
use courier_shared::{
    ActorId, ConnectionFailure, Credential, FrameHeader, FrameKind, Message, MissingCredentials,
    Packet, PacketTypeId, Request, RequestId, UnhandledMessage, UnhandledRequest,
    UnhandledRequestAnswer,
};

use super::{Dispatcher, RequestOutcome};
use crate::config::CourierConfig;
use crate::error::ProtocolError;
use crate::registry::PacketRegistry;
use crate::transport::{endpoint, OutboundFrame, TransportPort};

// =============================================================================
// FIXTURES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ping(u32);

impl Wire for Ping {
    fn encode(&self, writer: &mut WriteCursor) {
        self.0.encode(writer);
    }
    fn decode(reader: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        u32::decode(reader).map(Self)
    }
}
impl Packet for Ping {
    const NAME: &'static str = "test.Ping";
}
impl Message for Ping {}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Echo(String);

impl Wire for Echo {
    fn encode(&self, writer: &mut WriteCursor) {
        self.0.encode(writer);
    }
    fn decode(reader: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        String::decode(reader).map(Self)
    }
}
impl Packet for Echo {
    const NAME: &'static str = "test.Echo";
}
impl Request for Echo {
    type Answer = String;
    type Failure = u8;
}

struct Shutdown;

impl Wire for Shutdown {
    fn encode(&self, _writer: &mut WriteCursor) {}
    fn decode(_reader: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        Ok(Self)
    }
}
impl Packet for Shutdown {
    const NAME: &'static str = "test.Shutdown";
}
impl Request for Shutdown {
    type Answer = ();
    type Failure = ();
    const REQUIRED_CREDENTIALS: &'static [&'static str] = &["admin"];
}

struct Unregistered;

impl Wire for Unregistered {
    fn encode(&self, _writer: &mut WriteCursor) {}
    fn decode(_reader: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        Ok(Self)
    }
}
impl Packet for Unregistered {
    const NAME: &'static str = "test.Unregistered";
}
impl Message for Unregistered {}

fn setup_with(config: &CourierConfig) -> (Dispatcher, TransportPort) {
    let (port, transport) = endpoint(config);
    let mut registry = PacketRegistry::new();
    registry.register_message::<Ping>().unwrap();
    registry.register_request::<Echo>().unwrap();
    registry.register_request::<Shutdown>().unwrap();
    (Dispatcher::new(config, registry, port).unwrap(), transport)
}

fn setup() -> (Dispatcher, TransportPort) {
    setup_with(&CourierConfig::default())
}

fn request_frame<R: Request>(id: u16, request: &R) -> Vec<u8> {
    FrameHeader::Request {
        packet: R::TYPE_ID,
        request: RequestId(id),
    }
    .frame(request)
}

fn terminal_frame<T: Wire>(kind: FrameKind, id: u16, payload: &T) -> Vec<u8> {
    FrameHeader::terminal(kind, RequestId(id)).frame(payload)
}

fn sent_header(frame: &OutboundFrame) -> FrameHeader {
    FrameHeader::decode(&mut ReadCursor::new(&frame.bytes)).unwrap()
}

type Outcomes = Rc<RefCell<Vec<RequestOutcome<Echo>>>>;

fn recorder() -> Outcomes {
    Rc::new(RefCell::new(Vec::new()))
}

fn record(outcomes: &Outcomes) -> impl FnOnce(&Dispatcher, RequestOutcome<Echo>) + 'static {
    let outcomes = Rc::clone(outcomes);
    move |_, outcome| outcomes.borrow_mut().push(outcome)
}

// =============================================================================
// MESSAGES
// =============================================================================

#[test]
fn test_loopback_message_waits_for_processing() {
    let (dispatcher, _transport) = setup();
    let seen = Rc::new(RefCell::new(Vec::new()));

    let log = Rc::clone(&seen);
    let _watch = dispatcher
        .watch_message(move |_, from, ping: Ping| log.borrow_mut().push((from, ping)))
        .unwrap();

    dispatcher.send_message(ActorId::SELF, &Ping(5)).unwrap();
    assert!(seen.borrow().is_empty());

    assert_eq!(dispatcher.process_packets().unwrap(), 1);
    assert_eq!(*seen.borrow(), vec![(ActorId::SELF, Ping(5))]);
}

#[test]
fn test_every_watcher_sees_message_in_order() {
    let (dispatcher, transport) = setup();
    let order = Rc::new(RefCell::new(Vec::new()));

    let first = Rc::clone(&order);
    let _a = dispatcher
        .watch_message(move |_, _, ping: Ping| first.borrow_mut().push(("a", ping.0)))
        .unwrap();
    let second = Rc::clone(&order);
    let _b = dispatcher
        .watch_message(move |_, _, ping: Ping| second.borrow_mut().push(("b", ping.0)))
        .unwrap();
    assert_eq!(dispatcher.message_watchers::<Ping>(), 2);

    let bytes = FrameHeader::Message { packet: Ping::TYPE_ID }.frame(&Ping(9));
    transport.deliver(ActorId::SERVER, bytes).unwrap();
    dispatcher.process_packets().unwrap();

    assert_eq!(*order.borrow(), vec![("a", 9), ("b", 9)]);
}

#[test]
fn test_dropping_watch_unregisters() {
    let (dispatcher, _transport) = setup();
    let hits = Rc::new(Cell::new(0));

    let counter = Rc::clone(&hits);
    let watch = dispatcher
        .watch_message(move |_, _, _: Ping| counter.set(counter.get() + 1))
        .unwrap();
    assert!(watch.is_active());

    dispatcher.send_message(ActorId::SELF, &Ping(1)).unwrap();
    dispatcher.process_packets().unwrap();
    drop(watch);
    dispatcher.send_message(ActorId::SELF, &Ping(2)).unwrap();
    dispatcher.process_packets().unwrap();

    assert_eq!(hits.get(), 1);
    assert_eq!(dispatcher.message_watchers::<Ping>(), 0);
}

#[test]
fn test_unhandled_message_notified_once() {
    let (dispatcher, transport) = setup();
    let notes = Rc::new(RefCell::new(Vec::new()));

    let log = Rc::clone(&notes);
    let _watch = dispatcher
        .watch_message(move |_, from, note: UnhandledMessage| log.borrow_mut().push((from, note)))
        .unwrap();

    let bytes = FrameHeader::Message { packet: Ping::TYPE_ID }.frame(&Ping(1));
    transport.deliver(ActorId::SERVER, bytes).unwrap();
    dispatcher.process_packets().unwrap();

    assert_eq!(
        *notes.borrow(),
        vec![(
            ActorId::SELF,
            UnhandledMessage {
                from: ActorId::SERVER,
                packet: Ping::TYPE_ID,
            }
        )]
    );
}

#[test]
fn test_unwatched_bookkeeping_is_dropped() {
    let (dispatcher, transport) = setup();
    let bytes = FrameHeader::Message { packet: Ping::TYPE_ID }.frame(&Ping(1));
    transport.deliver(ActorId::SERVER, bytes).unwrap();
    assert_eq!(dispatcher.process_packets(), Ok(1));
    assert!(transport.next_outbound().is_none());
}

#[test]
fn test_unknown_type_is_fatal() {
    let (dispatcher, transport) = setup();
    let bogus = PacketTypeId(0x1234_5678);
    let bytes = FrameHeader::Message { packet: bogus }.frame(&());
    transport.deliver(ActorId::SERVER, bytes).unwrap();

    assert_eq!(
        dispatcher.process_packets(),
        Err(ProtocolError::UnknownPacketType {
            from: ActorId::SERVER,
            packet: bogus,
        })
    );
}

#[test]
fn test_remote_local_only_dropped() {
    let (dispatcher, transport) = setup();
    let hits = Rc::new(Cell::new(0));
    let counter = Rc::clone(&hits);
    let _watch = dispatcher
        .watch_message(move |_, _, _: UnhandledMessage| counter.set(counter.get() + 1))
        .unwrap();

    let forged = UnhandledMessage {
        from: ActorId::SERVER,
        packet: Ping::TYPE_ID,
    };
    let bytes = FrameHeader::Message {
        packet: UnhandledMessage::TYPE_ID,
    }
    .frame(&forged);
    transport.deliver(ActorId::SERVER, bytes).unwrap();
    dispatcher.process_packets().unwrap();

    assert_eq!(hits.get(), 0);
}

#[test]
fn test_send_guards() {
    let (dispatcher, _transport) = setup();
    let note = UnhandledMessage {
        from: ActorId::SELF,
        packet: Ping::TYPE_ID,
    };

    assert_eq!(
        dispatcher.send_message(ActorId::SERVER, &note),
        Err(ProtocolError::LocalOnlyPacket {
            name: UnhandledMessage::NAME,
            to: ActorId::SERVER,
        })
    );
    assert!(dispatcher.send_message(ActorId::SELF, &note).is_ok());
    assert_eq!(
        dispatcher.send_message(ActorId::SERVER, &Unregistered),
        Err(ProtocolError::UnregisteredPacket {
            name: "test.Unregistered"
        })
    );
    assert_eq!(
        dispatcher.send_message(ActorId::INVALID, &Ping(0)),
        Err(ProtocolError::InvalidDestination(ActorId::INVALID))
    );
    assert!(dispatcher.watch_message(|_, _, _: Unregistered| {}).is_err());
}

#[test]
fn test_processing_bounded_to_queued_frames() {
    let (dispatcher, _transport) = setup();
    let hits = Rc::new(Cell::new(0));

    let counter = Rc::clone(&hits);
    let _watch = dispatcher
        .watch_message(move |d: &Dispatcher, _, ping: Ping| {
            counter.set(counter.get() + 1);
            d.send_message(ActorId::SELF, &Ping(ping.0 + 1)).unwrap();
        })
        .unwrap();

    dispatcher.send_message(ActorId::SELF, &Ping(0)).unwrap();
    assert_eq!(dispatcher.process_packets().unwrap(), 1);
    assert_eq!(dispatcher.process_packets().unwrap(), 1);
    assert_eq!(hits.get(), 2);
    assert_eq!(dispatcher.loopback_len(), 1);
}

// =============================================================================
// REQUESTS
// =============================================================================

#[test]
fn test_self_request_resolves_exactly_once() {
    let (dispatcher, _transport) = setup();
    let _responder = dispatcher
        .watch_request(|_, _, echo: Echo, responder| responder.answer(echo.0.to_uppercase()))
        .unwrap();

    let outcomes = recorder();
    let pending = dispatcher
        .send_request(ActorId::SELF, &Echo("ping".into()), record(&outcomes))
        .unwrap();
    assert!(pending.is_pending());

    dispatcher.process_packets().unwrap();
    dispatcher.process_packets().unwrap();
    dispatcher.process_packets().unwrap();

    assert!(!pending.is_pending());
    let outcomes = outcomes.borrow();
    assert_eq!(outcomes.len(), 1);
    assert!(matches!(&outcomes[0], RequestOutcome::Answered(text) if text == "PING"));
    assert_eq!(dispatcher.request_ids_in_use(), 0);
}

#[test]
fn test_duplicate_responder_rejected() {
    let (dispatcher, _transport) = setup();
    let first = dispatcher
        .watch_request(|_, _, _: Echo, responder| responder.unhandled())
        .unwrap();
    assert_eq!(
        dispatcher
            .watch_request(|_, _, _: Echo, responder| responder.unhandled())
            .unwrap_err(),
        ProtocolError::DuplicateResponder { name: "test.Echo" }
    );

    drop(first);
    assert!(!dispatcher.has_responder::<Echo>());
    assert!(dispatcher
        .watch_request(|_, _, _: Echo, responder| responder.unhandled())
        .is_ok());
}

#[test]
fn test_request_destinations() {
    let (dispatcher, _transport) = setup();
    for to in [ActorId::ALL, ActorId::INVALID] {
        assert_eq!(
            dispatcher
                .send_request(to, &Echo(String::new()), |_, _| {})
                .unwrap_err(),
            ProtocolError::InvalidDestination(to)
        );
    }
    assert_eq!(dispatcher.request_ids_in_use(), 0);
}

#[test]
fn test_request_ids_exhausted() {
    let config = CourierConfig::default().with_request_id_capacity(2);
    let (dispatcher, _transport) = setup_with(&config);

    let a = dispatcher
        .send_request(ActorId::SERVER, &Echo("a".into()), |_, _| {})
        .unwrap();
    let _b = dispatcher
        .send_request(ActorId::SERVER, &Echo("b".into()), |_, _| {})
        .unwrap();
    assert_eq!(
        dispatcher
            .send_request(ActorId::SERVER, &Echo("c".into()), |_, _| {})
            .unwrap_err(),
        ProtocolError::RequestIdsExhausted { capacity: 2 }
    );

    assert!(a.cancel());
    assert!(dispatcher
        .send_request(ActorId::SERVER, &Echo("d".into()), |_, _| {})
        .is_ok());
}

#[test]
fn test_unhandled_request_replies_and_notifies() {
    let (dispatcher, transport) = setup();
    let notes = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&notes);
    let _watch = dispatcher
        .watch_message(move |_, _, note: UnhandledRequest| log.borrow_mut().push(note))
        .unwrap();

    transport
        .deliver(ActorId::SERVER, request_frame(7, &Echo("x".into())))
        .unwrap();
    dispatcher.process_packets().unwrap();

    let reply = transport.next_outbound().unwrap();
    assert_eq!(reply.to, ActorId::SERVER);
    assert_eq!(
        sent_header(&reply),
        FrameHeader::terminal(FrameKind::Unhandled, RequestId(7))
    );
    assert_eq!(
        *notes.borrow(),
        vec![UnhandledRequest {
            from: ActorId::SERVER,
            packet: Echo::TYPE_ID,
        }]
    );
}

#[test]
fn test_credential_gate_blocks_then_admits() {
    let (dispatcher, transport) = setup();
    let runs = Rc::new(Cell::new(0));
    let counter = Rc::clone(&runs);
    let _responder = dispatcher
        .watch_request(move |_, _, _: Shutdown, responder| {
            counter.set(counter.get() + 1);
            responder.answer(());
        })
        .unwrap();

    let peer = ActorId::dynamic(3);
    transport.deliver(peer, request_frame(1, &Shutdown)).unwrap();
    dispatcher.process_packets().unwrap();

    assert_eq!(runs.get(), 0);
    let reply = transport.next_outbound().unwrap();
    let mut reader = ReadCursor::new(&reply.bytes);
    assert_eq!(
        FrameHeader::decode(&mut reader).unwrap(),
        FrameHeader::terminal(FrameKind::MissingCredentials, RequestId(1))
    );
    assert_eq!(
        MissingCredentials::decode(&mut reader).unwrap(),
        MissingCredentials(vec![Credential::from("admin")])
    );

    assert!(dispatcher.grant_credential(peer, "admin"));
    transport.deliver(peer, request_frame(2, &Shutdown)).unwrap();
    dispatcher.process_packets().unwrap();

    assert_eq!(runs.get(), 1);
    assert_eq!(
        sent_header(&transport.next_outbound().unwrap()),
        FrameHeader::terminal(FrameKind::Answer, RequestId(2))
    );
}

#[test]
fn test_self_bypasses_gate() {
    let (dispatcher, _transport) = setup();
    let _responder = dispatcher
        .watch_request(|_, _, _: Shutdown, responder| responder.answer(()))
        .unwrap();

    let answered = Rc::new(Cell::new(false));
    let flag = Rc::clone(&answered);
    dispatcher
        .send_request(ActorId::SELF, &Shutdown, move |_, outcome| {
            flag.set(!outcome.failed());
        })
        .unwrap()
        .detach();

    dispatcher.process_packets().unwrap();
    dispatcher.process_packets().unwrap();
    assert!(answered.get());
}

#[test]
fn test_implications_satisfy_gate() {
    let config = CourierConfig::default().with_implication("owner", "admin");
    let (dispatcher, transport) = setup_with(&config);
    let _responder = dispatcher
        .watch_request(|_, _, _: Shutdown, responder| responder.answer(()))
        .unwrap();

    let peer = ActorId::dynamic(0);
    dispatcher.grant_credential(peer, "owner");
    transport.deliver(peer, request_frame(4, &Shutdown)).unwrap();
    dispatcher.process_packets().unwrap();

    assert_eq!(
        sent_header(&transport.next_outbound().unwrap()),
        FrameHeader::terminal(FrameKind::Answer, RequestId(4))
    );
}

#[test]
fn test_cancelled_request_late_answer() {
    let (dispatcher, transport) = setup();
    let notes = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&notes);
    let _watch = dispatcher
        .watch_message(move |_, _, note: UnhandledRequestAnswer| log.borrow_mut().push(note))
        .unwrap();

    let outcomes = recorder();
    let pending = dispatcher
        .send_request(ActorId::SERVER, &Echo("late".into()), record(&outcomes))
        .unwrap();
    let id = pending.id();
    drop(pending);
    assert_eq!(dispatcher.pending_requests(), 0);

    transport
        .deliver(ActorId::SERVER, terminal_frame(FrameKind::Answer, id.0, &"hi".to_owned()))
        .unwrap();
    dispatcher.process_packets().unwrap();

    assert!(outcomes.borrow().is_empty());
    assert_eq!(
        *notes.borrow(),
        vec![UnhandledRequestAnswer {
            from: ActorId::SERVER,
            request: id,
            kind: FrameKind::Answer,
        }]
    );
}

#[test]
fn test_stale_handle_cannot_cancel_reused_id() {
    let config = CourierConfig::default().with_request_id_capacity(1);
    let (dispatcher, transport) = setup_with(&config);

    let first = dispatcher
        .send_request(ActorId::SERVER, &Echo("1".into()), |_, _| {})
        .unwrap();
    transport
        .deliver(ActorId::SERVER, terminal_frame(FrameKind::Unhandled, first.id().0, &()))
        .unwrap();
    dispatcher.process_packets().unwrap();
    assert!(!first.is_pending());

    let second = dispatcher
        .send_request(ActorId::SERVER, &Echo("2".into()), |_, _| {})
        .unwrap();
    assert_eq!(first.id(), second.id());

    drop(first);
    assert!(second.is_pending());
    assert_eq!(dispatcher.pending_requests(), 1);
}

#[test]
fn test_answer_from_other_peer_ignored() {
    let (dispatcher, transport) = setup();
    let outcomes = recorder();
    let pending = dispatcher
        .send_request(ActorId::SERVER, &Echo("q".into()), record(&outcomes))
        .unwrap();

    let intruder = ActorId::dynamic(9);
    transport
        .deliver(intruder, terminal_frame(FrameKind::Answer, pending.id().0, &"forged".to_owned()))
        .unwrap();
    dispatcher.process_packets().unwrap();

    assert!(outcomes.borrow().is_empty());
    assert!(pending.is_pending());
}

#[test]
fn test_peer_disconnect_fails_pending() {
    let (dispatcher, transport) = setup();
    let outcomes = recorder();
    let _pending = dispatcher
        .send_request(ActorId::SERVER, &Echo("q".into()), record(&outcomes))
        .unwrap();
    dispatcher.grant_credential(ActorId::SERVER, "admin");

    transport
        .peer_disconnected(ActorId::SERVER, ConnectionFailure::TimedOut)
        .unwrap();
    dispatcher.process_packets().unwrap();

    assert!(matches!(
        outcomes.borrow().as_slice(),
        [RequestOutcome::ConnectionFailed(ConnectionFailure::TimedOut)]
    ));
    assert!(dispatcher.credentials_of(ActorId::SERVER).is_empty());
    assert_eq!(dispatcher.request_ids_in_use(), 0);
}

#[test]
fn test_garbage_answer_resolves_unexpected_packet() {
    let (dispatcher, transport) = setup();
    let outcomes = recorder();
    let pending = dispatcher
        .send_request(ActorId::SERVER, &Echo("q".into()), record(&outcomes))
        .unwrap();

    // Claims a 255-byte string, carries none of it
    transport
        .deliver(ActorId::SERVER, terminal_frame(FrameKind::Answer, pending.id().0, &255u32))
        .unwrap();
    dispatcher.process_packets().unwrap();

    assert!(matches!(
        outcomes.borrow().as_slice(),
        [RequestOutcome::ConnectionFailed(ConnectionFailure::UnexpectedPacket)]
    ));
}

#[test]
fn test_failure_payload_delivered() {
    let (dispatcher, transport) = setup();
    let outcomes = recorder();
    let pending = dispatcher
        .send_request(ActorId::SERVER, &Echo("q".into()), record(&outcomes))
        .unwrap();

    transport
        .deliver(ActorId::SERVER, terminal_frame(FrameKind::Failure, pending.id().0, &42u8))
        .unwrap();
    dispatcher.process_packets().unwrap();

    assert!(matches!(outcomes.borrow().as_slice(), [RequestOutcome::Failed(42)]));
}

#[test]
fn test_dropped_responder_reported() {
    let (dispatcher, transport) = setup();
    let _responder = dispatcher
        .watch_request(|_, _, _: Echo, responder| drop(responder))
        .unwrap();

    transport
        .deliver(ActorId::SERVER, request_frame(3, &Echo("x".into())))
        .unwrap();
    assert!(dispatcher.process_packets().is_ok());
    assert_eq!(
        sent_header(&transport.next_outbound().unwrap()),
        FrameHeader::terminal(FrameKind::Unhandled, RequestId(3))
    );
    assert_eq!(
        dispatcher.process_packets(),
        Err(ProtocolError::UnresolvedRequest {
            name: "test.Echo",
            from: ActorId::SERVER,
        })
    );
    assert_eq!(dispatcher.process_packets(), Ok(0));
}

#[test]
fn test_responder_resolved_later() {
    let (dispatcher, _transport) = setup();
    let parked = Rc::new(RefCell::new(None));
    let slot = Rc::clone(&parked);
    let _responder = dispatcher
        .watch_request(move |_, _, _: Echo, responder| *slot.borrow_mut() = Some(responder))
        .unwrap();

    let outcomes = recorder();
    let _pending = dispatcher
        .send_request(ActorId::SELF, &Echo("wait".into()), record(&outcomes))
        .unwrap();
    dispatcher.process_packets().unwrap();
    assert!(outcomes.borrow().is_empty());

    let responder = parked.borrow_mut().take().unwrap();
    assert_eq!(responder.requester(), ActorId::SELF);
    responder.fail(7);
    dispatcher.process_packets().unwrap();
    assert!(matches!(outcomes.borrow().as_slice(), [RequestOutcome::Failed(7)]));
}

#[test]
fn test_malformed_request_answered_unhandled() {
    let (dispatcher, transport) = setup();
    let runs = Rc::new(Cell::new(0));
    let counter = Rc::clone(&runs);
    let _responder = dispatcher
        .watch_request(move |_, _, _: Echo, responder| {
            counter.set(counter.get() + 1);
            responder.unhandled();
        })
        .unwrap();

    let mut bytes = to_bytes(&FrameHeader::Request {
        packet: Echo::TYPE_ID,
        request: RequestId(11),
    });
    bytes.extend_from_slice(&[0xFF, 0xFF, 0xFF, 0x7F]);
    transport.deliver(ActorId::SERVER, bytes).unwrap();

    assert!(matches!(
        dispatcher.process_packets(),
        Err(ProtocolError::MalformedFrame { from: ActorId::SERVER, .. })
    ));
    assert_eq!(runs.get(), 0);
    assert_eq!(
        sent_header(&transport.next_outbound().unwrap()),
        FrameHeader::terminal(FrameKind::Unhandled, RequestId(11))
    );
}

// =============================================================================
// LIFECYCLE
// =============================================================================

#[test]
fn test_terminate_inside_handler_is_deferred() {
    let (dispatcher, _transport) = setup();
    let outcomes = recorder();
    let _pending = dispatcher
        .send_request(ActorId::SERVER, &Echo("q".into()), record(&outcomes))
        .unwrap();

    let saw_processing = Rc::new(Cell::new(false));
    let flag = Rc::clone(&saw_processing);
    let watch = dispatcher
        .watch_message(move |d: &Dispatcher, _, _: Ping| {
            d.terminate();
            flag.set(d.is_processing() && d.message_watchers::<Ping>() == 1);
        })
        .unwrap();

    dispatcher.send_message(ActorId::SELF, &Ping(0)).unwrap();
    dispatcher.process_packets().unwrap();

    assert!(saw_processing.get());
    assert!(!watch.is_active());
    assert_eq!(dispatcher.message_watchers::<Ping>(), 0);
    assert_eq!(dispatcher.pending_requests(), 0);
    assert!(matches!(
        outcomes.borrow().as_slice(),
        [RequestOutcome::ConnectionFailed(ConnectionFailure::Disconnected)]
    ));
}

#[test]
fn test_terminate_requested_by_transport() {
    let (dispatcher, transport) = setup();
    let _responder = dispatcher
        .watch_request(|_, _, _: Echo, responder| responder.unhandled())
        .unwrap();
    dispatcher.send_message(ActorId::SELF, &Ping(1)).unwrap();

    transport.flags.request_terminate();
    assert_eq!(dispatcher.process_packets(), Ok(0));
    assert!(!dispatcher.has_responder::<Echo>());
    assert_eq!(dispatcher.loopback_len(), 0);
    assert!(!transport.flags.is_terminate_requested());
}

#[test]
fn test_nested_process_is_noop() {
    let (dispatcher, _transport) = setup();
    let nested = Rc::new(Cell::new(None));
    let result = Rc::clone(&nested);
    let _watch = dispatcher
        .watch_message(move |d: &Dispatcher, _, _: Ping| result.set(Some(d.process_packets())))
        .unwrap();

    dispatcher.send_message(ActorId::SELF, &Ping(0)).unwrap();
    dispatcher.process_packets().unwrap();
    assert_eq!(nested.take(), Some(Ok(0)));
}

#[test]
fn test_flags_track_lifetime() {
    let (dispatcher, transport) = setup();
    assert!(transport.flags.is_running());
    drop(dispatcher);
    assert!(!transport.flags.is_running());
}

#[test]
fn test_retry_during_terminate_is_refused() {
    let (dispatcher, _transport) = setup();
    let retries: Rc<RefCell<Vec<Result<(), ProtocolError>>>> = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&retries);

    dispatcher
        .send_request(ActorId::SERVER, &Echo("first".into()), move |d, outcome| {
            assert!(outcome.failed());
            let retry = d
                .send_request(ActorId::SERVER, &Echo("retry".into()), |_, _| {})
                .map(|pending| pending.detach());
            log.borrow_mut().push(retry);
        })
        .unwrap()
        .detach();

    dispatcher.terminate();

    assert_eq!(
        *retries.borrow(),
        vec![Err(ProtocolError::Terminating { name: "test.Echo" })]
    );
    assert_eq!(dispatcher.pending_requests(), 0);
    assert_eq!(dispatcher.request_ids_in_use(), 0);

    // Back to normal once termination is over
    let outcomes = recorder();
    let _again = dispatcher
        .send_request(ActorId::SERVER, &Echo("later".into()), record(&outcomes))
        .unwrap();
    assert_eq!(dispatcher.pending_requests(), 1);
}

#[test]
fn test_retry_after_peer_disconnect_stays_pending() {
    let (dispatcher, transport) = setup();
    let peer = ActorId::dynamic(2);
    let retried = Rc::new(Cell::new(false));
    let flag = Rc::clone(&retried);

    dispatcher
        .send_request(peer, &Echo("first".into()), move |d, _| {
            d.send_request(peer, &Echo("retry".into()), |_, _| {})
                .unwrap()
                .detach();
            flag.set(true);
        })
        .unwrap()
        .detach();

    transport
        .peer_disconnected(peer, ConnectionFailure::TimedOut)
        .unwrap();
    dispatcher.process_packets().unwrap();

    assert!(retried.get());
    assert_eq!(dispatcher.pending_requests(), 1);
}

#[test]
fn test_watch_dropped_by_sibling_is_skipped() {
    let (dispatcher, _transport) = setup();
    let hits = Rc::new(Cell::new(0));
    let victim: Rc<RefCell<Option<super::WatchHandle>>> = Rc::new(RefCell::new(None));

    let holder = Rc::clone(&victim);
    let _first = dispatcher
        .watch_message(move |_, _, _: Ping| drop(holder.borrow_mut().take()))
        .unwrap();
    let counter = Rc::clone(&hits);
    *victim.borrow_mut() = Some(
        dispatcher
            .watch_message(move |_, _, _: Ping| counter.set(counter.get() + 1))
            .unwrap(),
    );

    dispatcher.send_message(ActorId::SELF, &Ping(3)).unwrap();
    dispatcher.process_packets().unwrap();

    assert_eq!(hits.get(), 0);
    assert_eq!(dispatcher.message_watchers::<Ping>(), 1);
}
