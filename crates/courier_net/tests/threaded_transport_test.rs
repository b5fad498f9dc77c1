//! Integration test: dispatchers polled on the test thread while the
//! memory network pumps on its own thread.

mod common;

use std::cell::Cell;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use common::{Chat, Ping};
use courier_net::MemoryNetwork;
use courier_shared::ActorId;

const DEADLINE: Duration = Duration::from_secs(5);

#[test]
fn test_requests_cross_the_pump_thread() {
    let mut network = MemoryNetwork::new();
    let server = common::node(&mut network, ActorId::SERVER);
    let client = common::node(&mut network, ActorId::dynamic(0));
    network.connect_star(ActorId::SERVER);

    let _responder = server
        .watch_request(|_, _, _: Ping, responder| responder.answer(()))
        .unwrap();
    let chats = Rc::new(Cell::new(0));
    let counter = Rc::clone(&chats);
    let _chat = server
        .watch_message(move |_, _, _: Chat| counter.set(counter.get() + 1))
        .unwrap();

    let running = network.spawn();
    assert!(client.flags().is_connected());

    const REQUESTS: usize = 50;
    let answered = Rc::new(Cell::new(0usize));
    for _ in 0..REQUESTS {
        let done = Rc::clone(&answered);
        client
            .send_request(ActorId::SERVER, &Ping, move |_, outcome| {
                if !outcome.failed() {
                    done.set(done.get() + 1);
                }
            })
            .unwrap()
            .detach();
        client
            .send_message(
                ActorId::SERVER,
                &Chat {
                    text: "tick".to_owned(),
                },
            )
            .unwrap();
    }

    let start = Instant::now();
    while (answered.get() < REQUESTS || chats.get() < REQUESTS) && start.elapsed() < DEADLINE {
        server.process_packets().unwrap();
        client.process_packets().unwrap();
        thread::sleep(Duration::from_micros(100));
    }

    assert_eq!(answered.get(), REQUESTS);
    assert_eq!(chats.get(), REQUESTS);

    let network = running.stop().unwrap();
    let stats = network.stats();
    assert_eq!(stats.frames_delivered, (REQUESTS * 3) as u64);
    assert_eq!(stats.frames_dropped, 0);
}
