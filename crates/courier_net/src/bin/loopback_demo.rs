//! # Loopback Demo
//!
//! A server and a client wired through an in-process `MemoryNetwork`:
//! 1. Client pings the server
//! 2. Client tries a gated `Shutdown`, gets `missing_credentials`
//! 3. Client logs in with a wrong, then the right password
//! 4. Client retries `Shutdown`
//! 5. Client observes the server's shared "players" collection
//!
//! Usage: `loopback_demo [config.toml]`

use std::cell::RefCell;
use std::process::ExitCode;
use std::rc::Rc;

use courier_core::{Blob, DecodeResult, ReadCursor, Wire, WriteCursor};
use courier_net::{
    endpoint, CollectionClient, CollectionHost, ConfigError, CourierConfig, Dispatcher,
    MemoryNetwork, PacketRegistry, ProtocolError, ProtocolResult, RequestOutcome,
    SharedCollection, SharedCollectionObserver,
};
use courier_shared::{ActorId, Packet, Request};
use thiserror::Error;

const PASSWORD: &str = "swordfish";

struct Ping;

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

struct AdminRights {
    password: String,
}

impl Wire for AdminRights {
    fn encode(&self, writer: &mut WriteCursor) {
        self.password.encode(writer);
    }
    fn decode(reader: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        String::decode(reader).map(|password| Self { password })
    }
}
impl Packet for AdminRights {
    const NAME: &'static str = "demo.AdminRights";
}
impl Request for AdminRights {
    type Answer = ();
    /// Human-readable reason.
    type Failure = String;
}

struct Shutdown;

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

fn registry() -> ProtocolResult<PacketRegistry> {
    let mut registry = PacketRegistry::new();
    registry.register_request::<Ping>()?;
    registry.register_request::<AdminRights>()?;
    registry.register_request::<Shutdown>()?;
    Ok(registry)
}

#[derive(Error, Debug)]
enum DemoError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

fn load_config() -> Result<CourierConfig, DemoError> {
    let Some(path) = std::env::args().nth(1) else {
        return Ok(CourierConfig::default());
    };
    let text = std::fs::read_to_string(&path).map_err(|source| DemoError::Io { path, source })?;
    Ok(CourierConfig::from_toml_str(&text)?)
}

struct Demo {
    network: MemoryNetwork,
    server: Dispatcher,
    client: Dispatcher,
}

impl Demo {
    fn settle(&self) -> ProtocolResult<()> {
        for _ in 0..64 {
            let moved = self.network.pump()
                + self.server.process_packets()?
                + self.client.process_packets()?;
            if moved == 0 {
                break;
            }
        }
        Ok(())
    }

    fn request<R: Request>(&self, label: &'static str, request: &R) -> ProtocolResult<()>
    where
        R::Failure: std::fmt::Debug,
    {
        self.client
            .send_request(ActorId::SERVER, request, move |_, outcome: RequestOutcome<R>| {
                let verdict = match outcome {
                    RequestOutcome::Answered(_) => "answered".to_owned(),
                    RequestOutcome::Failed(reason) => format!("failed: {reason:?}"),
                    RequestOutcome::MissingCredentials(missing) => {
                        format!("missing credentials: {missing:?}")
                    }
                    RequestOutcome::Unhandled => "unhandled".to_owned(),
                    RequestOutcome::ConnectionFailed(reason) => format!("connection failed: {reason}"),
                };
                println!("  {label:<24} {verdict}");
            })?
            .detach();
        self.settle()
    }
}

fn run(config: &CourierConfig) -> Result<(), DemoError> {
    let mut network = MemoryNetwork::new();
    let (server_port, server_transport) = endpoint(config);
    let (client_port, client_transport) = endpoint(config);
    network.attach(ActorId::SERVER, server_transport);
    network.attach(ActorId::dynamic(0), client_transport);

    let server = Dispatcher::new(config, registry()?, server_port)?;
    let client = Dispatcher::new(config, registry()?, client_port)?;
    network.connect(ActorId::SERVER, ActorId::dynamic(0));

    let _ping = server.watch_request(|_, _, _: Ping, responder| responder.answer(()))?;
    let _login = server.watch_request(|d: &Dispatcher, from, login: AdminRights, responder| {
        if login.password == PASSWORD {
            d.grant_credential(from, "admin");
            responder.answer(());
        } else {
            responder.fail("wrong_password".to_owned());
        }
    })?;
    let _shutdown = server.watch_request(|_, _, _: Shutdown, responder| responder.answer(()))?;

    let host = CollectionHost::attach(&server, config)?;
    let players = Rc::new(RefCell::new(vec!["ada".to_owned()]));
    let snapshot = Rc::clone(&players);
    let mut shared = SharedCollection::new("players", move || snapshot.borrow().clone());
    shared.bind(&host)?;

    let demo = Demo {
        network,
        server,
        client,
    };
    demo.settle()?;

    println!("requests:");
    demo.request("ping", &Ping)?;
    demo.request("shutdown", &Shutdown)?;
    demo.request(
        "login (wrong password)",
        &AdminRights {
            password: "hunter2".to_owned(),
        },
    )?;
    demo.request(
        "login",
        &AdminRights {
            password: PASSWORD.to_owned(),
        },
    )?;
    demo.request("shutdown", &Shutdown)?;

    println!("collection:");
    let client_side = CollectionClient::attach(&demo.client)?;
    let observer = SharedCollectionObserver::<String>::new(&client_side);
    let _received = observer
        .received()
        .connect(|items: &Vec<String>| println!("  snapshot {items:?}"));
    let _added = observer
        .item_added()
        .connect(|item: &String| println!("  added    {item}"));
    let _removed = observer
        .item_removed()
        .connect(|item: &String| println!("  removed  {item}"));
    observer.observe_named(ActorId::SERVER, "players", Blob::default())?;
    demo.settle()?;

    for name in ["grace", "linus"] {
        players.borrow_mut().push(name.to_owned());
        shared.add_item(&name.to_owned())?;
    }
    players.borrow_mut().retain(|name| name != "ada");
    shared.remove_item(&"ada".to_owned())?;
    demo.settle()?;

    println!("  replica  {:?}", observer.items());
    println!("transport: {:?}", demo.network.stats());
    Ok(())
}

fn main() -> ExitCode {
    match load_config().and_then(|config| run(&config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}
