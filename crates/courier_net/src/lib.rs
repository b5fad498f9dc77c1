//! # Courier Net - Actor-Addressed Messaging
//!
//! Request/answer correlation, message fan-out and credential gating over
//! any transport that can move byte frames between actors.
//!
//! ## Architecture
//!
//! ```text
//!  TRANSPORT THREAD                 PROCESSING THREAD
//! ┌──────────────────┐  inbound   ┌───────────────────────────────┐
//! │ TransportPort    │──(SPSC)───►│ Dispatcher                    │
//! │  (MemoryNetwork, │            │   PacketRegistry (schemas)    │
//! │   sockets, ...)  │◄──(SPSC)───│   CredentialStore (gate)      │
//! └──────────────────┘  outbound  │   watches / pending requests  │
//!          ▲                      │   CollectionHost / Client     │
//!          └── LinkFlags (atomic) └───────────────────────────────┘
//! ```
//!
//! - **Dispatcher**: single-threaded, never blocks, runs handlers only
//!   inside `process_packets()`
//! - **Registry**: every packet type is known up front; an unknown type id
//!   on the wire is a fatal protocol error
//! - **Credentials**: requests name the tokens they need; senders lacking
//!   them get `missing_credentials` and the handler never runs
//! - **Collections**: snapshot + delta replication built on the above
//!
//! ## Example
//!
//! ```rust,ignore
//! use courier_net::{endpoint, CourierConfig, Dispatcher, PacketRegistry};
//!
//! let config = CourierConfig::default();
//! let (port, transport) = endpoint(&config);
//! let dispatcher = Dispatcher::new(&config, PacketRegistry::new(), port)?;
//!
//! let _watch = dispatcher.watch_message(|_, from, ping: Ping| {
//!     tracing::info!("ping {} from {}", ping.0, from);
//! })?;
//! loop {
//!     dispatcher.process_packets()?;
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod collection;
pub mod config;
pub mod credentials;
pub mod dispatcher;
pub mod error;
pub mod registry;
pub mod transport;

// Re-exports for convenience
pub use collection::{
    CollectionClient, CollectionHost, JoinDecision, ObserveError, SharedCollection,
    SharedCollectionObserver,
};
pub use config::{ConfigError, ConfigResult, CourierConfig, Implication};
pub use credentials::{CredentialList, CredentialStore, ImplicationTable};
pub use dispatcher::{Dispatcher, PendingRequest, RequestOutcome, Responder, WatchHandle};
pub use error::{ProtocolError, ProtocolResult};
pub use registry::{PacketRegistry, PacketSchema, SchemaKind};
pub use transport::{
    endpoint, DispatcherPort, InboundEvent, LinkFlags, MemoryNetwork, MemoryNetworkThread,
    OutboundFrame, TransportPort, TransportStats,
};
