//! # Collection Replication
//!
//! An owner publishes a named list; observers on other actors keep a
//! replica in sync from a snapshot followed by ordered deltas.
//!
//! ```text
//! OWNER DISPATCHER                          OBSERVER DISPATCHER
//! ┌───────────────────────┐                 ┌──────────────────────────┐
//! │ CollectionHost        │◄── Observe ─────│ SharedCollectionObserver │
//! │   SharedCollection<T> │── snapshot ────►│   replica: Vec<T>        │
//! │   SharedCollection<U> │── Add/Remove ──►│ CollectionClient         │
//! │                       │── Clear/Closed ►│   (owner, id) → observer │
//! └───────────────────────┘                 └──────────────────────────┘
//! ```
//!
//! A subscriber only starts receiving deltas after its snapshot answer was
//! queued, and stops the moment it leaves or disconnects.

mod client;
mod host;
mod observer;

pub use client::CollectionClient;
pub use host::{CollectionHost, JoinDecision, SharedCollection};
pub use observer::{ObserveError, SharedCollectionObserver};
