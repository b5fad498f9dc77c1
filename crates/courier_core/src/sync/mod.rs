//! # Cross-Thread Plumbing
//!
//! The only shared state between the transport thread and the processing
//! thread is a pair of SPSC queues (plus a few atomic flags owned by the
//! networking crate).
//!
//! ```text
//! Transport:   Producer<Inbound>  ──►  Consumer<Inbound>   :Processing
//! Processing:  Producer<Outbound> ──►  Consumer<Outbound>  :Transport
//! ```
//!
//! No locks around protocol state. The processing thread owns it all.

pub mod spsc;

pub use spsc::{channel, Consumer, Producer, QueueError};
