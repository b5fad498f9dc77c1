//! # Courier Core
//!
//! Leaf building blocks for the Courier messaging engine:
//! - Byte cursors with non-destructive peeking
//! - An explicit wire codec for payload shapes
//! - Bounded id pools that fail closed
//! - A non-blocking SPSC queue for the transport/processing boundary
//! - Single-threaded signals for local event fan-out
//!
//! ## Architecture Rules
//!
//! 1. **Nothing here knows about packets** - the protocol lives upstream
//! 2. **Readers never panic on hostile input** - every read is checked
//! 3. **No locks** - the queue is the only cross-thread type
//!
//! ## Example
//!
//! ```rust,ignore
//! use courier_core::{WriteCursor, ReadCursor, Wire};
//!
//! let mut writer = WriteCursor::new();
//! 42u64.encode(&mut writer);
//! let value = u64::decode(&mut ReadCursor::new(writer.as_slice()))?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod codec;
pub mod cursor;
pub mod memory;
pub mod signal;
pub mod sync;

pub use codec::{from_bytes, to_bytes, Blob, Wire};
pub use cursor::{DecodeError, DecodeResult, ReadCursor, WriteCursor};
pub use memory::IdPool;
pub use signal::{Signal, SlotGuard};
pub use sync::{Consumer, Producer, QueueError};
