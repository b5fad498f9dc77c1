//! # Protocol Constants
//!
//! Defaults every endpoint starts from.
//!
//! **CRITICAL:** The wire tags below are baked into every peer.
//! Changing them breaks compatibility with deployed endpoints.

// =============================================================================
// WIRE LAYOUT
// =============================================================================

/// Size of the frame tag.
pub const TAG_SIZE: usize = 1;

/// Size of a packet type id on the wire.
pub const PACKET_TYPE_ID_SIZE: usize = 4;

/// Size of a request id on the wire.
pub const REQUEST_ID_SIZE: usize = 2;

/// Header bytes in front of a message payload.
pub const MESSAGE_HEADER_SIZE: usize = TAG_SIZE + PACKET_TYPE_ID_SIZE;

/// Header bytes in front of a request payload.
pub const REQUEST_HEADER_SIZE: usize = MESSAGE_HEADER_SIZE + REQUEST_ID_SIZE;

/// Header bytes in front of a terminal (answer, failure, ...) payload.
pub const TERMINAL_HEADER_SIZE: usize = TAG_SIZE + REQUEST_ID_SIZE;

// =============================================================================
// CAPACITIES
// =============================================================================

/// Default number of requests a dispatcher may have in flight.
pub const DEFAULT_REQUEST_ID_CAPACITY: usize = 4096;

/// Default number of collections a dispatcher may publish.
pub const DEFAULT_COLLECTION_ID_CAPACITY: usize = 1024;

/// Default inbound queue depth (transport → processing).
pub const DEFAULT_INBOUND_CAPACITY: usize = 10_000;

/// Default outbound queue depth (processing → transport).
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 10_000;
