//! # Memory Management
//!
//! Pre-sized identifier pools.
//!
//! ## Design Philosophy
//!
//! Id spaces are sized once at startup. During processing:
//! - Allocation and release are O(1)
//! - Exhaustion is reported, never papered over by reuse

mod id_pool;

pub use id_pool::IdPool;
