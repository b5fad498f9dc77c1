//! # Id Pool
//!
//! Bounded freelist allocator for 16-bit identifiers.

use std::collections::VecDeque;

/// A bounded pool of `u16` identifiers.
///
/// Ids are handed out from a freelist and returned to its back when freed,
/// so a released id is reused as late as possible. When every id is live,
/// [`IdPool::allocate`] returns `None`: the pool fails closed and never
/// hands out an id that is still in use.
///
/// # Thread Safety
///
/// This pool is NOT thread-safe. It lives on the processing thread.
///
/// # Example
///
/// ```rust,ignore
/// let mut pool = IdPool::new(1024);
///
/// let id = pool.allocate()?;   // O(1)
/// pool.free(id);               // O(1), id goes to the back of the line
/// ```
#[derive(Clone, Debug)]
pub struct IdPool {
    /// Free ids, oldest release first.
    free_list: VecDeque<u16>,
    /// Liveness flag per id.
    live: Box<[bool]>,
    /// Number of allocated ids.
    allocated_count: usize,
}

impl IdPool {
    /// Largest capacity a pool can have (the whole 16-bit space).
    pub const MAX_CAPACITY: usize = u16::MAX as usize + 1;

    /// Creates a new pool with ids `0..capacity`.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero or larger than [`IdPool::MAX_CAPACITY`].
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Capacity must be greater than zero");
        assert!(
            capacity <= Self::MAX_CAPACITY,
            "Capacity must fit in the 16-bit id space"
        );

        #[allow(clippy::cast_possible_truncation)]
        let free_list: VecDeque<u16> = (0..capacity).map(|id| id as u16).collect();

        Self {
            free_list,
            live: vec![false; capacity].into_boxed_slice(),
            allocated_count: 0,
        }
    }

    /// Returns the total capacity.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.live.len()
    }

    /// Returns the number of ids currently in use.
    #[inline]
    #[must_use]
    pub const fn allocated_count(&self) -> usize {
        self.allocated_count
    }

    /// Returns the number of ids still available.
    #[inline]
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.capacity() - self.allocated_count
    }

    /// Allocates an id, or `None` when the pool is exhausted.
    pub fn allocate(&mut self) -> Option<u16> {
        let id = self.free_list.pop_front()?;
        self.live[usize::from(id)] = true;
        self.allocated_count += 1;
        Some(id)
    }

    /// Returns an id to the pool.
    ///
    /// Returns false (and changes nothing) if the id was not live, so a
    /// double free can never put the same id in the freelist twice.
    pub fn free(&mut self, id: u16) -> bool {
        match self.live.get_mut(usize::from(id)) {
            Some(live) if *live => {
                *live = false;
                self.free_list.push_back(id);
                self.allocated_count -= 1;
                true
            }
            _ => false,
        }
    }

    /// Returns true if the id is currently allocated.
    #[inline]
    #[must_use]
    pub fn is_live(&self, id: u16) -> bool {
        self.live.get(usize::from(id)).copied().unwrap_or(false)
    }

    /// Releases every id, restoring the freshly-constructed state.
    pub fn clear(&mut self) {
        let capacity = self.capacity();
        *self = Self::new(capacity);
    }
}
