//! # Signals
//!
//! Single-threaded event registration: connect any number of slots to a
//! [`Signal`], emit to call them in connection order.
//!
//! ```text
//!   signal.connect(slot)  ──►  SlotGuard   (drop = disconnect, exactly once)
//!   signal.emit(&value)   ──►  slot_1(&value), slot_2(&value), ...
//! ```
//!
//! Slots may connect or disconnect other slots (or themselves) while an
//! emit is running. Slots connected during an emit wait for the next one;
//! a slot disconnected during an emit is not called again, even by the
//! emit already running.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

struct SlotCell<T> {
    key: u64,
    active: Cell<bool>,
    callback: RefCell<Box<dyn FnMut(&T)>>,
}

type Slot<T> = Rc<SlotCell<T>>;

struct SlotTable<T> {
    next_key: u64,
    slots: Vec<Slot<T>>,
}

/// A list of callbacks fired together.
pub struct Signal<T> {
    table: Rc<RefCell<SlotTable<T>>>,
}

/// Keeps a slot connected; dropping it disconnects the slot.
#[must_use = "dropping a SlotGuard disconnects the slot immediately"]
pub struct SlotGuard {
    disconnect: Option<Box<dyn FnOnce()>>,
}

impl<T: 'static> Signal<T> {
    /// Creates a signal with no slots.
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: Rc::new(RefCell::new(SlotTable {
                next_key: 0,
                slots: Vec::new(),
            })),
        }
    }

    /// Connects a slot.
    pub fn connect<F>(&self, slot: F) -> SlotGuard
    where
        F: FnMut(&T) + 'static,
    {
        let key = {
            let mut table = self.table.borrow_mut();
            let key = table.next_key;
            table.next_key += 1;
            table.slots.push(Rc::new(SlotCell {
                key,
                active: Cell::new(true),
                callback: RefCell::new(Box::new(slot)),
            }));
            key
        };

        let weak: Weak<RefCell<SlotTable<T>>> = Rc::downgrade(&self.table);
        SlotGuard {
            disconnect: Some(Box::new(move || {
                let Some(table) = weak.upgrade() else {
                    return;
                };
                let removed = {
                    let mut table = table.borrow_mut();
                    let index = table.slots.iter().position(|slot| slot.key == key);
                    index.map(|index| table.slots.remove(index))
                };
                if let Some(slot) = removed {
                    slot.active.set(false);
                }
            })),
        }
    }

    /// Calls every connected slot with `value`.
    ///
    /// A slot that is already running further up the stack is skipped
    /// rather than re-entered.
    pub fn emit(&self, value: &T) {
        let snapshot: Vec<Slot<T>> = self.table.borrow().slots.clone();

        for slot in snapshot {
            if !slot.active.get() {
                continue;
            }
            if let Ok(mut callback) = slot.callback.try_borrow_mut() {
                (&mut **callback)(value);
            }
        }
    }

    /// Number of connected slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.borrow().slots.len()
    }

    /// Returns true if nothing is connected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Disconnects every slot. Outstanding guards become no-ops.
    pub fn clear(&self) {
        let slots = std::mem::take(&mut self.table.borrow_mut().slots);
        for slot in &slots {
            slot.active.set(false);
        }
    }
}

impl<T: 'static> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl SlotGuard {
    /// Disconnects now. Equivalent to dropping the guard.
    pub fn disconnect(mut self) {
        self.run();
    }

    /// Keeps the slot connected for the lifetime of the signal.
    pub fn detach(mut self) {
        self.disconnect = None;
    }

    fn run(&mut self) {
        if let Some(disconnect) = self.disconnect.take() {
            disconnect();
        }
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.run();
    }
}

impl std::fmt::Debug for SlotGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotGuard")
            .field("connected", &self.disconnect.is_some())
            .finish()
    }
}
