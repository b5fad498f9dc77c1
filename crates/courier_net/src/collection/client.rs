//! Observer side: routes collection deltas to the observers waiting on them.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use courier_core::Blob;
use courier_shared::{
    ActorId, CollectionAdd, CollectionClear, CollectionClosed, CollectionId, CollectionRemove,
    ConnectionFailure, PeerDisconnected,
};

use crate::dispatcher::{Dispatcher, WatchHandle};
use crate::error::ProtocolResult;

/// One change to a replicated collection, still encoded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Delta {
    Added(Blob),
    Removed(Blob),
    Cleared,
    /// The owner unbound the collection or went away.
    Closed,
}

pub(crate) type Sink = Rc<dyn Fn(&Delta)>;

type Key = (ActorId, CollectionId);

struct SinkEntry {
    serial: u64,
    /// Cleared on unregister, so a route already in flight skips it.
    active: Cell<bool>,
    sink: Sink,
}

struct ClientInner {
    dispatcher: Dispatcher,
    sinks: RefCell<HashMap<Key, Vec<Rc<SinkEntry>>>>,
    next_serial: Cell<u64>,
    watches: RefCell<Vec<WatchHandle>>,
}

/// Demultiplexes collection deltas by (owner, collection id).
///
/// One per dispatcher. Observers register through it; deltas for keys
/// nobody registered are dropped.
#[derive(Clone)]
pub struct CollectionClient {
    inner: Rc<ClientInner>,
}

impl CollectionClient {
    /// Watches the delta messages on `dispatcher`.
    pub fn attach(dispatcher: &Dispatcher) -> ProtocolResult<Self> {
        let inner = Rc::new(ClientInner {
            dispatcher: dispatcher.clone(),
            sinks: RefCell::new(HashMap::new()),
            next_serial: Cell::new(0),
            watches: RefCell::new(Vec::new()),
        });

        let weak = Rc::downgrade(&inner);
        let added = dispatcher.watch_message(move |_, from, delta: CollectionAdd| {
            if let Some(client) = weak.upgrade() {
                client.route((from, delta.collection), &Delta::Added(delta.item));
            }
        })?;

        let weak = Rc::downgrade(&inner);
        let removed = dispatcher.watch_message(move |_, from, delta: CollectionRemove| {
            if let Some(client) = weak.upgrade() {
                client.route((from, delta.collection), &Delta::Removed(delta.item));
            }
        })?;

        let weak = Rc::downgrade(&inner);
        let cleared = dispatcher.watch_message(move |_, from, delta: CollectionClear| {
            if let Some(client) = weak.upgrade() {
                client.route((from, delta.collection), &Delta::Cleared);
            }
        })?;

        let weak = Rc::downgrade(&inner);
        let closed = dispatcher.watch_message(move |_, from, delta: CollectionClosed| {
            if let Some(client) = weak.upgrade() {
                client.route((from, delta.collection), &Delta::Closed);
            }
        })?;

        let weak = Rc::downgrade(&inner);
        let gone = dispatcher.watch_message(move |_, _, event: PeerDisconnected| {
            if let Some(client) = weak.upgrade() {
                client.owner_gone(event.actor, event.reason);
            }
        })?;

        inner
            .watches
            .borrow_mut()
            .extend([added, removed, cleared, closed, gone]);
        Ok(Self { inner })
    }

    /// The dispatcher this client listens on.
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    /// Number of registered observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.inner.sinks.borrow().values().map(Vec::len).sum()
    }

    pub(crate) fn register(&self, owner: ActorId, collection: CollectionId, sink: Sink) -> u64 {
        let serial = self.inner.next_serial.get() + 1;
        self.inner.next_serial.set(serial);
        self.inner
            .sinks
            .borrow_mut()
            .entry((owner, collection))
            .or_default()
            .push(Rc::new(SinkEntry {
                serial,
                active: Cell::new(true),
                sink,
            }));
        serial
    }

    pub(crate) fn unregister(&self, owner: ActorId, collection: CollectionId, serial: u64) {
        let removed = {
            let mut sinks = self.inner.sinks.borrow_mut();
            let key = (owner, collection);
            let Some(entries) = sinks.get_mut(&key) else {
                return;
            };
            let removed = entries
                .iter()
                .position(|entry| entry.serial == serial)
                .map(|index| entries.remove(index));
            if let Some(entry) = &removed {
                entry.active.set(false);
            }
            if entries.is_empty() {
                sinks.remove(&key);
            }
            removed
        };
        drop(removed);
    }
}

impl ClientInner {
    fn route(&self, key: Key, delta: &Delta) {
        let targets: Vec<Rc<SinkEntry>> = self
            .sinks
            .borrow()
            .get(&key)
            .cloned()
            .unwrap_or_default();
        if targets.is_empty() {
            tracing::debug!("delta for {} from {} has no observer", key.1, key.0);
            return;
        }
        for entry in targets {
            if entry.active.get() {
                (entry.sink)(delta);
            }
        }
    }

    fn owner_gone(&self, owner: ActorId, reason: ConnectionFailure) {
        let keys: Vec<Key> = self
            .sinks
            .borrow()
            .keys()
            .filter(|(actor, _)| *actor == owner)
            .copied()
            .collect();
        if !keys.is_empty() {
            tracing::debug!("{} collections of {} closed ({})", keys.len(), owner, reason);
        }
        for key in keys {
            self.route(key, &Delta::Closed);
        }
    }
}

impl std::fmt::Debug for CollectionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionClient")
            .field("observers", &self.observer_count())
            .finish_non_exhaustive()
    }
}
