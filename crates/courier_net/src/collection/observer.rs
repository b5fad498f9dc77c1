//! A local replica of a remote [`SharedCollection`](super::SharedCollection).

use std::cell::RefCell;
use std::rc::Rc;

use courier_core::{Blob, Signal, Wire};
use courier_shared::{
    ActorId, CollectionId, ConnectionFailure, Credential, JoinRejection, LeaveCollection,
    ObserveCollection, Request, ResolveCollection,
};
use thiserror::Error;

use super::client::{CollectionClient, Delta, Sink};
use crate::dispatcher::{PendingRequest, RequestOutcome};
use crate::error::{ProtocolError, ProtocolResult};

/// Why an observer failed to join.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ObserveError {
    /// The owner refused, or does not know the collection.
    #[error("join rejected: {0:?}")]
    Rejected(JoinRejection),

    /// The owner requires credentials we lack.
    #[error("missing credentials: {0:?}")]
    MissingCredentials(Vec<Credential>),

    /// The connection went away or the reply was garbage.
    #[error("connection failed: {0}")]
    ConnectionFailed(ConnectionFailure),

    /// The observe request could not be sent after a name lookup.
    #[error("observe request not sent: {0}")]
    Send(ProtocolError),
}

enum Link {
    Idle,
    Pending {
        request: PendingRequest,
    },
    Connected {
        owner: ActorId,
        collection: CollectionId,
        serial: u64,
    },
}

struct ObserverState<T> {
    items: Vec<T>,
    link: Link,
}

struct ObserverInner<T> {
    client: CollectionClient,
    state: RefCell<ObserverState<T>>,
    received: Signal<Vec<T>>,
    item_added: Signal<T>,
    item_removed: Signal<T>,
    cleared: Signal<()>,
    register_failed: Signal<ObserveError>,
    register_unhandled: Signal<()>,
    closed: Signal<()>,
}

/// Keeps a local copy of a collection owned by another actor.
///
/// ```text
///   observe() ──► snapshot ──► received(items)
///                 deltas   ──► item_added / item_removed / cleared
///                 unbind   ──► closed
///   failure   ──► register_failed(err) | register_unhandled()
/// ```
///
/// Dropping the observer disconnects it.
pub struct SharedCollectionObserver<T: Wire + Clone + PartialEq + 'static> {
    inner: Rc<ObserverInner<T>>,
}

impl<T: Wire + Clone + PartialEq + 'static> SharedCollectionObserver<T> {
    /// Creates an idle observer on `client`'s dispatcher.
    #[must_use]
    pub fn new(client: &CollectionClient) -> Self {
        Self {
            inner: Rc::new(ObserverInner {
                client: client.clone(),
                state: RefCell::new(ObserverState {
                    items: Vec::new(),
                    link: Link::Idle,
                }),
                received: Signal::new(),
                item_added: Signal::new(),
                item_removed: Signal::new(),
                cleared: Signal::new(),
                register_failed: Signal::new(),
                register_unhandled: Signal::new(),
                closed: Signal::new(),
            }),
        }
    }

    /// Subscribes to `collection` on `owner`, dropping any current
    /// subscription first. The outcome arrives through the signals.
    pub fn observe(
        &self,
        owner: ActorId,
        collection: CollectionId,
        registration: Blob,
    ) -> ProtocolResult<()> {
        self.disconnect();
        ObserverInner::start_observe(&self.inner, owner, collection, registration)
    }

    /// Resolves `name` on `owner`, then subscribes to it.
    pub fn observe_named(
        &self,
        owner: ActorId,
        name: &str,
        registration: Blob,
    ) -> ProtocolResult<()> {
        self.disconnect();
        let weak = Rc::downgrade(&self.inner);
        let request = self.inner.client.dispatcher().send_request(
            owner,
            &ResolveCollection {
                name: name.to_owned(),
            },
            move |_, outcome| {
                let Some(observer) = weak.upgrade() else {
                    return;
                };
                drop(observer.set_link(Link::Idle));
                match outcome {
                    RequestOutcome::Answered(collection) => {
                        if let Err(err) =
                            ObserverInner::start_observe(&observer, owner, collection, registration)
                        {
                            observer.register_failed.emit(&ObserveError::Send(err));
                        }
                    }
                    other => observer.report(other),
                }
            },
        )?;
        drop(self.inner.set_link(Link::Pending { request }));
        Ok(())
    }

    /// Leaves the collection. No event fires afterwards until the next
    /// `observe`. The replica keeps its last contents.
    pub fn disconnect(&self) {
        match self.inner.set_link(Link::Idle) {
            Link::Idle => {}
            Link::Pending { request } => {
                request.cancel();
            }
            Link::Connected {
                owner,
                collection,
                serial,
            } => {
                self.inner.client.unregister(owner, collection, serial);
                let leave = LeaveCollection { collection };
                if let Err(err) = self.inner.client.dispatcher().send_message(owner, &leave) {
                    tracing::warn!("leave for {} on {} not sent: {}", collection, owner, err);
                }
            }
        }
    }

    /// True between a successful join and the next disconnect or close.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self.inner.state.borrow().link, Link::Connected { .. })
    }

    /// True while a resolve or observe request is in flight.
    #[must_use]
    pub fn is_joining(&self) -> bool {
        matches!(self.inner.state.borrow().link, Link::Pending { .. })
    }

    /// The collection id while connected.
    #[must_use]
    pub fn collection(&self) -> Option<CollectionId> {
        match self.inner.state.borrow().link {
            Link::Connected { collection, .. } => Some(collection),
            _ => None,
        }
    }

    /// A copy of the replica.
    #[must_use]
    pub fn items(&self) -> Vec<T> {
        self.inner.state.borrow().items.clone()
    }

    /// Fires with the full snapshot once the join succeeds.
    #[must_use]
    pub fn received(&self) -> &Signal<Vec<T>> {
        &self.inner.received
    }

    /// Fires for each added item.
    #[must_use]
    pub fn item_added(&self) -> &Signal<T> {
        &self.inner.item_added
    }

    /// Fires for each removed item.
    #[must_use]
    pub fn item_removed(&self) -> &Signal<T> {
        &self.inner.item_removed
    }

    /// Fires when the owner clears the collection.
    #[must_use]
    pub fn cleared(&self) -> &Signal<()> {
        &self.inner.cleared
    }

    /// Fires when a join fails.
    #[must_use]
    pub fn register_failed(&self) -> &Signal<ObserveError> {
        &self.inner.register_failed
    }

    /// Fires when the owner has no collection host, or its validator
    /// refused without detail.
    #[must_use]
    pub fn register_unhandled(&self) -> &Signal<()> {
        &self.inner.register_unhandled
    }

    /// Fires when the owner unbinds the collection or disconnects.
    #[must_use]
    pub fn closed(&self) -> &Signal<()> {
        &self.inner.closed
    }
}

impl<T: Wire + Clone + PartialEq + 'static> Drop for SharedCollectionObserver<T> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl<T: Wire + Clone + PartialEq + 'static> std::fmt::Debug for SharedCollectionObserver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedCollectionObserver")
            .field("connected", &self.is_connected())
            .field("collection", &self.collection())
            .finish_non_exhaustive()
    }
}

impl<T: Wire + Clone + PartialEq + 'static> ObserverInner<T> {
    /// Swaps the link, handing the old one back to be dropped outside the
    /// state borrow.
    fn set_link(&self, link: Link) -> Link {
        std::mem::replace(&mut self.state.borrow_mut().link, link)
    }

    fn start_observe(
        this: &Rc<Self>,
        owner: ActorId,
        collection: CollectionId,
        registration: Blob,
    ) -> ProtocolResult<()> {
        let weak = Rc::downgrade(this);
        let request = this.client.dispatcher().send_request(
            owner,
            &ObserveCollection {
                collection,
                registration,
            },
            move |_, outcome| {
                if let Some(observer) = weak.upgrade() {
                    observer.joined(owner, collection, outcome);
                }
            },
        )?;
        drop(this.set_link(Link::Pending { request }));
        Ok(())
    }

    fn joined(
        self: &Rc<Self>,
        owner: ActorId,
        collection: CollectionId,
        outcome: RequestOutcome<ObserveCollection>,
    ) {
        drop(self.set_link(Link::Idle));
        let snapshot = match outcome {
            RequestOutcome::Answered(snapshot) => snapshot,
            other => return self.report(other),
        };
        let items = match snapshot.items.decode_as::<Vec<T>>() {
            Ok(items) => items,
            Err(err) => {
                tracing::warn!("snapshot of {} from {} undecodable: {}", collection, owner, err);
                self.register_failed
                    .emit(&ObserveError::ConnectionFailed(ConnectionFailure::UnexpectedPacket));
                return;
            }
        };

        let weak = Rc::downgrade(self);
        let sink: Sink = Rc::new(move |delta: &Delta| {
            if let Some(observer) = weak.upgrade() {
                observer.apply(delta);
            }
        });
        let serial = self.client.register(owner, collection, sink);
        {
            let mut state = self.state.borrow_mut();
            state.items.clone_from(&items);
            state.link = Link::Connected {
                owner,
                collection,
                serial,
            };
        }
        tracing::debug!("observing {} on {} ({} items)", collection, owner, items.len());
        self.received.emit(&items);
    }

    /// Emits the failure signal matching a non-answered outcome.
    fn report<R: Request<Failure = JoinRejection>>(&self, outcome: RequestOutcome<R>) {
        let error = match outcome {
            RequestOutcome::Answered(_) => return,
            RequestOutcome::Unhandled => {
                self.register_unhandled.emit(&());
                return;
            }
            RequestOutcome::Failed(rejection) => ObserveError::Rejected(rejection),
            RequestOutcome::MissingCredentials(missing) => ObserveError::MissingCredentials(missing),
            RequestOutcome::ConnectionFailed(reason) => ObserveError::ConnectionFailed(reason),
        };
        tracing::debug!("join failed: {}", error);
        self.register_failed.emit(&error);
    }

    fn apply(&self, delta: &Delta) {
        match delta {
            Delta::Added(bytes) => {
                let Some(item) = Self::decode_item(bytes) else {
                    return;
                };
                self.state.borrow_mut().items.push(item.clone());
                self.item_added.emit(&item);
            }
            Delta::Removed(bytes) => {
                let Some(item) = Self::decode_item(bytes) else {
                    return;
                };
                let removed = {
                    let mut state = self.state.borrow_mut();
                    let index = state.items.iter().position(|held| *held == item);
                    index.map(|index| state.items.remove(index))
                };
                match removed {
                    Some(item) => self.item_removed.emit(&item),
                    None => tracing::debug!("removal of an item the replica lacks"),
                }
            }
            Delta::Cleared => {
                self.state.borrow_mut().items.clear();
                self.cleared.emit(&());
            }
            Delta::Closed => {
                if let Link::Connected {
                    owner,
                    collection,
                    serial,
                } = self.set_link(Link::Idle)
                {
                    self.client.unregister(owner, collection, serial);
                }
                self.closed.emit(&());
            }
        }
    }

    fn decode_item(bytes: &Blob) -> Option<T> {
        bytes
            .decode_as::<T>()
            .map_err(|err| tracing::warn!("undecodable collection item: {}", err))
            .ok()
    }
}
