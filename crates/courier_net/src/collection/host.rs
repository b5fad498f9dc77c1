//! Owner side: the per-dispatcher host and the collections bound to it.

use std::cell::RefCell;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::rc::Rc;

use courier_core::{Blob, IdPool, Wire};
use courier_shared::{
    ActorId, CollectionAdd, CollectionClear, CollectionClosed, CollectionId, CollectionRemove,
    CollectionSnapshot, JoinRejection, LeaveCollection, Message, ObserveCollection,
    PeerDisconnected, ResolveCollection,
};

use crate::config::CourierConfig;
use crate::dispatcher::{Dispatcher, Responder, WatchHandle};
use crate::error::{ProtocolError, ProtocolResult};

type SnapshotFn = dyn Fn() -> Blob;
type ValidatorFn = dyn FnMut(ActorId, &Blob) -> JoinDecision;

/// A join validator's verdict on an observe request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JoinDecision {
    /// Answer with a snapshot and start sending deltas.
    Accept,
    /// Refuse. With detail bytes the observer sees
    /// [`JoinRejection::Rejected`], without them `unhandled`.
    Reject(Option<Blob>),
}

struct Bound {
    name: String,
    subscribers: Vec<ActorId>,
    snapshot: Rc<SnapshotFn>,
    validator: Option<Rc<RefCell<ValidatorFn>>>,
}

struct HostState {
    ids: IdPool,
    collections: HashMap<CollectionId, Bound>,
    names: HashMap<String, CollectionId>,
}

struct HostInner {
    dispatcher: Dispatcher,
    state: RefCell<HostState>,
    watches: RefCell<Vec<WatchHandle>>,
}

/// Serves every [`SharedCollection`] bound on one dispatcher.
///
/// Owns the responders for [`ResolveCollection`] and [`ObserveCollection`],
/// so only one host can be attached per dispatcher.
#[derive(Clone)]
pub struct CollectionHost {
    inner: Rc<HostInner>,
}

impl CollectionHost {
    /// Registers the host's responders and watches on `dispatcher`.
    ///
    /// Fails with [`ProtocolError::Config`] if `config` does not validate.
    pub fn attach(dispatcher: &Dispatcher, config: &CourierConfig) -> ProtocolResult<Self> {
        config.validate()?;
        let inner = Rc::new(HostInner {
            dispatcher: dispatcher.clone(),
            state: RefCell::new(HostState {
                ids: IdPool::new(config.collection_id_capacity),
                collections: HashMap::new(),
                names: HashMap::new(),
            }),
            watches: RefCell::new(Vec::new()),
        });

        let weak = Rc::downgrade(&inner);
        let resolve = dispatcher.watch_request(move |_, _, request: ResolveCollection, responder| {
            match weak.upgrade() {
                Some(host) => host.resolve(&request.name, responder),
                None => responder.unhandled(),
            }
        })?;

        let weak = Rc::downgrade(&inner);
        let observe = dispatcher.watch_request(move |_, from, request: ObserveCollection, responder| {
            match weak.upgrade() {
                Some(host) => host.join(from, &request, responder),
                None => responder.unhandled(),
            }
        })?;

        let weak = Rc::downgrade(&inner);
        let leave = dispatcher.watch_message(move |_, from, leave: LeaveCollection| {
            if let Some(host) = weak.upgrade() {
                host.leave(from, Some(leave.collection));
            }
        })?;

        let weak = Rc::downgrade(&inner);
        let gone = dispatcher.watch_message(move |_, _, event: PeerDisconnected| {
            if let Some(host) = weak.upgrade() {
                host.leave(event.actor, None);
            }
        })?;

        inner
            .watches
            .borrow_mut()
            .extend([resolve, observe, leave, gone]);
        Ok(Self { inner })
    }

    /// The dispatcher this host serves.
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    /// Number of bound collections.
    #[must_use]
    pub fn bound_count(&self) -> usize {
        self.inner.state.borrow().collections.len()
    }

    /// Looks up a bound collection by name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<CollectionId> {
        self.inner.state.borrow().names.get(name).copied()
    }

    fn bind(
        &self,
        name: &str,
        snapshot: Rc<SnapshotFn>,
        validator: Option<Rc<RefCell<ValidatorFn>>>,
    ) -> ProtocolResult<CollectionId> {
        let mut state = self.inner.state.borrow_mut();
        let Some(raw) = state.ids.allocate() else {
            let capacity = state.ids.capacity();
            tracing::warn!("cannot bind collection {}: ids exhausted", name);
            return Err(ProtocolError::CollectionIdsExhausted { capacity });
        };
        let id = CollectionId(raw);
        state.collections.insert(
            id,
            Bound {
                name: name.to_owned(),
                subscribers: Vec::new(),
                snapshot,
                validator,
            },
        );
        if let Some(previous) = state.names.insert(name.to_owned(), id) {
            tracing::warn!("collection name {} rebound from {} to {}", name, previous, id);
        }
        tracing::info!("collection {} bound as {}", name, id);
        Ok(id)
    }

    /// Forgets the collection and returns whoever was subscribed.
    fn release(&self, id: CollectionId) -> Vec<ActorId> {
        let removed = {
            let mut state = self.inner.state.borrow_mut();
            let removed = state.collections.remove(&id);
            if let Some(bound) = &removed {
                state.ids.free(id.0);
                if state.names.get(&bound.name) == Some(&id) {
                    state.names.remove(&bound.name);
                }
            }
            removed
        };
        // Builder and validator dropped outside the borrow
        removed.map_or_else(Vec::new, |bound| {
            tracing::info!("collection {} ({}) unbound", bound.name, id);
            bound.subscribers
        })
    }

    fn set_validator(&self, id: CollectionId, validator: Option<Rc<RefCell<ValidatorFn>>>) {
        let previous = self
            .inner
            .state
            .borrow_mut()
            .collections
            .get_mut(&id)
            .map(|bound| std::mem::replace(&mut bound.validator, validator));
        drop(previous);
    }

    fn subscribers(&self, id: CollectionId) -> Vec<ActorId> {
        self.inner
            .state
            .borrow()
            .collections
            .get(&id)
            .map(|bound| bound.subscribers.clone())
            .unwrap_or_default()
    }

    /// Sends `message` to every subscriber of `id`, returning the first
    /// error after trying them all.
    fn fan_out<M: Message>(&self, id: CollectionId, message: &M) -> ProtocolResult<()> {
        let mut first_error = None;
        for subscriber in self.subscribers(id) {
            if let Err(err) = self.inner.dispatcher.send_message(subscriber, message) {
                tracing::warn!("{} delta for {} lost: {}", id, subscriber, err);
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl HostInner {
    fn resolve(&self, name: &str, responder: Responder<ResolveCollection>) {
        let id = self.state.borrow().names.get(name).copied();
        match id {
            Some(id) => responder.answer(id),
            None => {
                tracing::debug!("{} asked for unknown collection {}", responder.requester(), name);
                responder.fail(JoinRejection::UnknownCollection);
            }
        }
    }

    fn join(&self, from: ActorId, request: &ObserveCollection, responder: Responder<ObserveCollection>) {
        let id = request.collection;
        let known = self
            .state
            .borrow()
            .collections
            .get(&id)
            .map(|bound| bound.validator.clone());
        let Some(validator) = known else {
            tracing::debug!("{} tried to observe unknown {}", from, id);
            responder.fail(JoinRejection::UnknownCollection);
            return;
        };

        let decision = match validator {
            Some(validator) => match validator.try_borrow_mut() {
                Ok(mut validate) => (&mut *validate)(from, &request.registration),
                Err(_) => JoinDecision::Reject(None),
            },
            None => JoinDecision::Accept,
        };

        match decision {
            JoinDecision::Accept => {
                // The validator may have unbound the collection
                let snapshot = self
                    .state
                    .borrow()
                    .collections
                    .get(&id)
                    .map(|bound| Rc::clone(&bound.snapshot));
                let Some(snapshot) = snapshot else {
                    responder.fail(JoinRejection::UnknownCollection);
                    return;
                };
                let items = snapshot();
                responder.answer(CollectionSnapshot { items });

                let mut state = self.state.borrow_mut();
                if let Some(bound) = state.collections.get_mut(&id) {
                    if !bound.subscribers.contains(&from) {
                        bound.subscribers.push(from);
                    }
                    tracing::debug!("{} joined {} ({})", from, bound.name, id);
                }
            }
            JoinDecision::Reject(Some(detail)) => {
                tracing::debug!("{} rejected from {}", from, id);
                responder.fail(JoinRejection::Rejected(detail));
            }
            JoinDecision::Reject(None) => responder.unhandled(),
        }
    }

    fn leave(&self, actor: ActorId, only: Option<CollectionId>) {
        let mut state = self.state.borrow_mut();
        for (id, bound) in &mut state.collections {
            if only.is_some_and(|only| only != *id) {
                continue;
            }
            let before = bound.subscribers.len();
            bound.subscribers.retain(|subscriber| *subscriber != actor);
            if bound.subscribers.len() != before {
                tracing::debug!("{} left {} ({})", actor, bound.name, id);
            }
        }
    }
}

impl std::fmt::Debug for CollectionHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionHost")
            .field("bound", &self.bound_count())
            .finish_non_exhaustive()
    }
}

/// A named, replicated list of `T` owned by this side.
///
/// The owner keeps the items; the collection only knows how to snapshot
/// them and broadcasts the deltas it is told about. Dropping a bound
/// collection unbinds it.
pub struct SharedCollection<T: Wire> {
    name: String,
    snapshot: Rc<SnapshotFn>,
    validator: Option<Rc<RefCell<ValidatorFn>>>,
    binding: Option<(CollectionHost, CollectionId)>,
    _item: PhantomData<fn(&T)>,
}

impl<T: Wire> SharedCollection<T> {
    /// Creates an unbound collection. `snapshot` is called once per
    /// accepted join and must return the current items.
    pub fn new<F>(name: impl Into<String>, snapshot: F) -> Self
    where
        F: Fn() -> Vec<T> + 'static,
    {
        Self {
            name: name.into(),
            snapshot: Rc::new(move || Blob::encode_from(&snapshot())),
            validator: None,
            binding: None,
            _item: PhantomData,
        }
    }

    /// Installs a validator run against each observer's registration.
    pub fn set_join_validator<F>(&mut self, validator: F)
    where
        F: FnMut(ActorId, &Blob) -> JoinDecision + 'static,
    {
        let validator: Rc<RefCell<ValidatorFn>> = Rc::new(RefCell::new(validator));
        if let Some((host, id)) = &self.binding {
            host.set_validator(*id, Some(Rc::clone(&validator)));
        }
        self.validator = Some(validator);
    }

    /// Publishes the collection on `host`. Rebinding unbinds first.
    pub fn bind(&mut self, host: &CollectionHost) -> ProtocolResult<CollectionId> {
        self.unbind();
        let id = host.bind(&self.name, Rc::clone(&self.snapshot), self.validator.clone())?;
        self.binding = Some((host.clone(), id));
        Ok(id)
    }

    /// Withdraws the collection, telling every subscriber it closed.
    pub fn unbind(&mut self) {
        let Some((host, id)) = self.binding.take() else {
            return;
        };
        for subscriber in host.release(id) {
            if let Err(err) = host
                .dispatcher()
                .send_message(subscriber, &CollectionClosed { collection: id })
            {
                tracing::warn!("could not tell {} that {} closed: {}", subscriber, id, err);
            }
        }
    }

    /// The name observers resolve.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The id while bound.
    #[must_use]
    pub fn id(&self) -> Option<CollectionId> {
        self.binding.as_ref().map(|(_, id)| *id)
    }

    /// True while bound.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    /// Current subscribers, in join order.
    #[must_use]
    pub fn subscribers(&self) -> Vec<ActorId> {
        self.binding
            .as_ref()
            .map(|(host, id)| host.subscribers(*id))
            .unwrap_or_default()
    }

    /// Tells every subscriber `item` was appended.
    pub fn add_item(&self, item: &T) -> ProtocolResult<()> {
        self.publish(|collection| CollectionAdd {
            collection,
            item: Blob::encode_from(item),
        })
    }

    /// Tells every subscriber `item` was removed.
    pub fn remove_item(&self, item: &T) -> ProtocolResult<()> {
        self.publish(|collection| CollectionRemove {
            collection,
            item: Blob::encode_from(item),
        })
    }

    /// Tells every subscriber the collection was emptied.
    pub fn clear(&self) -> ProtocolResult<()> {
        self.publish(|collection| CollectionClear { collection })
    }

    fn publish<M: Message>(&self, build: impl FnOnce(CollectionId) -> M) -> ProtocolResult<()> {
        match &self.binding {
            Some((host, id)) => host.fan_out(*id, &build(*id)),
            None => Ok(()),
        }
    }
}

impl<T: Wire> Drop for SharedCollection<T> {
    fn drop(&mut self) {
        self.unbind();
    }
}

impl<T: Wire> std::fmt::Debug for SharedCollection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedCollection")
            .field("name", &self.name)
            .field("id", &self.id())
            .finish_non_exhaustive()
    }
}
