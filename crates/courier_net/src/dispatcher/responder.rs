//! The obligation to resolve one inbound request.

use std::marker::PhantomData;
use std::rc::Weak;

use courier_core::Wire;
use courier_shared::{ActorId, FrameHeader, FrameKind, Request, RequestId};

use super::Inner;
use crate::error::ProtocolError;

/// Resolves one inbound request of type `R`.
///
/// Every resolving method consumes the responder, so a request can never
/// be answered twice. Dropping it unresolved sends `unhandled` to the
/// requester, logs an error and makes the next `process_packets()` return
/// [`ProtocolError::UnresolvedRequest`].
///
/// A responder may be kept past the handler and resolved later.
#[must_use = "a Responder must be resolved exactly once"]
pub struct Responder<R: Request> {
    inner: Weak<Inner>,
    to: ActorId,
    request: RequestId,
    armed: bool,
    _request: PhantomData<fn() -> R>,
}

impl<R: Request> Responder<R> {
    pub(crate) fn new(inner: Weak<Inner>, to: ActorId, request: RequestId) -> Self {
        Self {
            inner,
            to,
            request,
            armed: true,
            _request: PhantomData,
        }
    }

    /// Who sent the request.
    #[must_use]
    pub const fn requester(&self) -> ActorId {
        self.to
    }

    /// The request id being answered.
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        self.request
    }

    /// Resolves with a successful answer.
    pub fn answer(self, answer: R::Answer) {
        self.finish(FrameKind::Answer, &answer);
    }

    /// Resolves with a typed failure.
    pub fn fail(self, failure: R::Failure) {
        self.finish(FrameKind::Failure, &failure);
    }

    /// Resolves as `unhandled`, as if no responder existed.
    pub fn unhandled(self) {
        self.finish(FrameKind::Unhandled, &());
    }

    fn finish<T: Wire>(mut self, kind: FrameKind, payload: &T) {
        self.armed = false;
        self.send(kind, payload);
    }

    fn send<T: Wire>(&self, kind: FrameKind, payload: &T) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let bytes = FrameHeader::terminal(kind, self.request).frame(payload);
        if let Err(err) = inner.route(self.to, bytes) {
            tracing::error!("{} for {} {} lost: {}", kind, R::NAME, self.request, err);
            inner.defer(err);
        }
    }
}

impl<R: Request> Drop for Responder<R> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        tracing::error!(
            "{} {} from {} dropped without a reply",
            R::NAME,
            self.request,
            self.to
        );
        self.send(FrameKind::Unhandled, &());
        if let Some(inner) = self.inner.upgrade() {
            inner.defer(ProtocolError::UnresolvedRequest {
                name: R::NAME,
                from: self.to,
            });
        }
    }
}

impl<R: Request> std::fmt::Debug for Responder<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Responder")
            .field("request", &R::NAME)
            .field("id", &self.request)
            .field("to", &self.to)
            .finish()
    }
}
