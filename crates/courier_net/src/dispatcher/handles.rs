//! RAII handles for watches and pending requests.

use std::rc::Weak;

use courier_shared::{PacketTypeId, RequestId};

use super::Inner;

/// Which registry a [`WatchHandle`] points into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum WatchKind {
    Message,
    Request,
}

/// Keeps a message or request handler registered.
///
/// Dropping the handle unregisters the handler exactly once. A handle
/// that outlives its registration (after `terminate()`, say) is inert.
#[must_use = "dropping a WatchHandle unregisters the handler immediately"]
pub struct WatchHandle {
    inner: Weak<Inner>,
    kind: WatchKind,
    packet: PacketTypeId,
    serial: u64,
    armed: bool,
}

impl WatchHandle {
    pub(crate) fn new(inner: Weak<Inner>, kind: WatchKind, packet: PacketTypeId, serial: u64) -> Self {
        Self {
            inner,
            kind,
            packet,
            serial,
            armed: true,
        }
    }

    /// Type id of the watched packet.
    #[must_use]
    pub const fn packet(&self) -> PacketTypeId {
        self.packet
    }

    /// True while the handler is still registered.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner
            .upgrade()
            .is_some_and(|inner| inner.is_watching(self.kind, self.packet, self.serial))
    }

    /// Unregisters now. Equivalent to dropping the handle.
    pub fn unwatch(self) {}

    /// Keeps the handler registered until `terminate()`.
    pub fn detach(mut self) {
        self.armed = false;
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(inner) = self.inner.upgrade() {
            inner.unwatch(self.kind, self.packet, self.serial);
        }
    }
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle")
            .field("kind", &self.kind)
            .field("packet", &self.packet)
            .field("serial", &self.serial)
            .finish()
    }
}

/// An in-flight request.
///
/// Dropping the handle cancels the request: its answer handler is
/// discarded without running, and the request id goes back to the pool.
#[must_use = "dropping a PendingRequest cancels the request immediately"]
pub struct PendingRequest {
    inner: Weak<Inner>,
    id: RequestId,
    serial: u64,
    armed: bool,
}

impl PendingRequest {
    pub(crate) fn new(inner: Weak<Inner>, id: RequestId, serial: u64) -> Self {
        Self {
            inner,
            id,
            serial,
            armed: true,
        }
    }

    /// The request id on the wire.
    #[must_use]
    pub const fn id(&self) -> RequestId {
        self.id
    }

    /// True until the request resolves or is cancelled.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.inner
            .upgrade()
            .is_some_and(|inner| inner.is_pending(self.id, self.serial))
    }

    /// Cancels now. Returns true if the request was still pending.
    pub fn cancel(mut self) -> bool {
        self.armed = false;
        self.inner
            .upgrade()
            .is_some_and(|inner| inner.cancel_request(self.id, self.serial))
    }

    /// Lets the request run to completion without holding the handle.
    pub fn detach(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(inner) = self.inner.upgrade() {
            inner.cancel_request(self.id, self.serial);
        }
    }
}

impl std::fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRequest")
            .field("id", &self.id)
            .field("serial", &self.serial)
            .finish()
    }
}
