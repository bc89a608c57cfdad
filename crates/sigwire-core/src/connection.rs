#![forbid(unsafe_code)]

//! Connection handles: the caller-facing identity of one registration.
//!
//! A [`ConnectionHandle`] holds a *weak* reference to its connection
//! record, so an outstanding handle never keeps a dead registration alive
//! and every operation on a handle whose signal (or record) is gone is a
//! no-op. Equality is identity: two handles are equal when they refer to
//! the same record.
//!
//! [`BlockGuard`] is the scoped form of blocking (the record is skipped by
//! dispatch while any guard lives), and [`ScopedConnection`] disconnects
//! on drop for callers that want RAII lifetimes.

use std::sync::{Arc, Weak};

/// Type-erased control surface of a connection record.
///
/// Implemented by `ConnectionRecord`; erased so handles are independent of
/// the signal's type parameters.
pub(crate) trait RecordControl: Send + Sync {
    fn disconnect(&self);
    fn connected(&self) -> bool;
    fn blocked(&self) -> bool;
    fn block(&self);
    fn unblock(&self);
}

/// Handle referring to one connection record.
///
/// Cheap to clone; all clones refer to the same registration.
#[derive(Clone, Default)]
pub struct ConnectionHandle {
    record: Option<Weak<dyn RecordControl>>,
}

impl ConnectionHandle {
    pub(crate) fn for_record(record: Weak<dyn RecordControl>) -> Self {
        Self {
            record: Some(record),
        }
    }

    /// A handle referring to nothing.
    ///
    /// Extended slots observe a detached handle if a dispatch races the
    /// window between record publication and handle binding.
    pub fn detached() -> Self {
        Self { record: None }
    }

    fn upgrade(&self) -> Option<Arc<dyn RecordControl>> {
        self.record.as_ref().and_then(Weak::upgrade)
    }

    /// Disconnect the registration. Idempotent; a no-op on a detached or
    /// dead handle.
    pub fn disconnect(&self) {
        if let Some(record) = self.upgrade() {
            record.disconnect();
        }
    }

    /// True while the registration is connected and its signal is alive.
    pub fn connected(&self) -> bool {
        self.upgrade().is_some_and(|record| record.connected())
    }

    /// True while at least one [`BlockGuard`] for this connection lives.
    pub fn blocked(&self) -> bool {
        self.upgrade().is_some_and(|record| record.blocked())
    }

    /// Block delivery to this connection for the guard's lifetime.
    ///
    /// Guards nest: the slot is skipped until every guard has dropped.
    /// Blocking a detached or dead handle yields an inert guard.
    pub fn block(&self) -> BlockGuard {
        let record = self.upgrade();
        if let Some(record) = &record {
            record.block();
        }
        BlockGuard { record }
    }

    /// Wrap into a guard that disconnects on drop.
    pub fn scoped(self) -> ScopedConnection {
        ScopedConnection {
            handle: Some(self),
        }
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        match (&self.record, &other.record) {
            (Some(a), Some(b)) => a.ptr_eq(b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl Eq for ConnectionHandle {}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("connected", &self.connected())
            .field("blocked", &self.blocked())
            .finish_non_exhaustive()
    }
}

/// RAII guard holding one block on a connection.
///
/// Holds the record strongly so the block stays accounted even if the
/// registration is garbage collected while blocked.
pub struct BlockGuard {
    record: Option<Arc<dyn RecordControl>>,
}

impl Drop for BlockGuard {
    fn drop(&mut self) {
        if let Some(record) = self.record.take() {
            record.unblock();
        }
    }
}

impl std::fmt::Debug for BlockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockGuard")
            .field("active", &self.record.is_some())
            .finish()
    }
}

/// Connection that disconnects when dropped.
pub struct ScopedConnection {
    handle: Option<ConnectionHandle>,
}

impl ScopedConnection {
    /// The underlying handle.
    pub fn handle(&self) -> &ConnectionHandle {
        // `handle` is only None transiently inside release/drop.
        self.handle.as_ref().unwrap_or(&DETACHED)
    }

    /// Give up RAII ownership without disconnecting.
    pub fn release(mut self) -> ConnectionHandle {
        self.handle.take().unwrap_or_default()
    }
}

static DETACHED: ConnectionHandle = ConnectionHandle { record: None };

impl Drop for ScopedConnection {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.disconnect();
        }
    }
}

impl From<ConnectionHandle> for ScopedConnection {
    fn from(handle: ConnectionHandle) -> Self {
        handle.scoped()
    }
}

impl std::fmt::Debug for ScopedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedConnection")
            .field("handle", self.handle())
            .finish()
    }
}
