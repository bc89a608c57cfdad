#![forbid(unsafe_code)]

//! Slots: the adapted callable plus its tracked dependencies.
//!
//! # Design
//!
//! A [`Slot`] bundles three things that are fixed at construction:
//!
//! - the callable, stored behind one uniform fallible interface
//!   (`Fn(&A) -> Result<R, ExpiredError>`) so weak-bound callables can
//!   report expiry at call time;
//! - the ordered set of weak references to tracked dependencies, checked in
//!   full on every dispatch step;
//! - a stable [`SlotId`] derived from the callable's allocation, used for
//!   by-identity disconnect.
//!
//! Tracking is explicit: anything implementing [`Trackable`] can be handed
//! to [`Slot::track`], and [`Slot::bound`] weak-binds a method-style
//! callable to a shared object while tracking it automatically. References
//! to trackables are unwrapped by a blanket impl, so `track(&arc)` and
//! `track(&&arc)` both work.
//!
//! # Failure Modes
//!
//! - A tracked dependency dropping between construction and dispatch makes
//!   the slot *expired*: dispatch skips it and disconnects the record.
//!   [`Slot::lock_tracked`] surfaces the same condition as
//!   [`ExpiredError`] to callers that resolve dependencies by hand.

use std::any::Any;
use std::sync::{Arc, OnceLock, Weak};

use smallvec::SmallVec;

use crate::connection::ConnectionHandle;
use crate::error::ExpiredError;

/// Result of one slot invocation.
pub type SlotResult<R> = Result<R, ExpiredError>;

/// Uniform callable interface all slots are adapted to.
pub type SlotCallable<A, R> = dyn Fn(&A) -> SlotResult<R> + Send + Sync;

type ExtendedCallable<A, R> = dyn Fn(&ConnectionHandle, &A) -> SlotResult<R> + Send + Sync;

/// Weak reference to a tracked dependency.
pub type WeakTracked = Weak<dyn Any + Send + Sync>;

/// Strong reference produced by resolving a [`WeakTracked`].
pub type StrongTracked = Arc<dyn Any + Send + Sync>;

/// Batch of strong references held for the duration of one dispatch step.
///
/// Inline capacity covers typical slots (a handful of tracked objects)
/// without touching the heap in the dispatch loop.
pub type TrackedBatch = SmallVec<[StrongTracked; 8]>;

/// Identity of a slot's callable, stable for the lifetime of the slot.
///
/// Two slots compare equal only if they share the same callable
/// allocation; wrapping the same `fn` in two `Slot::new` calls yields two
/// distinct ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(usize);

impl SlotId {
    fn of<A, R>(call: &Arc<SlotCallable<A, R>>) -> Self {
        Self(Arc::as_ptr(call) as *const () as usize)
    }

    fn of_extended<A, R>(call: &Arc<ExtendedCallable<A, R>>) -> Self {
        Self(Arc::as_ptr(call) as *const () as usize)
    }
}

/// An object that can be tracked by a slot.
///
/// Implementors hand out a weak view of themselves; the slot resolves it on
/// every dispatch and treats a failed resolution as expiry.
pub trait Trackable {
    /// A weak reference whose liveness gates the slot.
    fn weak_handle(&self) -> WeakTracked;
}

impl<T: Send + Sync + 'static> Trackable for Arc<T> {
    fn weak_handle(&self) -> WeakTracked {
        let weak: Weak<T> = Arc::downgrade(self);
        weak
    }
}

impl<T: Send + Sync + 'static> Trackable for Weak<T> {
    fn weak_handle(&self) -> WeakTracked {
        let weak: Weak<T> = self.clone();
        weak
    }
}

// Unwrap references so `track(&arc)` and `track(&&arc)` read the same.
impl<T: Trackable + ?Sized> Trackable for &T {
    fn weak_handle(&self) -> WeakTracked {
        (**self).weak_handle()
    }
}

/// One registered callback plus its tracked dependencies.
pub struct Slot<A, R> {
    call: Arc<SlotCallable<A, R>>,
    tracked: Vec<WeakTracked>,
    id: SlotId,
}

impl<A, R> std::fmt::Debug for Slot<A, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slot")
            .field("id", &self.id)
            .field("tracked", &self.tracked.len())
            .finish_non_exhaustive()
    }
}

impl<A: 'static, R: 'static> Slot<A, R> {
    /// Wrap a plain callable.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&A) -> R + Send + Sync + 'static,
    {
        Self::fallible(move |args| Ok(f(args)))
    }

    /// Wrap a callable that can itself report expiry.
    ///
    /// This is the escape hatch for adapters that resolve weak references
    /// per call (signal chaining uses it); plain callbacks should use
    /// [`Slot::new`].
    pub fn fallible<F>(f: F) -> Self
    where
        F: Fn(&A) -> SlotResult<R> + Send + Sync + 'static,
    {
        let call: Arc<SlotCallable<A, R>> = Arc::new(f);
        let id = SlotId::of(&call);
        Self {
            call,
            tracked: Vec::new(),
            id,
        }
    }

    /// Weak-bind a method-style callable to a shared object.
    ///
    /// The object is tracked automatically: once the last strong reference
    /// outside the dispatch engine drops, the slot expires and its
    /// connection is lazily disconnected.
    pub fn bound<T, F>(target: &Arc<T>, f: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&T, &A) -> R + Send + Sync + 'static,
    {
        let weak = Arc::downgrade(target);
        let call_weak = weak.clone();
        let mut slot = Self::fallible(move |args| match call_weak.upgrade() {
            Some(obj) => Ok(f(&obj, args)),
            None => Err(ExpiredError),
        });
        let tracked: WeakTracked = weak;
        slot.tracked.push(tracked);
        slot
    }

    /// Track an additional dependency.
    ///
    /// The trackable set is fixed once the slot is connected; every entry is
    /// checked on every dispatch step.
    #[must_use]
    pub fn track<T: Trackable + ?Sized>(mut self, dep: &T) -> Self {
        self.tracked.push(dep.weak_handle());
        self
    }

    /// Identity of this slot's callable.
    pub fn id(&self) -> SlotId {
        self.id
    }

    /// Number of tracked dependencies.
    pub fn tracked_len(&self) -> usize {
        self.tracked.len()
    }

    /// True if any tracked dependency has been destroyed.
    pub fn expired(&self) -> bool {
        self.tracked.iter().any(|weak| weak.strong_count() == 0)
    }

    /// Resolve every tracked dependency to a strong reference.
    ///
    /// Fails with [`ExpiredError`] if any dependency is already gone; on
    /// failure the caller should treat the slot as terminally expired.
    pub fn lock_tracked(&self) -> Result<Vec<StrongTracked>, ExpiredError> {
        let mut locked = Vec::with_capacity(self.tracked.len());
        for weak in &self.tracked {
            match weak.upgrade() {
                Some(strong) => locked.push(strong),
                None => return Err(ExpiredError),
            }
        }
        Ok(locked)
    }

    /// Invoke the callable directly, outside any dispatch.
    pub fn invoke(&self, args: &A) -> SlotResult<R> {
        (self.call)(args)
    }

    /// Resolve the tracked set into `out`, all-or-nothing.
    ///
    /// Only meaningful under the owning record's lock; see
    /// `ConnectionRecord` for the locking discipline.
    pub(crate) fn grab_tracked(&self, out: &mut TrackedBatch) -> Result<(), ExpiredError> {
        for weak in &self.tracked {
            match weak.upgrade() {
                Some(strong) => out.push(strong),
                None => return Err(ExpiredError),
            }
        }
        Ok(())
    }

    /// Clone of the callable, for invocation outside the record lock.
    pub(crate) fn callable(&self) -> Arc<SlotCallable<A, R>> {
        Arc::clone(&self.call)
    }
}

/// A slot that receives its own [`ConnectionHandle`] as first argument.
///
/// Extended slots can disconnect or block themselves from within their own
/// invocation. The handle is bound after the connection is made; in the
/// window between publication of the record and the binding, a concurrent
/// dispatch sees a detached handle.
pub struct ExtendedSlot<A, R> {
    call: Arc<ExtendedCallable<A, R>>,
    tracked: Vec<WeakTracked>,
    id: SlotId,
}

impl<A, R> std::fmt::Debug for ExtendedSlot<A, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtendedSlot")
            .field("id", &self.id)
            .field("tracked", &self.tracked.len())
            .finish_non_exhaustive()
    }
}

impl<A: 'static, R: 'static> ExtendedSlot<A, R> {
    /// Wrap a callable taking `(handle, args)`.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&ConnectionHandle, &A) -> R + Send + Sync + 'static,
    {
        let call: Arc<ExtendedCallable<A, R>> = Arc::new(move |conn, args| Ok(f(conn, args)));
        let id = SlotId::of_extended(&call);
        Self {
            call,
            tracked: Vec::new(),
            id,
        }
    }

    /// Track an additional dependency; see [`Slot::track`].
    #[must_use]
    pub fn track<T: Trackable + ?Sized>(mut self, dep: &T) -> Self {
        self.tracked.push(dep.weak_handle());
        self
    }

    /// Identity of this slot's callable, usable with by-identity disconnect.
    pub fn id(&self) -> SlotId {
        self.id
    }

    /// Adapt into an ordinary slot plus the cell the connection is bound
    /// through once `connect` has produced the handle.
    ///
    /// The produced slot inherits this slot's identity and tracked set.
    pub(crate) fn into_bound(self) -> (Slot<A, R>, Arc<OnceLock<ConnectionHandle>>) {
        let cell = Arc::new(OnceLock::new());
        let bound_cell = Arc::clone(&cell);
        let call = self.call;
        let mut slot = Slot::fallible(move |args: &A| {
            let conn = bound_cell
                .get()
                .cloned()
                .unwrap_or_else(ConnectionHandle::detached);
            call(&conn, args)
        });
        slot.tracked = self.tracked;
        slot.id = self.id;
        (slot, cell)
    }
}
