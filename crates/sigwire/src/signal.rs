#![forbid(unsafe_code)]

//! The caller-facing `Signal` handle.
//!
//! [`Signal`] is a cheap shared handle over the core engine: cloning it
//! produces another handle to the **same** dispatch point. Both see the
//! same connections, and equality is identity. All heavy lifting lives in
//! `sigwire-core`; this type adds the shared-handle ergonomics and
//! signal-to-signal chaining with automatic lifetime tracking.

use std::sync::Arc;

use sigwire_core::combiner::{Combiner, OptionalLastValue};
use sigwire_core::connection::ConnectionHandle;
use sigwire_core::error::ExpiredError;
use sigwire_core::gc::SweepPolicy;
use sigwire_core::group::ConnectPosition;
use sigwire_core::signal::SignalCore;
use sigwire_core::slot::{ExtendedSlot, Slot, SlotId};

/// A dispatch point: slots connect to it, `invoke` delivers to them.
///
/// Parameterized over the argument tuple `A`, the slot result `R`, the
/// combiner `C` (defaults to keep-the-last-value), and the group key `G`.
///
/// Any thread may connect, disconnect, or invoke concurrently; a dispatch
/// in progress runs against the snapshot it captured, so mutations during
/// a pass become visible from the next pass on.
pub struct Signal<A, R = (), C = OptionalLastValue<R>, G = i32> {
    core: Arc<SignalCore<A, R, C, G>>,
}

// Shares the core: both handles dispatch to the same connections.
impl<A, R, C, G> Clone for Signal<A, R, C, G> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<A, R, C, G> Signal<A, R, C, G>
where
    A: 'static,
    R: 'static,
    C: Combiner<R>,
    G: Ord + Send + Sync + 'static,
{
    /// Signal with the default-constructed combiner.
    #[must_use]
    pub fn new() -> Self
    where
        C: Default,
    {
        Self::with_combiner(C::default())
    }

    /// Signal with an explicit combiner instance.
    #[must_use]
    pub fn with_combiner(combiner: C) -> Self {
        Self {
            core: Arc::new(SignalCore::with_combiner(combiner)),
        }
    }

    /// Signal with explicit garbage-collection tuning.
    #[must_use]
    pub fn with_policy(combiner: C, policy: SweepPolicy) -> Self {
        Self {
            core: Arc::new(SignalCore::with_policy(combiner, policy)),
        }
    }

    /// Connect an ungrouped slot at the front or back.
    pub fn connect(&self, slot: Slot<A, R>, position: ConnectPosition) -> ConnectionHandle {
        self.core.connect(slot, position)
    }

    /// Connect a slot into `group`, positioned within the group.
    ///
    /// Groups dispatch between the front- and back-ungrouped slots, in
    /// `G`'s order, each group FIFO by insertion.
    pub fn connect_in_group(
        &self,
        group: G,
        slot: Slot<A, R>,
        position: ConnectPosition,
    ) -> ConnectionHandle {
        self.core.connect_in_group(group, slot, position)
    }

    /// Connect a slot that receives its own connection handle, enabling
    /// self-disconnect from within the call.
    pub fn connect_extended(
        &self,
        slot: ExtendedSlot<A, R>,
        position: ConnectPosition,
    ) -> ConnectionHandle {
        self.core.connect_extended(slot, position)
    }

    /// Grouped form of [`connect_extended`](Self::connect_extended).
    pub fn connect_extended_in_group(
        &self,
        group: G,
        slot: ExtendedSlot<A, R>,
        position: ConnectPosition,
    ) -> ConnectionHandle {
        self.core.connect_extended_in_group(group, slot, position)
    }

    /// Connect `downstream` as a slot of this signal.
    ///
    /// Only a weak reference is kept, and the downstream core is tracked:
    /// dropping the last handle to `downstream` expires the chain
    /// connection instead of dangling it. The downstream combiner's output
    /// becomes the slot's result, so it must match this signal's `R`.
    pub fn chain<R2, C2, G2>(&self, downstream: &Signal<A, R2, C2, G2>) -> ConnectionHandle
    where
        R2: 'static,
        C2: Combiner<R2, Output = R>,
        G2: Ord + Send + Sync + 'static,
    {
        let weak = Arc::downgrade(&downstream.core);
        let slot = Slot::fallible(move |args: &A| match weak.upgrade() {
            Some(core) => Ok(core.invoke(args)),
            None => Err(ExpiredError),
        })
        .track(&downstream.core);
        tracing::debug!("chained downstream signal");
        self.connect(slot, ConnectPosition::Back)
    }

    /// Disconnect every connection in `group`.
    pub fn disconnect_group(&self, group: &G) {
        self.core.disconnect_group(group);
    }

    /// Disconnect every connection holding the slot with this identity;
    /// true if any matched.
    pub fn disconnect_slot(&self, id: SlotId) -> bool {
        self.core.disconnect_slot(id)
    }

    /// Disconnect everything.
    pub fn disconnect_all(&self) {
        self.core.disconnect_all();
    }

    /// Dispatch to connected slots in order; returns the combiner result.
    pub fn invoke(&self, args: &A) -> C::Output {
        self.core.invoke(args)
    }

    /// Number of connected slots (blocked ones included).
    #[must_use]
    pub fn num_slots(&self) -> usize {
        self.core.num_slots()
    }

    /// True when no connected slot remains.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.core.is_empty()
    }

    /// The current combiner.
    #[must_use]
    pub fn combiner(&self) -> Arc<C> {
        self.core.combiner()
    }

    /// Replace the combiner; applies from the next dispatch on.
    pub fn set_combiner(&self, combiner: C) {
        self.core.set_combiner(combiner);
    }

    /// The garbage-collection tuning this signal runs with.
    #[must_use]
    pub fn policy(&self) -> SweepPolicy {
        self.core.policy()
    }
}

impl<A, R, C, G> Default for Signal<A, R, C, G>
where
    A: 'static,
    R: 'static,
    C: Combiner<R> + Default,
    G: Ord + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

// Identity: two handles are equal when they share the same core.
impl<A, R, C, G> PartialEq for Signal<A, R, C, G> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }
}

impl<A, R, C, G> Eq for Signal<A, R, C, G> {}

impl<A, R, C, G> std::fmt::Debug for Signal<A, R, C, G>
where
    A: 'static,
    R: 'static,
    C: Combiner<R>,
    G: Ord + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("slots", &self.num_slots())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_dispatch_point() {
        let signal: Signal<i32, i32> = Signal::new();
        let other = signal.clone();

        other.connect(Slot::new(|x: &i32| x * 2), ConnectPosition::Back);
        assert_eq!(signal.invoke(&4), Some(8));
        assert_eq!(signal, other);
    }

    #[test]
    fn distinct_signals_are_unequal() {
        let a: Signal<(), ()> = Signal::new();
        let b: Signal<(), ()> = Signal::new();
        assert_ne!(a, b);
    }

    #[test]
    fn debug_reports_slot_count() {
        let signal: Signal<(), ()> = Signal::new();
        signal.connect(Slot::new(|_: &()| ()), ConnectPosition::Back);
        let rendered = format!("{signal:?}");
        assert!(rendered.contains("Signal"));
        assert!(rendered.contains("slots: 1"));
    }

    #[test]
    fn chain_delivers_downstream() {
        let upstream: Signal<i32, Option<i32>> = Signal::new();
        let downstream: Signal<i32, i32> = Signal::new();
        downstream.connect(Slot::new(|x: &i32| x + 1), ConnectPosition::Back);

        upstream.chain(&downstream);
        assert_eq!(upstream.invoke(&1), Some(Some(2)));
    }

    #[test]
    fn dropping_the_downstream_expires_the_chain() {
        let upstream: Signal<i32, Option<i32>> = Signal::new();
        let downstream: Signal<i32, i32> = Signal::new();
        downstream.connect(Slot::new(|x: &i32| x + 1), ConnectPosition::Back);

        let link = upstream.chain(&downstream);
        drop(downstream);

        assert!(link.connected());
        assert_eq!(upstream.invoke(&1), None);
        assert!(!link.connected());
    }
}
