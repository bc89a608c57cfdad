#![forbid(unsafe_code)]

//! The signal core: connect/disconnect/dispatch orchestration.
//!
//! # Design
//!
//! A [`SignalCore`] owns one shared [`InvocationSnapshot`] and a mutex
//! guarding only the snapshot pointer swap and the garbage-collection
//! cursor. Dispatch clones the snapshot `Arc` under that mutex and then
//! runs entirely outside it, so connects, disconnects, and re-entrant
//! dispatches proceed concurrently; structural mutation uses clone-on-write
//! (`Arc::make_mut`), never in-place mutation visible to a concurrent
//! reader.
//!
//! # Locking discipline
//!
//! The signal mutex is never held across a slot call, and record locks are
//! never held while taking the signal mutex. A slot body may therefore
//! freely connect, disconnect, block, or re-dispatch on the same signal.
//!
//! # Garbage collection
//!
//! Disconnect only marks records; erasure happens in bounded opportunistic
//! sweeps whenever the mutex is taken and the snapshot is uniquely owned,
//! and in a forced full sweep after any dispatch pass that saw more
//! disconnected records than connected ones (the sweep trigger is a drop
//! guard, so it survives a panicking slot).

use std::sync::Arc;

use parking_lot::Mutex;

use crate::combiner::{Combiner, OptionalLastValue};
use crate::connection::{ConnectionHandle, RecordControl};
use crate::dispatch::{DispatchIterator, DispatchStats};
use crate::gc::{self, SweepPolicy};
use crate::group::{ConnectPosition, GroupKey};
use crate::list::GroupedConnectionList;
use crate::record::ConnectionRecord;
use crate::slot::{ExtendedSlot, Slot, SlotId};
use crate::snapshot::InvocationSnapshot;

struct SignalState<A, R, C, G> {
    snapshot: Arc<InvocationSnapshot<A, R, C, G>>,
    /// Incremental sweep position; only meaningful for the current list.
    cursor: usize,
}

/// The dispatch point: holds the current snapshot and the signal mutex.
///
/// Parameterized over the argument tuple `A`, the slot result `R`, the
/// combiner `C`, and the group key `G`.
pub struct SignalCore<A, R = (), C = OptionalLastValue<R>, G = i32> {
    state: Mutex<SignalState<A, R, C, G>>,
    policy: SweepPolicy,
}

impl<A, R, C, G> SignalCore<A, R, C, G>
where
    A: 'static,
    R: 'static,
    C: Combiner<R>,
    G: Ord + Send + Sync + 'static,
{
    /// Core with the default-constructed combiner.
    pub fn new() -> Self
    where
        C: Default,
    {
        Self::with_combiner(C::default())
    }

    pub fn with_combiner(combiner: C) -> Self {
        Self::with_policy(combiner, SweepPolicy::default())
    }

    pub fn with_policy(combiner: C, policy: SweepPolicy) -> Self {
        Self {
            state: Mutex::new(SignalState {
                snapshot: Arc::new(InvocationSnapshot::new(combiner)),
                cursor: 0,
            }),
            policy,
        }
    }

    /// Connect an ungrouped slot at the front or back.
    pub fn connect(&self, slot: Slot<A, R>, position: ConnectPosition) -> ConnectionHandle {
        self.connect_record(GroupKey::ungrouped(position), slot, position)
    }

    /// Connect a slot into `group`, positioned within the group.
    pub fn connect_in_group(
        &self,
        group: G,
        slot: Slot<A, R>,
        position: ConnectPosition,
    ) -> ConnectionHandle {
        self.connect_record(GroupKey::Grouped(group), slot, position)
    }

    /// Connect a slot that receives its own handle as first argument.
    ///
    /// The handle is bound after the record is published; a dispatch racing
    /// that window sees a detached handle.
    pub fn connect_extended(
        &self,
        slot: ExtendedSlot<A, R>,
        position: ConnectPosition,
    ) -> ConnectionHandle {
        let (slot, cell) = slot.into_bound();
        let handle = self.connect(slot, position);
        let _ = cell.set(handle.clone());
        handle
    }

    /// Grouped form of [`connect_extended`](Self::connect_extended).
    pub fn connect_extended_in_group(
        &self,
        group: G,
        slot: ExtendedSlot<A, R>,
        position: ConnectPosition,
    ) -> ConnectionHandle {
        let (slot, cell) = slot.into_bound();
        let handle = self.connect_in_group(group, slot, position);
        let _ = cell.set(handle.clone());
        handle
    }

    /// Disconnect every connection in `group`.
    pub fn disconnect_group(&self, group: &G) {
        let snapshot = self.readable_snapshot();
        let range = snapshot.list().range(group);
        for record in range {
            record.disconnect();
        }
        tracing::debug!(slots = range.len(), "disconnected group");
    }

    /// Disconnect every connection holding the slot with this identity.
    ///
    /// Returns true if any connection matched.
    pub fn disconnect_slot(&self, id: SlotId) -> bool {
        let snapshot = self.readable_snapshot();
        let mut matched = false;
        for record in snapshot.list().iter() {
            matched |= record.disconnect_if_slot(id);
        }
        matched
    }

    /// Disconnect everything.
    pub fn disconnect_all(&self) {
        let snapshot = self.readable_snapshot();
        for record in snapshot.list().iter() {
            record.disconnect();
        }
        tracing::debug!(slots = snapshot.list().len(), "disconnected all slots");
    }

    /// Dispatch: invoke connected slots in list order, feeding results to
    /// the combiner, and return what the combiner produces.
    ///
    /// The pass operates on the snapshot captured here: connects and
    /// disconnects issued during the pass (including from slot bodies) are
    /// visible to the *next* dispatch, not this one. A panicking slot
    /// aborts the remainder of the pass and propagates.
    pub fn invoke(&self, args: &A) -> C::Output {
        let snapshot = {
            let mut state = self.state.lock();
            Self::opportunistic_sweep(&mut state, self.policy.dispatch_budget, false);
            Arc::clone(&state.snapshot)
        };
        let stats = DispatchStats::default();
        let sentinel = SweepSentinel {
            core: self,
            list: Arc::clone(&snapshot.list),
            stats: &stats,
        };
        let iter = DispatchIterator::new(snapshot.list(), args, &stats);
        let output = snapshot.combiner().combine(iter);
        drop(sentinel);
        output
    }

    /// Number of connected slots (blocked ones count; disconnected,
    /// not-yet-collected ones do not).
    pub fn num_slots(&self) -> usize {
        let snapshot = self.readable_snapshot();
        snapshot
            .list()
            .iter()
            .filter(|record| record.is_connected())
            .count()
    }

    /// True when no connected slot remains.
    pub fn is_empty(&self) -> bool {
        let snapshot = self.readable_snapshot();
        !snapshot.list().iter().any(|record| record.is_connected())
    }

    /// The current combiner.
    pub fn combiner(&self) -> Arc<C> {
        Arc::clone(&self.state.lock().snapshot.combiner)
    }

    /// Replace the combiner.
    ///
    /// An in-progress dispatch keeps the combiner captured in its snapshot;
    /// the replacement applies from the next dispatch on. The connection
    /// list is preserved, not cloned.
    pub fn set_combiner(&self, combiner: C) {
        let mut state = self.state.lock();
        let snapshot = Arc::make_mut(&mut state.snapshot);
        snapshot.combiner = Arc::new(combiner);
        tracing::debug!("combiner replaced");
    }

    /// The sweep policy this core runs with.
    pub fn policy(&self) -> SweepPolicy {
        self.policy
    }

    fn readable_snapshot(&self) -> Arc<InvocationSnapshot<A, R, C, G>> {
        Arc::clone(&self.state.lock().snapshot)
    }

    fn connect_record(
        &self,
        key: GroupKey<G>,
        slot: Slot<A, R>,
        position: ConnectPosition,
    ) -> ConnectionHandle {
        let record = Arc::new(ConnectionRecord::new(key, slot));
        {
            let mut state = self.state.lock();
            let list = self.unique_list_mut(&mut state);
            match position {
                ConnectPosition::Front => list.insert_front(Arc::clone(&record)),
                ConnectPosition::Back => list.insert_back(Arc::clone(&record)),
            }
        }
        tracing::trace!("connected slot");
        let control: Arc<dyn RecordControl> = record;
        ConnectionHandle::for_record(Arc::downgrade(&control))
    }

    /// Bounded sweep from the remembered cursor, only when the snapshot
    /// (and its list) are uniquely owned; mutating a shared list would be
    /// visible to an in-flight dispatch.
    fn opportunistic_sweep(
        state: &mut SignalState<A, R, C, G>,
        budget: usize,
        scan_expired: bool,
    ) {
        if let Some(snapshot) = Arc::get_mut(&mut state.snapshot) {
            if let Some(list) = Arc::get_mut(&mut snapshot.list) {
                let start = if state.cursor >= list.len() {
                    0
                } else {
                    state.cursor
                };
                state.cursor = gc::sweep(list, start, Some(budget), scan_expired);
            }
        }
    }

    /// Make the current list exclusively ours, cloning it (and fully
    /// sweeping the clone) when a concurrent dispatch still reads it.
    fn unique_list_mut<'s>(
        &self,
        state: &'s mut SignalState<A, R, C, G>,
    ) -> &'s mut GroupedConnectionList<A, R, G> {
        let unique = Arc::get_mut(&mut state.snapshot)
            .is_some_and(|snapshot| Arc::get_mut(&mut snapshot.list).is_some());
        if unique {
            // Examine more than one record here: certain repeated
            // connect/disconnect patterns would otherwise grow the list
            // without limit.
            Self::opportunistic_sweep(state, self.policy.connect_budget, true);
        } else {
            let mut list = (*state.snapshot.list).clone();
            let cursor = gc::sweep(&mut list, 0, None, true);
            let combiner = Arc::clone(&state.snapshot.combiner);
            state.snapshot = Arc::new(InvocationSnapshot::from_parts(Arc::new(list), combiner));
            state.cursor = cursor;
        }
        // Uniquely owned now; make_mut never actually clones here.
        let snapshot = Arc::make_mut(&mut state.snapshot);
        Arc::make_mut(&mut snapshot.list)
    }

    /// Full sweep requested by a finished dispatch pass.
    ///
    /// Skipped if the list the pass ran over has already been replaced.
    fn force_full_sweep(&self, expected: &Arc<GroupedConnectionList<A, R, G>>) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if !Arc::ptr_eq(&state.snapshot.list, expected) {
            return;
        }
        let snapshot = Arc::make_mut(&mut state.snapshot);
        let list = Arc::make_mut(&mut snapshot.list);
        let before = list.len();
        state.cursor = gc::sweep(list, 0, None, false);
        tracing::debug!(erased = before - list.len(), "full sweep after dispatch");
    }
}

impl<A, R, C, G> Default for SignalCore<A, R, C, G>
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

impl<A, R, C, G> std::fmt::Debug for SignalCore<A, R, C, G>
where
    A: 'static,
    R: 'static,
    C: Combiner<R>,
    G: Ord + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalCore")
            .field("slots", &self.num_slots())
            .finish_non_exhaustive()
    }
}

// Runs the janitor decision when the dispatch pass ends, panicking slots
// included: if the pass saw disconnected records outnumber connected ones,
// force a full sweep so churn cannot grow the list without bound.
struct SweepSentinel<'a, A, R, C, G>
where
    A: 'static,
    R: 'static,
    C: Combiner<R>,
    G: Ord + Send + Sync + 'static,
{
    core: &'a SignalCore<A, R, C, G>,
    list: Arc<GroupedConnectionList<A, R, G>>,
    stats: &'a DispatchStats,
}

impl<A, R, C, G> Drop for SweepSentinel<'_, A, R, C, G>
where
    A: 'static,
    R: 'static,
    C: Combiner<R>,
    G: Ord + Send + Sync + 'static,
{
    fn drop(&mut self) {
        let connected = self.stats.connected();
        let disconnected = self.stats.disconnected();
        if self.core.policy.full_sweep_due(connected, disconnected) {
            self.core.force_full_sweep(&self.list);
        }
    }
}
