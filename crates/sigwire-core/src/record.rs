#![forbid(unsafe_code)]

//! Connection records: the shared mutable state of one registration.
//!
//! # Design
//!
//! A [`ConnectionRecord`] is identity-stable and heap-allocated; the list,
//! every outstanding handle, and any in-flight dispatch step all share the
//! same allocation, so the record lives as long as its longest holder.
//! All mutable state sits behind one record-local lock:
//!
//! - `connected`: monotonic, set false exactly once and never reset. A
//!   disconnected record stays readable until the garbage collector erases
//!   it from the list.
//! - `blocked`: a counter; while positive, dispatch skips the record
//!   without disconnecting it.
//! - `in_flight`: dispatch steps currently holding the record. Teardown
//!   of the stored slot (releasing the callable and its captures) after a
//!   disconnect is deferred until the last step ends.
//!
//! # Locking discipline
//!
//! The record lock is held only for a flag check or a tracked-reference
//! grab, never across a slot call, and never while taking the signal
//! mutex. `grab_tracked` must only run under this lock: it races with a
//! concurrent disconnect/teardown otherwise.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::connection::RecordControl;
use crate::group::GroupKey;
use crate::slot::{Slot, SlotCallable, SlotId, TrackedBatch};

/// Outcome of examining a record for one dispatch step.
pub(crate) enum StepDecision<A, R> {
    /// Connected, unblocked, tracked set resolved; the record's in-flight
    /// count has been raised and must be released with
    /// [`ConnectionRecord::end_dispatch_step`].
    Call(Arc<SlotCallable<A, R>>),
    /// Connected but blocked; skip without invoking.
    Blocked,
    /// Disconnected, torn down, or expired; skip.
    Disconnected,
}

struct RecordState<A, R> {
    slot: Option<Slot<A, R>>,
    connected: bool,
    blocked: usize,
    in_flight: usize,
}

impl<A, R> RecordState<A, R> {
    // Monotonic: `connected` never goes back to true. Teardown is deferred
    // while a dispatch step is in flight.
    fn disconnect(&mut self) {
        self.connected = false;
        if self.in_flight == 0 {
            self.slot = None;
        }
    }
}

/// Shared state of one registration; see the module docs.
pub struct ConnectionRecord<A, R, G> {
    group_key: GroupKey<G>,
    state: Mutex<RecordState<A, R>>,
}

impl<A: 'static, R: 'static, G> ConnectionRecord<A, R, G> {
    pub(crate) fn new(group_key: GroupKey<G>, slot: Slot<A, R>) -> Self {
        Self {
            group_key,
            state: Mutex::new(RecordState {
                slot: Some(slot),
                connected: true,
                blocked: 0,
                in_flight: 0,
            }),
        }
    }

    pub(crate) fn group_key(&self) -> &GroupKey<G> {
        &self.group_key
    }

    /// Idempotent; safe from any thread, including a slot disconnecting
    /// its own record mid-dispatch.
    pub(crate) fn disconnect(&self) {
        self.state.lock().disconnect();
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    pub(crate) fn is_blocked(&self) -> bool {
        self.state.lock().blocked > 0
    }

    pub(crate) fn block(&self) {
        self.state.lock().blocked += 1;
    }

    pub(crate) fn unblock(&self) {
        let mut state = self.state.lock();
        state.blocked = state.blocked.saturating_sub(1);
    }

    /// Examine the record for one dispatch step.
    ///
    /// Under the record lock: resolves the tracked set into `out`
    /// (all-or-nothing), checks the flags, and on success hands out the
    /// callable with the in-flight count raised. An expired tracked set
    /// disconnects the record as a side effect.
    pub(crate) fn acquire_for_dispatch(&self, out: &mut TrackedBatch) -> StepDecision<A, R> {
        let mut state = self.state.lock();
        let decision = match &state.slot {
            Some(slot) if state.connected => {
                if slot.grab_tracked(out).is_err() {
                    None
                } else if state.blocked > 0 {
                    Some(StepDecision::Blocked)
                } else {
                    Some(StepDecision::Call(slot.callable()))
                }
            }
            _ => Some(StepDecision::Disconnected),
        };
        match decision {
            None => {
                state.disconnect();
                StepDecision::Disconnected
            }
            Some(StepDecision::Call(call)) => {
                state.in_flight += 1;
                StepDecision::Call(call)
            }
            Some(skip) => skip,
        }
    }

    /// Release one in-flight hold, performing any teardown a disconnect
    /// deferred while the step ran.
    pub(crate) fn end_dispatch_step(&self) {
        let mut state = self.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        if !state.connected && state.in_flight == 0 {
            state.slot = None;
        }
    }

    /// Disconnect if any tracked dependency is already gone.
    ///
    /// Used by expiry-scanning garbage collection sweeps.
    pub(crate) fn disconnect_if_expired(&self) {
        let mut state = self.state.lock();
        let expired = state.connected && state.slot.as_ref().is_some_and(Slot::expired);
        if expired {
            state.disconnect();
        }
    }

    /// Disconnect if this record holds the slot with the given identity.
    pub(crate) fn disconnect_if_slot(&self, id: SlotId) -> bool {
        let mut state = self.state.lock();
        let matched =
            state.connected && state.slot.as_ref().is_some_and(|slot| slot.id() == id);
        if matched {
            state.disconnect();
        }
        matched
    }
}

impl<A: 'static, R: 'static, G: Send + Sync + 'static> RecordControl
    for ConnectionRecord<A, R, G>
{
    fn disconnect(&self) {
        ConnectionRecord::disconnect(self);
    }

    fn connected(&self) -> bool {
        self.is_connected()
    }

    fn blocked(&self) -> bool {
        self.is_blocked()
    }

    fn block(&self) {
        ConnectionRecord::block(self);
    }

    fn unblock(&self) {
        ConnectionRecord::unblock(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(slot: Slot<i32, i32>) -> ConnectionRecord<i32, i32, i32> {
        ConnectionRecord::new(GroupKey::BackUngrouped, slot)
    }

    #[test]
    fn disconnect_is_idempotent_and_monotonic() {
        let rec = record(Slot::new(|x: &i32| *x));
        assert!(rec.is_connected());
        rec.disconnect();
        assert!(!rec.is_connected());
        rec.disconnect();
        assert!(!rec.is_connected());
    }

    #[test]
    fn disconnect_releases_captured_state() {
        let captured = Arc::new(0u8);
        let probe = Arc::clone(&captured);
        let rec = record(Slot::new(move |x: &i32| {
            let _keep = &probe;
            *x
        }));
        assert_eq!(Arc::strong_count(&captured), 2);

        rec.disconnect();
        assert_eq!(Arc::strong_count(&captured), 1);
    }

    #[test]
    fn teardown_deferred_while_in_flight() {
        let captured = Arc::new(0u8);
        let probe = Arc::clone(&captured);
        let rec = record(Slot::new(move |x: &i32| {
            let _keep = &probe;
            *x
        }));

        let mut batch = TrackedBatch::new();
        let StepDecision::Call(call) = rec.acquire_for_dispatch(&mut batch) else {
            panic!("record should be callable");
        };
        rec.disconnect();
        // The step still holds the record: captures stay alive.
        assert_eq!(Arc::strong_count(&captured), 2);
        assert_eq!(call(&3), Ok(3));

        drop(call);
        rec.end_dispatch_step();
        assert_eq!(Arc::strong_count(&captured), 1);
    }

    #[test]
    fn blocked_records_are_skipped_not_disconnected() {
        let rec = record(Slot::new(|x: &i32| *x));
        rec.block();
        let mut batch = TrackedBatch::new();
        assert!(matches!(
            rec.acquire_for_dispatch(&mut batch),
            StepDecision::Blocked
        ));
        assert!(rec.is_connected());

        rec.unblock();
        assert!(matches!(
            rec.acquire_for_dispatch(&mut batch),
            StepDecision::Call(_)
        ));
        rec.end_dispatch_step();
    }

    #[test]
    fn block_counts_nest() {
        let rec = record(Slot::new(|x: &i32| *x));
        rec.block();
        rec.block();
        rec.unblock();
        assert!(rec.is_blocked());
        rec.unblock();
        assert!(!rec.is_blocked());
    }

    #[test]
    fn expired_tracked_set_disconnects_on_acquire() {
        let dep = Arc::new(1u8);
        let rec = record(Slot::new(|x: &i32| *x).track(&dep));
        drop(dep);

        let mut batch = TrackedBatch::new();
        assert!(matches!(
            rec.acquire_for_dispatch(&mut batch),
            StepDecision::Disconnected
        ));
        assert!(!rec.is_connected());
    }

    #[test]
    fn acquire_resolves_tracked_into_batch() {
        let dep = Arc::new(1u8);
        let rec = record(Slot::new(|x: &i32| *x).track(&dep));
        let mut batch = TrackedBatch::new();
        let StepDecision::Call(_call) = rec.acquire_for_dispatch(&mut batch) else {
            panic!("record should be callable");
        };
        assert_eq!(batch.len(), 1);
        rec.end_dispatch_step();
    }

    #[test]
    fn disconnect_by_slot_identity() {
        let slot = Slot::new(|x: &i32| *x);
        let id = slot.id();
        let other = Slot::new(|x: &i32| *x);
        let rec = record(slot);

        assert!(!rec.disconnect_if_slot(other.id()));
        assert!(rec.is_connected());
        assert!(rec.disconnect_if_slot(id));
        assert!(!rec.is_connected());
    }
}
