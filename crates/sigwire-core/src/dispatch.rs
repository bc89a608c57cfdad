#![forbid(unsafe_code)]

//! The lazy slot-calling iterator at the heart of a dispatch pass.
//!
//! # Design
//!
//! [`DispatchIterator`] walks a snapshot's list in key order and yields
//! slot results on demand: nothing is invoked until the combiner pulls,
//! and each record is invoked at most once: `next()` computes each value
//! exactly once, so a combiner that peeks and then consumes cannot
//! double-invoke a slot.
//!
//! Per examined record, under the record's own lock, the iterator resolves
//! the tracked set into a small strong-reference batch and checks the
//! flags; records that are blocked, disconnected, or expired are skipped
//! (expiry also disconnects, whether detected at resolution or reported by
//! the callable itself). The strong batch and the record's in-flight mark
//! are held only for the duration of that one step, never across the
//! advance to the next record.
//!
//! The iterator also tallies connected vs. disconnected records seen;
//! the post-dispatch sweep decision reads the tally through
//! [`DispatchStats`], which outlives the iterator precisely so a panicking
//! slot cannot lose the bookkeeping.

use std::cell::Cell;

use crate::list::GroupedConnectionList;
use crate::record::{ConnectionRecord, StepDecision};
use crate::slot::TrackedBatch;

/// Connected/disconnected tally of one dispatch pass.
///
/// Shared by borrow between the iterator and the signal's post-pass sweep
/// sentinel; single-threaded by construction (one pass, one thread).
#[derive(Default)]
pub(crate) struct DispatchStats {
    connected: Cell<usize>,
    disconnected: Cell<usize>,
}

impl DispatchStats {
    pub(crate) fn note_connected(&self) {
        self.connected.set(self.connected.get() + 1);
    }

    pub(crate) fn note_disconnected(&self) {
        self.disconnected.set(self.disconnected.get() + 1);
    }

    pub(crate) fn connected(&self) -> usize {
        self.connected.get()
    }

    pub(crate) fn disconnected(&self) -> usize {
        self.disconnected.get()
    }
}

// Releases the record's in-flight hold even if the slot body panics.
struct StepGuard<'r, A: 'static, R: 'static, G>(&'r ConnectionRecord<A, R, G>);

impl<A: 'static, R: 'static, G> Drop for StepGuard<'_, A, R, G> {
    fn drop(&mut self) {
        self.0.end_dispatch_step();
    }
}

/// Lazy, forward-only, single-pass iterator over a snapshot's records.
pub struct DispatchIterator<'a, A, R, G> {
    list: &'a GroupedConnectionList<A, R, G>,
    args: &'a A,
    stats: &'a DispatchStats,
    position: usize,
    tracked: TrackedBatch,
}

impl<'a, A, R, G> DispatchIterator<'a, A, R, G> {
    pub(crate) fn new(
        list: &'a GroupedConnectionList<A, R, G>,
        args: &'a A,
        stats: &'a DispatchStats,
    ) -> Self {
        Self {
            list,
            args,
            stats,
            position: 0,
            tracked: TrackedBatch::new(),
        }
    }
}

impl<A: 'static, R: 'static, G> Iterator for DispatchIterator<'_, A, R, G> {
    type Item = R;

    fn next(&mut self) -> Option<R> {
        let list = self.list;
        while let Some(record) = list.get(self.position) {
            self.position += 1;
            self.tracked.clear();
            match record.acquire_for_dispatch(&mut self.tracked) {
                StepDecision::Call(call) => {
                    self.stats.note_connected();
                    let step = StepGuard(record.as_ref());
                    match call(self.args) {
                        Ok(value) => return Some(value),
                        Err(_expired) => {
                            // Call-time expiry: release the step, then
                            // lazily disconnect and move on.
                            drop(step);
                            record.disconnect();
                        }
                    }
                }
                StepDecision::Blocked => self.stats.note_connected(),
                StepDecision::Disconnected => self.stats.note_disconnected(),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExpiredError;
    use crate::group::GroupKey;
    use crate::slot::Slot;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn push(
        list: &mut GroupedConnectionList<(), i32, i32>,
        slot: Slot<(), i32>,
    ) -> Arc<ConnectionRecord<(), i32, i32>> {
        let record = Arc::new(ConnectionRecord::new(GroupKey::BackUngrouped, slot));
        list.insert_back(Arc::clone(&record));
        record
    }

    #[test]
    fn yields_results_in_list_order() {
        let mut list = GroupedConnectionList::new();
        push(&mut list, Slot::new(|_: &()| 1));
        push(&mut list, Slot::new(|_: &()| 2));
        push(&mut list, Slot::new(|_: &()| 3));

        let stats = DispatchStats::default();
        let values: Vec<i32> = DispatchIterator::new(&list, &(), &stats).collect();
        assert_eq!(values, vec![1, 2, 3]);
        assert_eq!(stats.connected(), 3);
        assert_eq!(stats.disconnected(), 0);
    }

    #[test]
    fn slots_run_only_when_pulled() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut list = GroupedConnectionList::new();
        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            push(
                &mut list,
                Slot::new(move |_: &()| calls.fetch_add(1, Ordering::SeqCst) as i32),
            );
        }

        let stats = DispatchStats::default();
        let mut iter = DispatchIterator::new(&list, &(), &stats);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        let _first = iter.next();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        drop(iter);
        // Unpulled records are never invoked.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn blocked_and_disconnected_records_are_skipped() {
        let mut list = GroupedConnectionList::new();
        push(&mut list, Slot::new(|_: &()| 1));
        let blocked = push(&mut list, Slot::new(|_: &()| 2));
        let gone = push(&mut list, Slot::new(|_: &()| 3));
        push(&mut list, Slot::new(|_: &()| 4));

        blocked.block();
        gone.disconnect();

        let stats = DispatchStats::default();
        let values: Vec<i32> = DispatchIterator::new(&list, &(), &stats).collect();
        assert_eq!(values, vec![1, 4]);
        // Blocked still counts as connected; only `gone` is disconnected.
        assert_eq!(stats.connected(), 3);
        assert_eq!(stats.disconnected(), 1);
    }

    #[test]
    fn resolution_expiry_disconnects_and_skips() {
        let dep = Arc::new(0u8);
        let mut list = GroupedConnectionList::new();
        push(&mut list, Slot::new(|_: &()| 1));
        let expired = push(&mut list, Slot::new(|_: &()| 2).track(&dep));
        push(&mut list, Slot::new(|_: &()| 3));
        drop(dep);

        let stats = DispatchStats::default();
        let values: Vec<i32> = DispatchIterator::new(&list, &(), &stats).collect();
        assert_eq!(values, vec![1, 3]);
        assert!(!expired.is_connected());
        assert_eq!(stats.disconnected(), 1);
    }

    #[test]
    fn call_time_expiry_disconnects_and_continues() {
        let mut list = GroupedConnectionList::new();
        let failing = push(&mut list, Slot::fallible(|_: &()| Err(ExpiredError)));
        push(&mut list, Slot::new(|_: &()| 7));

        let stats = DispatchStats::default();
        let values: Vec<i32> = DispatchIterator::new(&list, &(), &stats).collect();
        assert_eq!(values, vec![7]);
        assert!(!failing.is_connected());
    }

    #[test]
    fn in_flight_hold_released_after_each_step() {
        let mut list = GroupedConnectionList::new();
        let record = push(&mut list, Slot::new(|_: &()| 5));

        let stats = DispatchStats::default();
        let mut iter = DispatchIterator::new(&list, &(), &stats);
        assert_eq!(iter.next(), Some(5));

        // The step ended: a disconnect now tears down immediately.
        record.disconnect();
        let mut batch = TrackedBatch::new();
        assert!(matches!(
            record.acquire_for_dispatch(&mut batch),
            StepDecision::Disconnected
        ));
    }

    #[test]
    fn exhausted_iterator_stays_exhausted() {
        let mut list = GroupedConnectionList::new();
        push(&mut list, Slot::new(|_: &()| 1));

        let stats = DispatchStats::default();
        let mut iter = DispatchIterator::new(&list, &(), &stats);
        assert_eq!(iter.next(), Some(1));
        assert_eq!(iter.next(), None);
        assert_eq!(iter.next(), None);
        assert_eq!(stats.connected(), 1);
    }
}
