#![forbid(unsafe_code)]

//! Garbage collection: physical removal of logically-disconnected records.
//!
//! Disconnect never erases; it only marks. Reclamation happens here, in
//! two modes driven by [`SweepPolicy`]:
//!
//! - *incremental*: a bounded number of positions advanced from a cursor
//!   the signal remembers across calls, run opportunistically whenever the
//!   signal mutex is already held and the snapshot is uniquely owned;
//! - *full*: the whole list, forced after a dispatch that saw more
//!   disconnected records than connected ones, so disconnect-heavy churn
//!   cannot grow the list without bound.
//!
//! Exact budgets are tuning, not correctness: any positive budget
//! guarantees eventual reclamation because the cursor persists.

use crate::list::GroupedConnectionList;

/// Decision logic for when and how much to sweep.
///
/// Defaults follow the original engine: one position per dispatch, two per
/// connect (connects must outpace the churn they add), full sweep once a
/// pass saw disconnected records outnumber connected ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepPolicy {
    /// Positions examined by the opportunistic sweep on the dispatch path.
    pub dispatch_budget: usize,
    /// Positions examined by the opportunistic sweep on the connect path.
    pub connect_budget: usize,
}

impl Default for SweepPolicy {
    fn default() -> Self {
        Self {
            dispatch_budget: 1,
            connect_budget: 2,
        }
    }
}

impl SweepPolicy {
    /// Should a completed dispatch pass trigger a full sweep?
    pub fn full_sweep_due(&self, connected: usize, disconnected: usize) -> bool {
        disconnected > connected
    }
}

/// Erase disconnected records from `start` onward.
///
/// Examines at most `budget` positions (unbounded when `None`), optionally
/// disconnecting records whose tracked dependencies have expired before
/// checking the flag. Returns the position after the last examined record,
/// which becomes the cursor for the next incremental call.
///
/// The caller must own the list uniquely (copy-on-write discipline).
pub(crate) fn sweep<A: 'static, R: 'static, G>(
    list: &mut GroupedConnectionList<A, R, G>,
    start: usize,
    budget: Option<usize>,
    scan_expired: bool,
) -> usize {
    let mut position = start.min(list.len());
    let mut examined = 0usize;
    let mut erased = 0usize;
    while position < list.len() && budget.is_none_or(|limit| examined < limit) {
        let connected = {
            let Some(record) = list.get(position) else {
                break;
            };
            if scan_expired {
                record.disconnect_if_expired();
            }
            record.is_connected()
        };
        if connected {
            position += 1;
        } else {
            list.erase(position);
            erased += 1;
        }
        examined += 1;
    }
    if erased > 0 {
        tracing::trace!(erased, remaining = list.len(), "swept disconnected records");
    }
    position
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::GroupKey;
    use crate::record::ConnectionRecord;
    use crate::slot::Slot;
    use std::sync::Arc;

    fn list_of(n: usize) -> GroupedConnectionList<(), usize, i32> {
        let mut list = GroupedConnectionList::new();
        for tag in 0..n {
            list.insert_back(Arc::new(ConnectionRecord::new(
                GroupKey::BackUngrouped,
                Slot::new(move |_: &()| tag),
            )));
        }
        list
    }

    fn disconnect_at(list: &GroupedConnectionList<(), usize, i32>, positions: &[usize]) {
        for &position in positions {
            list.get(position)
                .expect("position in range")
                .disconnect();
        }
    }

    #[test]
    fn full_sweep_erases_every_disconnected_record() {
        let mut list = list_of(5);
        disconnect_at(&list, &[0, 2, 4]);

        let cursor = sweep(&mut list, 0, None, false);
        assert_eq!(list.len(), 2);
        assert_eq!(cursor, 2);
        assert!(list.iter().all(|record| record.is_connected()));
    }

    #[test]
    fn bounded_sweep_respects_the_budget() {
        let mut list = list_of(6);
        disconnect_at(&list, &[0, 1, 2, 3, 4, 5]);

        let cursor = sweep(&mut list, 0, Some(2), false);
        assert_eq!(list.len(), 4);
        assert_eq!(cursor, 0);
    }

    #[test]
    fn cursor_resumes_where_the_last_sweep_stopped() {
        let mut list = list_of(6);
        disconnect_at(&list, &[5]);

        let mut cursor = 0;
        for _ in 0..3 {
            cursor = sweep(&mut list, cursor, Some(2), false);
        }
        assert_eq!(list.len(), 5);
        assert_eq!(cursor, 5);
    }

    #[test]
    fn start_past_the_end_is_clamped() {
        let mut list = list_of(2);
        let cursor = sweep(&mut list, 99, Some(1), false);
        assert_eq!(cursor, 2);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn expiry_scan_disconnects_and_erases() {
        let dep = Arc::new(0u8);
        let mut list = GroupedConnectionList::new();
        list.insert_back(Arc::new(ConnectionRecord::new(
            GroupKey::<i32>::BackUngrouped,
            Slot::new(|_: &()| 0usize).track(&dep),
        )));
        drop(dep);

        // Without the scan the record looks connected and survives.
        sweep(&mut list, 0, None, false);
        assert_eq!(list.len(), 1);

        sweep(&mut list, 0, None, true);
        assert_eq!(list.len(), 0);
    }

    #[test]
    fn policy_full_sweep_trigger() {
        let policy = SweepPolicy::default();
        assert!(policy.full_sweep_due(1, 2));
        assert!(!policy.full_sweep_due(2, 2));
        assert!(!policy.full_sweep_due(3, 0));
        assert!(policy.full_sweep_due(0, 1));
    }

    #[test]
    fn default_budgets_match_the_engine() {
        let policy = SweepPolicy::default();
        assert_eq!(policy.dispatch_budget, 1);
        assert_eq!(policy.connect_budget, 2);
    }
}
