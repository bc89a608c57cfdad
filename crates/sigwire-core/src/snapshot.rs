#![forbid(unsafe_code)]

//! The copy-on-write bundle a dispatch runs against.
//!
//! An [`InvocationSnapshot`] pairs the connection list with the combiner,
//! each behind its own shared pointer. The signal holds the current
//! snapshot; every dispatch clones the `Arc` under the signal mutex and
//! then iterates with no list lock held. Structural mutation goes through
//! `Arc::make_mut`: in place when the signal is the only holder, onto a
//! fresh clone otherwise, with the old snapshot staying valid for whatever
//! dispatch still holds it.
//!
//! Keeping list and combiner behind separate pointers means a combiner
//! swap preserves the list and a list clone preserves the combiner.

use std::sync::Arc;

use crate::list::GroupedConnectionList;

/// Immutable-while-shared {list, combiner} bundle.
pub struct InvocationSnapshot<A, R, C, G> {
    pub(crate) list: Arc<GroupedConnectionList<A, R, G>>,
    pub(crate) combiner: Arc<C>,
}

// Cheap: two pointer clones. `Arc::make_mut` relies on this to produce the
// fresh snapshot that shares both parts until one of them is replaced.
impl<A, R, C, G> Clone for InvocationSnapshot<A, R, C, G> {
    fn clone(&self) -> Self {
        Self {
            list: Arc::clone(&self.list),
            combiner: Arc::clone(&self.combiner),
        }
    }
}

impl<A, R, C, G> InvocationSnapshot<A, R, C, G> {
    pub(crate) fn new(combiner: C) -> Self {
        Self {
            list: Arc::new(GroupedConnectionList::new()),
            combiner: Arc::new(combiner),
        }
    }

    pub(crate) fn from_parts(
        list: Arc<GroupedConnectionList<A, R, G>>,
        combiner: Arc<C>,
    ) -> Self {
        Self { list, combiner }
    }

    /// The record list this snapshot was taken over.
    pub fn list(&self) -> &GroupedConnectionList<A, R, G> {
        &self.list
    }

    /// The combiner captured with this snapshot.
    pub fn combiner(&self) -> &C {
        &self.combiner
    }
}
