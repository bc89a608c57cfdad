#![forbid(unsafe_code)]

//! Ordered, group-keyed container of connection records.
//!
//! Records are kept sorted by [`GroupKey`], with insertion order preserved
//! inside each key. Positions are plain indices: the list is only ever
//! mutated while uniquely owned by one snapshot (copy-on-write), so there
//! is no iterator invalidation to defend against. Removal is always an
//! explicit [`erase`](GroupedConnectionList::erase) driven by the garbage
//! collector or a grouped disconnect, never implicit.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::group::GroupKey;
use crate::record::ConnectionRecord;

/// Ordered sequence of shared connection records.
pub struct GroupedConnectionList<A, R, G> {
    entries: Vec<Arc<ConnectionRecord<A, R, G>>>,
}

// Shallow: clones the record pointers, shares the records. This is the
// copy-on-write clone a snapshot takes before mutating a shared list.
impl<A, R, G> Clone for GroupedConnectionList<A, R, G> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<A, R, G> Default for GroupedConnectionList<A, R, G> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A, R, G> GroupedConnectionList<A, R, G> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&Arc<ConnectionRecord<A, R, G>>> {
        self.entries.get(position)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Arc<ConnectionRecord<A, R, G>>> {
        self.entries.iter()
    }

    /// Remove the record at `position`. The next position is `position`
    /// itself (everything after shifts down by one).
    pub fn erase(&mut self, position: usize) {
        self.entries.remove(position);
    }
}

impl<A: 'static, R: 'static, G: Ord> GroupedConnectionList<A, R, G> {
    /// Insert before existing records with the same key.
    ///
    /// Position search is O(log n); existing records never reorder.
    pub fn insert_front(&mut self, record: Arc<ConnectionRecord<A, R, G>>) {
        let key = record.group_key();
        let at = self
            .entries
            .partition_point(|entry| entry.group_key() < key);
        self.entries.insert(at, record);
    }

    /// Insert after existing records with the same key.
    pub fn insert_back(&mut self, record: Arc<ConnectionRecord<A, R, G>>) {
        let key = record.group_key();
        let at = self
            .entries
            .partition_point(|entry| entry.group_key() <= key);
        self.entries.insert(at, record);
    }

    /// The contiguous run of records in `group`, possibly empty.
    pub fn range(&self, group: &G) -> &[Arc<ConnectionRecord<A, R, G>>] {
        let lower = self
            .entries
            .partition_point(|entry| cmp_to_group(entry.group_key(), group) == Ordering::Less);
        let upper = self
            .entries
            .partition_point(|entry| cmp_to_group(entry.group_key(), group) != Ordering::Greater);
        &self.entries[lower..upper]
    }
}

fn cmp_to_group<G: Ord>(key: &GroupKey<G>, group: &G) -> Ordering {
    match key {
        GroupKey::FrontUngrouped => Ordering::Less,
        GroupKey::Grouped(g) => g.cmp(group),
        GroupKey::BackUngrouped => Ordering::Greater,
    }
}
