#![forbid(unsafe_code)]

//! Ordering keys for connections.
//!
//! Every connection carries a [`GroupKey`]: either one of the two ungrouped
//! anchors or a user group value. The derived `Ord` gives the three-way
//! total order the dispatch pass relies on:
//!
//! ```text
//! FrontUngrouped < Grouped(g) in g's order < BackUngrouped
//! ```
//!
//! Within one key, insertion order is preserved by the list, with
//! [`ConnectPosition`] selecting front- or back-insertion per call.

/// Where a new connection lands relative to others with the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectPosition {
    /// Before existing connections with the same key.
    Front,
    /// After existing connections with the same key.
    #[default]
    Back,
}

/// Three-way ordering key for a connection.
///
/// Custom group orders are expressed through `G`'s `Ord` (wrap the group in
/// a newtype to invert or refine it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum GroupKey<G> {
    /// Ungrouped connection made with [`ConnectPosition::Front`].
    FrontUngrouped,
    /// Connection in a user group.
    Grouped(G),
    /// Ungrouped connection made with [`ConnectPosition::Back`].
    BackUngrouped,
}

impl<G> GroupKey<G> {
    /// Key for an ungrouped connection at the given position.
    pub fn ungrouped(position: ConnectPosition) -> Self {
        match position {
            ConnectPosition::Front => Self::FrontUngrouped,
            ConnectPosition::Back => Self::BackUngrouped,
        }
    }

    /// The group value, if this key is grouped.
    pub fn group(&self) -> Option<&G> {
        match self {
            Self::Grouped(g) => Some(g),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_way_total_order() {
        let front: GroupKey<i32> = GroupKey::FrontUngrouped;
        let back: GroupKey<i32> = GroupKey::BackUngrouped;
        assert!(front < GroupKey::Grouped(i32::MIN));
        assert!(GroupKey::Grouped(i32::MAX) < back);
        assert!(front < back);
    }

    #[test]
    fn grouped_keys_follow_group_order() {
        assert!(GroupKey::Grouped(1) < GroupKey::Grouped(2));
        assert_eq!(GroupKey::Grouped(3), GroupKey::Grouped(3));
    }

    #[test]
    fn ungrouped_key_from_position() {
        assert_eq!(
            GroupKey::<i32>::ungrouped(ConnectPosition::Front),
            GroupKey::FrontUngrouped
        );
        assert_eq!(
            GroupKey::<i32>::ungrouped(ConnectPosition::Back),
            GroupKey::BackUngrouped
        );
        assert!(GroupKey::<i32>::BackUngrouped.group().is_none());
        assert_eq!(GroupKey::Grouped(7).group(), Some(&7));
    }
}
