//! Node splitting for B+ tree insertions.
//!
//! When a full node must absorb one more entry it is split in two: entries
//! are redistributed between the original (left) node and a freshly
//! allocated sibling (right), and a separator key is promoted to the
//! parent. The median selection rules below are part of the on-disk
//! contract; the choice depends on whether the capacity is even or odd and
//! on where the incoming key falls relative to the two middle keys.

use super::node::{InnerNode, LeafNode};

/// Result of splitting a leaf node.
#[derive(Debug, Clone, Copy)]
pub struct LeafSplit {
    /// The key to promote to the parent.
    pub separator: i32,
}

/// Result of splitting an inner node.
#[derive(Debug, Clone, Copy)]
pub struct InnerSplit {
    /// The key to promote to the parent.
    pub separator: i32,
}

/// Splits a full leaf into `full` (left) and `right`, splicing `right`
/// into the sibling chain as `right_page_no`.
///
/// `right` must be a fresh empty leaf of the same capacity. The incoming
/// entry is NOT placed here; the caller inserts it into `full` when
/// `key < separator` and into `right` otherwise.
pub fn split_leaf(
    full: &mut LeafNode,
    right: &mut LeafNode,
    key: i32,
    right_page_no: u32,
) -> LeafSplit {
    let cap = full.capacity();
    debug_assert!(full.is_full());
    debug_assert_eq!(right.used(), 0);

    let (mid, separator) = if cap % 2 == 1 {
        (cap / 2, full.key(cap / 2))
    } else {
        let a = full.key(cap / 2 - 1);
        let b = full.key(cap / 2);
        if key < a {
            (cap / 2 - 1, a)
        } else if key > a && key < b {
            // The incoming key is itself the median; promote it by value
            (cap / 2, key)
        } else {
            (cap / 2, b)
        }
    };

    // Move the upper half into the right leaf
    for i in mid..cap {
        right.set_key(i - mid, full.key(i));
        right.set_rid(i - mid, full.rid(i));
    }
    full.clear_from(mid);

    // Splice the new leaf into the sibling chain
    right.set_right_sibling(full.right_sibling());
    full.set_right_sibling(Some(right_page_no));

    LeafSplit { separator }
}

/// Splits a full inner node into `full` (left) and `right`, placing the
/// incoming `(key, right_child)` pair on the correct side.
///
/// `right` must be a fresh empty inner node of the same capacity; it is
/// given the same level as `full`. When the incoming key is itself the
/// median it is promoted by value: no copy of it lands in either node and
/// `right.children[0]` takes the accompanying child. Otherwise the
/// promoted separator is removed from `full` and the pair is inserted on
/// the side its range falls in.
pub fn split_inner(
    full: &mut InnerNode,
    right: &mut InnerNode,
    key: i32,
    right_child: u32,
) -> InnerSplit {
    let cap = full.capacity();
    debug_assert!(full.is_full());
    debug_assert!(cap >= 2);
    debug_assert_eq!(right.used(), 0);

    right.set_level(full.level());

    let (mid, separator) = if cap % 2 == 0 {
        let a = full.key(cap / 2 - 1);
        let b = full.key(cap / 2);
        if key > a && key < b {
            (cap / 2 - 1, key)
        } else if key > b {
            (cap / 2, b)
        } else {
            (cap / 2 - 1, a)
        }
    } else {
        let below = full.key(cap / 2 - 1);
        let middle = full.key(cap / 2);
        if key > below && key < middle {
            (cap / 2 - 1, key)
        } else if cap / 2 + 1 < cap && key > middle && key < full.key(cap / 2 + 1) {
            (cap / 2, key)
        } else if key < below {
            (cap / 2 - 1, below)
        } else {
            (cap / 2, middle)
        }
    };

    if separator == key {
        // Median case: the promoted key exists only in the parent
        right.set_child(0, right_child);
        for i in (mid + 1)..cap {
            right.set_key(i - mid - 1, full.key(i));
            right.set_child(i - mid, full.child(i + 1));
        }
        full.clear_from(mid + 1);
    } else {
        // The separator at `mid` moves up; the upper half moves right
        for i in (mid + 1)..cap {
            right.set_key(i - mid - 1, full.key(i));
            right.set_child(i - mid - 1, full.child(i));
        }
        right.set_child(cap - mid - 1, full.child(cap));
        full.clear_from(mid);

        if key < separator {
            full.insert_separator(key, right_child);
        } else {
            right.insert_separator(key, right_child);
        }
    }

    InnerSplit { separator }
}
