//! Lookups over partially loaded sibling chains.
//!
//! The mirror only holds some of each parent's children, linked in row order. A lookup walks in
//! from whichever end of the chain is closer to the wanted row and stops as soon as it passes
//! it.

use crate::key::TreeKey;
use crate::node::{NodeId, Tree};

/// The loaded child of `parent` at `row`.
pub(crate) fn child_at<K: TreeKey>(tree: &Tree<K>, parent: NodeId, row: usize) -> Option<NodeId> {
    let node = tree.get(parent)?;
    let (first, last) = (node.first_child?, node.last_child?);
    let (lo, hi) = (tree.effective_row(first), tree.effective_row(last));
    if row < lo || row > hi {
        return None;
    }
    if row - lo <= hi - row {
        let mut cur = Some(first);
        while let Some(c) = cur {
            let r = tree.effective_row(c);
            if r >= row {
                return (r == row).then_some(c);
            }
            cur = tree.node(c).next;
        }
    } else {
        let mut cur = Some(last);
        while let Some(c) = cur {
            let r = tree.effective_row(c);
            if r <= row {
                return (r == row).then_some(c);
            }
            cur = tree.node(c).prev;
        }
    }
    None
}

/// The last loaded child of `parent` whose row is at most `row`: the sibling a new row at `row`
/// is linked after. `None` means the new row goes first.
pub(crate) fn preceding<K: TreeKey>(tree: &Tree<K>, parent: NodeId, row: usize) -> Option<NodeId> {
    let node = tree.get(parent)?;
    let (first, last) = (node.first_child?, node.last_child?);
    let (lo, hi) = (tree.effective_row(first), tree.effective_row(last));
    if row < lo {
        return None;
    }
    if hi <= row {
        return Some(last);
    }
    if row - lo <= hi - row {
        let mut cur = first;
        while let Some(n) = tree.node(cur).next {
            if tree.effective_row(n) > row {
                break;
            }
            cur = n;
        }
        Some(cur)
    } else {
        let mut cur = last;
        while tree.effective_row(cur) > row {
            cur = tree.node(cur).prev?;
        }
        Some(cur)
    }
}

/// First and last node when every row in `first..=last` under `parent` is loaded.
pub(crate) fn covering<K: TreeKey>(
    tree: &Tree<K>,
    parent: NodeId,
    first: usize,
    last: usize,
) -> Option<(NodeId, NodeId)> {
    let start = child_at(tree, parent, first)?;
    let mut end = start;
    while tree.effective_row(end) < last {
        let next = tree.node(end).next?;
        if tree.effective_row(next) != tree.effective_row(end) + 1 {
            return None;
        }
        end = next;
    }
    Some((start, end))
}
