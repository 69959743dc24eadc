use alloc::vec::Vec;

use crate::continuity;
use crate::edges::EdgeRegion;
use crate::error::{Result, TreeError};
use crate::key::TreeKey;
use crate::model_item::{ItemAction, ItemState};
use crate::node::NodeId;
use crate::reflector::PendingMove;
use crate::tracker::{TrackerAction, TrackerState};
use crate::view_item::ViewFactory;
use crate::window::Successor;
use crate::{Reflector, Role};

/// A move whose rows are all mirrored and whose destination lies inside the window.
struct MovePlan {
    src: NodeId,
    dst: NodeId,
    block: Vec<NodeId>,
    start: usize,
    end: usize,
    row: usize,
    same_parent: bool,
    successor: Successor,
}

impl MovePlan {
    fn len(&self) -> usize {
        self.end - self.start + 1
    }

    /// Row of the first moved row once the move is applied.
    fn final_first(&self) -> usize {
        if self.same_parent && self.row > self.end {
            self.row - self.len()
        } else {
            self.row
        }
    }
}

impl<K: TreeKey, F: ViewFactory<K>> Reflector<K, F> {
    /// Rows `first..=last` were inserted under `parent`.
    pub fn rows_inserted(&mut self, parent: Option<&K>, first: usize, last: usize) -> Result<()> {
        if first > last {
            return Err(TreeError::InvalidRange { first, last });
        }
        vtrace!(first, last, "Reflector::rows_inserted");
        self.dispatch(|r| {
            if !r.tracking() {
                return;
            }
            if let Some(p) = r.tree.resolve(parent) {
                r.insert_range(p, first, last);
            }
            r.refresh();
        });
        Ok(())
    }

    /// Applies an insertion to the mirror.
    ///
    /// Loaded siblings are renumbered; the new rows are only mirrored when they land between
    /// two window rows. Anywhere else the window reaches them lazily.
    pub(crate) fn insert_range(&mut self, parent: NodeId, first: usize, last: usize) {
        let n = last - first + 1;
        let shifted: Vec<NodeId> = self
            .tree
            .children(parent)
            .filter(|&c| self.tree.node(c).row >= first)
            .collect();
        for c in shifted {
            self.tree.node_mut(c).row += n;
        }

        let depth = self.tree.node(parent).depth + 1;
        if !self.options.loads_depth(depth) {
            return;
        }
        let Some(source) = self.source.clone() else {
            return;
        };
        let at_start = first == 0 && parent == self.tree.root();
        let successor = match self.successor_of_rows(parent, last) {
            Successor::Loaded(s) => s,
            _ => return,
        };
        if !self.is_window_member(successor) || (Some(successor) == self.window_top && !at_start) {
            return;
        }

        let before = continuity::child_at(&self.tree, parent, last + 1);
        let replaces_top = Some(successor) == self.window_top;
        let mut inserted = Vec::new();
        for row in first..=last {
            let Some(key) = source.key(self.tree.key(parent), row) else {
                break;
            };
            let has_children =
                self.options.loads_depth(depth + 1) && source.row_count(Some(&key)) > 0;
            let id = self.insert_row(parent, key, row, Some(before));
            if inserted.is_empty() && replaces_top {
                self.set_window_top(Some(id));
            }
            inserted.push(id);
            if has_children {
                // The new row's children come next in the traversal; let the window load them.
                self.truncate_after(id);
                break;
            }
        }

        if let Some(&first_new) = inserted.first() {
            if let Some(up) = self.tree.up(first_new) {
                self.perform_item(up, ItemAction::Move);
            }
        }
        if self.tree.contains(successor) {
            self.perform_item(successor, ItemAction::Move);
        }
        vdebug!(count = inserted.len(), "rows mirrored");
    }

    /// Rows `first..=last` under `parent` are about to be removed.
    pub fn rows_about_to_be_removed(
        &mut self,
        parent: Option<&K>,
        first: usize,
        last: usize,
    ) -> Result<()> {
        if first > last {
            return Err(TreeError::InvalidRange { first, last });
        }
        vtrace!(first, last, "Reflector::rows_about_to_be_removed");
        self.dispatch(|r| {
            if !r.tracking() {
                return;
            }
            if let Some(p) = r.tree.resolve(parent) {
                r.remove_range(p, first, last);
            }
        });
        Ok(())
    }

    /// Rows `first..=last` under `parent` were removed.
    pub fn rows_removed(&mut self, parent: Option<&K>, first: usize, last: usize) -> Result<()> {
        if first > last {
            return Err(TreeError::InvalidRange { first, last });
        }
        let _ = parent;
        vtrace!(first, last, "Reflector::rows_removed");
        self.dispatch(|r| {
            if r.tracking() {
                r.refresh();
            }
        });
        Ok(())
    }

    /// Detaches the mirrored rows of a removed range and renumbers the siblings after it.
    pub(crate) fn remove_range(&mut self, parent: NodeId, first: usize, last: usize) {
        let n = last - first + 1;
        let victims: Vec<NodeId> = self
            .tree
            .children(parent)
            .filter(|&c| (first..=last).contains(&self.tree.node(c).row))
            .collect();

        if let (Some(&head), Some(&tail), Some(top)) =
            (victims.first(), victims.last(), self.window_top)
        {
            let top_removed = victims
                .iter()
                .any(|&v| v == top || self.tree.is_ancestor(v, top));
            if top_removed {
                let y = self.origin;
                match (self.tree.next_skipping_children(tail), self.tree.up(head)) {
                    (Some(next), _) => {
                        self.set_window_top(Some(next));
                        self.origin = y;
                    }
                    (None, Some(prev)) => self.adopt_as_top(prev, y),
                    (None, None) => self.set_window_top(None),
                }
            }
        }

        for v in victims {
            self.detach_subtree(v);
        }
        let shifted: Vec<NodeId> = self
            .tree
            .children(parent)
            .filter(|&c| self.tree.node(c).row > last)
            .collect();
        for c in shifted {
            self.tree.node_mut(c).row -= n;
        }
        self.normalize();
        self.sync_window_edges();
        self.dirty = true;
    }

    /// Rows `start..=end` under `src` are about to move under `dst`, before the row that is
    /// currently at `row`.
    pub fn rows_about_to_be_moved(
        &mut self,
        src: Option<&K>,
        start: usize,
        end: usize,
        dst: Option<&K>,
        row: usize,
    ) -> Result<()> {
        if start > end {
            return Err(TreeError::InvalidRange {
                first: start,
                last: end,
            });
        }
        vtrace!(start, end, row, "Reflector::rows_about_to_be_moved");
        self.dispatch(|r| r.about_to_move(src, start, end, dst, row))
    }

    /// The move announced by `rows_about_to_be_moved` happened.
    pub fn rows_moved(
        &mut self,
        src: Option<&K>,
        start: usize,
        end: usize,
        dst: Option<&K>,
        row: usize,
    ) -> Result<()> {
        if start > end {
            return Err(TreeError::InvalidRange {
                first: start,
                last: end,
            });
        }
        let _ = (src, dst, row);
        vtrace!(start, end, row, "Reflector::rows_moved");
        self.dispatch(|r| {
            if !r.tracking() {
                return;
            }
            if let Some(pending) = r.pending_move.take() {
                if let Some(p) = r.tree.resolve(pending.parent.as_ref()) {
                    r.insert_range(p, pending.first, pending.first + pending.count - 1);
                }
            }
            r.perform_tracker(TrackerAction::Move);
        });
        Ok(())
    }

    fn about_to_move(
        &mut self,
        src: Option<&K>,
        start: usize,
        end: usize,
        dst: Option<&K>,
        row: usize,
    ) -> Result<()> {
        if !self.tracking() {
            return Ok(());
        }
        let same_parent = src == dst;
        if same_parent && (start..=end + 1).contains(&row) {
            return Ok(());
        }
        let sp = self.tree.resolve(src);
        let dp = self.tree.resolve(dst);

        if let (Some(sp), Some(dp)) = (sp, dp) {
            let mut cur = Some(dp);
            while let Some(c) = cur {
                let node = self.tree.node(c);
                if node.parent == Some(sp) && (start..=end).contains(&node.row) {
                    return Err(TreeError::MoveIntoSelf);
                }
                cur = node.parent;
            }
        }

        if let Some(plan) = self.plan_move(sp, start, end, dp, row, same_parent) {
            self.relink(plan);
            return Ok(());
        }

        let n = end - start + 1;
        let first = if same_parent && row > end { row - n } else { row };
        vdebug!(start, end, "move degrades to remove + insert");
        self.pending_move = Some(PendingMove {
            parent: dst.cloned(),
            first,
            count: n,
        });
        if let Some(sp) = sp {
            self.remove_range(sp, start, end);
        }
        Ok(())
    }

    fn plan_move(
        &self,
        src: Option<NodeId>,
        start: usize,
        end: usize,
        dst: Option<NodeId>,
        row: usize,
        same_parent: bool,
    ) -> Option<MovePlan> {
        let (src, dst) = (src?, dst?);
        let source = self.source.as_deref()?;
        let (src_depth, dst_depth) = (self.tree.node(src).depth, self.tree.node(dst).depth);
        if !self.options.loads_depth(dst_depth + 1) {
            return None;
        }
        // Rows moving up would expose descendants that were never loaded.
        if self.options.max_depth.is_some() && dst_depth < src_depth {
            return None;
        }
        let (first, last) = continuity::covering(&self.tree, src, start, end)?;
        let mut block = Vec::with_capacity(end - start + 1);
        let mut cur = Some(first);
        while let Some(c) = cur {
            block.push(c);
            if c == last {
                break;
            }
            cur = self.tree.node(c).next;
        }
        if block.iter().any(|&b| self.is_anchor(b)) {
            return None;
        }

        let mut successor = if row < source.row_count(self.tree.key(dst)) {
            match continuity::child_at(&self.tree, dst, row) {
                Some(n) => Successor::Loaded(n),
                None => Successor::Unloaded,
            }
        } else {
            self.successor_after(dst)
        };
        if let Successor::Loaded(s) = successor {
            if block.contains(&s) {
                successor = self.successor_after(last);
            }
        }
        let lands_in_window = match successor {
            Successor::Loaded(s) => {
                self.is_window_member(s)
                    && !block.contains(&s)
                    && (Some(s) != self.window_top || (dst == self.tree.root() && row == 0))
            }
            Successor::End => !self.free.bottom,
            Successor::Unloaded => false,
        };
        lands_in_window.then_some(MovePlan {
            src,
            dst,
            block,
            start,
            end,
            row,
            same_parent,
            successor,
        })
    }

    /// Moves mirrored rows to their destination, keeping their model items and views.
    fn relink(&mut self, plan: MovePlan) {
        let Some(&head) = plan.block.first() else {
            return;
        };
        let Some(&tail) = plan.block.last() else {
            return;
        };
        let n = plan.len();
        let final_first = plan.final_first();
        let top_in_block = self.window_top.is_some_and(|t| plan.block.contains(&t));
        let cut_short = !self.subtree_loaded(tail)
            && self
                .tree
                .last()
                .is_some_and(|l| l == tail || self.tree.is_ancestor(tail, l));
        let old_up = self.tree.up(head);
        let old_down = self.tree.next_skipping_children(tail);
        // Visible edges are meaningless while rows are unlinked; rebuilt below.
        self.set_edges(EdgeRegion::Visible, None, None);

        // Stamp the post-move index on every row whose index changes.
        let mut stamped = Vec::new();
        for (i, &b) in plan.block.iter().enumerate() {
            self.tree.set_temporary_index(b, plan.dst, final_first + i, 0);
            stamped.push(b);
        }
        let src_siblings: Vec<NodeId> = self
            .tree
            .children(plan.src)
            .filter(|c| !plan.block.contains(c))
            .collect();
        if plan.same_parent {
            for c in src_siblings {
                let r = self.tree.node(c).row;
                let shifted = if plan.row > plan.end && r > plan.end && r < plan.row {
                    Some(r - n)
                } else if plan.row < plan.start && r >= plan.row && r < plan.start {
                    Some(r + n)
                } else {
                    None
                };
                if let Some(r) = shifted {
                    self.tree.set_temporary_index(c, plan.src, r, 0);
                    stamped.push(c);
                }
            }
        } else {
            for c in src_siblings {
                let r = self.tree.node(c).row;
                if r > plan.end {
                    self.tree.set_temporary_index(c, plan.src, r - n, 0);
                    stamped.push(c);
                }
            }
            let dst_siblings: Vec<NodeId> = self.tree.children(plan.dst).collect();
            for c in dst_siblings {
                let r = self.tree.node(c).row;
                if r >= plan.row {
                    self.tree.set_temporary_index(c, plan.dst, r + n, 0);
                    stamped.push(c);
                }
            }
        }

        for &b in &plan.block {
            self.perform_item(b, ItemAction::Reparent);
        }
        for &b in &plan.block {
            self.tree.remove(b, true);
        }
        for &b in &plan.block {
            let r = self.tree.effective_row(b);
            let before = self
                .tree
                .children(plan.dst)
                .find(|&c| self.tree.effective_row(c) > r);
            self.tree.insert_child_before(b, before, plan.dst);
        }

        if let Some(max) = self.options.max_depth {
            for &b in &plan.block {
                let mut too_deep = Vec::new();
                let mut stack = alloc::vec![b];
                while let Some(cur) = stack.pop() {
                    for c in self.tree.children(cur) {
                        if self.tree.node(c).depth > max {
                            too_deep.push(c);
                        } else {
                            stack.push(c);
                        }
                    }
                }
                for c in too_deep {
                    self.detach_subtree(c);
                }
            }
        }

        for id in stamped {
            self.tree.reset_temporary_index(id);
        }

        let lands_on_top =
            matches!(plan.successor, Successor::Loaded(s) if Some(s) == self.window_top);
        if top_in_block {
            self.set_window_top(old_down.or(Some(head)));
        } else if lands_on_top {
            self.set_window_top(Some(head));
        }
        self.normalize();
        if cut_short {
            let tail_end = self.tree.deepest_last(tail);
            self.truncate_after(tail_end);
        }

        for &b in &plan.block {
            if !self.tree.contains(b) {
                continue;
            }
            self.perform_item(b, ItemAction::Attach);
            self.perform_item(b, ItemAction::Move);
            self.rebuild_state(b);
        }
        let neighbors = [
            old_up,
            old_down,
            self.tree.up(head),
            self.tree.next_skipping_children(tail),
        ];
        for id in neighbors.into_iter().flatten() {
            if self.tree.contains(id) && !plan.block.contains(&id) {
                self.perform_item(id, ItemAction::Move);
            }
        }
        self.reload_edges();
        self.dirty = true;
        vdebug!(moved = n, "rows relinked");
    }

    /// Whether every row below `id` that the window may load is mirrored.
    fn subtree_loaded(&self, id: NodeId) -> bool {
        let Some(source) = self.source.as_deref() else {
            return true;
        };
        let mut cur = self.tree.deepest_last(id);
        if self.options.loads_depth(self.tree.node(cur).depth + 1)
            && source.row_count(self.tree.key(cur)) > 0
        {
            return false;
        }
        while cur != id {
            let node = self.tree.node(cur);
            let Some(parent) = node.parent else {
                return false;
            };
            if node.row + 1 != source.row_count(self.tree.key(parent)) {
                return false;
            }
            cur = parent;
        }
        true
    }

    /// The whole source is about to change.
    pub fn model_about_to_be_reset(&mut self) {
        vtrace!("Reflector::model_about_to_be_reset");
        self.dispatch(|r| {
            // A second notice before `model_reset` is out of order and heals the tracker.
            if r.tracker == TrackerState::Resetting || r.tracking() {
                r.perform_tracker(TrackerAction::Reset);
            }
        });
    }

    /// The whole source changed.
    pub fn model_reset(&mut self) {
        vtrace!("Reflector::model_reset");
        self.dispatch(|r| match r.tracker {
            TrackerState::Resetting => {
                r.perform_tracker(TrackerAction::Populate);
                if r.options.enabled {
                    r.perform_tracker(TrackerAction::Enable);
                }
            }
            TrackerState::Tracking => {
                r.perform_tracker(TrackerAction::Reset);
                r.perform_tracker(TrackerAction::Populate);
                r.perform_tracker(TrackerAction::Enable);
            }
            TrackerState::NoModel => {}
            _ => r.missed = true,
        });
    }

    /// Data of the sibling rows from `top_left` to `bottom_right` changed for `roles` (empty:
    /// every role).
    pub fn data_changed(&mut self, top_left: &K, bottom_right: &K, roles: &[Role]) -> Result<()> {
        vtrace!(roles = roles.len(), "Reflector::data_changed");
        self.dispatch(|r| {
            if !r.tracking() {
                return Ok(());
            }
            let a = r.tree.node_for_key(top_left);
            let b = r.tree.node_for_key(bottom_right);
            let Some(parent) = a.or(b).and_then(|n| r.tree.node(n).parent) else {
                return Ok(());
            };
            let lo = a.map_or(0, |n| r.tree.node(n).row);
            let hi = b.map_or(usize::MAX, |n| r.tree.node(n).row);
            if lo > hi {
                return Err(TreeError::InvalidRange {
                    first: lo,
                    last: hi,
                });
            }
            let rows: Vec<NodeId> = r
                .tree
                .children(parent)
                .filter(|&c| (lo..=hi).contains(&r.tree.node(c).row))
                .collect();
            let resizes = r.options.size_hint.depends_on(roles);
            r.roles.clear();
            r.roles.extend_from_slice(roles);
            r.resized = false;
            for id in rows {
                if resizes && r.tree.node(id).geometry.size().is_some() {
                    let size = r.resolve_size(id);
                    r.resize_node(id, size);
                }
                if r.tree.node(id).item.state != ItemState::Dangling {
                    r.perform_item(id, ItemAction::Update);
                }
            }
            r.roles.clear();
            if r.resized {
                r.perform_tracker(TrackerAction::Move);
            }
            r.dirty = true;
            Ok(())
        })
    }
}
