use alloc::vec::Vec;

use crate::geometry::GeometryAction;
use crate::key::TreeKey;
use crate::model_item::{ItemAction, ItemState};
use crate::node::NodeId;
use crate::tracker::{TrackerAction, TrackerState};
use crate::view_item::ViewFactory;
use crate::{Edge, Point, Reflector, Size};

/// Upper bound on layout passes per refresh. A pass repeats only when materializing rows
/// changed their measured size.
const MAX_LAYOUT_PASSES: usize = 4;

impl<K: TreeKey, F: ViewFactory<K>> Reflector<K, F> {
    /// Grows, trims and lays out the window around the viewport, then updates row states.
    pub(crate) fn refresh(&mut self) {
        if !matches!(
            self.tracker,
            TrackerState::Populated | TrackerState::Tracking
        ) || self.source.is_none()
        {
            return;
        }
        for _ in 0..MAX_LAYOUT_PASSES {
            self.resized = false;
            self.populate();
            self.perform_tracker(TrackerAction::Trim);
            self.layout();
            self.update_states();
            if !self.resized {
                break;
            }
        }
        self.layout();
        self.sync_window_edges();
        self.update_free_edges();
        self.push_window_geometry();
        self.dirty = true;
    }

    /// Mirrored rows before the window are kept only as structural ancestors of its first row.
    pub(crate) fn is_anchor(&self, id: NodeId) -> bool {
        self.window_top
            .is_some_and(|top| self.tree.is_ancestor(id, top))
    }

    pub(crate) fn is_window_member(&self, id: NodeId) -> bool {
        self.tree.contains(id) && self.window_top.is_some() && !self.is_anchor(id)
    }

    /// Makes sure the row has a size and returns its decorated height.
    pub(crate) fn ensure_size(&mut self, id: NodeId) -> u32 {
        if self.tree.node(id).geometry.size().is_none() {
            let size = self.resolve_size(id);
            self.tree
                .node_mut(id)
                .geometry
                .perform(GeometryAction::Resize(size));
        }
        self.node_height(id)
    }

    pub(crate) fn resolve_size(&mut self, id: NodeId) -> Size {
        if self.options.size_hint.is_just_in_time() {
            if let Some(size) = self.measure_view(id) {
                return size;
            }
        }
        let Some(key) = self.tree.key(id) else {
            return Size::default();
        };
        self.options.size_hint.resolve(key, self.source.as_deref())
    }

    /// Applies a new size. A row starting above the scroll offset drags the offset along so
    /// the content on screen stays put.
    pub(crate) fn resize_node(&mut self, id: NodeId, size: Size) {
        let geometry = &mut self.tree.node_mut(id).geometry;
        let old = geometry.decorated_height();
        geometry.perform(GeometryAction::Resize(size));
        let new = geometry.decorated_height();
        let top = geometry.position().map(|p| p.y);
        if old == new {
            return;
        }
        self.resized = true;
        self.dirty = true;
        if let (Some(old), Some(new), Some(top)) = (old, new, top) {
            if self.options.adjust_scroll_on_resize && top < self.offset && self.is_window_member(id)
            {
                let delta = i64::from(new) - i64::from(old);
                vtrace!(?id, delta, "adjusting scroll offset for a resized row");
                self.offset = self.offset.saturating_add(delta);
            }
        }
    }

    pub(crate) fn place(&mut self, id: NodeId, y: i64) {
        let depth = self.tree.node(id).depth;
        let x = i64::from(self.options.indentation) * depth.saturating_sub(1) as i64;
        self.tree
            .node_mut(id)
            .geometry
            .perform(GeometryAction::Place(Point::new(x, y)));
    }

    pub(crate) fn node_height(&self, id: NodeId) -> u32 {
        self.tree.node(id).geometry.decorated_height().unwrap_or(0)
    }

    pub(crate) fn node_top(&self, id: NodeId) -> i64 {
        self.tree
            .node(id)
            .geometry
            .position()
            .map_or(self.origin, |p| p.y)
    }

    pub(crate) fn node_bottom(&self, id: NodeId) -> i64 {
        self.node_top(id)
            .saturating_add(i64::from(self.node_height(id)))
    }

    /// Stacks the window rows from `origin` down.
    pub(crate) fn layout(&mut self) {
        let mut y = self.origin;
        let mut cur = self.window_top;
        while let Some(id) = cur {
            let h = self.ensure_size(id);
            self.place(id, y);
            y = y.saturating_add(i64::from(h));
            cur = self.tree.down(id);
        }
        self.content_end = y;
    }

    pub(crate) fn intersects_viewport(&self, id: NodeId) -> bool {
        let (vt, vb) = self.viewport_span();
        if vt == vb {
            return false;
        }
        let top = self.node_top(id);
        let h = self.node_height(id);
        if h == 0 {
            return vt <= top && top < vb;
        }
        top < vb && top.saturating_add(i64::from(h)) > vt
    }

    /// Rows at the end of the window that lie entirely below `vb`.
    fn count_below(&self, vb: i64) -> usize {
        let mut count = 0;
        let mut cur = self.tree.last();
        while let Some(id) = cur {
            if self.node_top(id) < vb {
                break;
            }
            count += 1;
            if Some(id) == self.window_top {
                break;
            }
            cur = self.tree.up(id);
        }
        count
    }

    /// Rows at the start of the window that lie entirely above `vt`.
    fn count_above(&self, vt: i64) -> usize {
        let mut count = 0;
        let mut cur = self.window_top;
        while let Some(id) = cur {
            if self.node_bottom(id) > vt {
                break;
            }
            count += 1;
            cur = self.tree.down(id);
        }
        count
    }

    /// Loads rows until the viewport plus `buffer_size` rows on each side are covered, or the
    /// tree ends.
    pub(crate) fn populate(&mut self) {
        if self.source.is_none() {
            return;
        }
        if self.window_top.is_none() {
            self.origin = 0;
            let Some(proximity) = self.first_proximity() else {
                return;
            };
            let Some(first) = self.insert_proximity(proximity) else {
                return;
            };
            self.set_window_top(Some(first));
        }
        self.layout();

        let (vt, vb) = self.viewport_span();
        let buffer = self.options.buffer_size;

        while let Some(last) = self.tree.last() {
            if self.node_bottom(last) >= vb && self.count_below(vb) >= buffer {
                break;
            }
            if self.load_edge(last, Edge::Bottom).is_none() || self.tree.last() == Some(last) {
                break;
            }
        }
        self.content_end = self.tree.last().map_or(self.origin, |l| self.node_bottom(l));

        while let Some(top) = self.window_top {
            if self.node_top(top) <= vt && self.count_above(vt) >= buffer {
                break;
            }
            if self.load_edge(top, Edge::Top).is_none() || self.window_top == Some(top) {
                break;
            }
        }

        // Once the first row of the tree is loaded, content coordinates start at zero.
        if let Some(top) = self.window_top {
            if self.origin != 0 && self.proximity(top, Edge::Top).is_none() {
                let delta = -self.origin;
                vtrace!(delta, "re-anchoring content at the top of the tree");
                self.origin = 0;
                self.offset = self.offset.saturating_add(delta);
                self.layout();
            }
        }
    }

    /// Drops rows beyond `buffer_size` rows outside the viewport.
    ///
    /// At the top, a dropped row that still has loaded children stays mirrored as their
    /// ancestor, without a view or geometry.
    pub(crate) fn trim(&mut self) {
        let (vt, vb) = self.viewport_span();
        let buffer = self.options.buffer_size;

        while let Some(last) = self.tree.last() {
            if Some(last) == self.window_top || self.count_below(vb) <= buffer {
                break;
            }
            self.detach_node(last);
        }

        while let Some(top) = self.window_top {
            let Some(next) = self.tree.down(top) else {
                break;
            };
            if self.count_above(vt) <= buffer {
                break;
            }
            let h = i64::from(self.node_height(top));
            if self.tree.is_leaf(top) {
                let mut parent = self.tree.node(top).parent;
                self.detach_node(top);
                while let Some(p) = parent {
                    if p == self.tree.root() || !self.tree.is_leaf(p) {
                        break;
                    }
                    parent = self.tree.node(p).parent;
                    self.detach_node(p);
                }
            } else {
                self.perform_item(top, ItemAction::Reset);
            }
            self.set_window_top(Some(next));
            self.origin = self.origin.saturating_add(h);
        }
        self.content_end = self.tree.last().map_or(self.origin, |l| self.node_bottom(l));
    }

    /// Shows rows intersecting the viewport and hides (buffers) the others.
    pub(crate) fn update_states(&mut self) {
        let mut cur = self.window_top;
        while let Some(id) = cur {
            let visible = self.intersects_viewport(id);
            let state = self.tree.node(id).item.state;
            match (state, visible) {
                (ItemState::Reachable | ItemState::Buffer | ItemState::Moving, true) => {
                    self.perform_item(id, ItemAction::Show);
                }
                (ItemState::Visible | ItemState::Moving | ItemState::Reachable, false) => {
                    self.perform_item(id, ItemAction::Hide);
                }
                _ => {}
            }
            cur = self.tree.down(id);
        }
    }

    pub(crate) fn update_free_edges(&mut self) {
        self.free.top = self
            .window_top
            .is_some_and(|top| self.proximity(top, Edge::Top).is_some());
        self.free.bottom = match self.tree.last() {
            Some(last) => self.proximity(last, Edge::Bottom).is_some(),
            None => self.first_proximity().is_some(),
        };
    }

    pub(crate) fn push_window_geometry(&mut self) {
        let mut cur = self.window_top;
        while let Some(id) = cur {
            self.push_geometry(id);
            cur = self.tree.down(id);
        }
    }

    /// Detaches a childless row: releases its view, unlinks it and drops it.
    pub(crate) fn detach_node(&mut self, id: NodeId) {
        debug_assert!(self.tree.is_leaf(id), "detach_node: row still has children");
        self.perform_item(id, ItemAction::Detach);
        if self.window_top == Some(id) {
            self.set_window_top(None);
        }
        self.tree.remove(id, false);
        self.tree.free(id);
    }

    /// Detaches a row and everything below it, children first.
    pub(crate) fn detach_subtree(&mut self, id: NodeId) {
        let mut order = Vec::new();
        let mut stack = alloc::vec![id];
        while let Some(cur) = stack.pop() {
            order.push(cur);
            stack.extend(self.tree.children(cur));
        }
        for node in order.into_iter().rev() {
            self.detach_node(node);
        }
    }

    /// Drops rows from the end of the mirror until `id` is the last one.
    pub(crate) fn truncate_after(&mut self, id: NodeId) {
        while let Some(last) = self.tree.last() {
            if last == id || Some(last) == self.window_top {
                break;
            }
            self.detach_node(last);
        }
    }

    /// Drops mirrored rows before the window that are not ancestors of its first row.
    pub(crate) fn normalize(&mut self) {
        let Some(top) = self.window_top else {
            let roots: Vec<NodeId> = self.tree.children(self.tree.root()).collect();
            for id in roots {
                self.detach_subtree(id);
            }
            return;
        };
        let mut path = Vec::new();
        let mut cur = Some(top);
        while let Some(c) = cur {
            path.push(c);
            cur = self.tree.node(c).parent;
        }
        path.reverse();
        for pair in path.windows(2) {
            let (parent, on_path) = (pair[0], pair[1]);
            let before: Vec<NodeId> = self
                .tree
                .children(parent)
                .take_while(|&c| c != on_path)
                .collect();
            for id in before {
                self.detach_subtree(id);
            }
        }
    }

    /// The row following the subtree of `id` in the source, if there is one.
    pub(crate) fn successor_after(&self, id: NodeId) -> Successor {
        let Some(source) = self.source.as_deref() else {
            return Successor::End;
        };
        let mut cur = id;
        loop {
            if cur == self.tree.root() {
                return Successor::End;
            }
            let Some(parent) = self.tree.effective_parent(cur) else {
                return Successor::End;
            };
            let next = self.tree.effective_row(cur) + 1;
            if next < source.row_count(self.tree.key(parent)) {
                return match crate::continuity::child_at(&self.tree, parent, next) {
                    Some(n) => Successor::Loaded(n),
                    None => Successor::Unloaded,
                };
            }
            cur = parent;
        }
    }

    /// The row following rows `..=last` under `parent`.
    pub(crate) fn successor_of_rows(&self, parent: NodeId, last: usize) -> Successor {
        if let Some(n) = crate::continuity::child_at(&self.tree, parent, last + 1) {
            return Successor::Loaded(n);
        }
        let Some(source) = self.source.as_deref() else {
            return Successor::End;
        };
        if last + 1 < source.row_count(self.tree.key(parent)) {
            return Successor::Unloaded;
        }
        self.successor_after(parent)
    }

    /// Moves the window start onto `id`, an ancestor that was kept above it.
    pub(crate) fn adopt_as_top(&mut self, id: NodeId, y: i64) {
        self.set_window_top(Some(id));
        let h = self.ensure_size(id);
        self.origin = y.saturating_sub(i64::from(h));
        self.place(id, self.origin);
    }
}

/// Where the source continues after some rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Successor {
    Loaded(NodeId),
    /// The next row exists but is not mirrored.
    Unloaded,
    /// Nothing follows: end of the tree.
    End,
}
