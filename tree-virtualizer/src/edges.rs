use alloc::format;

use crate::error::{Result, TreeError};
use crate::key::TreeKey;
use crate::model_item::ItemState;
use crate::node::NodeId;
use crate::view_item::ViewFactory;
use crate::{Edge, Reflector};

/// A named region of the linearized tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EdgeRegion {
    /// Rows in the `Visible` state.
    Visible,
    /// The loaded window: visible rows plus the preloaded buffer.
    Buffered,
}

/// Boundary rows of a region.
///
/// In the linearized tree `left` coincides with `top` and `right` with `bottom`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ModelRect {
    top: Option<NodeId>,
    bottom: Option<NodeId>,
}

impl ModelRect {
    pub fn get(&self, edge: Edge) -> Option<NodeId> {
        match edge {
            Edge::Top | Edge::Left => self.top,
            Edge::Bottom | Edge::Right => self.bottom,
        }
    }

    pub fn top(&self) -> Option<NodeId> {
        self.top
    }

    pub fn bottom(&self) -> Option<NodeId> {
        self.bottom
    }

    pub fn is_empty(&self) -> bool {
        self.top.is_none()
    }
}

/// Whether the window can still grow toward an edge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FreeEdges {
    pub top: bool,
    pub bottom: bool,
}

#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Edges {
    visible: ModelRect,
    buffered: ModelRect,
}

impl Edges {
    pub(crate) fn region(&self, region: EdgeRegion) -> ModelRect {
        match region {
            EdgeRegion::Visible => self.visible,
            EdgeRegion::Buffered => self.buffered,
        }
    }
}

impl<K: TreeKey, F: ViewFactory<K>> Reflector<K, F> {
    /// The only writer of the edge rectangles.
    pub(crate) fn set_edges(
        &mut self,
        region: EdgeRegion,
        top: Option<NodeId>,
        bottom: Option<NodeId>,
    ) {
        debug_assert_eq!(
            top.is_some(),
            bottom.is_some(),
            "edges are set both-or-neither"
        );
        debug_assert!(
            match (top, bottom) {
                (Some(t), Some(b)) => self.tree.compare(t, b) != core::cmp::Ordering::Greater,
                _ => true,
            },
            "top edge after bottom edge"
        );
        let rect = ModelRect { top, bottom };
        match region {
            EdgeRegion::Visible => self.edges.visible = rect,
            EdgeRegion::Buffered => self.edges.buffered = rect,
        }
    }

    /// The only writer of the window start. Keeps the buffered edges on the window bounds.
    pub(crate) fn set_window_top(&mut self, top: Option<NodeId>) {
        debug_assert!(
            top.is_none_or(|t| self.tree.contains(t)),
            "window top is not mirrored"
        );
        self.window_top = top;
        self.sync_window_edges();
    }

    /// Extends the visible edges after `id` became visible.
    pub(crate) fn on_shown(&mut self, id: NodeId) {
        let rect = self.edges.visible;
        let (top, bottom) = match (rect.top, rect.bottom) {
            (Some(t), Some(b)) if self.tree.contains(t) && self.tree.contains(b) => {
                let top = if self.tree.compare(id, t).is_lt() { id } else { t };
                let bottom = if self.tree.compare(id, b).is_gt() { id } else { b };
                (top, bottom)
            }
            _ => (id, id),
        };
        self.set_edges(EdgeRegion::Visible, Some(top), Some(bottom));
    }

    /// Shrinks the visible edges before `id` stops being visible.
    ///
    /// Runs while `id` is still linked, so the replacement is found by walking its neighbors.
    pub(crate) fn on_hidden(&mut self, id: NodeId) {
        let rect = self.edges.visible;
        let (Some(top), Some(bottom)) = (rect.top, rect.bottom) else {
            return;
        };
        if top == id && bottom == id {
            self.set_edges(EdgeRegion::Visible, None, None);
            return;
        }
        if top == id {
            match self.scan_visible(id, bottom, |tree, n| tree.down(n)) {
                Some(next) => self.set_edges(EdgeRegion::Visible, Some(next), Some(bottom)),
                None => self.set_edges(EdgeRegion::Visible, None, None),
            }
        } else if bottom == id {
            match self.scan_visible(id, top, |tree, n| tree.up(n)) {
                Some(prev) => self.set_edges(EdgeRegion::Visible, Some(top), Some(prev)),
                None => self.set_edges(EdgeRegion::Visible, None, None),
            }
        }
    }

    fn scan_visible(
        &self,
        from: NodeId,
        limit: NodeId,
        step: impl Fn(&crate::node::Tree<K>, NodeId) -> Option<NodeId>,
    ) -> Option<NodeId> {
        let mut cur = step(&self.tree, from);
        while let Some(n) = cur {
            if self.tree.node(n).item.state == ItemState::Visible {
                return Some(n);
            }
            if n == limit {
                return None;
            }
            cur = step(&self.tree, n);
        }
        None
    }

    /// Points the buffered edges at the window bounds.
    pub(crate) fn sync_window_edges(&mut self) {
        match self.window_top {
            Some(top) => {
                let bottom = self.tree.last();
                self.set_edges(EdgeRegion::Buffered, Some(top), bottom.or(Some(top)));
            }
            None => self.set_edges(EdgeRegion::Buffered, None, None),
        }
    }

    /// Recomputes every edge with a full scan of the window.
    pub(crate) fn reload_edges(&mut self) {
        let mut first = None;
        let mut last = None;
        let mut cur = self.window_top;
        while let Some(id) = cur {
            if self.tree.node(id).item.state == ItemState::Visible {
                first.get_or_insert(id);
                last = Some(id);
            }
            cur = self.tree.down(id);
        }
        self.set_edges(EdgeRegion::Visible, first, last);
        self.sync_window_edges();
    }

    fn view_failed(&self, id: NodeId) -> bool {
        self.tree
            .node(id)
            .item
            .view
            .and_then(|v| self.views.get(v))
            .is_some_and(|v| v.state == crate::ViewState::Failed)
    }

    /// Checks the edge rectangle against the row states.
    pub(crate) fn check_edges(&self) -> Result<()> {
        let rect = self.edges.visible;
        let corrupted = |msg: &str| Err(TreeError::Corrupted(format!("visible edges: {msg}")));
        match (rect.top, rect.bottom) {
            (None, None) => {
                let mut cur = self.window_top;
                while let Some(id) = cur {
                    if self.tree.node(id).item.state == ItemState::Visible {
                        return corrupted("a visible row exists outside of empty edges");
                    }
                    cur = self.tree.down(id);
                }
                Ok(())
            }
            (Some(top), Some(bottom)) => {
                if !self.tree.contains(top) || !self.tree.contains(bottom) {
                    return corrupted("edge points at a dropped node");
                }
                if self.tree.compare(top, bottom).is_gt() {
                    return corrupted("top after bottom");
                }
                let state = |n: Option<NodeId>| n.map(|n| self.tree.node(n).item.state);
                if state(self.tree.up(top)) == Some(ItemState::Visible)
                    || state(self.tree.down(bottom)) == Some(ItemState::Visible)
                {
                    return corrupted("a visible row lies beyond an edge");
                }
                let mut cur = Some(top);
                while let Some(id) = cur {
                    if self.tree.node(id).item.state != ItemState::Visible && !self.view_failed(id) {
                        return corrupted("hole between the edges");
                    }
                    if id == bottom {
                        break;
                    }
                    cur = self.tree.down(id);
                }
                if cur.is_none() {
                    return corrupted("bottom is not reachable from top");
                }
                Ok(())
            }
            _ => corrupted("only one edge is set"),
        }
    }
}
