use alloc::format;
use alloc::rc::Rc;
use alloc::vec::Vec;

use slotmap::SlotMap;

use crate::edges::{EdgeRegion, Edges, FreeEdges, ModelRect};
use crate::error::{Result, TreeError};
use crate::geometry::GeometryState;
use crate::key::TreeKey;
use crate::model_item::{ItemAction, ItemState};
use crate::node::{NodeId, TemporaryIndex, Tree};
use crate::pool::ViewPool;
use crate::tracker::{TrackerAction, TrackerState};
use crate::view_item::{ViewFactory, ViewItem, ViewState};
use crate::{
    Edge, FrameState, Rect, ReflectorEvent, ReflectorOptions, Role, ScrollState, Size,
    TreeSource, ViewportState,
};

/// A visible row yielded by [`Reflector::for_each_visible`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VisibleItem<K> {
    pub node: NodeId,
    pub key: K,
    pub depth: usize,
    pub rect: Rect,
}

/// Destination of a move that could not keep its rows, replayed as an insertion by
/// `rows_moved`.
#[derive(Clone, Debug)]
pub(crate) struct PendingMove<K> {
    pub(crate) parent: Option<K>,
    pub(crate) first: usize,
    pub(crate) count: usize,
}

/// The tree-to-linear reflection engine.
///
/// It mirrors a window of a [`TreeSource`] as a depth-first ordered list of rows around the
/// viewport, keeps one lifecycle state machine per mirrored row and one per materialized view,
/// and lays the rows out lazily.
///
/// Like the rest of this crate it holds no UI objects: the adapter forwards source
/// notifications, viewport size and scroll offset, and renders through the [`ViewFactory`].
///
/// Every public entry point is one dispatch cycle. Released views are parked until the cycle
/// ends, then pooled or destroyed, and the `on_change` notifications fire last.
pub struct Reflector<K, F: ViewFactory<K>> {
    pub(crate) options: ReflectorOptions<K>,
    pub(crate) source: Option<Rc<dyn TreeSource<K>>>,
    pub(crate) factory: F,

    pub(crate) tree: Tree<K>,
    pub(crate) views: SlotMap<crate::ViewId, ViewItem<F::Handle>>,
    pub(crate) pool: ViewPool,
    pub(crate) tracker: TrackerState,
    pub(crate) edges: Edges,
    pub(crate) free: FreeEdges,

    /// First row of the loaded window. Mirrored rows before it are its ancestors.
    pub(crate) window_top: Option<NodeId>,
    /// Content `y` of `window_top`.
    pub(crate) origin: i64,
    pub(crate) content_end: i64,
    pub(crate) viewport: Size,
    pub(crate) offset: i64,

    pub(crate) missed: bool,
    pub(crate) healing: bool,
    pub(crate) resized: bool,
    pub(crate) dirty: bool,
    pub(crate) roles: Vec<Role>,
    pub(crate) pending_move: Option<PendingMove<K>>,

    dispatch_depth: usize,
    last_count: usize,
}

impl<K, F: ViewFactory<K>> core::fmt::Debug for Reflector<K, F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Reflector")
            .field("tracker", &self.tracker)
            .field("window_top", &self.window_top)
            .field("origin", &self.origin)
            .field("viewport", &self.viewport)
            .field("offset", &self.offset)
            .field("views", &self.views.len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<K: TreeKey, F: ViewFactory<K>> Reflector<K, F> {
    /// Creates a reflector without a source.
    pub fn new(options: ReflectorOptions<K>, factory: F) -> Self {
        let viewport = options.initial_viewport.unwrap_or_default();
        let offset = options.initial_offset.resolve();
        vdebug!(
            buffer_size = options.buffer_size,
            pool_size = options.pool_size,
            enabled = options.enabled,
            "Reflector::new"
        );
        Self {
            pool: ViewPool::new(options.pool_size),
            options,
            source: None,
            factory,
            tree: Tree::new(),
            views: SlotMap::with_key(),
            tracker: TrackerState::NoModel,
            edges: Edges::default(),
            free: FreeEdges::default(),
            window_top: None,
            origin: 0,
            content_end: 0,
            viewport,
            offset,
            missed: false,
            healing: false,
            resized: false,
            dirty: false,
            roles: Vec::new(),
            pending_move: None,
            dispatch_depth: 0,
            last_count: 0,
        }
    }

    pub fn options(&self) -> &ReflectorOptions<K> {
        &self.options
    }

    pub fn set_options(&mut self, options: ReflectorOptions<K>) {
        self.dispatch(|r| {
            let prev = core::mem::replace(&mut r.options, options);
            vtrace!(
                buffer_size = r.options.buffer_size,
                enabled = r.options.enabled,
                "Reflector::set_options"
            );
            if prev.pool_size != r.options.pool_size {
                for view in r.pool.set_capacity(r.options.pool_size) {
                    r.pool.doom(view);
                }
            }
            if prev.recycling != r.options.recycling {
                r.drain_pool();
            }
            let rebuild = !prev.size_hint.same_as(&r.options.size_hint)
                || prev.max_depth != r.options.max_depth
                || prev.decoration != r.options.decoration
                || prev.recycling != r.options.recycling;

            if prev.enabled != r.options.enabled {
                r.apply_enabled();
            } else if rebuild {
                r.clear_mirror();
                r.refresh();
            } else {
                r.refresh();
            }
            r.dirty = true;
        });
    }

    pub fn update_options(&mut self, f: impl FnOnce(&mut ReflectorOptions<K>)) {
        let mut next = self.options.clone();
        f(&mut next);
        self.set_options(next);
    }

    pub fn set_on_change(&mut self, on_change: Option<impl Fn(ReflectorEvent) + Send + Sync + 'static>) {
        self.options.on_change =
            on_change.map(|f| alloc::sync::Arc::new(f) as crate::OnChangeCallback);
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn factory_mut(&mut self) -> &mut F {
        &mut self.factory
    }

    pub fn source(&self) -> Option<&Rc<dyn TreeSource<K>>> {
        self.source.as_ref()
    }

    pub fn tracker_state(&self) -> TrackerState {
        self.tracker
    }

    /// Attaches a new source (or detaches the current one with `None`).
    ///
    /// The current mirror is torn down first. When enabled, the new source is populated and
    /// tracked right away.
    pub fn set_source(&mut self, source: Option<Rc<dyn TreeSource<K>>>) {
        self.dispatch(|r| {
            vtrace!(attach = source.is_some(), "Reflector::set_source");
            match r.tracker {
                TrackerState::NoModel => {}
                TrackerState::Resetting => {
                    r.perform_tracker(TrackerAction::Free);
                }
                _ => {
                    r.perform_tracker(TrackerAction::Disable);
                    r.perform_tracker(TrackerAction::Reset);
                    r.perform_tracker(TrackerAction::Free);
                }
            }
            r.source = None;
            r.tracker = TrackerState::NoModel;
            r.missed = false;
            if let Some(source) = source {
                r.source = Some(source);
                r.tracker = TrackerState::Paused;
                if r.options.enabled {
                    r.perform_tracker(TrackerAction::Populate);
                    r.perform_tracker(TrackerAction::Enable);
                }
            }
            r.dirty = true;
        });
    }

    pub fn enabled(&self) -> bool {
        self.options.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if self.options.enabled == enabled {
            return;
        }
        self.dispatch(|r| {
            r.options.enabled = enabled;
            r.apply_enabled();
        });
    }

    fn apply_enabled(&mut self) {
        vtrace!(enabled = self.options.enabled, "Reflector::set_enabled");
        if self.options.enabled {
            if self.tracker == TrackerState::Populated {
                self.missed = true;
            }
            self.perform_tracker(TrackerAction::Enable);
        } else {
            self.perform_tracker(TrackerAction::Disable);
        }
        self.dirty = true;
    }

    pub(crate) fn dispatch<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.dispatch_depth = self.dispatch_depth.saturating_add(1);
        let out = f(self);
        debug_assert!(self.dispatch_depth > 0, "dispatch_depth underflow");
        self.dispatch_depth = self.dispatch_depth.saturating_sub(1);
        if self.dispatch_depth == 0 {
            self.finish_dispatch();
        }
        out
    }

    fn finish_dispatch(&mut self) {
        if self.pool.has_pending() {
            self.flush_views();
        }
        let count = self.visible_count();
        let content = core::mem::take(&mut self.dirty);
        let count_changed = count != self.last_count;
        self.last_count = count;
        let Some(cb) = self.options.on_change.clone() else {
            return;
        };
        if content {
            cb(ReflectorEvent::ContentChanged);
        }
        if count_changed {
            cb(ReflectorEvent::CountChanged(count));
        }
    }

    /// Batches several updates into one dispatch cycle: views released by any of them are
    /// flushed once and `on_change` fires at most once per event kind.
    pub fn batch_update(&mut self, f: impl FnOnce(&mut Self)) {
        self.dispatch(f);
    }

    pub fn viewport_size(&self) -> Size {
        self.viewport
    }

    pub fn scroll_offset(&self) -> i64 {
        self.offset
    }

    pub fn viewport_state(&self) -> ViewportState {
        ViewportState {
            size: self.viewport,
        }
    }

    pub fn scroll_state(&self) -> ScrollState {
        ScrollState {
            offset: self.offset,
        }
    }

    pub fn frame_state(&self) -> FrameState {
        FrameState {
            viewport: self.viewport_state(),
            scroll: self.scroll_state(),
        }
    }

    pub fn restore_frame_state(&mut self, frame: FrameState) {
        self.apply_scroll_frame(frame.viewport.size, frame.scroll.offset);
    }

    pub fn set_viewport_size(&mut self, size: Size) {
        if self.viewport == size {
            return;
        }
        self.dispatch(|r| {
            r.viewport = size;
            r.refresh();
        });
    }

    pub fn set_scroll_offset(&mut self, offset: i64) {
        if self.offset == offset {
            return;
        }
        self.dispatch(|r| {
            r.offset = offset;
            r.refresh();
        });
    }

    pub fn set_scroll_offset_clamped(&mut self, offset: i64) {
        self.dispatch(|r| {
            r.offset = offset;
            r.refresh();
            r.clamp_scroll_offset();
        });
    }

    pub fn scroll_by(&mut self, delta: i64) {
        let offset = self.offset.saturating_add(delta);
        self.set_scroll_offset_clamped(offset);
    }

    /// Applies a viewport size and a scroll offset as a single frame.
    pub fn apply_scroll_frame(&mut self, size: Size, offset: i64) {
        self.dispatch(|r| {
            r.viewport = size;
            r.offset = offset;
            r.refresh();
        });
    }

    /// Keeps the scroll offset inside the content extent, on the sides where the extent is
    /// known (the top or bottom of the tree is loaded).
    pub fn clamp_scroll_offset(&mut self) {
        self.dispatch(|r| {
            let vh = i64::from(r.viewport.height);
            let mut offset = r.offset;
            if !r.free.bottom && r.window_top.is_some() {
                offset = offset.min(r.content_end - vh);
            }
            if !r.free.top && r.window_top.is_some() {
                offset = offset.max(r.origin);
            }
            if offset != r.offset {
                r.offset = offset;
                r.refresh();
            }
        });
    }

    /// Content `y` range covered by the loaded window.
    pub fn loaded_extent(&self) -> core::ops::Range<i64> {
        self.origin..self.content_end
    }

    pub(crate) fn viewport_span(&self) -> (i64, i64) {
        let vt = self.offset;
        (vt, vt.saturating_add(i64::from(self.viewport.height)))
    }

    fn check_node(&self, id: NodeId) -> Result<()> {
        if self.tree.contains(id) {
            Ok(())
        } else {
            Err(TreeError::StaleNode(id))
        }
    }

    /// Runs a model item action and returns the resulting state.
    ///
    /// Only `Show`, `Update` and `Move` on a row of the window can be issued from outside;
    /// the structural actions belong to the notification handlers. A failed materialization
    /// leaves the row in its previous state; issuing `Show` again retries it. A row shown
    /// outside the viewport settles in the buffer.
    pub fn perform(&mut self, id: NodeId, action: ItemAction) -> Result<ItemState> {
        self.check_node(id)?;
        let accepted = matches!(action, ItemAction::Show | ItemAction::Update | ItemAction::Move)
            && self.is_window_member(id);
        if !accepted {
            return Err(TreeError::RejectedAction { node: id, action });
        }
        vtrace!(?id, ?action, "Reflector::perform");
        Ok(self.dispatch(|r| {
            let mut state = r.perform_item(id, action);
            if state == ItemState::Visible && !r.intersects_viewport(id) {
                state = r.perform_item(id, ItemAction::Hide);
            }
            r.reload_edges();
            r.dirty = true;
            state
        }))
    }

    /// Returns the neighbor of `id` toward `edge`, loading it from the source when `id` sits on
    /// the window boundary. `Ok(None)` means the end of the tree was reached.
    pub fn load(&mut self, id: NodeId, edge: Edge) -> Result<Option<NodeId>> {
        if self.source.is_none() {
            return Err(TreeError::NoSource);
        }
        self.check_node(id)?;
        vtrace!(?id, ?edge, "Reflector::load");
        Ok(self.dispatch(|r| {
            let n = r.load_edge(id, edge);
            if n.is_some() {
                r.layout();
                r.update_states();
                r.sync_window_edges();
                r.update_free_edges();
                r.push_window_geometry();
                r.dirty = true;
            }
            n
        }))
    }

    pub fn up(&self, id: NodeId) -> Option<NodeId> {
        self.tree.up(id)
    }

    pub fn down(&self, id: NodeId) -> Option<NodeId> {
        self.tree.down(id)
    }

    pub fn left(&self, id: NodeId) -> Option<NodeId> {
        self.tree.left(id)
    }

    pub fn right(&self, id: NodeId) -> Option<NodeId> {
        self.tree.right(id)
    }

    pub fn first(&self) -> Option<NodeId> {
        self.tree.first()
    }

    pub fn last(&self) -> Option<NodeId> {
        self.tree.last()
    }

    pub fn node_for_key(&self, key: &K) -> Option<NodeId> {
        self.tree.node_for_key(key)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.tree.contains(id)
    }

    pub fn key(&self, id: NodeId) -> Option<&K> {
        self.tree.key(id)
    }

    pub fn state(&self, id: NodeId) -> Option<ItemState> {
        self.tree.contains(id).then(|| self.tree.node(id).item.state)
    }

    pub fn view_state(&self, id: NodeId) -> Option<ViewState> {
        let view = self.tree.get(id)?.item.view?;
        Some(self.views.get(view)?.state)
    }

    /// The rendering handle of a materialized row.
    pub fn handle(&self, id: NodeId) -> Option<&F::Handle> {
        let view = self.tree.get(id)?.item.view?;
        self.views.get(view)?.handle.as_ref()
    }

    pub fn depth(&self, id: NodeId) -> Option<usize> {
        self.tree.contains(id).then(|| self.tree.node(id).depth)
    }

    pub fn effective_row(&self, id: NodeId) -> Option<usize> {
        self.tree.contains(id).then(|| self.tree.effective_row(id))
    }

    pub fn effective_column(&self, id: NodeId) -> Option<usize> {
        self.tree.contains(id).then(|| self.tree.effective_column(id))
    }

    /// Parent of `id`, `None` for top-level rows.
    pub fn effective_parent(&self, id: NodeId) -> Option<NodeId> {
        if !self.tree.contains(id) {
            return None;
        }
        self.tree
            .effective_parent(id)
            .filter(|&p| p != self.tree.root())
    }

    pub fn temporary_index(&self, id: NodeId) -> Option<TemporaryIndex> {
        self.tree.temporary_index(id)
    }

    /// Decorated geometry of a row, composed on demand.
    pub fn decorated_geometry(&mut self, id: NodeId) -> Option<Rect> {
        self.tree.get_mut(id)?.geometry.decorated_geometry()
    }

    /// Geometry of a row without its decoration.
    pub fn content_geometry(&mut self, id: NodeId) -> Option<Rect> {
        self.tree.get_mut(id)?.geometry.content_geometry()
    }

    /// Decorated geometry without touching the cache.
    pub fn geometry(&self, id: NodeId) -> Option<Rect> {
        self.tree.get(id)?.geometry.peek()
    }

    pub fn geometry_state(&self, id: NodeId) -> Option<GeometryState> {
        Some(self.tree.get(id)?.geometry.state())
    }

    pub fn edges(&self, region: EdgeRegion) -> ModelRect {
        self.edges.region(region)
    }

    pub fn edge(&self, region: EdgeRegion, edge: Edge) -> Option<NodeId> {
        self.edges.region(region).get(edge)
    }

    pub fn free_edges(&self) -> FreeEdges {
        self.free
    }

    /// Number of rows in the `Visible` state.
    pub fn visible_count(&self) -> usize {
        let rect = self.edges.region(EdgeRegion::Visible);
        let (Some(top), Some(bottom)) = (rect.top(), rect.bottom()) else {
            return 0;
        };
        let mut count = 0;
        let mut cur = Some(top);
        while let Some(id) = cur {
            if self.tree.node(id).item.state == ItemState::Visible {
                count += 1;
            }
            if id == bottom {
                break;
            }
            cur = self.tree.down(id);
        }
        count
    }

    /// Number of mirrored rows, structural ancestors of the window included.
    pub fn loaded_count(&self) -> usize {
        self.tree.len()
    }

    /// Number of view handles waiting in the recycling pool.
    pub fn pooled_count(&self) -> usize {
        self.pool.len()
    }

    /// Calls `f` for every visible row, in depth-first order.
    pub fn for_each_visible(&self, mut f: impl FnMut(VisibleItem<K>)) {
        let rect = self.edges.region(EdgeRegion::Visible);
        let (Some(top), Some(bottom)) = (rect.top(), rect.bottom()) else {
            return;
        };
        let mut cur = Some(top);
        while let Some(id) = cur {
            let node = self.tree.node(id);
            if node.item.state == ItemState::Visible {
                if let (Some(key), Some(rect)) = (node.key.clone(), node.geometry.peek()) {
                    f(VisibleItem {
                        node: id,
                        key,
                        depth: node.depth,
                        rect,
                    });
                }
            }
            if id == bottom {
                break;
            }
            cur = self.tree.down(id);
        }
    }

    pub fn collect_visible(&self) -> Vec<VisibleItem<K>> {
        let mut out = Vec::new();
        self.for_each_visible(|item| out.push(item));
        out
    }

    /// Walks the whole mirror and reports the first broken invariant.
    ///
    /// Meant for tests and debugging; it queries the source for every mirrored row.
    pub fn validate(&self) -> Result<()> {
        let corrupted = |msg: alloc::string::String| Err(TreeError::Corrupted(msg));
        if let Err(e) = self.tree.check_links() {
            return corrupted(e.into());
        }

        for id in self.tree.ids() {
            let node = self.tree.node(id);
            let Some(key) = node.key.as_ref() else {
                return corrupted(format!("{id:?} has no key"));
            };
            if self.tree.node_for_key(key) != Some(id) {
                return corrupted(format!("{id:?} is not indexed by its key"));
            }
            let Some(parent) = node.parent else {
                return corrupted(format!("{id:?} is not linked"));
            };
            if node.depth != self.tree.node(parent).depth + 1 {
                return corrupted(format!("{id:?} has a stale depth"));
            }
            if !self.options.loads_depth(node.depth) {
                return corrupted(format!("{id:?} is deeper than max_depth"));
            }
            if let Some(source) = self.source.as_deref() {
                if source.key(self.tree.key(parent), node.row).as_ref() != Some(key) {
                    return corrupted(format!("{id:?} row {} is out of sync", node.row));
                }
            }
            if let Some(view) = node.item.view {
                let Some(item) = self.views.get(view) else {
                    return corrupted(format!("{id:?} points at a dropped view"));
                };
                if item.node != Some(id) {
                    return corrupted(format!("{id:?} and its view disagree"));
                }
                let expected = match node.item.state {
                    ItemState::Visible => Some(ViewState::Active),
                    ItemState::Buffer => Some(ViewState::Buffer),
                    _ => None,
                };
                if expected.is_some_and(|s| s != item.state) {
                    return corrupted(format!("{id:?} view is {:?}", item.state));
                }
            } else if node.item.state.is_materialized() {
                return corrupted(format!("{id:?} is materialized without a view"));
            }
            if let Some(down) = self.tree.down(id) {
                if self.tree.up(down) != Some(id) {
                    return corrupted(format!("{id:?} up/down links are asymmetric"));
                }
            }
        }

        match self.window_top {
            None => {
                if self.tree.len() != 0 {
                    return corrupted("rows are mirrored without a window".into());
                }
            }
            Some(top) => {
                let mut cur = self.tree.first();
                while let Some(id) = cur {
                    if id == top {
                        break;
                    }
                    if !self.tree.is_ancestor(id, top) {
                        return corrupted(format!("{id:?} lies before the window"));
                    }
                    if self.tree.node(id).item.view.is_some() {
                        return corrupted(format!("{id:?} is an ancestor with a view"));
                    }
                    cur = self.tree.down(id);
                }
                if cur.is_none() {
                    return corrupted("window top is not mirrored".into());
                }
                if self.source.is_some() {
                    let mut cur = top;
                    while let Some(next) = self.tree.down(cur) {
                        if self.source_next_key(cur).as_ref() != self.tree.key(next) {
                            return corrupted(format!("hole in the window after {cur:?}"));
                        }
                        cur = next;
                    }
                }
            }
        }

        let buffered = self.edges.region(EdgeRegion::Buffered);
        if buffered.top() != self.window_top || buffered.bottom() != self.window_top.and(self.tree.last()) {
            return corrupted("buffered edges do not match the window".into());
        }
        self.check_edges()
    }

    /// Key of the row following `id` in the source's depth-first order.
    fn source_next_key(&self, id: NodeId) -> Option<K> {
        let source = self.source.as_deref()?;
        let node = self.tree.node(id);
        if self.options.loads_depth(node.depth + 1) && source.row_count(node.key.as_ref()) > 0 {
            return source.key(node.key.as_ref(), 0);
        }
        let mut cur = id;
        loop {
            if cur == self.tree.root() {
                return None;
            }
            let parent = self.tree.node(cur).parent?;
            let next = self.tree.node(cur).row + 1;
            let parent_key = self.tree.key(parent);
            if next < source.row_count(parent_key) {
                return source.key(parent_key, next);
            }
            cur = parent;
        }
    }

    /// Drops every mirrored row and releases their views.
    pub(crate) fn clear_mirror(&mut self) {
        let ids: Vec<NodeId> = self.tree.ids().collect();
        for id in ids {
            self.release_item_view(id);
        }
        self.tree.clear();
        self.set_window_top(None);
        self.origin = 0;
        self.content_end = 0;
        self.pending_move = None;
        self.set_edges(EdgeRegion::Visible, None, None);
        self.set_edges(EdgeRegion::Buffered, None, None);
        self.free = FreeEdges::default();
        self.dirty = true;
    }
}

impl<K, F: ViewFactory<K>> Drop for Reflector<K, F> {
    fn drop(&mut self) {
        for (_, item) in self.views.drain() {
            if let Some(handle) = item.handle {
                self.factory.destroy(handle);
            }
        }
    }
}
