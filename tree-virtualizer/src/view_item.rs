use slotmap::new_key_type;

use crate::key::TreeKey;
use crate::node::NodeId;
use crate::{Rect, Reflector, Role, Size};

new_key_type! {
    /// Handle of a view item in the reflector's view arena.
    pub struct ViewId;
}

/// The rendering layer consumed by the engine.
///
/// `create` is called once per materialization; every handle it returns is eventually passed to
/// exactly one `destroy`, or kept in the recycling pool and rebound with `bind`. The engine
/// never keeps a handle after its view item was detached and flushed.
pub trait ViewFactory<K> {
    type Handle;

    /// Creates a visual for `key`. `None` means the visual cannot be created yet; the engine
    /// retries on the next action that touches the row.
    fn create(&mut self, key: &K, depth: usize) -> Option<Self::Handle>;

    /// Rebinds a recycled handle to another row.
    fn bind(&mut self, handle: &mut Self::Handle, key: &K, depth: usize) {
        let _ = (handle, key, depth);
    }

    /// Refreshes the given roles. An empty slice means "everything".
    fn update(&mut self, handle: &mut Self::Handle, key: &K, roles: &[Role]) {
        let _ = (handle, key, roles);
    }

    fn set_visible(&mut self, handle: &mut Self::Handle, visible: bool) {
        let _ = (handle, visible);
    }

    fn set_geometry(&mut self, handle: &mut Self::Handle, rect: Rect) {
        let _ = (handle, rect);
    }

    /// Real size of a materialized row, used by [`crate::SizeHintStrategy::JustInTime`].
    fn measure(&mut self, handle: &Self::Handle, key: &K) -> Option<Size> {
        let _ = (handle, key);
        None
    }

    fn destroy(&mut self, handle: Self::Handle) {
        let _ = handle;
    }
}

/// Lifecycle of a view item.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ViewState {
    /// Released, waiting for the end of the dispatch cycle to enter the pool.
    Pooling,
    /// Available for reuse.
    #[default]
    Pooled,
    /// Materialized but not displayed.
    Buffer,
    /// Displayed.
    Active,
    /// The factory could not create a handle; any further action retries.
    Failed,
    /// Released for good, destroyed at the end of the dispatch cycle.
    Dangling,
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ViewAction {
    Attach,
    EnterBuffer,
    EnterView,
    Update,
    Move,
    LeaveBuffer,
    Detach,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ViewHandler {
    Nothing,
    /// Bind a recycled handle or create a new one.
    Attach,
    Activate,
    Deactivate,
    Update,
    Move,
    /// Give the handle back: pool it when possible, destroy it otherwise.
    Release,
}

/// `(state, action) -> (next state, handler)`.
///
/// `Attach` falls back to `Failed` when the factory returns nothing and `Release` picks between
/// `Pooling` and `Dangling`; the table lists the optimistic outcome.
pub(crate) fn transition(state: ViewState, action: ViewAction) -> (ViewState, ViewHandler) {
    use ViewAction as A;
    use ViewHandler as H;
    use ViewState as S;

    match (state, action) {
        (S::Pooling, A::Detach) => (S::Pooling, H::Nothing),
        (S::Pooling, _) => (S::Error, H::Nothing),

        (S::Pooled, A::Attach | A::EnterBuffer) => (S::Buffer, H::Attach),
        (S::Pooled, A::Detach) => (S::Pooled, H::Nothing),
        (S::Pooled, _) => (S::Error, H::Nothing),

        (S::Buffer, A::EnterView) => (S::Active, H::Activate),
        (S::Buffer, A::Update) => (S::Buffer, H::Update),
        (S::Buffer, A::Move) => (S::Buffer, H::Move),
        (S::Buffer, A::Detach) => (S::Dangling, H::Release),
        (S::Buffer, A::Attach | A::EnterBuffer | A::LeaveBuffer) => (S::Buffer, H::Nothing),

        (S::Active, A::LeaveBuffer) => (S::Buffer, H::Deactivate),
        (S::Active, A::Update) => (S::Active, H::Update),
        (S::Active, A::Move) => (S::Active, H::Move),
        (S::Active, A::Detach) => (S::Dangling, H::Release),
        (S::Active, A::Attach | A::EnterBuffer | A::EnterView) => (S::Active, H::Nothing),

        (S::Failed, A::Attach | A::EnterBuffer | A::EnterView | A::Update | A::Move) => {
            (S::Buffer, H::Attach)
        }
        (S::Failed, A::LeaveBuffer) => (S::Failed, H::Nothing),
        (S::Failed, A::Detach) => (S::Dangling, H::Release),

        (S::Dangling, _) => (S::Dangling, H::Nothing),

        (S::Error, A::Detach) => (S::Dangling, H::Release),
        (S::Error, _) => (S::Error, H::Nothing),
    }
}

/// The visual counterpart of a materialized model item.
#[derive(Debug)]
pub(crate) struct ViewItem<H> {
    pub(crate) state: ViewState,
    pub(crate) handle: Option<H>,
    pub(crate) node: Option<NodeId>,
    /// Depth the handle was last bound for, used by per-depth recycling.
    pub(crate) depth: usize,
    pub(crate) pushed: Option<Rect>,
}

impl<H> ViewItem<H> {
    pub(crate) fn new(node: NodeId, depth: usize) -> Self {
        Self {
            state: ViewState::Pooled,
            handle: None,
            node: Some(node),
            depth,
            pushed: None,
        }
    }
}

impl<K: TreeKey, F: ViewFactory<K>> Reflector<K, F> {
    /// Returns a pooled view for `node` or allocates a fresh one.
    pub(crate) fn acquire_view(&mut self, node: NodeId) -> ViewId {
        let depth = self.tree.node(node).depth;
        let bucket = self.options.recycling_bucket(depth);
        if let Some(view) = self.pool.take(bucket) {
            if let Some(item) = self.views.get_mut(view) {
                item.node = Some(node);
                item.pushed = None;
                vtrace!(?view, ?node, "recycled view");
                return view;
            }
        }
        self.views.insert(ViewItem::new(node, depth))
    }

    /// Runs one view action and returns the resulting state.
    pub(crate) fn perform_view(&mut self, view: ViewId, action: ViewAction) -> ViewState {
        let Some(item) = self.views.get(view) else {
            return ViewState::Dangling;
        };
        let prev = item.state;
        let (next, handler) = transition(prev, action);
        let next = match handler {
            ViewHandler::Nothing => next,
            ViewHandler::Attach => {
                if self.attach_view(view) {
                    next
                } else {
                    ViewState::Failed
                }
            }
            ViewHandler::Activate => {
                self.show_view(view, true);
                next
            }
            ViewHandler::Deactivate => {
                self.show_view(view, false);
                next
            }
            ViewHandler::Update => {
                self.update_view(view);
                next
            }
            ViewHandler::Move => {
                if let Some(item) = self.views.get_mut(view) {
                    item.pushed = None;
                }
                next
            }
            ViewHandler::Release => self.release_view(view),
        };
        if next == ViewState::Error && prev != ViewState::Error {
            vwarn!(?view, ?prev, ?action, "view item entered the error state");
        }
        if let Some(item) = self.views.get_mut(view) {
            item.state = next;
        }
        next
    }

    fn attach_view(&mut self, view: ViewId) -> bool {
        let Some(node) = self.views.get(view).and_then(|v| v.node) else {
            return false;
        };
        let Some(n) = self.tree.get(node) else {
            return false;
        };
        let Some(key) = n.key.clone() else {
            return false;
        };
        let depth = n.depth;
        let Some(item) = self.views.get_mut(view) else {
            return false;
        };
        item.depth = depth;
        item.pushed = None;
        match item.handle.as_mut() {
            Some(handle) => {
                self.factory.bind(handle, &key, depth);
                true
            }
            None => match self.factory.create(&key, depth) {
                Some(handle) => {
                    item.handle = Some(handle);
                    true
                }
                None => {
                    vdebug!(?view, ?node, "view factory returned no handle");
                    false
                }
            },
        }
    }

    fn show_view(&mut self, view: ViewId, visible: bool) {
        if let Some(handle) = self.views.get_mut(view).and_then(|v| v.handle.as_mut()) {
            self.factory.set_visible(handle, visible);
        }
    }

    fn update_view(&mut self, view: ViewId) {
        let Some(item) = self.views.get_mut(view) else {
            return;
        };
        let Some(key) = item.node.and_then(|n| self.tree.key(n)).cloned() else {
            return;
        };
        if let Some(handle) = item.handle.as_mut() {
            self.factory.update(handle, &key, &self.roles);
        }
    }

    fn release_view(&mut self, view: ViewId) -> ViewState {
        let Some(item) = self.views.get_mut(view) else {
            return ViewState::Dangling;
        };
        if item.state == ViewState::Active {
            if let Some(handle) = item.handle.as_mut() {
                self.factory.set_visible(handle, false);
            }
        }
        item.node = None;
        item.pushed = None;
        let depth = item.depth;
        let recyclable = item.handle.is_some();
        if recyclable && self.pool.admit(view, self.options.recycling_bucket(depth)) {
            ViewState::Pooling
        } else {
            self.pool.doom(view);
            ViewState::Dangling
        }
    }

    /// Drains the deferred queues: released views enter the pool, dangling ones are destroyed.
    pub(crate) fn flush_views(&mut self) {
        for view in self.pool.drain_returning() {
            if let Some(item) = self.views.get_mut(view) {
                if item.state == ViewState::Pooling {
                    item.state = ViewState::Pooled;
                }
            }
        }
        for view in self.pool.drain_doomed() {
            if let Some(item) = self.views.remove(view) {
                if let Some(handle) = item.handle {
                    self.factory.destroy(handle);
                }
            }
        }
    }

    /// Destroys every pooled handle.
    pub(crate) fn drain_pool(&mut self) {
        for view in self.pool.drain_all() {
            self.pool.doom(view);
        }
        self.flush_views();
    }

    pub(crate) fn push_geometry(&mut self, node: NodeId) {
        let Some(view) = self.tree.node(node).item.view else {
            return;
        };
        let Some(rect) = self.tree.node_mut(node).geometry.decorated_geometry() else {
            return;
        };
        let Some(item) = self.views.get_mut(view) else {
            return;
        };
        if item.pushed == Some(rect) {
            return;
        }
        if let Some(handle) = item.handle.as_mut() {
            self.factory.set_geometry(handle, rect);
            item.pushed = Some(rect);
        }
    }

    /// Asks the factory for the real size of a materialized row.
    pub(crate) fn measure_view(&mut self, node: NodeId) -> Option<Size> {
        let view = self.tree.node(node).item.view?;
        let key = self.tree.key(node)?.clone();
        let handle = self.views.get(view)?.handle.as_ref()?;
        self.factory.measure(handle, &key)
    }
}
