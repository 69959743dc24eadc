use crate::geometry::GeometryAction;
use crate::key::TreeKey;
use crate::node::{NodeId, NodeKind};
use crate::view_item::{ViewAction, ViewFactory, ViewId, ViewState};
use crate::Reflector;

/// Load/visibility lifecycle of a mirrored row.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ItemState {
    /// Allocated, not attached to the tree yet.
    #[default]
    New,
    /// Materialized, outside the viewport.
    Buffer,
    /// Unlinked in the middle of a move, view released.
    Removed,
    /// In the tree, not materialized.
    Reachable,
    Visible,
    /// Quarantined after an impossible transition; only `Detach` leaves it.
    Error,
    /// Detached; about to be dropped.
    Dangling,
    /// Unlinked in the middle of a move while keeping its view.
    Moving,
}

impl ItemState {
    /// Whether the row currently holds a view item.
    pub fn is_materialized(self) -> bool {
        matches!(self, Self::Buffer | Self::Visible | Self::Moving)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ItemAction {
    Show,
    Hide,
    Attach,
    Detach,
    Update,
    Move,
    Reset,
    Reparent,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ItemHandler {
    Nothing,
    Attach,
    Show,
    Hide,
    Buffer,
    Detach,
    Update,
    Move,
    Reset,
    Reparent,
    Error,
}

pub(crate) fn transition(state: ItemState, action: ItemAction) -> (ItemState, ItemHandler) {
    use ItemAction as A;
    use ItemHandler as H;
    use ItemState as S;

    match (state, action) {
        (S::New, A::Attach) => (S::Reachable, H::Attach),
        (S::New, A::Detach) => (S::Dangling, H::Nothing),
        (S::New, A::Reset) => (S::New, H::Nothing),
        (S::New, _) => (S::Error, H::Error),

        (S::Reachable, A::Show) => (S::Visible, H::Show),
        (S::Reachable, A::Hide) => (S::Buffer, H::Buffer),
        (S::Reachable, A::Attach) => (S::Reachable, H::Nothing),
        (S::Reachable, A::Detach) => (S::Dangling, H::Detach),
        (S::Reachable, A::Update) => (S::Reachable, H::Update),
        (S::Reachable, A::Move) => (S::Reachable, H::Move),
        (S::Reachable, A::Reset) => (S::Reachable, H::Reset),
        (S::Reachable, A::Reparent) => (S::Removed, H::Reparent),

        (S::Buffer, A::Show) => (S::Visible, H::Show),
        (S::Buffer, A::Hide | A::Attach) => (S::Buffer, H::Nothing),
        (S::Buffer, A::Detach) => (S::Dangling, H::Detach),
        (S::Buffer, A::Update) => (S::Buffer, H::Update),
        (S::Buffer, A::Move) => (S::Buffer, H::Move),
        (S::Buffer, A::Reset) => (S::Reachable, H::Reset),
        (S::Buffer, A::Reparent) => (S::Removed, H::Reparent),

        (S::Visible, A::Show | A::Attach) => (S::Visible, H::Nothing),
        (S::Visible, A::Hide) => (S::Buffer, H::Hide),
        (S::Visible, A::Detach) => (S::Dangling, H::Detach),
        (S::Visible, A::Update) => (S::Visible, H::Update),
        (S::Visible, A::Move) => (S::Visible, H::Move),
        (S::Visible, A::Reset) => (S::Reachable, H::Reset),
        (S::Visible, A::Reparent) => (S::Moving, H::Nothing),

        (S::Moving, A::Show) => (S::Visible, H::Show),
        (S::Moving, A::Hide) => (S::Buffer, H::Hide),
        (S::Moving, A::Attach | A::Reparent) => (S::Moving, H::Nothing),
        (S::Moving, A::Detach) => (S::Dangling, H::Detach),
        (S::Moving, A::Update) => (S::Moving, H::Update),
        (S::Moving, A::Move) => (S::Moving, H::Move),
        (S::Moving, A::Reset) => (S::Reachable, H::Reset),

        (S::Removed, A::Attach) => (S::Reachable, H::Attach),
        (S::Removed, A::Detach) => (S::Dangling, H::Nothing),
        (S::Removed, A::Move | A::Reset | A::Reparent) => (S::Removed, H::Nothing),
        (S::Removed, A::Show | A::Hide | A::Update) => (S::Error, H::Error),

        (S::Error, A::Detach) => (S::Dangling, H::Detach),
        (S::Error, _) => (S::Error, H::Nothing),

        (S::Dangling, _) => (S::Dangling, H::Nothing),
    }
}

/// Per-row lifecycle data embedded in each index node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct ModelItem {
    pub(crate) state: ItemState,
    pub(crate) view: Option<ViewId>,
}

impl<K: TreeKey, F: ViewFactory<K>> Reflector<K, F> {
    /// Runs one model item action.
    ///
    /// When the handler fails (the view could not be materialized) the item keeps its previous
    /// state and the action can simply be issued again later.
    pub(crate) fn perform_item(&mut self, id: NodeId, action: ItemAction) -> ItemState {
        let prev = self.tree.node(id).item.state;
        let (next, handler) = transition(prev, action);
        if next == ItemState::Error && prev != ItemState::Error {
            vwarn!(?id, ?prev, ?action, "model item quarantined");
        }

        let leaves_view = prev == ItemState::Visible
            && next != ItemState::Visible
            && next != ItemState::Moving;
        let enters_view = next == ItemState::Visible
            && prev != ItemState::Visible
            && prev != ItemState::Moving;

        if leaves_view {
            self.on_hidden(id);
        }
        self.tree.node_mut(id).item.state = next;

        if !self.run_item_handler(id, handler) {
            debug_assert!(
                !(prev == ItemState::New && action == ItemAction::Attach),
                "attaching a new node must not fail"
            );
            self.tree.node_mut(id).item.state = prev;
            if leaves_view {
                self.on_shown(id);
            }
            return prev;
        }

        if enters_view {
            self.on_shown(id);
        }
        next
    }

    fn run_item_handler(&mut self, id: NodeId, handler: ItemHandler) -> bool {
        match handler {
            ItemHandler::Nothing => true,
            ItemHandler::Attach => {
                self.attach_item(id);
                true
            }
            ItemHandler::Show => self.show_item(id),
            ItemHandler::Buffer => self.buffer_item(id),
            ItemHandler::Hide => {
                match self.tree.node(id).item.view {
                    Some(view) => {
                        self.perform_view(view, ViewAction::LeaveBuffer);
                    }
                    None => return self.buffer_item(id),
                }
                true
            }
            ItemHandler::Update => {
                if let Some(view) = self.tree.node(id).item.view {
                    self.perform_view(view, ViewAction::Update);
                }
                true
            }
            ItemHandler::Move => {
                self.tree.node_mut(id).geometry.perform(GeometryAction::Move);
                if let Some(view) = self.tree.node(id).item.view {
                    self.perform_view(view, ViewAction::Move);
                }
                true
            }
            ItemHandler::Detach | ItemHandler::Error => {
                self.release_item_view(id);
                true
            }
            ItemHandler::Reset | ItemHandler::Reparent => {
                self.release_item_view(id);
                self.tree.node_mut(id).geometry.perform(GeometryAction::Reset);
                true
            }
        }
    }

    fn attach_item(&mut self, id: NodeId) {
        let decoration = self.options.decoration;
        let node = self.tree.node_mut(id);
        if node.kind == NodeKind::New {
            node.kind = NodeKind::Normal;
        }
        node.geometry.perform(GeometryAction::Decorate(decoration));
        if self.options.size_hint.is_ahead_of_time() {
            self.ensure_size(id);
        }
    }

    fn item_view(&mut self, id: NodeId) -> ViewId {
        if let Some(view) = self.tree.node(id).item.view {
            return view;
        }
        let view = self.acquire_view(id);
        self.tree.node_mut(id).item.view = Some(view);
        view
    }

    fn show_item(&mut self, id: NodeId) -> bool {
        let view = self.item_view(id);
        if matches!(
            self.perform_view(view, ViewAction::Attach),
            ViewState::Failed | ViewState::Error
        ) {
            return false;
        }
        self.perform_view(view, ViewAction::EnterBuffer);
        if self.perform_view(view, ViewAction::EnterView) != ViewState::Active {
            return false;
        }
        self.materialized(id);
        true
    }

    fn buffer_item(&mut self, id: NodeId) -> bool {
        let view = self.item_view(id);
        if matches!(
            self.perform_view(view, ViewAction::Attach),
            ViewState::Failed | ViewState::Error
        ) {
            return false;
        }
        if self.perform_view(view, ViewAction::EnterBuffer) != ViewState::Buffer {
            return false;
        }
        self.materialized(id);
        true
    }

    fn materialized(&mut self, id: NodeId) {
        if self.options.size_hint.is_just_in_time() {
            if let Some(size) = self.measure_view(id) {
                self.resize_node(id, size);
            }
        }
        self.push_geometry(id);
    }

    /// Hands the row's view back to the pool (or the destruction queue) and forgets it.
    pub(crate) fn release_item_view(&mut self, id: NodeId) {
        if let Some(view) = self.tree.node_mut(id).item.view.take() {
            self.perform_view(view, ViewAction::Detach);
        }
    }

    /// Recomputes `Visible` vs `Buffer` from the immediate neighbors.
    ///
    /// A row next to a visible row is visible too. Used after a move, before the next layout
    /// pass confirms the result against the viewport.
    pub(crate) fn rebuild_state(&mut self, id: NodeId) -> ItemState {
        let is_visible = |n: Option<NodeId>, this: &Self| {
            n.is_some_and(|n| this.tree.node(n).item.state == ItemState::Visible)
        };
        let neighbor_visible =
            is_visible(self.tree.up(id), self) || is_visible(self.tree.down(id), self);
        if neighbor_visible {
            self.perform_item(id, ItemAction::Show)
        } else {
            self.perform_item(id, ItemAction::Hide)
        }
    }
}
