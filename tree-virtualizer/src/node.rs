use core::cmp::Ordering;

use slotmap::{SlotMap, new_key_type};

use crate::geometry::GeometryTracker;
use crate::key::{KeyMap, TreeKey};
use crate::model_item::ModelItem;

new_key_type! {
    /// Stable handle of a mirrored node.
    ///
    /// Handles are never reused while the engine is alive, so a handle kept past the node's
    /// removal is detected as stale instead of aliasing a new node.
    pub struct NodeId;
}

/// Structural lifecycle of an index node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NodeKind {
    /// Allocated, not linked into the tree yet.
    New,
    Normal,
    /// Carries a temporary index while a move is being applied.
    Transition,
    Root,
}

/// A pending `(parent, row, column)` reported while a move is in flight.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TemporaryIndex {
    pub parent: NodeId,
    pub row: usize,
    pub column: usize,
}

#[derive(Clone, Debug)]
pub(crate) struct IndexNode<K> {
    pub(crate) key: Option<K>,
    pub(crate) kind: NodeKind,
    pub(crate) row: usize,
    pub(crate) column: usize,
    pub(crate) depth: usize,
    temporary: Option<TemporaryIndex>,

    pub(crate) parent: Option<NodeId>,
    pub(crate) first_child: Option<NodeId>,
    pub(crate) last_child: Option<NodeId>,
    pub(crate) prev: Option<NodeId>,
    pub(crate) next: Option<NodeId>,
    pub(crate) children: KeyMap<K, NodeId>,

    pub(crate) geometry: GeometryTracker,
    pub(crate) item: ModelItem,
}

impl<K> IndexNode<K> {
    fn new(key: Option<K>, kind: NodeKind, row: usize, depth: usize) -> Self {
        Self {
            key,
            kind,
            row,
            column: 0,
            depth,
            temporary: None,
            parent: None,
            first_child: None,
            last_child: None,
            prev: None,
            next: None,
            children: KeyMap::new(),
            geometry: GeometryTracker::new(),
            item: ModelItem::default(),
        }
    }

    fn is_unattached(&self) -> bool {
        self.parent.is_none() && self.prev.is_none() && self.next.is_none()
    }
}

/// The mirrored tree: an arena of index nodes linked as parent/child/sibling chains.
///
/// The depth-first order of the nodes is the linear order exposed by `up`/`down`.
#[derive(Clone, Debug)]
pub(crate) struct Tree<K> {
    nodes: SlotMap<NodeId, IndexNode<K>>,
    root: NodeId,
    keys: KeyMap<K, NodeId>,
}

impl<K: TreeKey> Tree<K> {
    pub(crate) fn new() -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(IndexNode::new(None, NodeKind::Root, 0, 0));
        Self {
            nodes,
            root,
            keys: KeyMap::new(),
        }
    }

    pub(crate) fn root(&self) -> NodeId {
        self.root
    }

    /// Number of mirrored nodes, root excluded.
    pub(crate) fn len(&self) -> usize {
        self.nodes.len() - 1
    }

    pub(crate) fn contains(&self, id: NodeId) -> bool {
        id != self.root && self.nodes.contains_key(id)
    }

    pub(crate) fn get(&self, id: NodeId) -> Option<&IndexNode<K>> {
        self.nodes.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut IndexNode<K>> {
        self.nodes.get_mut(id)
    }

    pub(crate) fn node(&self, id: NodeId) -> &IndexNode<K> {
        &self.nodes[id]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut IndexNode<K> {
        &mut self.nodes[id]
    }

    pub(crate) fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        let root = self.root;
        self.nodes.keys().filter(move |&id| id != root)
    }

    pub(crate) fn node_for_key(&self, key: &K) -> Option<NodeId> {
        self.keys.get(key).copied()
    }

    /// Resolves a notification parent: `None` is the invisible root.
    pub(crate) fn resolve(&self, parent: Option<&K>) -> Option<NodeId> {
        match parent {
            None => Some(self.root),
            Some(key) => self.node_for_key(key),
        }
    }

    pub(crate) fn child_by_key(&self, parent: NodeId, key: &K) -> Option<NodeId> {
        self.nodes.get(parent)?.children.get(key).copied()
    }

    pub(crate) fn key(&self, id: NodeId) -> Option<&K> {
        self.nodes.get(id)?.key.as_ref()
    }

    /// Allocates an unattached node. The node is indexed by key right away.
    pub(crate) fn alloc(&mut self, key: K, row: usize, depth: usize) -> NodeId {
        let id = self
            .nodes
            .insert(IndexNode::new(Some(key.clone()), NodeKind::New, row, depth));
        self.keys.insert(key, id);
        id
    }

    /// Drops an unlinked, childless node from the arena.
    pub(crate) fn free(&mut self, id: NodeId) {
        debug_assert!(id != self.root, "Tree::free: the root is not freeable");
        let Some(node) = self.nodes.remove(id) else {
            return;
        };
        debug_assert!(node.is_unattached(), "Tree::free: node is still linked");
        debug_assert!(node.first_child.is_none(), "Tree::free: node still has children");
        if let Some(key) = node.key {
            if self.keys.get(&key) == Some(&id) {
                self.keys.remove(&key);
            }
        }
    }

    /// Drops every node except the root.
    pub(crate) fn clear(&mut self) {
        let root = self.root;
        self.nodes.retain(|id, _| id == root);
        self.keys.clear();
        let r = &mut self.nodes[root];
        r.first_child = None;
        r.last_child = None;
        r.children.clear();
    }

    /// Links `new` as a child of `parent`, right before `other` (appended when `other` is `None`).
    pub(crate) fn insert_child_before(&mut self, new: NodeId, other: Option<NodeId>, parent: NodeId) {
        debug_assert!(
            self.nodes[new].is_unattached(),
            "insert_child_before: node is already attached"
        );
        debug_assert!(
            other.is_none_or(|o| self.nodes[o].parent == Some(parent)),
            "insert_child_before: sibling belongs to another parent"
        );
        let prev = match other {
            Some(o) => self.nodes[o].prev,
            None => self.nodes[parent].last_child,
        };
        self.link(new, prev, other, parent);
    }

    /// Links `new` as a child of `parent`, right after `other` (prepended when `other` is `None`).
    pub(crate) fn insert_child_after(&mut self, new: NodeId, other: Option<NodeId>, parent: NodeId) {
        debug_assert!(
            self.nodes[new].is_unattached(),
            "insert_child_after: node is already attached"
        );
        debug_assert!(
            other.is_none_or(|o| self.nodes[o].parent == Some(parent)),
            "insert_child_after: sibling belongs to another parent"
        );
        let next = match other {
            Some(o) => self.nodes[o].next,
            None => self.nodes[parent].first_child,
        };
        self.link(new, other, next, parent);
    }

    fn link(&mut self, new: NodeId, prev: Option<NodeId>, next: Option<NodeId>, parent: NodeId) {
        let depth = self.nodes[parent].depth + 1;
        {
            let n = &mut self.nodes[new];
            n.parent = Some(parent);
            n.prev = prev;
            n.next = next;
            n.depth = depth;
        }
        if let Some(p) = prev {
            self.nodes[p].next = Some(new);
        }
        if let Some(nx) = next {
            self.nodes[nx].prev = Some(new);
        }
        self.bridge_gap(parent, prev, Some(new));
        self.bridge_gap(parent, Some(new), next);

        if let Some(key) = self.nodes[new].key.clone() {
            self.nodes[parent].children.insert(key, new);
        }
        self.sync_subtree_depth(new);
    }

    /// Repairs the sibling links between `first` and `second` after the nodes between them
    /// were unlinked.
    ///
    /// A missing `first` makes `second` the first child, a missing `second` makes `first` the
    /// last child. Both missing leaves the parent without children.
    pub(crate) fn bridge_gap(&mut self, parent: NodeId, first: Option<NodeId>, second: Option<NodeId>) {
        match (first, second) {
            (Some(a), Some(b)) => {
                debug_assert_eq!(self.nodes[a].parent, self.nodes[b].parent);
                self.nodes[a].next = Some(b);
                self.nodes[b].prev = Some(a);
            }
            (None, Some(b)) => {
                self.nodes[b].prev = None;
                self.nodes[parent].first_child = Some(b);
            }
            (Some(a), None) => {
                self.nodes[a].next = None;
                self.nodes[parent].last_child = Some(a);
            }
            (None, None) => {
                let p = &mut self.nodes[parent];
                p.first_child = None;
                p.last_child = None;
            }
        }
    }

    /// Unlinks a node from its parent's chain and child index.
    ///
    /// With `reparent` the node keeps its own children (it is about to be linked elsewhere);
    /// without it the node must already be a leaf.
    pub(crate) fn remove(&mut self, id: NodeId, reparent: bool) {
        debug_assert!(
            reparent || self.nodes[id].first_child.is_none(),
            "Tree::remove: node still has children"
        );
        let Some(parent) = self.nodes[id].parent else {
            return;
        };
        let (prev, next) = (self.nodes[id].prev, self.nodes[id].next);
        self.bridge_gap(parent, prev, next);
        if let Some(key) = self.nodes[id].key.clone() {
            if self.nodes[parent].children.get(&key) == Some(&id) {
                self.nodes[parent].children.remove(&key);
            }
        }
        let n = &mut self.nodes[id];
        n.parent = None;
        n.prev = None;
        n.next = None;
    }

    fn sync_subtree_depth(&mut self, id: NodeId) {
        let mut stack = alloc::vec![id];
        while let Some(cur) = stack.pop() {
            let depth = self.nodes[cur].depth;
            let mut child = self.nodes[cur].first_child;
            while let Some(c) = child {
                self.nodes[c].depth = depth + 1;
                stack.push(c);
                child = self.nodes[c].next;
            }
        }
    }

    pub(crate) fn set_temporary_index(&mut self, id: NodeId, parent: NodeId, row: usize, column: usize) {
        let n = &mut self.nodes[id];
        n.temporary = Some(TemporaryIndex {
            parent,
            row,
            column,
        });
        n.kind = NodeKind::Transition;
    }

    /// Commits the temporary index as the real one and leaves the transition.
    pub(crate) fn reset_temporary_index(&mut self, id: NodeId) {
        let n = &mut self.nodes[id];
        if let Some(t) = n.temporary.take() {
            n.row = t.row;
            n.column = t.column;
        }
        if n.kind == NodeKind::Transition {
            n.kind = NodeKind::Normal;
        }
    }

    pub(crate) fn temporary_index(&self, id: NodeId) -> Option<TemporaryIndex> {
        self.nodes.get(id)?.temporary
    }

    pub(crate) fn effective_row(&self, id: NodeId) -> usize {
        let n = &self.nodes[id];
        match (n.kind, n.temporary) {
            (NodeKind::Transition, Some(t)) => t.row,
            _ => n.row,
        }
    }

    pub(crate) fn effective_column(&self, id: NodeId) -> usize {
        let n = &self.nodes[id];
        match (n.kind, n.temporary) {
            (NodeKind::Transition, Some(t)) => t.column,
            _ => n.column,
        }
    }

    pub(crate) fn effective_parent(&self, id: NodeId) -> Option<NodeId> {
        let n = &self.nodes[id];
        match (n.kind, n.temporary) {
            (NodeKind::Transition, Some(t)) => Some(t.parent),
            _ => n.parent,
        }
    }

    /// Next node in depth-first order.
    pub(crate) fn down(&self, id: NodeId) -> Option<NodeId> {
        let n = self.nodes.get(id)?;
        if let Some(c) = n.first_child {
            return Some(c);
        }
        self.next_skipping_children(id)
    }

    /// Next node in depth-first order, ignoring the children of `id`.
    pub(crate) fn next_skipping_children(&self, id: NodeId) -> Option<NodeId> {
        let mut cur = id;
        loop {
            let n = self.nodes.get(cur)?;
            if let Some(nx) = n.next {
                return Some(nx);
            }
            match n.parent {
                Some(p) if p != self.root => cur = p,
                _ => return None,
            }
        }
    }

    /// Previous node in depth-first order.
    pub(crate) fn up(&self, id: NodeId) -> Option<NodeId> {
        let n = self.nodes.get(id)?;
        if let Some(p) = n.prev {
            return Some(self.deepest_last(p));
        }
        n.parent.filter(|&p| p != self.root)
    }

    pub(crate) fn left(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id)?.parent.filter(|&p| p != self.root)
    }

    pub(crate) fn right(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id)?.first_child
    }

    /// Follows the last-child chain down from `id`.
    pub(crate) fn deepest_last(&self, id: NodeId) -> NodeId {
        let mut cur = id;
        while let Some(l) = self.nodes[cur].last_child {
            cur = l;
        }
        cur
    }

    pub(crate) fn first(&self) -> Option<NodeId> {
        self.nodes[self.root].first_child
    }

    pub(crate) fn last(&self) -> Option<NodeId> {
        let l = self.nodes[self.root].last_child?;
        Some(self.deepest_last(l))
    }

    pub(crate) fn is_leaf(&self, id: NodeId) -> bool {
        self.nodes[id].first_child.is_none()
    }

    pub(crate) fn children(&self, parent: NodeId) -> Children<'_, K> {
        Children {
            tree: self,
            cur: self.nodes.get(parent).and_then(|n| n.first_child),
        }
    }

    /// Whether `a` is a strict ancestor of `b`.
    pub(crate) fn is_ancestor(&self, a: NodeId, b: NodeId) -> bool {
        let mut cur = self.nodes.get(b).and_then(|n| n.parent);
        while let Some(c) = cur {
            if c == a {
                return true;
            }
            cur = self.nodes[c].parent;
        }
        false
    }

    /// Depth-first order of two linked nodes, using effective rows.
    pub(crate) fn compare(&self, a: NodeId, b: NodeId) -> Ordering {
        if a == b {
            return Ordering::Equal;
        }
        let (mut x, mut y) = (a, b);
        let (mut dx, mut dy) = (self.nodes[x].depth, self.nodes[y].depth);
        while dx > dy {
            let px = self.nodes[x].parent.unwrap_or(self.root);
            if px == y {
                return Ordering::Greater;
            }
            x = px;
            dx -= 1;
        }
        while dy > dx {
            let py = self.nodes[y].parent.unwrap_or(self.root);
            if py == x {
                return Ordering::Less;
            }
            y = py;
            dy -= 1;
        }
        loop {
            let (px, py) = (self.nodes[x].parent, self.nodes[y].parent);
            if px == py || px.is_none() || py.is_none() {
                return self.effective_row(x).cmp(&self.effective_row(y));
            }
            x = px.unwrap_or(self.root);
            y = py.unwrap_or(self.root);
        }
    }

    /// Checks the link invariants of the whole arena.
    pub(crate) fn check_links(&self) -> Result<(), &'static str> {
        for (id, n) in self.nodes.iter() {
            match (n.first_child, n.last_child) {
                (None, None) => {
                    if !n.children.is_empty() {
                        return Err("child index is not empty for a childless node");
                    }
                }
                (Some(first), Some(last)) => {
                    if self.nodes[first].prev.is_some() || self.nodes[last].next.is_some() {
                        return Err("first/last child pointers disagree with the sibling chain");
                    }
                    let mut count = 0usize;
                    let mut cur = Some(first);
                    let mut prev = None;
                    while let Some(c) = cur {
                        let cn = &self.nodes[c];
                        if cn.parent != Some(id) {
                            return Err("child does not point back to its parent");
                        }
                        if cn.prev != prev {
                            return Err("asymmetric sibling links");
                        }
                        if let Some(p) = prev {
                            if self.nodes[p].row >= cn.row {
                                return Err("sibling rows are not increasing");
                            }
                        }
                        count += 1;
                        prev = cur;
                        cur = cn.next;
                    }
                    if prev != Some(last) {
                        return Err("sibling chain does not end at the last child");
                    }
                    if count != n.children.len() {
                        return Err("child index size differs from the sibling chain length");
                    }
                }
                _ => return Err("only one of first/last child is set"),
            }
            if n.kind == NodeKind::Transition {
                return Err("node left in transition");
            }
        }
        Ok(())
    }
}

pub(crate) struct Children<'a, K> {
    tree: &'a Tree<K>,
    cur: Option<NodeId>,
}

impl<K> Iterator for Children<'_, K> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let cur = self.cur?;
        self.cur = self.tree.nodes[cur].next;
        Some(cur)
    }
}
