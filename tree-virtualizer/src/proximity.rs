use alloc::vec;
use alloc::vec::Vec;

use crate::continuity;
use crate::key::TreeKey;
use crate::model_item::ItemAction;
use crate::node::NodeId;
use crate::view_item::ViewFactory;
use crate::{Edge, Reflector};

/// One key to instantiate, nested under the previous step (or under [`Proximity::parent`]).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProximityStep<K> {
    pub key: K,
    pub row: usize,
}

/// The keys needed to extend the window by one row in some direction.
///
/// The last step is the row that becomes adjacent; the steps before it are its ancestors that
/// must exist in the mirror for it to be linked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Proximity<K> {
    pub parent: NodeId,
    pub steps: Vec<ProximityStep<K>>,
}

impl<K> Proximity<K> {
    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.steps.iter().map(|s| &s.key)
    }

    /// The row that ends up adjacent to the starting node.
    pub fn target(&self) -> Option<&K> {
        self.steps.last().map(|s| &s.key)
    }
}

impl<K: TreeKey, F: ViewFactory<K>> Reflector<K, F> {
    /// Source keys needed to extend the window from `id` one step toward `edge`.
    ///
    /// `None` means the top or bottom of the whole tree was reached.
    pub fn proximity(&self, id: NodeId, edge: Edge) -> Option<Proximity<K>> {
        let source = self.source.as_deref()?;
        if !self.tree.contains(id) {
            return None;
        }
        let tree = &self.tree;
        match edge {
            Edge::Top => {
                let parent = tree.effective_parent(id)?;
                let row = tree.effective_row(id);
                if row > 0 {
                    let key = source.key(tree.key(parent), row - 1)?;
                    let mut steps = vec![ProximityStep { key, row: row - 1 }];
                    let mut depth = tree.node(parent).depth + 1;
                    while self.options.loads_depth(depth + 1) {
                        let Some(cur) = steps.last().map(|s| s.key.clone()) else {
                            break;
                        };
                        let count = source.row_count(Some(&cur));
                        if count == 0 {
                            break;
                        }
                        let Some(key) = source.key(Some(&cur), count - 1) else {
                            break;
                        };
                        steps.push(ProximityStep {
                            key,
                            row: count - 1,
                        });
                        depth += 1;
                    }
                    Some(Proximity { parent, steps })
                } else {
                    self.parent_step(parent)
                }
            }
            Edge::Left => self.parent_step(tree.effective_parent(id)?),
            Edge::Right => self.first_child_step(id),
            Edge::Bottom => {
                if tree.right(id).is_none() {
                    if let Some(p) = self.first_child_step(id) {
                        return Some(p);
                    }
                }
                let mut cur = id;
                loop {
                    if cur == tree.root() {
                        return None;
                    }
                    let parent = tree.effective_parent(cur)?;
                    let next = tree.effective_row(cur) + 1;
                    if next < source.row_count(tree.key(parent)) {
                        let key = source.key(tree.key(parent), next)?;
                        return Some(Proximity {
                            parent,
                            steps: vec![ProximityStep { key, row: next }],
                        });
                    }
                    cur = parent;
                }
            }
        }
    }

    /// Proximity of the very first row, used when the window is empty.
    pub(crate) fn first_proximity(&self) -> Option<Proximity<K>> {
        let source = self.source.as_deref()?;
        if !self.options.loads_depth(1) || source.row_count(None) == 0 {
            return None;
        }
        let key = source.key(None, 0)?;
        Some(Proximity {
            parent: self.tree.root(),
            steps: vec![ProximityStep { key, row: 0 }],
        })
    }

    fn parent_step(&self, parent: NodeId) -> Option<Proximity<K>> {
        if parent == self.tree.root() {
            return None;
        }
        let grandparent = self.tree.effective_parent(parent)?;
        let key = self.tree.key(parent)?.clone();
        Some(Proximity {
            parent: grandparent,
            steps: vec![ProximityStep {
                key,
                row: self.tree.effective_row(parent),
            }],
        })
    }

    fn first_child_step(&self, id: NodeId) -> Option<Proximity<K>> {
        let source = self.source.as_deref()?;
        if !self.options.loads_depth(self.tree.node(id).depth + 1) {
            return None;
        }
        let parent_key = self.tree.key(id);
        if source.row_count(parent_key) == 0 {
            return None;
        }
        let key = source.key(parent_key, 0)?;
        Some(Proximity {
            parent: id,
            steps: vec![ProximityStep { key, row: 0 }],
        })
    }

    /// Instantiates the missing steps of `proximity` and returns the target node.
    ///
    /// Steps already mirrored are reused as they are.
    pub(crate) fn insert_proximity(&mut self, proximity: Proximity<K>) -> Option<NodeId> {
        let mut parent = proximity.parent;
        let mut last = None;
        for step in proximity.steps {
            let id = match self.tree.child_by_key(parent, &step.key) {
                Some(id) => id,
                None => self.insert_row(parent, step.key, step.row, None),
            };
            parent = id;
            last = Some(id);
        }
        last
    }

    /// Allocates, links and attaches one row under `parent`.
    ///
    /// Without an explicit `before` sibling the row is placed by its effective row.
    pub(crate) fn insert_row(
        &mut self,
        parent: NodeId,
        key: K,
        row: usize,
        before: Option<Option<NodeId>>,
    ) -> NodeId {
        let depth = self.tree.node(parent).depth + 1;
        let id = self.tree.alloc(key, row, depth);
        match before {
            Some(before) => self.tree.insert_child_before(id, before, parent),
            None => {
                let after = continuity::preceding(&self.tree, parent, row);
                self.tree.insert_child_after(id, after, parent);
            }
        }
        self.perform_item(id, ItemAction::Attach);
        vtrace!(?id, ?parent, row, "row attached");
        id
    }

    /// The windowing primitive: returns the neighbor of `id` toward `edge`, loading it from the
    /// source first when `id` sits on the window boundary.
    pub(crate) fn load_edge(&mut self, id: NodeId, edge: Edge) -> Option<NodeId> {
        match edge {
            Edge::Top => {
                if self.window_top != Some(id) {
                    return self.tree.up(id);
                }
                let proximity = self.proximity(id, Edge::Top)?;
                let n = self.insert_proximity(proximity)?;
                self.set_window_top(Some(n));
                let h = self.ensure_size(n);
                self.origin -= i64::from(h);
                self.place(n, self.origin);
                Some(n)
            }
            Edge::Bottom => {
                if self.tree.last() != Some(id) {
                    return self.tree.down(id);
                }
                let y = self.node_bottom(id);
                let proximity = self.proximity(id, Edge::Bottom)?;
                let n = self.insert_proximity(proximity)?;
                self.ensure_size(n);
                self.place(n, y);
                Some(n)
            }
            Edge::Left => self.tree.left(id),
            Edge::Right => {
                if let Some(child) = self.tree.right(id) {
                    return Some(child);
                }
                if self.tree.last() != Some(id) {
                    return None;
                }
                self.first_child_step(id)?;
                self.load_edge(id, Edge::Bottom)
            }
        }
    }
}
