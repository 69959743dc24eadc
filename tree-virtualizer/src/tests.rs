use crate::*;

use alloc::collections::BTreeMap;
use alloc::rc::Rc;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};

use crate::node::Tree;

#[derive(Clone, Copy, Debug)]
struct Lcg(u64);

impl Lcg {
    fn new(seed: u64) -> Self {
        Self(seed)
    }

    fn next_u64(&mut self) -> u64 {
        // Deterministic, dependency-free PRNG for tests.
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 11
    }

    fn gen_range_usize(&mut self, start: usize, end_exclusive: usize) -> usize {
        debug_assert!(start < end_exclusive);
        start + (self.next_u64() % (end_exclusive - start) as u64) as usize
    }

    fn gen_range_i64(&mut self, start: i64, end_exclusive: i64) -> i64 {
        debug_assert!(start < end_exclusive);
        start + (self.next_u64() % (end_exclusive - start) as u64) as i64
    }

    fn gen_bool(&mut self) -> bool {
        (self.next_u64() & 1) == 1
    }
}

/// Keyed in-memory tree. The test mutates it, then forwards the matching notification.
#[derive(Default)]
struct Store {
    children: RefCell<BTreeMap<Option<u32>, Vec<u32>>>,
    heights: RefCell<BTreeMap<u32, u32>>,
}

impl Store {
    fn flat(n: u32) -> Rc<Self> {
        let store = Self::default();
        store
            .children
            .borrow_mut()
            .insert(None, (1..=n).collect());
        Rc::new(store)
    }

    fn with(entries: &[(Option<u32>, &[u32])]) -> Rc<Self> {
        let store = Self::default();
        for (parent, keys) in entries {
            store.children.borrow_mut().insert(*parent, keys.to_vec());
        }
        Rc::new(store)
    }

    fn count(&self, parent: Option<u32>) -> usize {
        self.children.borrow().get(&parent).map_or(0, Vec::len)
    }

    fn insert(&self, parent: Option<u32>, row: usize, keys: &[u32]) {
        let mut children = self.children.borrow_mut();
        let list = children.entry(parent).or_default();
        for (i, &k) in keys.iter().enumerate() {
            list.insert(row + i, k);
        }
    }

    fn remove(&self, parent: Option<u32>, first: usize, last: usize) {
        let removed: Vec<u32> = {
            let mut children = self.children.borrow_mut();
            let list = children.entry(parent).or_default();
            list.drain(first..=last).collect()
        };
        let mut stack = removed;
        while let Some(k) = stack.pop() {
            if let Some(sub) = self.children.borrow_mut().remove(&Some(k)) {
                stack.extend(sub);
            }
        }
    }

    /// Moves `start..=end` under `src` in front of the row currently at `row` under `dst`.
    fn move_rows(&self, src: Option<u32>, start: usize, end: usize, dst: Option<u32>, row: usize) {
        let mut children = self.children.borrow_mut();
        let moved: Vec<u32> = children
            .entry(src)
            .or_default()
            .drain(start..=end)
            .collect();
        let at = if src == dst && row > end {
            row - moved.len()
        } else {
            row
        };
        let list = children.entry(dst).or_default();
        for (i, k) in moved.into_iter().enumerate() {
            list.insert(at + i, k);
        }
    }

    fn parent_of(&self, key: u32) -> Option<Option<u32>> {
        self.children
            .borrow()
            .iter()
            .find(|(_, v)| v.contains(&key))
            .map(|(p, _)| *p)
    }

    fn is_ancestor_or_self(&self, ancestor: u32, key: u32) -> bool {
        let mut cur = Some(key);
        while let Some(k) = cur {
            if k == ancestor {
                return true;
            }
            cur = self.parent_of(k).flatten();
        }
        false
    }

    /// Depth-first order of the rows the window may load.
    fn flatten(&self, max_depth: Option<usize>) -> Vec<u32> {
        fn walk(store: &Store, parent: Option<u32>, depth: usize, max: Option<usize>, out: &mut Vec<u32>) {
            if max.is_some_and(|m| depth > m) {
                return;
            }
            let keys = store.children.borrow().get(&parent).cloned().unwrap_or_default();
            for k in keys {
                out.push(k);
                walk(store, Some(k), depth + 1, max, out);
            }
        }
        let mut out = Vec::new();
        walk(self, None, 1, max_depth, &mut out);
        out
    }
}

impl TreeSource<u32> for Store {
    fn row_count(&self, parent: Option<&u32>) -> usize {
        self.count(parent.copied())
    }

    fn key(&self, parent: Option<&u32>, row: usize) -> Option<u32> {
        self.children.borrow().get(&parent.copied())?.get(row).copied()
    }

    fn size_hint(&self, key: &u32, _role: Role) -> Option<Size> {
        self.heights.borrow().get(key).map(|&h| Size::new(0, h))
    }
}

#[derive(Debug)]
struct Handle {
    id: usize,
    key: u32,
    visible: bool,
    rect: Option<Rect>,
}

#[derive(Default)]
struct Factory {
    attempts: usize,
    created: usize,
    bound: usize,
    fail: usize,
    measure: Option<Size>,
    updates: Vec<(u32, Vec<Role>)>,
    destroyed: Rc<Cell<usize>>,
}

impl ViewFactory<u32> for Factory {
    type Handle = Handle;

    fn create(&mut self, key: &u32, _depth: usize) -> Option<Handle> {
        self.attempts += 1;
        if self.fail > 0 {
            self.fail -= 1;
            return None;
        }
        self.created += 1;
        Some(Handle {
            id: self.created,
            key: *key,
            visible: false,
            rect: None,
        })
    }

    fn bind(&mut self, handle: &mut Handle, key: &u32, _depth: usize) {
        self.bound += 1;
        handle.key = *key;
    }

    fn update(&mut self, _handle: &mut Handle, key: &u32, roles: &[Role]) {
        self.updates.push((*key, roles.to_vec()));
    }

    fn set_visible(&mut self, handle: &mut Handle, visible: bool) {
        handle.visible = visible;
    }

    fn set_geometry(&mut self, handle: &mut Handle, rect: Rect) {
        handle.rect = Some(rect);
    }

    fn measure(&mut self, _handle: &Handle, _key: &u32) -> Option<Size> {
        self.measure
    }

    fn destroy(&mut self, _handle: Handle) {
        self.destroyed.set(self.destroyed.get() + 1);
    }
}

type TestReflector = Reflector<u32, Factory>;

fn options(viewport_rows: u32, buffer_size: usize) -> ReflectorOptions<u32> {
    ReflectorOptions::uniform(1)
        .with_initial_viewport(Some(Size::new(10, viewport_rows)))
        .with_buffer_size(buffer_size)
}

fn attach(store: &Rc<Store>, options: ReflectorOptions<u32>, factory: Factory) -> TestReflector {
    let mut r = Reflector::new(options, factory);
    r.set_source(Some(store.clone() as Rc<dyn TreeSource<u32>>));
    r
}

fn visible_keys(r: &TestReflector) -> Vec<u32> {
    r.collect_visible().into_iter().map(|v| v.key).collect()
}

fn node(r: &TestReflector, key: u32) -> NodeId {
    r.node_for_key(&key).expect("row is mirrored")
}

fn insert_rows(r: &mut TestReflector, store: &Store, parent: Option<u32>, row: usize, keys: &[u32]) {
    store.insert(parent, row, keys);
    r.rows_inserted(parent.as_ref(), row, row + keys.len() - 1)
        .unwrap();
}

fn remove_rows(r: &mut TestReflector, store: &Store, parent: Option<u32>, first: usize, last: usize) {
    r.rows_about_to_be_removed(parent.as_ref(), first, last)
        .unwrap();
    store.remove(parent, first, last);
    r.rows_removed(parent.as_ref(), first, last).unwrap();
}

fn move_rows(
    r: &mut TestReflector,
    store: &Store,
    src: Option<u32>,
    start: usize,
    end: usize,
    dst: Option<u32>,
    row: usize,
) {
    r.rows_about_to_be_moved(src.as_ref(), start, end, dst.as_ref(), row)
        .unwrap();
    store.move_rows(src, start, end, dst, row);
    r.rows_moved(src.as_ref(), start, end, dst.as_ref(), row)
        .unwrap();
}

#[test]
fn geometry_composes_once_and_caches() {
    let mut g = GeometryTracker::new();
    assert_eq!(g.perform(GeometryAction::Resize(Size::new(4, 2))), GeometryState::Size);
    assert_eq!(g.perform(GeometryAction::Place(Point::new(1, 5))), GeometryState::Pending);
    assert_eq!(g.cached(), None);
    assert_eq!(g.peek(), Some(Rect::new(1, 5, 4, 2)));

    let first = g.decorated_geometry();
    assert_eq!(first, Some(Rect::new(1, 5, 4, 2)));
    assert_eq!(g.state(), GeometryState::Valid);
    assert_eq!(g.decorated_geometry(), first);

    // Same inputs keep the cache.
    assert_eq!(g.perform(GeometryAction::Resize(Size::new(4, 2))), GeometryState::Valid);
    assert_eq!(g.perform(GeometryAction::Place(Point::new(1, 5))), GeometryState::Valid);
    assert_eq!(g.perform(GeometryAction::Move), GeometryState::Valid);

    assert_eq!(g.perform(GeometryAction::Modify), GeometryState::Pending);
    assert_eq!(g.decorated_geometry(), first);

    assert_eq!(g.perform(GeometryAction::Reset), GeometryState::Init);
    assert_eq!(g.size(), None);
    assert_eq!(g.position(), None);
    assert_eq!(g.decorated_geometry(), None);
}

#[test]
fn geometry_decoration_wraps_content() {
    let mut g = GeometryTracker::new();
    g.perform(GeometryAction::Decorate(Decoration::uniform(1)));
    g.perform(GeometryAction::Resize(Size::new(10, 3)));
    assert_eq!(g.decorated_height(), Some(5));
    g.perform(GeometryAction::Place(Point::new(0, 0)));

    assert_eq!(g.decorated_geometry(), Some(Rect::new(0, 0, 12, 5)));
    assert_eq!(g.content_geometry(), Some(Rect::new(1, 1, 10, 3)));

    assert_eq!(
        g.perform(GeometryAction::Decorate(Decoration::vertical(2, 0))),
        GeometryState::Pending
    );
    assert_eq!(g.decorated_geometry(), Some(Rect::new(0, 0, 10, 5)));
}

#[test]
fn geometry_move_forgets_position_only_position() {
    let mut g = GeometryTracker::new();
    g.perform(GeometryAction::Place(Point::new(0, 3)));
    assert_eq!(g.perform(GeometryAction::Move), GeometryState::Init);
    assert_eq!(g.position(), None);

    g.perform(GeometryAction::Resize(Size::new(1, 1)));
    assert_eq!(g.perform(GeometryAction::Move), GeometryState::Size);
    assert_eq!(g.size(), Some(Size::new(1, 1)));
}

#[test]
fn item_transitions_follow_the_table() {
    use crate::model_item::{transition, ItemHandler};

    assert_eq!(
        transition(ItemState::New, ItemAction::Attach),
        (ItemState::Reachable, ItemHandler::Attach)
    );
    assert_eq!(
        transition(ItemState::Visible, ItemAction::Reparent),
        (ItemState::Moving, ItemHandler::Nothing)
    );
    assert_eq!(
        transition(ItemState::Buffer, ItemAction::Reparent),
        (ItemState::Removed, ItemHandler::Reparent)
    );
    assert_eq!(
        transition(ItemState::Removed, ItemAction::Show),
        (ItemState::Error, ItemHandler::Error)
    );
    assert_eq!(
        transition(ItemState::Error, ItemAction::Show),
        (ItemState::Error, ItemHandler::Nothing)
    );
    assert_eq!(
        transition(ItemState::Error, ItemAction::Detach),
        (ItemState::Dangling, ItemHandler::Detach)
    );
    assert_eq!(
        transition(ItemState::New, ItemAction::Show),
        (ItemState::Error, ItemHandler::Error)
    );
}

#[test]
fn view_transitions_follow_the_table() {
    use crate::view_item::{transition, ViewHandler};

    assert_eq!(
        transition(ViewState::Pooled, ViewAction::Attach),
        (ViewState::Buffer, ViewHandler::Attach)
    );
    assert_eq!(
        transition(ViewState::Buffer, ViewAction::EnterView),
        (ViewState::Active, ViewHandler::Activate)
    );
    assert_eq!(
        transition(ViewState::Active, ViewAction::LeaveBuffer),
        (ViewState::Buffer, ViewHandler::Deactivate)
    );
    assert_eq!(
        transition(ViewState::Failed, ViewAction::Update),
        (ViewState::Buffer, ViewHandler::Attach)
    );
    assert_eq!(
        transition(ViewState::Pooling, ViewAction::Attach),
        (ViewState::Error, ViewHandler::Nothing)
    );
    assert_eq!(
        transition(ViewState::Error, ViewAction::Detach),
        (ViewState::Dangling, ViewHandler::Release)
    );
}

#[test]
fn tracker_transitions_follow_the_table() {
    use crate::tracker::{transition, TrackerHandler};

    assert_eq!(
        transition(TrackerState::NoModel, TrackerAction::Populate),
        (TrackerState::NoModel, TrackerHandler::Nothing)
    );
    assert_eq!(
        transition(TrackerState::Paused, TrackerAction::Populate),
        (TrackerState::Populated, TrackerHandler::Populate)
    );
    assert_eq!(
        transition(TrackerState::Populated, TrackerAction::Enable),
        (TrackerState::Tracking, TrackerHandler::Track)
    );
    assert_eq!(
        transition(TrackerState::Tracking, TrackerAction::Free),
        (TrackerState::Tracking, TrackerHandler::Error)
    );
    assert_eq!(
        transition(TrackerState::Resetting, TrackerAction::Reset),
        (TrackerState::Resetting, TrackerHandler::Error)
    );
    assert_eq!(
        transition(TrackerState::Resetting, TrackerAction::Populate),
        (TrackerState::Populated, TrackerHandler::Populate)
    );
    assert_eq!(
        transition(TrackerState::Tracking, TrackerAction::Trim),
        (TrackerState::Tracking, TrackerHandler::Trim)
    );
    assert_eq!(
        transition(TrackerState::Paused, TrackerAction::Trim),
        (TrackerState::Paused, TrackerHandler::Nothing)
    );
}

#[test]
fn temporary_index_reports_then_commits() {
    let mut tree: Tree<u32> = Tree::new();
    let root = tree.root();
    let a = tree.alloc(1, 0, 1);
    tree.insert_child_before(a, None, root);
    let b = tree.alloc(2, 1, 1);
    tree.insert_child_before(b, None, root);

    tree.set_temporary_index(b, root, 7, 0);
    assert_eq!(tree.effective_row(b), 7);
    assert_eq!(tree.node(b).row, 1);
    assert_eq!(tree.node(b).kind, NodeKind::Transition);
    assert!(tree.check_links().is_err());

    tree.reset_temporary_index(b);
    assert_eq!(tree.node(b).row, 7);
    assert_eq!(tree.temporary_index(b), None);
    assert_eq!(tree.node(b).kind, NodeKind::Normal);
    assert_eq!(tree.effective_row(a), 0);
    assert!(tree.check_links().is_ok());
}

#[test]
fn tree_navigation_is_depth_first() {
    let mut tree: Tree<u32> = Tree::new();
    let root = tree.root();
    let a = tree.alloc(1, 0, 1);
    tree.insert_child_before(a, None, root);
    let a0 = tree.alloc(10, 0, 2);
    tree.insert_child_before(a0, None, a);
    let a1 = tree.alloc(11, 1, 2);
    tree.insert_child_after(a1, Some(a0), a);
    let b = tree.alloc(2, 1, 1);
    tree.insert_child_before(b, None, root);

    assert_eq!(tree.first(), Some(a));
    assert_eq!(tree.last(), Some(b));
    assert_eq!(tree.down(a), Some(a0));
    assert_eq!(tree.down(a1), Some(b));
    assert_eq!(tree.up(b), Some(a1));
    assert_eq!(tree.up(a0), Some(a));
    assert_eq!(tree.up(a), None);
    assert_eq!(tree.left(a0), Some(a));
    assert_eq!(tree.right(a), Some(a0));
    assert_eq!(tree.node(a1).depth, 2);
    assert!(tree.is_ancestor(a, a1));
    assert!(!tree.is_ancestor(a1, a));
    assert!(tree.compare(a1, b).is_lt());
    assert!(tree.compare(a, a0).is_lt());
    assert_eq!(tree.children(a).collect::<Vec<_>>(), vec![a0, a1]);
    assert_eq!(tree.child_by_key(a, &11), Some(a1));

    tree.remove(a0, false);
    tree.free(a0);
    assert_eq!(tree.down(a), Some(a1));
    assert_eq!(tree.node_for_key(&10), None);
    assert!(tree.check_links().is_ok());
}

#[test]
fn sibling_lookups_walk_partial_chains() {
    use crate::continuity;

    let mut tree: Tree<u32> = Tree::new();
    let root = tree.root();
    for (key, row) in [(1, 0), (2, 1), (3, 2), (6, 5), (7, 6)] {
        let id = tree.alloc(key, row, 1);
        tree.insert_child_before(id, None, root);
    }
    let k = |key: u32| tree.node_for_key(&key);

    assert_eq!(continuity::covering(&tree, root, 1, 2), k(2).zip(k(3)));
    assert_eq!(continuity::covering(&tree, root, 2, 5), None);
    assert_eq!(continuity::covering(&tree, root, 5, 6), k(6).zip(k(7)));

    assert_eq!(continuity::child_at(&tree, root, 6), k(7));
    assert_eq!(continuity::child_at(&tree, root, 0), k(1));
    assert_eq!(continuity::child_at(&tree, root, 3), None);
    assert_eq!(continuity::child_at(&tree, root, 9), None);

    assert_eq!(continuity::preceding(&tree, root, 4), k(3));
    assert_eq!(continuity::preceding(&tree, root, 5), k(6));
    assert_eq!(continuity::preceding(&tree, root, 9), k(7));
    let leaf = k(1).unwrap();
    assert_eq!(continuity::preceding(&tree, leaf, 0), None);

    let (one, three) = (leaf, k(3));

    let late = tree.alloc(4, 3, 1);
    tree.insert_child_after(late, continuity::preceding(&tree, root, 3), root);
    assert_eq!(tree.node(late).prev, three);
    assert_eq!(continuity::covering(&tree, root, 0, 3), Some((one, late)));
    assert!(tree.check_links().is_ok());
}

#[test]
fn first_rows_fill_the_viewport_and_buffer() {
    let store = Store::flat(3);
    let r = attach(&store, options(2, 2), Factory::default());

    assert_eq!(r.tracker_state(), TrackerState::Tracking);
    assert_eq!(visible_keys(&r), vec![1, 2]);
    assert_eq!(r.state(node(&r, 3)), Some(ItemState::Buffer));
    assert_eq!(r.view_state(node(&r, 3)), Some(ViewState::Buffer));
    assert_eq!(r.view_state(node(&r, 1)), Some(ViewState::Active));
    assert_eq!(r.factory().created, 3);
    assert_eq!(r.visible_count(), 2);
    assert_eq!(r.loaded_extent(), 0..3);
    assert_eq!(r.free_edges(), FreeEdges::default());

    let rects: Vec<Rect> = r.collect_visible().into_iter().map(|v| v.rect).collect();
    assert_eq!(rects, vec![Rect::new(0, 0, 0, 1), Rect::new(0, 1, 0, 1)]);
    assert_eq!(r.handle(node(&r, 2)).and_then(|h| h.rect), Some(Rect::new(0, 1, 0, 1)));
    assert!(r.handle(node(&r, 1)).is_some_and(|h| h.visible));
    assert!(r.handle(node(&r, 3)).is_some_and(|h| !h.visible));

    assert_eq!(r.edge(EdgeRegion::Visible, Edge::Top), Some(node(&r, 1)));
    assert_eq!(r.edge(EdgeRegion::Visible, Edge::Bottom), Some(node(&r, 2)));
    assert_eq!(r.edge(EdgeRegion::Buffered, Edge::Bottom), Some(node(&r, 3)));
    assert_eq!(r.validate(), Ok(()));
}

#[test]
fn scrolling_moves_the_visible_edges() {
    let store = Store::flat(3);
    let mut r = attach(&store, options(2, 2), Factory::default());

    r.set_scroll_offset(1);
    assert_eq!(visible_keys(&r), vec![2, 3]);
    assert_eq!(r.state(node(&r, 1)), Some(ItemState::Buffer));
    assert!(r.handle(node(&r, 1)).is_some_and(|h| !h.visible));
    assert_eq!(r.edge(EdgeRegion::Visible, Edge::Left), Some(node(&r, 2)));
    assert_eq!(r.edge(EdgeRegion::Visible, Edge::Right), Some(node(&r, 3)));
    assert_eq!(r.factory().created, 3);
    assert_eq!(r.validate(), Ok(()));
}

#[test]
fn removing_the_visible_top_row_pulls_the_next_one_up() {
    let store = Store::flat(3);
    let mut r = attach(&store, options(2, 2), Factory::default());
    let first = node(&r, 1);

    remove_rows(&mut r, &store, None, 0, 0);

    assert!(!r.contains(first));
    assert_eq!(r.node_for_key(&1), None);
    assert_eq!(visible_keys(&r), vec![2, 3]);
    assert_eq!(r.effective_row(node(&r, 2)), Some(0));
    assert_eq!(r.geometry(node(&r, 2)), Some(Rect::new(0, 0, 0, 1)));
    assert_eq!(r.first(), Some(node(&r, 2)));
    assert_eq!(r.pooled_count(), 1);
    assert_eq!(r.factory().created, 3);
    assert_eq!(r.validate(), Ok(()));
}

#[test]
fn moving_a_visible_row_keeps_its_view() {
    let store = Store::flat(6);
    let mut r = attach(&store, options(100, 2), Factory::default());
    let moved = node(&r, 1);
    let handle_id = r.handle(moved).map(|h| h.id);
    assert_eq!(r.factory().created, 6);

    move_rows(&mut r, &store, None, 0, 0, None, 6);

    assert_eq!(r.node_for_key(&1), Some(moved));
    assert_eq!(r.effective_row(moved), Some(5));
    assert_eq!(r.handle(moved).map(|h| h.id), handle_id);
    assert_eq!(r.factory().created, 6);
    assert_eq!(r.state(moved), Some(ItemState::Visible));
    assert_eq!(r.geometry(moved), Some(Rect::new(0, 5, 0, 1)));
    assert_eq!(r.handle(moved).and_then(|h| h.rect), Some(Rect::new(0, 5, 0, 1)));
    assert_eq!(visible_keys(&r), vec![2, 3, 4, 5, 6, 1]);
    assert_eq!(r.temporary_index(moved), None);
    assert_eq!(r.validate(), Ok(()));
}

#[test]
fn moving_a_row_under_another_parent_keeps_its_view() {
    let store = Store::with(&[(None, &[1, 2]), (Some(1), &[10, 11]), (Some(2), &[20])]);
    let mut r = attach(&store, options(100, 2), Factory::default());
    let moved = node(&r, 11);
    let handle_id = r.handle(moved).map(|h| h.id);

    move_rows(&mut r, &store, Some(1), 1, 1, Some(2), 0);

    assert_eq!(r.node_for_key(&11), Some(moved));
    assert_eq!(r.effective_parent(moved), Some(node(&r, 2)));
    assert_eq!(r.effective_row(moved), Some(0));
    assert_eq!(r.effective_row(node(&r, 20)), Some(1));
    assert_eq!(r.handle(moved).map(|h| h.id), handle_id);
    assert_eq!(r.factory().created, 5);
    assert_eq!(visible_keys(&r), vec![1, 10, 2, 11, 20]);
    assert_eq!(r.validate(), Ok(()));
}

#[test]
fn moving_rows_out_of_the_window_degrades_to_remove_and_insert() {
    let store = Store::flat(50);
    let mut r = attach(&store, options(5, 1), Factory::default());
    let moved = node(&r, 1);

    move_rows(&mut r, &store, None, 0, 0, None, 40);

    assert!(!r.contains(moved));
    assert_eq!(r.node_for_key(&1), None);
    assert_eq!(visible_keys(&r), vec![2, 3, 4, 5, 6]);
    assert_eq!(r.validate(), Ok(()));
}

#[test]
fn moving_rows_into_their_own_subtree_is_rejected() {
    let store = Store::with(&[(None, &[1, 2]), (Some(1), &[10])]);
    let mut r = attach(&store, options(100, 2), Factory::default());

    assert_eq!(
        r.rows_about_to_be_moved(None, 0, 0, Some(&10), 0),
        Err(TreeError::MoveIntoSelf)
    );
    assert_eq!(
        r.rows_about_to_be_moved(None, 1, 0, None, 0),
        Err(TreeError::InvalidRange { first: 1, last: 0 })
    );
    assert_eq!(r.validate(), Ok(()));
}

#[test]
fn proximity_climbs_to_the_parent_and_loads_it_back() {
    let store = Store::with(&[(None, &[1]), (Some(1), &[10, 11, 12, 13, 14])]);
    let opts = options(2, 0).with_initial_offset_value(1);
    let mut r = attach(&store, opts, Factory::default());

    let parent = node(&r, 1);
    let first_child = node(&r, 10);
    assert_eq!(visible_keys(&r), vec![10, 11]);
    assert_eq!(r.loaded_count(), 3);
    assert_eq!(r.left(first_child), Some(parent));
    assert_eq!(r.right(parent), Some(first_child));
    assert_eq!(r.state(parent), Some(ItemState::Reachable));
    assert_eq!(r.view_state(parent), None);
    assert_eq!(r.geometry(parent), None);
    assert!(r.free_edges().top);
    assert!(r.free_edges().bottom);

    let proximity = r.proximity(first_child, Edge::Top).expect("parent is above");
    assert_eq!(proximity.target(), Some(&1));
    assert_eq!(proximity.keys().count(), 1);
    let below = r.proximity(node(&r, 11), Edge::Bottom).expect("more children below");
    assert_eq!(below.target(), Some(&12));
    assert_eq!(r.proximity(first_child, Edge::Right), None);
    assert_eq!(r.validate(), Ok(()));

    assert_eq!(r.load(first_child, Edge::Top), Ok(Some(parent)));
    assert_eq!(r.state(parent), Some(ItemState::Buffer));
    assert_eq!(r.geometry(parent), Some(Rect::new(0, 0, 0, 1)));
    assert_eq!(r.loaded_count(), 3);
    assert!(!r.free_edges().top);
    assert_eq!(r.validate(), Ok(()));
}

#[test]
fn load_walks_the_mirror_inside_the_window() {
    let store = Store::flat(10);
    let mut r = attach(&store, options(3, 0), Factory::default());
    let one = node(&r, 1);
    let three = node(&r, 3);

    assert_eq!(r.load(one, Edge::Bottom), Ok(r.down(one)));
    assert_eq!(r.load(one, Edge::Top), Ok(None));
    assert_eq!(r.load(one, Edge::Left), Ok(None));

    let four = r.load(three, Edge::Bottom).unwrap().expect("row 4 exists");
    assert_eq!(r.key(four), Some(&4));
    assert_eq!(r.last(), Some(four));
    assert_eq!(r.geometry(four), Some(Rect::new(0, 3, 0, 1)));
    assert_eq!(r.state(four), Some(ItemState::Buffer));

    let mut detached = Reflector::new(options(3, 0), Factory::default());
    assert_eq!(detached.load(four, Edge::Top), Err(TreeError::NoSource));
    assert_eq!(r.perform(NodeId::default(), ItemAction::Show), Err(TreeError::StaleNode(NodeId::default())));
}

#[test]
fn failed_views_are_retried() {
    let store = Store::flat(1);
    let factory = Factory {
        fail: 2,
        ..Factory::default()
    };
    let mut r = attach(&store, options(2, 0), factory);
    let row = node(&r, 1);

    assert_eq!(r.factory().attempts, 1);
    assert_eq!(r.state(row), Some(ItemState::Reachable));
    assert_eq!(r.view_state(row), Some(ViewState::Failed));
    assert!(visible_keys(&r).is_empty());
    assert_eq!(r.validate(), Ok(()));

    assert_eq!(r.perform(row, ItemAction::Show), Ok(ItemState::Reachable));
    assert_eq!(r.factory().attempts, 2);

    assert_eq!(r.perform(row, ItemAction::Show), Ok(ItemState::Visible));
    assert_eq!(r.factory().attempts, 3);
    assert_eq!(r.factory().created, 1);
    assert_eq!(r.view_state(row), Some(ViewState::Active));
    assert_eq!(visible_keys(&r), vec![1]);
    assert_eq!(r.validate(), Ok(()));
}

#[test]
fn perform_rejects_structural_actions() {
    let store = Store::flat(5);
    let mut r = attach(&store, options(2, 2), Factory::default());
    let two = node(&r, 2);

    for action in [ItemAction::Detach, ItemAction::Reparent, ItemAction::Attach, ItemAction::Reset] {
        assert_eq!(
            r.perform(two, action),
            Err(TreeError::RejectedAction { node: two, action })
        );
    }
    assert_eq!(r.state(two), Some(ItemState::Visible));
    assert_eq!(visible_keys(&r), vec![1, 2]);
    assert_eq!(r.validate(), Ok(()));

    assert_eq!(r.perform(node(&r, 4), ItemAction::Show), Ok(ItemState::Buffer));
    assert_eq!(visible_keys(&r), vec![1, 2]);
    assert_eq!(r.perform(two, ItemAction::Update), Ok(ItemState::Visible));
    assert_eq!(r.validate(), Ok(()));

    r.set_scroll_offset(1);
    assert_eq!(visible_keys(&r), vec![2, 3]);
    assert_eq!(r.validate(), Ok(()));

    let store = Store::with(&[(None, &[1, 2]), (Some(1), &[10, 11, 12, 13, 14, 15])]);
    let mut r = attach(&store, options(2, 0), Factory::default());
    r.set_scroll_offset(4);
    let parent = node(&r, 1);
    assert_eq!(
        r.perform(parent, ItemAction::Show),
        Err(TreeError::RejectedAction { node: parent, action: ItemAction::Show })
    );
    assert_eq!(r.view_state(parent), None);
    assert_eq!(r.validate(), Ok(()));
}

#[test]
fn deep_scroll_round_trip_keeps_anchors_view_free() {
    let store = Store::with(&[
        (None, &[1, 2, 3]),
        (Some(1), &[11, 12]),
        (Some(2), &[21]),
    ]);
    let mut r = attach(&store, options(2, 0), Factory::default());
    assert_eq!(visible_keys(&r), vec![1, 11]);

    r.set_scroll_offset(3);
    assert_eq!(visible_keys(&r), vec![2, 21]);
    assert_eq!(r.node_for_key(&1), None);
    assert_eq!(r.loaded_extent(), 3..5);
    assert_eq!(r.validate(), Ok(()));

    r.set_scroll_offset(0);
    assert_eq!(visible_keys(&r), vec![1, 11]);
    assert_eq!(r.node_for_key(&2), None);
    assert_eq!(r.loaded_extent(), 0..2);
    assert_eq!(r.validate(), Ok(()));
}

#[test]
fn trimming_the_top_keeps_parents_as_anchors() {
    let store = Store::with(&[(None, &[1, 2]), (Some(1), &[10, 11, 12, 13, 14, 15])]);
    let mut r = attach(&store, options(2, 0), Factory::default());

    r.set_scroll_offset(4);
    assert_eq!(visible_keys(&r), vec![13, 14]);
    let parent = node(&r, 1);
    assert_eq!(r.state(parent), Some(ItemState::Reachable));
    assert_eq!(r.view_state(parent), None);
    assert_eq!(r.geometry(parent), None);
    assert_eq!(r.edge(EdgeRegion::Buffered, Edge::Top), Some(node(&r, 13)));
    assert_eq!(r.first(), Some(parent));
    assert_eq!(r.loaded_count(), 3);
    assert_eq!(r.validate(), Ok(()));
}

#[test]
fn trimming_waits_while_the_tracker_is_paused() {
    let store = Store::flat(10);
    let mut r = attach(&store, options(2, 0), Factory::default());

    r.set_scroll_offset(6);
    assert_eq!(visible_keys(&r), vec![7, 8]);
    assert_eq!(r.loaded_extent(), 6..8);
    assert_eq!(r.loaded_count(), 2);

    r.set_enabled(false);
    r.set_scroll_offset(0);
    assert_eq!(r.tracker_state(), TrackerState::Paused);
    assert_eq!(r.loaded_extent(), 6..8);

    r.set_enabled(true);
    assert_eq!(r.tracker_state(), TrackerState::Tracking);
    assert_eq!(visible_keys(&r), vec![1, 2]);
    assert_eq!(r.loaded_extent(), 0..2);
    assert_eq!(r.loaded_count(), 2);
    assert_eq!(r.validate(), Ok(()));
}

#[test]
fn buffered_edges_follow_the_window_top() {
    let store = Store::flat(10);
    let mut r = attach(&store, options(2, 1), Factory::default());
    let buffered = |r: &TestReflector| {
        (r.edge(EdgeRegion::Buffered, Edge::Top), r.edge(EdgeRegion::Buffered, Edge::Bottom))
    };

    r.set_scroll_offset(4);
    assert_eq!(visible_keys(&r), vec![5, 6]);
    assert_eq!(buffered(&r), (Some(node(&r, 4)), Some(node(&r, 7))));

    remove_rows(&mut r, &store, None, 3, 3);
    assert_eq!(buffered(&r), (r.first(), r.last()));
    assert_eq!(r.validate(), Ok(()));

    move_rows(&mut r, &store, None, 0, 0, None, 9);
    assert_eq!(buffered(&r), (r.first(), r.last()));
    assert_eq!(r.validate(), Ok(()));

    r.set_scroll_offset(0);
    assert_eq!(buffered(&r).0, Some(node(&r, 2)));
    assert_eq!(buffered(&r), (r.first(), r.last()));
    assert_eq!(r.validate(), Ok(()));
}

#[test]
fn max_depth_limits_loaded_levels() {
    let store = Store::with(&[(None, &[1, 2]), (Some(1), &[10]), (Some(10), &[100])]);
    let mut r = attach(
        &store,
        options(10, 2).with_max_depth(Some(1)),
        Factory::default(),
    );
    assert_eq!(visible_keys(&r), vec![1, 2]);
    assert_eq!(r.proximity(node(&r, 1), Edge::Right), None);
    assert_eq!(r.validate(), Ok(()));

    r.update_options(|o| o.max_depth = Some(2));
    assert_eq!(visible_keys(&r), vec![1, 10, 2]);
    assert_eq!(r.depth(node(&r, 10)), Some(2));
    assert_eq!(r.validate(), Ok(()));

    r.update_options(|o| o.max_depth = None);
    assert_eq!(visible_keys(&r), vec![1, 10, 100, 2]);
    assert_eq!(r.validate(), Ok(()));
}

#[test]
fn indentation_and_decoration_shape_geometry() {
    let store = Store::with(&[(None, &[1]), (Some(1), &[10])]);
    let opts = options(100, 0)
        .with_indentation(4)
        .with_decoration(Decoration::vertical(1, 1));
    let mut r = attach(&store, opts, Factory::default());

    let child = node(&r, 10);
    assert_eq!(r.geometry(node(&r, 1)), Some(Rect::new(0, 0, 0, 3)));
    assert_eq!(r.geometry(child), Some(Rect::new(4, 3, 0, 3)));
    assert_eq!(r.content_geometry(child), Some(Rect::new(4, 4, 0, 1)));
    assert_eq!(r.decorated_geometry(child), Some(Rect::new(4, 3, 0, 3)));
    assert_eq!(r.geometry_state(child), Some(GeometryState::Valid));
    assert_eq!(r.loaded_extent(), 0..6);
}

#[test]
fn just_in_time_sizes_come_from_the_factory() {
    let store = Store::flat(3);
    let opts = options(4, 0).with_size_hint(SizeHintStrategy::JustInTime {
        estimate: Size::new(0, 1),
    });
    let factory = Factory {
        measure: Some(Size::new(0, 2)),
        ..Factory::default()
    };
    let r = attach(&store, opts, factory);

    let rects: Vec<Rect> = r.collect_visible().into_iter().map(|v| v.rect).collect();
    assert_eq!(rects, vec![Rect::new(0, 0, 0, 2), Rect::new(0, 2, 0, 2)]);
    assert_eq!(r.node_for_key(&3), None);
    assert_eq!(r.pooled_count(), 1);
    assert_eq!(r.validate(), Ok(()));
}

#[test]
fn role_sizes_follow_data_changes() {
    let store = Store::flat(3);
    let opts = options(10, 2).with_size_hint(SizeHintStrategy::Role {
        role: 7,
        fallback: Size::new(0, 1),
    });
    let mut r = attach(&store, opts, Factory::default());
    assert_eq!(r.loaded_extent(), 0..3);

    store.heights.borrow_mut().insert(1, 3);
    r.data_changed(&1, &1, &[7]).unwrap();
    assert_eq!(r.geometry(node(&r, 1)), Some(Rect::new(0, 0, 0, 3)));
    assert_eq!(r.geometry(node(&r, 2)), Some(Rect::new(0, 3, 0, 1)));
    assert_eq!(r.loaded_extent(), 0..5);
    assert_eq!(r.factory().updates, vec![(1, vec![7])]);

    // Other roles leave sizes alone.
    store.heights.borrow_mut().insert(2, 5);
    r.data_changed(&2, &3, &[1]).unwrap();
    assert_eq!(r.geometry(node(&r, 2)), Some(Rect::new(0, 3, 0, 1)));
    assert_eq!(r.factory().updates.len(), 3);
    assert_eq!(r.validate(), Ok(()));
}

#[test]
fn ahead_of_time_sizes_are_resolved_on_attach() {
    let store = Store::flat(4);
    let opts = options(10, 2)
        .with_size_hint(SizeHintStrategy::ahead_of_time(|k: &u32| Size::new(0, *k)));
    let r = attach(&store, opts, Factory::default());

    assert_eq!(r.geometry(node(&r, 3)), Some(Rect::new(0, 3, 0, 3)));
    assert_eq!(r.loaded_extent(), 0..10);
    assert_eq!(visible_keys(&r), vec![1, 2, 3, 4]);
}

#[test]
fn proxy_sizes_fall_back() {
    let store = Store::flat(2);
    let opts = options(10, 2).with_size_hint(SizeHintStrategy::proxy(
        |k: &u32| (*k == 1).then_some(Size::new(0, 4)),
        Size::new(0, 2),
    ));
    let r = attach(&store, opts, Factory::default());
    assert_eq!(r.geometry(node(&r, 2)), Some(Rect::new(0, 4, 0, 2)));
}

#[test]
fn resizing_a_row_above_the_viewport_adjusts_the_offset() {
    let store = Store::flat(20);
    let opts = options(3, 2).with_size_hint(SizeHintStrategy::Role {
        role: 1,
        fallback: Size::new(0, 1),
    });
    let mut r = attach(&store, opts, Factory::default());
    r.set_scroll_offset(5);
    assert_eq!(visible_keys(&r), vec![6, 7, 8]);

    store.heights.borrow_mut().insert(4, 3);
    r.data_changed(&4, &4, &[]).unwrap();
    assert_eq!(r.scroll_offset(), 7);
    assert_eq!(visible_keys(&r), vec![6, 7, 8]);
    assert_eq!(r.validate(), Ok(()));
}

#[test]
fn inserted_rows_inside_the_window_are_mirrored() {
    let store = Store::flat(4);
    let mut r = attach(&store, options(100, 2), Factory::default());

    insert_rows(&mut r, &store, None, 1, &[50, 51]);
    assert_eq!(visible_keys(&r), vec![1, 50, 51, 2, 3, 4]);
    assert_eq!(r.effective_row(node(&r, 4)), Some(5));
    assert_eq!(r.validate(), Ok(()));

    insert_rows(&mut r, &store, None, 0, &[60]);
    assert_eq!(r.first(), Some(node(&r, 60)));
    assert_eq!(visible_keys(&r), vec![60, 1, 50, 51, 2, 3, 4]);

    insert_rows(&mut r, &store, Some(2), 0, &[70]);
    assert_eq!(visible_keys(&r), vec![60, 1, 50, 51, 2, 70, 3, 4]);
    assert_eq!(r.depth(node(&r, 70)), Some(2));
    assert_eq!(r.validate(), Ok(()));
}

#[test]
fn inserted_rows_outside_the_window_only_renumber() {
    let store = Store::flat(30);
    let mut r = attach(&store, options(3, 1), Factory::default());
    r.set_scroll_offset(10);
    assert_eq!(visible_keys(&r), vec![11, 12, 13]);

    insert_rows(&mut r, &store, None, 2, &[90, 91]);
    assert_eq!(r.node_for_key(&90), None);
    assert_eq!(r.effective_row(node(&r, 11)), Some(12));
    assert_eq!(visible_keys(&r), vec![11, 12, 13]);
    assert_eq!(r.validate(), Ok(()));

    insert_rows(&mut r, &store, None, 28, &[92]);
    assert_eq!(r.node_for_key(&92), None);
    assert_eq!(r.validate(), Ok(()));
}

#[test]
fn inserted_rows_with_children_reload_the_tail() {
    let store = Store::flat(3);
    let mut r = attach(&store, options(100, 2), Factory::default());

    store.children.borrow_mut().insert(Some(80), vec![81, 82]);
    insert_rows(&mut r, &store, None, 1, &[80]);
    assert_eq!(visible_keys(&r), vec![1, 80, 81, 82, 2, 3]);
    assert_eq!(r.validate(), Ok(()));
}

#[test]
fn removing_the_parent_of_the_window_top_adopts_a_new_top() {
    let store = Store::with(&[(None, &[1, 2, 3]), (Some(1), &[10, 11, 12, 13])]);
    let mut r = attach(&store, options(2, 0), Factory::default());
    r.set_scroll_offset(3);
    assert_eq!(visible_keys(&r), vec![12, 13]);

    remove_rows(&mut r, &store, None, 0, 0);
    assert_eq!(r.node_for_key(&1), None);
    assert_eq!(r.node_for_key(&12), None);
    // Two rows left, both above the offset: only the buffer row stays.
    assert_eq!(r.key(r.first().expect("window is not empty")), Some(&3));
    assert!(visible_keys(&r).is_empty());
    assert_eq!(r.validate(), Ok(()));

    r.set_scroll_offset(0);
    assert_eq!(visible_keys(&r), vec![2, 3]);
    assert_eq!(r.validate(), Ok(()));
}

#[test]
fn removing_children_of_an_anchor_falls_back_to_the_anchor() {
    let store = Store::with(&[(None, &[1]), (Some(1), &[10, 11, 12, 13])]);
    let mut r = attach(&store, options(2, 0), Factory::default());
    r.set_scroll_offset(3);
    assert_eq!(visible_keys(&r), vec![12, 13]);

    remove_rows(&mut r, &store, Some(1), 2, 3);
    assert_eq!(r.node_for_key(&12), None);
    assert!(r.contains(node(&r, 1)));
    assert_eq!(visible_keys(&r), vec![10, 11]);
    assert_eq!(r.validate(), Ok(()));
}

#[test]
fn removing_everything_empties_the_mirror() {
    let store = Store::flat(3);
    let mut r = attach(&store, options(5, 1), Factory::default());

    remove_rows(&mut r, &store, None, 0, 2);
    assert_eq!(r.loaded_count(), 0);
    assert!(visible_keys(&r).is_empty());
    assert_eq!(r.edges(EdgeRegion::Buffered), ModelRect::default());
    assert_eq!(r.validate(), Ok(()));

    insert_rows(&mut r, &store, None, 0, &[9]);
    assert_eq!(visible_keys(&r), vec![9]);
    assert_eq!(r.validate(), Ok(()));
}

#[test]
fn reset_rebuilds_the_mirror() {
    let store = Store::flat(3);
    let mut r = attach(&store, options(5, 1), Factory::default());

    r.model_about_to_be_reset();
    assert_eq!(r.tracker_state(), TrackerState::Resetting);
    assert_eq!(r.loaded_count(), 0);
    *store.children.borrow_mut() = BTreeMap::from([(None, vec![7, 8])]);
    r.model_reset();

    assert_eq!(r.tracker_state(), TrackerState::Tracking);
    assert_eq!(visible_keys(&r), vec![7, 8]);
    assert_eq!(r.validate(), Ok(()));
}

#[test]
fn double_reset_heals_into_tracking() {
    let store = Store::flat(3);
    let mut r = attach(&store, options(5, 1), Factory::default());

    r.model_about_to_be_reset();
    assert_eq!(r.tracker_state(), TrackerState::Resetting);
    *store.children.borrow_mut() = BTreeMap::from([(None, vec![100, 101, 102])]);

    r.model_about_to_be_reset();
    assert_eq!(r.tracker_state(), TrackerState::Tracking);
    assert_eq!(r.validate(), Ok(()));

    r.model_reset();
    assert_eq!(r.tracker_state(), TrackerState::Tracking);
    assert_eq!(visible_keys(&r), vec![100, 101, 102]);
    assert_eq!(r.validate(), Ok(()));
}

#[test]
fn inserting_into_an_empty_tree_fills_the_viewport() {
    let store = Store::flat(0);
    let mut r = attach(&store, options(2, 0), Factory::default());
    assert_eq!(r.loaded_count(), 0);

    insert_rows(&mut r, &store, None, 0, &[1, 2, 3]);
    assert_eq!(visible_keys(&r), vec![1, 2]);
    assert_eq!(r.node_for_key(&3), None);
    assert_eq!(r.validate(), Ok(()));
}

#[test]
fn disabled_reflector_catches_up_on_enable() {
    let store = Store::flat(3);
    let mut r = attach(&store, options(5, 1), Factory::default());

    r.set_enabled(false);
    assert_eq!(r.tracker_state(), TrackerState::Paused);
    store.insert(None, 0, &[40]);
    r.rows_inserted(None, 0, 0).unwrap();
    assert_eq!(r.node_for_key(&40), None);

    r.set_enabled(true);
    assert_eq!(r.tracker_state(), TrackerState::Tracking);
    assert_eq!(visible_keys(&r), vec![40, 1, 2, 3]);
    assert_eq!(r.validate(), Ok(()));
}

#[test]
fn disabled_at_construction_populates_on_enable() {
    let store = Store::flat(2);
    let mut r = attach(&store, options(5, 1).with_enabled(false), Factory::default());
    assert_eq!(r.tracker_state(), TrackerState::Paused);
    assert_eq!(r.loaded_count(), 0);

    r.set_enabled(true);
    assert_eq!(visible_keys(&r), vec![1, 2]);
}

#[test]
fn replacing_the_source_tears_down_views() {
    let store = Store::flat(3);
    let destroyed = Rc::new(Cell::new(0));
    let factory = Factory {
        destroyed: destroyed.clone(),
        ..Factory::default()
    };
    let opts = options(5, 1).with_recycling(RecyclingMode::None);
    let mut r = attach(&store, opts, factory);

    r.set_source(None);
    assert_eq!(r.tracker_state(), TrackerState::NoModel);
    assert_eq!(r.loaded_count(), 0);
    assert_eq!(destroyed.get(), 3);

    let other = Store::flat(2);
    r.set_source(Some(other.clone() as Rc<dyn TreeSource<u32>>));
    assert_eq!(visible_keys(&r), vec![1, 2]);
    drop(r);
    assert_eq!(destroyed.get(), 5);
}

#[test]
fn data_changes_update_views_with_roles() {
    let store = Store::flat(3);
    let mut r = attach(&store, options(5, 1), Factory::default());

    r.data_changed(&1, &2, &[3, 4]).unwrap();
    assert_eq!(r.factory().updates, vec![(1, vec![3, 4]), (2, vec![3, 4])]);
    assert_eq!(
        r.data_changed(&2, &1, &[]),
        Err(TreeError::InvalidRange { first: 1, last: 0 })
    );
}

#[test]
fn released_views_are_recycled_on_the_next_cycle() {
    let store = Store::flat(20);
    let mut r = attach(&store, options(3, 0), Factory::default());
    assert_eq!(r.factory().created, 3);

    r.set_scroll_offset(10);
    assert_eq!(visible_keys(&r), vec![11, 12, 13]);
    assert_eq!(r.factory().created, 6);
    assert_eq!(r.pooled_count(), 3);

    r.set_scroll_offset(13);
    assert_eq!(visible_keys(&r), vec![14, 15, 16]);
    assert_eq!(r.factory().created, 6);
    assert_eq!(r.factory().bound, 3);
    assert_eq!(r.pooled_count(), 3);
    assert!(r.handle(node(&r, 14)).is_some_and(|h| h.key == 14 && h.visible));
    assert_eq!(r.validate(), Ok(()));
}

#[test]
fn recycling_off_destroys_released_views() {
    let store = Store::flat(20);
    let destroyed = Rc::new(Cell::new(0));
    let factory = Factory {
        destroyed: destroyed.clone(),
        ..Factory::default()
    };
    let mut r = attach(&store, options(3, 0).with_recycling(RecyclingMode::None), factory);

    r.set_scroll_offset(10);
    assert_eq!(destroyed.get(), 3);
    assert_eq!(r.pooled_count(), 0);
}

#[test]
fn shrinking_the_pool_evicts_views() {
    let store = Store::flat(20);
    let destroyed = Rc::new(Cell::new(0));
    let factory = Factory {
        destroyed: destroyed.clone(),
        ..Factory::default()
    };
    let mut r = attach(&store, options(3, 0), factory);
    r.set_scroll_offset(10);
    assert_eq!(r.pooled_count(), 3);

    r.update_options(|o| o.pool_size = 1);
    assert_eq!(r.pooled_count(), 1);
    assert_eq!(destroyed.get(), 2);
}

#[test]
fn on_change_fires_once_per_cycle() {
    let events = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = events.clone();
    let store = Store::flat(10);
    let mut r = Reflector::new(options(3, 1), Factory::default());
    r.set_on_change(Some(move |e: ReflectorEvent| sink.lock().unwrap().push(e)));

    r.set_source(Some(store.clone() as Rc<dyn TreeSource<u32>>));
    assert_eq!(
        *events.lock().unwrap(),
        vec![ReflectorEvent::ContentChanged, ReflectorEvent::CountChanged(3)]
    );

    events.lock().unwrap().clear();
    r.batch_update(|r| {
        r.set_scroll_offset(1);
        r.set_scroll_offset(2);
    });
    assert_eq!(*events.lock().unwrap(), vec![ReflectorEvent::ContentChanged]);
    assert_eq!(visible_keys(&r), vec![3, 4, 5]);
}

#[test]
fn frame_state_round_trips() {
    let store = Store::flat(30);
    let mut r = attach(&store, options(4, 1), Factory::default());
    r.apply_scroll_frame(Size::new(10, 5), 7);
    let frame = r.frame_state();
    assert_eq!(frame.viewport.size, Size::new(10, 5));
    assert_eq!(frame.scroll.offset, 7);

    r.set_scroll_offset(0);
    r.restore_frame_state(frame);
    assert_eq!(visible_keys(&r), vec![8, 9, 10, 11, 12]);
}

#[test]
fn clamping_stops_at_the_loaded_ends() {
    let store = Store::flat(5);
    let mut r = attach(&store, options(3, 1), Factory::default());

    r.scroll_by(100);
    assert_eq!(r.scroll_offset(), 2);
    assert_eq!(visible_keys(&r), vec![3, 4, 5]);

    r.scroll_by(-100);
    assert_eq!(r.scroll_offset(), 0);
    assert_eq!(visible_keys(&r), vec![1, 2, 3]);
}

#[test]
fn initial_offset_provider_is_evaluated_once() {
    let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let seen = calls.clone();
    let opts = options(3, 1).with_initial_offset_provider(move || {
        seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        4
    });
    let store = Store::flat(10);
    let r = attach(&store, opts, Factory::default());
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(visible_keys(&r), vec![5, 6, 7]);
}

fn random_tree(rng: &mut Lcg, next_key: &mut u32) -> Rc<Store> {
    let store = Store::default();
    let mut frontier = vec![(None, 1usize)];
    while let Some((parent, depth)) = frontier.pop() {
        let count = match depth {
            1 => rng.gen_range_usize(3, 12),
            2 | 3 => rng.gen_range_usize(0, 4),
            _ => 0,
        };
        let keys: Vec<u32> = (0..count)
            .map(|_| {
                *next_key += 1;
                *next_key
            })
            .collect();
        for &k in &keys {
            frontier.push((Some(k), depth + 1));
        }
        store.children.borrow_mut().insert(parent, keys);
    }
    Rc::new(store)
}

fn expected_visible(flat: &[u32], offset: i64, rows: i64) -> Vec<u32> {
    (offset.max(0)..(offset + rows).min(flat.len() as i64))
        .map(|i| flat[i as usize])
        .collect()
}

#[test]
fn property_scrolling_matches_the_flattened_tree() {
    for seed in 1..=24u64 {
        let mut rng = Lcg::new(seed);
        let mut next_key = 0;
        let store = random_tree(&mut rng, &mut next_key);
        let max_depth = if rng.gen_bool() { None } else { Some(2) };
        let buffer = rng.gen_range_usize(0, 3);
        let rows = rng.gen_range_usize(1, 6) as i64;
        let opts = options(rows as u32, buffer).with_max_depth(max_depth);
        let mut r = attach(&store, opts, Factory::default());
        let flat = store.flatten(max_depth);

        assert_eq!(visible_keys(&r), expected_visible(&flat, 0, rows), "seed {seed}");
        for step in 0..40 {
            let offset = rng.gen_range_i64(-3, flat.len() as i64 + 3);
            r.set_scroll_offset(offset);
            assert_eq!(r.validate(), Ok(()), "seed {seed} step {step}");
            assert_eq!(
                visible_keys(&r),
                expected_visible(&flat, offset, rows),
                "seed {seed} step {step} offset {offset}"
            );
            assert_eq!(r.scroll_offset(), offset);
        }
    }
}

#[test]
fn property_mutations_keep_the_mirror_consistent() {
    for seed in 1..=24u64 {
        let mut rng = Lcg::new(seed);
        let mut next_key = 0;
        let store = random_tree(&mut rng, &mut next_key);
        let rows = rng.gen_range_usize(2, 6) as i64;
        let mut r = attach(&store, options(rows as u32, 1), Factory::default());

        for step in 0..60 {
            let flat = store.flatten(None);
            let parent = if flat.is_empty() || rng.gen_range_usize(0, 3) == 0 {
                None
            } else {
                Some(flat[rng.gen_range_usize(0, flat.len())])
            };
            let count = store.count(parent);
            match rng.gen_range_usize(0, 4) {
                0 => {
                    let offset = rng.gen_range_i64(-2, flat.len() as i64 + 2);
                    r.set_scroll_offset(offset);
                }
                1 => {
                    let row = rng.gen_range_usize(0, count + 1);
                    let n = rng.gen_range_usize(1, 4);
                    let keys: Vec<u32> = (0..n)
                        .map(|_| {
                            next_key += 1;
                            next_key
                        })
                        .collect();
                    if rng.gen_bool() {
                        next_key += 1;
                        store.children.borrow_mut().insert(Some(keys[0]), vec![next_key]);
                    }
                    insert_rows(&mut r, &store, parent, row, &keys);
                }
                2 if count > 0 => {
                    let first = rng.gen_range_usize(0, count);
                    let last = rng.gen_range_usize(first, count.min(first + 3));
                    remove_rows(&mut r, &store, parent, first, last);
                }
                3 if count > 1 => {
                    let start = rng.gen_range_usize(0, count);
                    let end = rng.gen_range_usize(start, count.min(start + 2));
                    let row = rng.gen_range_usize(0, count + 1);
                    if !(start..=end + 1).contains(&row) {
                        move_rows(&mut r, &store, parent, start, end, parent, row);
                    }
                }
                _ => {}
            }

            assert_eq!(r.validate(), Ok(()), "seed {seed} step {step}");
            let visible = visible_keys(&r);
            assert!(visible.len() as i64 <= rows, "seed {seed} step {step}");
            if let Some(first) = visible.first() {
                let flat = store.flatten(None);
                let at = flat.iter().position(|k| k == first).expect("visible row exists");
                assert_eq!(
                    &flat[at..at + visible.len()],
                    visible.as_slice(),
                    "seed {seed} step {step}"
                );
            }
        }
    }
}

#[test]
fn property_cross_parent_moves_keep_the_mirror_consistent() {
    for seed in 1..=16u64 {
        let mut rng = Lcg::new(seed);
        let mut next_key = 0;
        let store = random_tree(&mut rng, &mut next_key);
        let mut r = attach(&store, options(10_000, 1), Factory::default());

        for step in 0..30 {
            let flat = store.flatten(None);
            let parents: Vec<Option<u32>> = core::iter::once(None)
                .chain(flat.iter().map(|&k| Some(k)))
                .collect();
            let src = parents[rng.gen_range_usize(0, parents.len())];
            let count = store.count(src);
            if count == 0 {
                continue;
            }
            let start = rng.gen_range_usize(0, count);
            let moved = store.key(src.as_ref(), start).expect("row exists");
            let dst = parents[rng.gen_range_usize(0, parents.len())];
            if dst.is_some_and(|d| store.is_ancestor_or_self(moved, d)) {
                continue;
            }
            let dst_count = store.count(dst);
            let row = rng.gen_range_usize(0, dst_count + 1);
            if src == dst && (start..=start + 1).contains(&row) {
                continue;
            }
            move_rows(&mut r, &store, src, start, start, dst, row);

            assert_eq!(r.validate(), Ok(()), "seed {seed} step {step}");
            assert_eq!(visible_keys(&r), store.flatten(None), "seed {seed} step {step}");
        }
    }
}
