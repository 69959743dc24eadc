use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;

#[cfg(not(feature = "std"))]
use alloc::collections::BTreeMap;
#[cfg(feature = "std")]
use std::collections::HashMap;

use tree_virtualizer::{Reflector, Role, Size, TreeKey, TreeSource, ViewFactory};

use crate::error::{StoreError, StoreResult};

#[cfg(feature = "std")]
type StoreMap<K, V> = HashMap<K, V>;
#[cfg(not(feature = "std"))]
type StoreMap<K, V> = BTreeMap<K, V>;

struct Record<K> {
    parent: Option<K>,
    children: Vec<K>,
}

struct Inner<K> {
    roots: Vec<K>,
    records: StoreMap<K, Record<K>>,
    sizes: StoreMap<(K, Role), Size>,
}

impl<K> Default for Inner<K> {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            records: StoreMap::new(),
            sizes: StoreMap::new(),
        }
    }
}

impl<K: TreeKey> Inner<K> {
    fn children(&self, parent: Option<&K>) -> Option<&Vec<K>> {
        match parent {
            None => Some(&self.roots),
            Some(p) => self.records.get(p).map(|r| &r.children),
        }
    }

    fn children_mut(&mut self, parent: Option<&K>) -> Option<&mut Vec<K>> {
        match parent {
            None => Some(&mut self.roots),
            Some(p) => self.records.get_mut(p).map(|r| &mut r.children),
        }
    }

    fn check_range(&self, parent: Option<&K>, first: usize, last: usize) -> StoreResult<()> {
        let len = self.children(parent).ok_or(StoreError::UnknownParent)?.len();
        if first > last || last >= len {
            return Err(StoreError::OutOfBounds { first, last });
        }
        Ok(())
    }

    fn insert(&mut self, parent: Option<&K>, row: usize, keys: Vec<K>) -> StoreResult<()> {
        let len = self.children(parent).ok_or(StoreError::UnknownParent)?.len();
        if row > len {
            return Err(StoreError::OutOfBounds {
                first: row,
                last: row,
            });
        }
        for (i, key) in keys.iter().enumerate() {
            if self.records.contains_key(key) || keys[..i].contains(key) {
                return Err(StoreError::DuplicateKey);
            }
        }
        for key in &keys {
            self.records.insert(
                key.clone(),
                Record {
                    parent: parent.cloned(),
                    children: Vec::new(),
                },
            );
        }
        if let Some(children) = self.children_mut(parent) {
            children.splice(row..row, keys);
        }
        Ok(())
    }

    fn remove(&mut self, parent: Option<&K>, first: usize, last: usize) -> Vec<K> {
        let Some(children) = self.children_mut(parent) else {
            return Vec::new();
        };
        let removed: Vec<K> = children.drain(first..=last).collect();
        let mut stack = removed.clone();
        while let Some(key) = stack.pop() {
            if let Some(record) = self.records.remove(&key) {
                stack.extend(record.children);
            }
            self.sizes.retain(|(k, _), _| *k != key);
        }
        removed
    }

    /// Whether `key` is one of `block` or sits below one of them.
    fn is_within(&self, key: Option<&K>, block: &[K]) -> bool {
        let mut cur = key.cloned();
        while let Some(k) = cur {
            if block.contains(&k) {
                return true;
            }
            cur = self.records.get(&k).and_then(|r| r.parent.clone());
        }
        false
    }

    fn relocate(&mut self, src: Option<&K>, start: usize, end: usize, dst: Option<&K>, row: usize) {
        let Some(children) = self.children_mut(src) else {
            return;
        };
        let block: Vec<K> = children.drain(start..=end).collect();
        let row = if src == dst && row > end {
            row - block.len()
        } else {
            row
        };
        for key in &block {
            if let Some(record) = self.records.get_mut(key) {
                record.parent = dst.cloned();
            }
        }
        if let Some(children) = self.children_mut(dst) {
            children.splice(row..row, block);
        }
    }

    fn depth(&self, key: &K) -> Option<usize> {
        let mut depth = 1;
        let mut cur = self.records.get(key)?.parent.clone();
        while let Some(k) = cur {
            depth += 1;
            cur = self.records.get(&k).and_then(|r| r.parent.clone());
        }
        Some(depth)
    }
}

/// An in-memory keyed tree that reports its own mutations to a [`Reflector`].
///
/// The store is a shared handle: clones see the same rows, and [`TreeStore::attach`] hands one
/// of them to the reflector as its [`TreeSource`]. Every mutation validates its arguments
/// first, then runs the reflector's "about to" handler, changes the rows and finally runs the
/// "happened" handler.
///
/// Row sizes are stored per data role and served through [`TreeSource::size_hint`].
pub struct TreeStore<K> {
    inner: Rc<RefCell<Inner<K>>>,
}

impl<K> Clone for TreeStore<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<K> Default for TreeStore<K> {
    fn default() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner::default())),
        }
    }
}

impl<K> core::fmt::Debug for TreeStore<K> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("TreeStore")
            .field("roots", &inner.roots.len())
            .field("len", &inner.records.len())
            .finish_non_exhaustive()
    }
}

impl<K: TreeKey> TreeStore<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store holding `keys` as top-level rows.
    pub fn flat(keys: impl IntoIterator<Item = K>) -> StoreResult<Self> {
        let store = Self::new();
        store.extend(None, keys)?;
        Ok(store)
    }

    /// Appends rows under `parent` without notifying anyone.
    ///
    /// Meant for filling the store before a reflector observes it; once attached, use
    /// [`TreeStore::insert_rows`].
    pub fn extend(&self, parent: Option<&K>, keys: impl IntoIterator<Item = K>) -> StoreResult<()> {
        let mut inner = self.inner.borrow_mut();
        let row = inner.children(parent).ok_or(StoreError::UnknownParent)?.len();
        inner.insert(parent, row, keys.into_iter().collect())
    }

    /// Total number of rows, at every depth.
    pub fn len(&self) -> usize {
        self.inner.borrow().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().records.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.inner.borrow().records.contains_key(key)
    }

    pub fn children(&self, parent: Option<&K>) -> Vec<K> {
        self.inner
            .borrow()
            .children(parent)
            .cloned()
            .unwrap_or_default()
    }

    /// Parent of `key`: `Some(None)` for top-level rows, `None` for unknown keys.
    pub fn parent(&self, key: &K) -> Option<Option<K>> {
        self.inner.borrow().records.get(key).map(|r| r.parent.clone())
    }

    pub fn row(&self, key: &K) -> Option<usize> {
        let inner = self.inner.borrow();
        let parent = inner.records.get(key)?.parent.clone();
        inner
            .children(parent.as_ref())?
            .iter()
            .position(|k| k == key)
    }

    /// Depth of `key`; top-level rows have depth 1.
    pub fn depth(&self, key: &K) -> Option<usize> {
        self.inner.borrow().depth(key)
    }

    pub fn size(&self, key: &K, role: Role) -> Option<Size> {
        self.inner.borrow().sizes.get(&(key.clone(), role)).copied()
    }

    /// Every row in depth-first order, down to `max_depth` when set.
    pub fn flatten(&self, max_depth: Option<usize>) -> Vec<K> {
        let inner = self.inner.borrow();
        let mut out = Vec::with_capacity(inner.records.len());
        let mut stack: Vec<(&K, usize)> = inner.roots.iter().rev().map(|k| (k, 1)).collect();
        while let Some((key, depth)) = stack.pop() {
            out.push(key.clone());
            if max_depth.is_some_and(|max| depth >= max) {
                continue;
            }
            if let Some(record) = inner.records.get(key) {
                stack.extend(record.children.iter().rev().map(|k| (k, depth + 1)));
            }
        }
        out
    }

    /// This store as a reflector source.
    pub fn source(&self) -> Rc<dyn TreeSource<K>>
    where
        K: 'static,
    {
        Rc::new(self.clone())
    }

    /// Makes this store the source of `reflector`.
    pub fn attach<F: ViewFactory<K>>(&self, reflector: &mut Reflector<K, F>)
    where
        K: 'static,
    {
        reflector.set_source(Some(self.source()));
    }

    /// Inserts `keys` under `parent`, starting at `row`.
    ///
    /// Insertions have no "about to" step: the reflector is told once the rows exist.
    pub fn insert_rows<F: ViewFactory<K>>(
        &self,
        reflector: &mut Reflector<K, F>,
        parent: Option<&K>,
        row: usize,
        keys: impl IntoIterator<Item = K>,
    ) -> StoreResult<()> {
        let keys: Vec<K> = keys.into_iter().collect();
        if keys.is_empty() {
            return Ok(());
        }
        let count = keys.len();
        self.inner.borrow_mut().insert(parent, row, keys)?;
        reflector.rows_inserted(parent, row, row + count - 1)?;
        Ok(())
    }

    /// Removes rows `first..=last` under `parent` together with their subtrees and returns the
    /// removed top-level keys.
    pub fn remove_rows<F: ViewFactory<K>>(
        &self,
        reflector: &mut Reflector<K, F>,
        parent: Option<&K>,
        first: usize,
        last: usize,
    ) -> StoreResult<Vec<K>> {
        self.inner.borrow().check_range(parent, first, last)?;
        reflector.rows_about_to_be_removed(parent, first, last)?;
        let removed = self.inner.borrow_mut().remove(parent, first, last);
        reflector.rows_removed(parent, first, last)?;
        Ok(removed)
    }

    /// Moves rows `start..=end` under `src` to `dst`, before the row currently at `row`.
    ///
    /// `row` counts rows of `dst` before the move. Moving a block onto itself is a no-op and
    /// emits nothing.
    pub fn move_rows<F: ViewFactory<K>>(
        &self,
        reflector: &mut Reflector<K, F>,
        src: Option<&K>,
        start: usize,
        end: usize,
        dst: Option<&K>,
        row: usize,
    ) -> StoreResult<()> {
        {
            let inner = self.inner.borrow();
            inner.check_range(src, start, end)?;
            let dst_len = inner.children(dst).ok_or(StoreError::UnknownParent)?.len();
            if row > dst_len {
                return Err(StoreError::OutOfBounds {
                    first: row,
                    last: row,
                });
            }
            if src == dst && (start..=end + 1).contains(&row) {
                return Ok(());
            }
            let block = inner
                .children(src)
                .map(|c| &c[start..=end])
                .unwrap_or_default();
            if inner.is_within(dst, block) {
                return Err(StoreError::MoveIntoSelf);
            }
        }
        reflector.rows_about_to_be_moved(src, start, end, dst, row)?;
        self.inner
            .borrow_mut()
            .relocate(src, start, end, dst, row);
        reflector.rows_moved(src, start, end, dst, row)?;
        Ok(())
    }

    /// Stores the size of `key` under `role` and reports the data change.
    pub fn set_size<F: ViewFactory<K>>(
        &self,
        reflector: &mut Reflector<K, F>,
        key: &K,
        role: Role,
        size: Size,
    ) -> StoreResult<()> {
        {
            let mut inner = self.inner.borrow_mut();
            if !inner.records.contains_key(key) {
                return Err(StoreError::UnknownKey);
            }
            inner.sizes.insert((key.clone(), role), size);
        }
        reflector.data_changed(key, key, &[role])?;
        Ok(())
    }

    /// Reports a data change of `key` for `roles` (empty: every role) without changing the row.
    pub fn touch<F: ViewFactory<K>>(
        &self,
        reflector: &mut Reflector<K, F>,
        key: &K,
        roles: &[Role],
    ) -> StoreResult<()> {
        if !self.contains(key) {
            return Err(StoreError::UnknownKey);
        }
        reflector.data_changed(key, key, roles)?;
        Ok(())
    }

    /// Replaces every row with the contents of `replacement`, wrapped in a reset.
    ///
    /// `replacement` is left empty.
    pub fn reset<F: ViewFactory<K>>(
        &self,
        reflector: &mut Reflector<K, F>,
        replacement: &TreeStore<K>,
    ) {
        reflector.model_about_to_be_reset();
        let next = replacement.inner.take();
        *self.inner.borrow_mut() = next;
        reflector.model_reset();
    }
}

impl<K: TreeKey> TreeSource<K> for TreeStore<K> {
    fn row_count(&self, parent: Option<&K>) -> usize {
        self.inner.borrow().children(parent).map_or(0, Vec::len)
    }

    fn key(&self, parent: Option<&K>, row: usize) -> Option<K> {
        self.inner.borrow().children(parent)?.get(row).cloned()
    }

    fn size_hint(&self, key: &K, role: Role) -> Option<Size> {
        self.size(key, role)
    }
}
