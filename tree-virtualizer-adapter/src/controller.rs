use tree_virtualizer::{
    Edge, EdgeRegion, NodeId, Reflector, ReflectorOptions, Result, Size, TreeKey, ViewFactory,
};

use crate::{ScrollAnchor, apply_anchor, capture_first_visible_anchor};

/// A framework-neutral controller that owns a [`Reflector`] and provides common adapter
/// workflows: scrolling by pages, anchoring and keyboard-style cursor navigation.
///
/// This type does not hold any UI objects. Adapters drive it by calling:
/// - `on_viewport_size` / `on_scroll` when UI events occur
/// - `move_cursor` for arrow keys, which loads rows on demand and scrolls them into view
///
/// The cursor is tracked by key, so it survives its row being trimmed out of the window.
pub struct Controller<K, F: ViewFactory<K>> {
    r: Reflector<K, F>,
    cursor: Option<K>,
}

impl<K: TreeKey + core::fmt::Debug, F: ViewFactory<K>> core::fmt::Debug for Controller<K, F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Controller")
            .field("reflector", &self.r)
            .field("cursor", &self.cursor)
            .finish()
    }
}

impl<K: TreeKey, F: ViewFactory<K>> Controller<K, F> {
    pub fn new(options: ReflectorOptions<K>, factory: F) -> Self {
        Self::from_reflector(Reflector::new(options, factory))
    }

    pub fn from_reflector(r: Reflector<K, F>) -> Self {
        Self { r, cursor: None }
    }

    pub fn reflector(&self) -> &Reflector<K, F> {
        &self.r
    }

    pub fn reflector_mut(&mut self) -> &mut Reflector<K, F> {
        &mut self.r
    }

    pub fn into_reflector(self) -> Reflector<K, F> {
        self.r
    }

    pub fn on_viewport_size(&mut self, size: Size) {
        self.r.set_viewport_size(size);
    }

    /// Call this when the UI reports a scroll offset change (e.g. user wheel/drag).
    pub fn on_scroll(&mut self, offset: i64) {
        self.r.set_scroll_offset(offset);
    }

    /// Scrolls by `delta`, clamped to the known content extent.
    pub fn scroll_by(&mut self, delta: i64) {
        self.r.scroll_by(delta);
    }

    pub fn page_down(&mut self) {
        let page = i64::from(self.r.viewport_size().height);
        self.r.scroll_by(page);
    }

    pub fn page_up(&mut self) {
        let page = i64::from(self.r.viewport_size().height);
        self.r.scroll_by(-page);
    }

    pub fn capture_anchor(&self) -> Option<ScrollAnchor<K>> {
        capture_first_visible_anchor(&self.r)
    }

    pub fn apply_anchor(&mut self, anchor: &ScrollAnchor<K>) -> bool {
        apply_anchor(&mut self.r, anchor)
    }

    pub fn cursor(&self) -> Option<&K> {
        self.cursor.as_ref()
    }

    /// Mirrored row under the cursor, if the cursor row is loaded.
    pub fn cursor_node(&self) -> Option<NodeId> {
        self.cursor.as_ref().and_then(|k| self.r.node_for_key(k))
    }

    pub fn set_cursor(&mut self, key: Option<K>) {
        self.cursor = key;
    }

    /// Moves the cursor one row toward `edge` and scrolls the new row into view.
    ///
    /// `Top`/`Bottom` step through the depth-first order, `Left` goes to the parent and `Right`
    /// to the first child. Rows beyond the window are loaded from the source on demand. When
    /// the cursor is unset, or its row is no longer mirrored, it lands on the first visible row
    /// instead. Returns the new cursor.
    pub fn move_cursor(&mut self, edge: Edge) -> Result<Option<K>> {
        let Some(current) = self.cursor_node() else {
            self.cursor = self
                .r
                .edge(EdgeRegion::Visible, Edge::Top)
                .and_then(|id| self.r.key(id).cloned());
            return Ok(self.cursor.clone());
        };
        if let Some(next) = self.r.load(current, edge)? {
            if let Some(key) = self.r.key(next).cloned() {
                self.scroll_into_view(next)?;
                self.cursor = Some(key);
            }
        }
        Ok(self.cursor.clone())
    }

    /// Scrolls the least amount that makes the row of `key` fully visible.
    ///
    /// Returns `false` when the row is not mirrored.
    pub fn ensure_visible(&mut self, key: &K) -> Result<bool> {
        match self.r.node_for_key(key) {
            Some(id) => self.scroll_into_view(id),
            None => Ok(false),
        }
    }

    fn scroll_into_view(&mut self, id: NodeId) -> Result<bool> {
        // Ancestors of the window carry no geometry until the window grows up to them.
        while self.r.geometry(id).is_none() {
            let Some(top) = self.r.edge(EdgeRegion::Buffered, Edge::Top) else {
                return Ok(false);
            };
            if self.r.load(top, Edge::Top)?.is_none() {
                return Ok(false);
            }
        }
        let Some(rect) = self.r.geometry(id) else {
            return Ok(false);
        };
        let vh = i64::from(self.r.viewport_size().height);
        let offset = self.r.scroll_offset();
        if rect.y < offset || i64::from(rect.height) > vh {
            self.r.set_scroll_offset(rect.y);
        } else if rect.bottom() > offset + vh {
            self.r.set_scroll_offset(rect.bottom() - vh);
        }
        Ok(true)
    }
}
