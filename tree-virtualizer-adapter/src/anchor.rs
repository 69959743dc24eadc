use core::fmt;

use tree_virtualizer::{Reflector, TreeKey, ViewFactory};

/// A scroll anchor that pins the viewport to a row identity across structural changes.
///
/// Typical use: capture before rows are inserted or removed above the viewport (or before a
/// reset), apply afterwards so the row on screen does not jump.
#[derive(Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScrollAnchor<K> {
    pub key: K,
    /// Distance from the anchor row's top to the scroll offset.
    pub offset_in_viewport: i64,
}

impl<K: fmt::Debug> fmt::Debug for ScrollAnchor<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScrollAnchor")
            .field("key", &self.key)
            .field("offset_in_viewport", &self.offset_in_viewport)
            .finish()
    }
}

/// Captures an anchor for the first visible row.
///
/// Returns `None` when nothing is visible.
pub fn capture_first_visible_anchor<K: TreeKey, F: ViewFactory<K>>(
    r: &Reflector<K, F>,
) -> Option<ScrollAnchor<K>> {
    let mut first = None;
    r.for_each_visible(|item| {
        if first.is_none() {
            first = Some(item);
        }
    });
    let item = first?;
    Some(ScrollAnchor {
        offset_in_viewport: r.scroll_offset() - item.rect.y,
        key: item.key,
    })
}

/// Scrolls so the anchor row sits where it was captured.
///
/// Returns `false` when the anchor row is not laid out in the current window.
pub fn apply_anchor<K: TreeKey, F: ViewFactory<K>>(
    r: &mut Reflector<K, F>,
    anchor: &ScrollAnchor<K>,
) -> bool {
    let Some(rect) = r.node_for_key(&anchor.key).and_then(|id| r.geometry(id)) else {
        return false;
    };
    r.set_scroll_offset(rect.y.saturating_add(anchor.offset_in_viewport));
    true
}
