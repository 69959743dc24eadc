use crate::{Role, Size};

/// The hierarchical data provider mirrored by the [`crate::Reflector`].
///
/// Parents are named by key; `None` is the invisible root. Keys must be unique across the whole
/// tree and stable for as long as the record exists.
///
/// Mutations are reported by calling the reflector's notification handlers:
/// - removals and moves *before* the container changes (`rows_about_to_be_removed`,
///   `rows_about_to_be_moved`, `model_about_to_be_reset`), then again once it changed,
/// - insertions and data changes *after* the container changed.
///
/// Queries made from an "about to" handler see the old state of the source; the "happened"
/// handlers read the new one.
pub trait TreeSource<K> {
    /// Number of children under `parent`.
    fn row_count(&self, parent: Option<&K>) -> usize;

    /// Key of the child at `row` under `parent`.
    fn key(&self, parent: Option<&K>, row: usize) -> Option<K>;

    /// Size stored under a data role, used by [`crate::SizeHintStrategy::Role`].
    fn size_hint(&self, key: &K, role: Role) -> Option<Size> {
        let _ = (key, role);
        None
    }
}
