#[cfg(not(feature = "std"))]
use alloc::collections::BTreeMap;
#[cfg(feature = "std")]
use std::collections::HashMap;

/// Key → value map used for the per-parent child index and the global key index.
#[cfg(feature = "std")]
pub(crate) type KeyMap<K, V> = HashMap<K, V>;
#[cfg(not(feature = "std"))]
pub(crate) type KeyMap<K, V> = BTreeMap<K, V>;

/// Bound for stable source keys.
///
/// Keys identify a record of the source for as long as it exists, independent of its row. They
/// must be unique across the whole source tree.
#[cfg(feature = "std")]
pub trait TreeKey: core::hash::Hash + Eq + Clone {}
#[cfg(feature = "std")]
impl<K: core::hash::Hash + Eq + Clone> TreeKey for K {}

#[cfg(not(feature = "std"))]
pub trait TreeKey: Ord + Clone {}
#[cfg(not(feature = "std"))]
impl<K: Ord + Clone> TreeKey for K {}
