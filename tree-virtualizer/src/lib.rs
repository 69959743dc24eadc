//! A headless tree-to-linear reflection engine.
//!
//! For adapter-level utilities (an in-memory tree store, a scroll/cursor controller), see the
//! `tree-virtualizer-adapter` crate.
//!
//! The engine mirrors a hierarchical [`TreeSource`] as a depth-first ordered list of rows and
//! keeps only a window of it alive: the rows intersecting the viewport plus a configurable
//! buffer on each side. Rows outside the window are never instantiated, so trees with millions
//! of records stay cheap to scroll.
//!
//! It is UI-agnostic. A TUI/GUI layer is expected to provide:
//! - viewport size and scroll offset
//! - a [`ViewFactory`] that creates, recycles and positions row views
//! - structural change notifications from the source (insert/remove/move/reset/data)
#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]

extern crate alloc;

#[cfg(test)]
extern crate std;

#[macro_use]
mod macros;

mod continuity;
mod edges;
mod error;
mod geometry;
mod key;
mod model_item;
mod mutation;
mod node;
mod options;
mod pool;
mod proximity;
mod reflector;
mod size;
mod source;
mod state;
mod tracker;
mod types;
mod view_item;
mod window;

#[cfg(test)]
mod tests;

pub use edges::{EdgeRegion, FreeEdges, ModelRect};
pub use error::{Result, TreeError};
pub use geometry::{GeometryAction, GeometryState, GeometryTracker};
pub use key::TreeKey;
pub use model_item::{ItemAction, ItemState};
pub use node::{NodeId, NodeKind, TemporaryIndex};
pub use options::{InitialOffset, OnChangeCallback, ReflectorOptions};
pub use proximity::{Proximity, ProximityStep};
pub use reflector::{Reflector, VisibleItem};
pub use size::SizeHintStrategy;
pub use source::TreeSource;
pub use state::{FrameState, ScrollState, ViewportState};
pub use tracker::{TrackerAction, TrackerState};
pub use types::{Decoration, Edge, Point, RecyclingMode, Rect, ReflectorEvent, Role, Size};
pub use view_item::{ViewAction, ViewFactory, ViewId, ViewState};
