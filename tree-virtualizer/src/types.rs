/// A data role, forwarded verbatim from `data_changed` notifications to the view factory.
pub type Role = u32;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Point {
    pub x: i64,
    pub y: i64,
}

impl Point {
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

/// A rectangle in content coordinates.
///
/// `y` grows downward along the linearized tree. Content coordinates are anchored at the first
/// row the engine ever laid out, so rows discovered above it can have negative `y`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rect {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: i64, y: i64, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn bottom(&self) -> i64 {
        self.y.saturating_add(self.height as i64)
    }

    pub fn right(&self) -> i64 {
        self.x.saturating_add(self.width as i64)
    }
}

/// Border padding around a row, one scalar per edge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Decoration {
    pub top: u32,
    pub left: u32,
    pub right: u32,
    pub bottom: u32,
}

impl Decoration {
    pub const fn uniform(v: u32) -> Self {
        Self {
            top: v,
            left: v,
            right: v,
            bottom: v,
        }
    }

    pub const fn vertical(top: u32, bottom: u32) -> Self {
        Self {
            top,
            left: 0,
            right: 0,
            bottom,
        }
    }
}

/// A cardinal direction in the linearized tree.
///
/// `Top`/`Bottom` follow the depth-first order. `Left` goes to the parent and `Right` to the
/// first loaded child, matching how tree rows indent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Edge {
    Top,
    Left,
    Right,
    Bottom,
}

/// How released view handles are recycled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RecyclingMode {
    /// Every released handle is destroyed.
    None,
    /// Handles are only reused for rows at the depth they were created for.
    PerDepth,
    /// Any pooled handle can be reused for any row.
    #[default]
    Global,
}

/// Notifications emitted after a dispatch cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ReflectorEvent {
    /// The window contents or geometry changed; redraw.
    ContentChanged,
    /// The number of visible rows changed (scrollbar sizing).
    CountChanged(usize),
}
