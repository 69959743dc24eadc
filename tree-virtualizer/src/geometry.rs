use crate::{Decoration, Point, Rect, Size};

/// Cache state of a row's geometry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GeometryState {
    /// Nothing is known.
    #[default]
    Init,
    /// The size is known, the position is not.
    Size,
    /// The position is known, the size is not.
    Position,
    /// Both inputs are known but the rectangle has not been composed yet.
    Pending,
    /// The decorated rectangle is composed and cached.
    Valid,
}

/// Inputs fed to [`GeometryTracker::perform`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GeometryAction {
    /// The row moved in the traversal; a known-only position is now stale.
    Move,
    Resize(Size),
    Place(Point),
    /// Hard invalidation (pooling, recycling, reparenting).
    Reset,
    /// The content changed without new inputs; recompose on the next read.
    Modify,
    Decorate(Decoration),
    /// A reader needs the rectangle. Composes it when both inputs are known.
    View,
}

/// Lazily composed geometry of one mirrored row.
///
/// The raw inputs (size, position, decoration) are kept separately from the composed rectangle,
/// so an invalidation only demotes the state and the recomposition on the next `View` is O(1).
/// Mutations go through [`perform`](Self::perform) only.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GeometryTracker {
    state: GeometryState,
    size: Option<Size>,
    position: Option<Point>,
    decoration: Decoration,
    composed: Rect,
}

impl GeometryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> GeometryState {
        self.state
    }

    pub fn size(&self) -> Option<Size> {
        self.size
    }

    pub fn position(&self) -> Option<Point> {
        self.position
    }

    pub fn decoration(&self) -> Decoration {
        self.decoration
    }

    /// Height including the top/bottom decoration, available as soon as the size is known.
    pub fn decorated_height(&self) -> Option<u32> {
        let size = self.size?;
        Some(
            size.height
                .saturating_add(self.decoration.top)
                .saturating_add(self.decoration.bottom),
        )
    }

    /// The composed rectangle, only when the cache is `Valid`.
    pub fn cached(&self) -> Option<Rect> {
        (self.state == GeometryState::Valid).then_some(self.composed)
    }

    /// The decorated rectangle without touching the cache: the cached value when `Valid`, a
    /// fresh composition when both inputs are known, `None` otherwise.
    pub fn peek(&self) -> Option<Rect> {
        match self.state {
            GeometryState::Valid => Some(self.composed),
            GeometryState::Pending => {
                let (size, pos) = (self.size?, self.position?);
                Some(Self::decorate(size, pos, self.decoration))
            }
            _ => None,
        }
    }

    /// Applies an action and returns the resulting state.
    pub fn perform(&mut self, action: GeometryAction) -> GeometryState {
        use GeometryAction as A;
        use GeometryState as S;

        let next = match (self.state, action) {
            (_, A::Reset) => {
                self.size = None;
                self.position = None;
                S::Init
            }

            (S::Init, A::Resize(size)) | (S::Size, A::Resize(size)) => {
                self.size = Some(size);
                S::Size
            }
            (S::Init, A::Place(pos)) | (S::Position, A::Place(pos)) => {
                self.position = Some(pos);
                S::Position
            }
            (S::Size, A::Place(pos)) => {
                self.position = Some(pos);
                S::Pending
            }
            (S::Position, A::Resize(size)) => {
                self.size = Some(size);
                S::Pending
            }
            (S::Pending, A::Resize(size)) => {
                self.size = Some(size);
                S::Pending
            }
            (S::Pending, A::Place(pos)) => {
                self.position = Some(pos);
                S::Pending
            }

            (S::Valid, A::Resize(size)) => {
                if self.size == Some(size) {
                    S::Valid
                } else {
                    self.size = Some(size);
                    S::Pending
                }
            }
            (S::Valid, A::Place(pos)) => {
                if self.position == Some(pos) {
                    S::Valid
                } else {
                    self.position = Some(pos);
                    S::Pending
                }
            }
            (S::Valid, A::Modify) => S::Pending,
            (state, A::Modify) => state,

            (S::Valid, A::Decorate(decoration)) => {
                if self.decoration == decoration {
                    S::Valid
                } else {
                    self.decoration = decoration;
                    S::Pending
                }
            }
            (state, A::Decorate(decoration)) => {
                self.decoration = decoration;
                state
            }

            (S::Position, A::Move) => {
                self.position = None;
                S::Init
            }
            (state, A::Move) => state,

            (S::Pending, A::View) => {
                self.compose();
                S::Valid
            }
            (state, A::View) => state,
        };
        self.state = next;
        next
    }

    /// Composes (if needed) and returns the decorated rectangle.
    pub fn decorated_geometry(&mut self) -> Option<Rect> {
        self.perform(GeometryAction::View);
        self.cached()
    }

    /// The rectangle without the decoration.
    pub fn content_geometry(&mut self) -> Option<Rect> {
        let rect = self.decorated_geometry()?;
        let d = self.decoration;
        Some(Rect {
            x: rect.x.saturating_add(d.left as i64),
            y: rect.y.saturating_add(d.top as i64),
            width: rect.width.saturating_sub(d.left.saturating_add(d.right)),
            height: rect.height.saturating_sub(d.top.saturating_add(d.bottom)),
        })
    }

    fn compose(&mut self) {
        let (Some(size), Some(pos)) = (self.size, self.position) else {
            debug_assert!(false, "GeometryTracker: composing without both inputs");
            return;
        };
        self.composed = Self::decorate(size, pos, self.decoration);
    }

    fn decorate(size: Size, pos: Point, d: Decoration) -> Rect {
        Rect {
            x: pos.x,
            y: pos.y,
            width: size.width.saturating_add(d.left).saturating_add(d.right),
            height: size.height.saturating_add(d.top).saturating_add(d.bottom),
        }
    }
}
