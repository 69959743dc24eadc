use alloc::sync::Arc;

use crate::{Decoration, RecyclingMode, ReflectorEvent, Size, SizeHintStrategy};

/// A callback fired at the end of a dispatch cycle for each emitted notification.
pub type OnChangeCallback = Arc<dyn Fn(ReflectorEvent) + Send + Sync>;

/// Initial scroll offset configuration.
#[derive(Clone)]
pub enum InitialOffset {
    Value(i64),
    /// A lazily evaluated initial offset provider (called by `Reflector::new`).
    Provider(Arc<dyn Fn() -> i64 + Send + Sync>),
}

impl InitialOffset {
    pub(crate) fn resolve(&self) -> i64 {
        match self {
            Self::Value(v) => *v,
            Self::Provider(f) => f(),
        }
    }
}

impl Default for InitialOffset {
    fn default() -> Self {
        Self::Value(0)
    }
}

impl core::fmt::Debug for InitialOffset {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Provider(_) => f.write_str("Provider(..)"),
        }
    }
}

/// Configuration for [`crate::Reflector`].
///
/// Cheap to clone: closures live behind `Arc`s, so adapters can tweak a field and call
/// `Reflector::set_options` without reallocating them.
pub struct ReflectorOptions<K> {
    /// When disabled, notifications are not applied and the mirror is rebuilt on re-enable.
    pub enabled: bool,
    /// Rows kept loaded beyond each viewport edge.
    pub buffer_size: usize,
    /// Maximum number of released view handles kept for reuse.
    pub pool_size: usize,
    /// Deepest loaded level (top-level rows have depth 1). `None` loads every level.
    pub max_depth: Option<usize>,
    pub recycling: RecyclingMode,
    pub size_hint: SizeHintStrategy<K>,
    /// Horizontal offset per depth level.
    pub indentation: u32,
    /// Border decoration applied to every row.
    pub decoration: Decoration,
    pub initial_viewport: Option<Size>,
    pub initial_offset: InitialOffset,
    /// Shift the scroll offset when a row above it changes size, so the content on screen does
    /// not jump.
    pub adjust_scroll_on_resize: bool,
    pub on_change: Option<OnChangeCallback>,
}

impl<K> Clone for ReflectorOptions<K> {
    fn clone(&self) -> Self {
        Self {
            enabled: self.enabled,
            buffer_size: self.buffer_size,
            pool_size: self.pool_size,
            max_depth: self.max_depth,
            recycling: self.recycling,
            size_hint: self.size_hint.clone(),
            indentation: self.indentation,
            decoration: self.decoration,
            initial_viewport: self.initial_viewport,
            initial_offset: self.initial_offset.clone(),
            adjust_scroll_on_resize: self.adjust_scroll_on_resize,
            on_change: self.on_change.clone(),
        }
    }
}

impl<K> Default for ReflectorOptions<K> {
    fn default() -> Self {
        Self::new(SizeHintStrategy::default())
    }
}

impl<K> ReflectorOptions<K> {
    pub fn new(size_hint: SizeHintStrategy<K>) -> Self {
        Self {
            enabled: true,
            buffer_size: 2,
            pool_size: 16,
            max_depth: None,
            recycling: RecyclingMode::default(),
            size_hint,
            indentation: 0,
            decoration: Decoration::default(),
            initial_viewport: None,
            initial_offset: InitialOffset::default(),
            adjust_scroll_on_resize: true,
            on_change: None,
        }
    }

    /// Options for rows of a fixed height.
    pub fn uniform(row_height: u32) -> Self {
        Self::new(SizeHintStrategy::Uniform(Size::new(0, row_height)))
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_recycling(mut self, recycling: RecyclingMode) -> Self {
        self.recycling = recycling;
        self
    }

    pub fn with_size_hint(mut self, size_hint: SizeHintStrategy<K>) -> Self {
        self.size_hint = size_hint;
        self
    }

    pub fn with_indentation(mut self, indentation: u32) -> Self {
        self.indentation = indentation;
        self
    }

    pub fn with_decoration(mut self, decoration: Decoration) -> Self {
        self.decoration = decoration;
        self
    }

    pub fn with_initial_viewport(mut self, initial_viewport: Option<Size>) -> Self {
        self.initial_viewport = initial_viewport;
        self
    }

    pub fn with_initial_offset_value(mut self, initial_offset: i64) -> Self {
        self.initial_offset = InitialOffset::Value(initial_offset);
        self
    }

    pub fn with_initial_offset_provider(
        mut self,
        initial_offset: impl Fn() -> i64 + Send + Sync + 'static,
    ) -> Self {
        self.initial_offset = InitialOffset::Provider(Arc::new(initial_offset));
        self
    }

    pub fn with_adjust_scroll_on_resize(mut self, adjust: bool) -> Self {
        self.adjust_scroll_on_resize = adjust;
        self
    }

    pub fn with_on_change(
        mut self,
        on_change: Option<impl Fn(ReflectorEvent) + Send + Sync + 'static>,
    ) -> Self {
        self.on_change = on_change.map(|f| Arc::new(f) as OnChangeCallback);
        self
    }

    /// Whether a row at `depth` may be loaded.
    pub(crate) fn loads_depth(&self, depth: usize) -> bool {
        self.max_depth.is_none_or(|max| depth <= max)
    }

    /// Pool bucket of a handle created for `depth`; `None` when recycling is off.
    pub(crate) fn recycling_bucket(&self, depth: usize) -> Option<usize> {
        match self.recycling {
            RecyclingMode::None => None,
            RecyclingMode::PerDepth => Some(depth),
            RecyclingMode::Global => Some(0),
        }
    }
}

impl<K> core::fmt::Debug for ReflectorOptions<K> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ReflectorOptions")
            .field("enabled", &self.enabled)
            .field("buffer_size", &self.buffer_size)
            .field("pool_size", &self.pool_size)
            .field("max_depth", &self.max_depth)
            .field("recycling", &self.recycling)
            .field("size_hint", &self.size_hint)
            .field("indentation", &self.indentation)
            .field("decoration", &self.decoration)
            .field("initial_viewport", &self.initial_viewport)
            .field("initial_offset", &self.initial_offset)
            .field("adjust_scroll_on_resize", &self.adjust_scroll_on_resize)
            .finish_non_exhaustive()
    }
}
