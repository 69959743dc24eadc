use alloc::sync::Arc;

use crate::{Role, Size, TreeSource};

/// Where a row's size comes from.
///
/// The engine asks the strategy once, the first time layout needs the size of a row, and caches
/// the answer in the row's geometry until it is explicitly invalidated.
pub enum SizeHintStrategy<K> {
    /// Every row has the same size.
    Uniform(Size),
    /// Evaluated eagerly as soon as a row is attached to the mirror.
    AheadOfTime(Arc<dyn Fn(&K) -> Size + Send + Sync>),
    /// `estimate` is used until the row is materialized, then the factory measures the handle.
    JustInTime { estimate: Size },
    /// An external size-hint function, consulted lazily.
    Proxy {
        hint: Arc<dyn Fn(&K) -> Option<Size> + Send + Sync>,
        fallback: Size,
    },
    /// Read from a data role of the source. `data_changed` on that role invalidates the size.
    Role { role: Role, fallback: Size },
}

impl<K> SizeHintStrategy<K> {
    pub fn ahead_of_time(f: impl Fn(&K) -> Size + Send + Sync + 'static) -> Self {
        Self::AheadOfTime(Arc::new(f))
    }

    pub fn proxy(hint: impl Fn(&K) -> Option<Size> + Send + Sync + 'static, fallback: Size) -> Self {
        Self::Proxy {
            hint: Arc::new(hint),
            fallback,
        }
    }

    pub(crate) fn is_ahead_of_time(&self) -> bool {
        matches!(self, Self::AheadOfTime(_))
    }

    pub(crate) fn is_just_in_time(&self) -> bool {
        matches!(self, Self::JustInTime { .. })
    }

    /// Whether a change of `roles` invalidates sizes produced by this strategy.
    pub(crate) fn depends_on(&self, roles: &[Role]) -> bool {
        match self {
            Self::Role { role, .. } => roles.is_empty() || roles.contains(role),
            _ => false,
        }
    }

    /// Resolves the size of `key` without a materialized handle.
    pub(crate) fn resolve(&self, key: &K, source: Option<&dyn TreeSource<K>>) -> Size {
        match self {
            Self::Uniform(size) => *size,
            Self::AheadOfTime(f) => f(key),
            Self::JustInTime { estimate } => *estimate,
            Self::Proxy { hint, fallback } => hint(key).unwrap_or(*fallback),
            Self::Role { role, fallback } => source
                .and_then(|s| s.size_hint(key, *role))
                .unwrap_or(*fallback),
        }
    }

    pub(crate) fn same_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Uniform(a), Self::Uniform(b)) => a == b,
            (Self::AheadOfTime(a), Self::AheadOfTime(b)) => Arc::ptr_eq(a, b),
            (Self::JustInTime { estimate: a }, Self::JustInTime { estimate: b }) => a == b,
            (
                Self::Proxy {
                    hint: a,
                    fallback: fa,
                },
                Self::Proxy {
                    hint: b,
                    fallback: fb,
                },
            ) => Arc::ptr_eq(a, b) && fa == fb,
            (
                Self::Role {
                    role: a,
                    fallback: fa,
                },
                Self::Role {
                    role: b,
                    fallback: fb,
                },
            ) => a == b && fa == fb,
            _ => false,
        }
    }
}

impl<K> Default for SizeHintStrategy<K> {
    fn default() -> Self {
        Self::Uniform(Size::new(0, 1))
    }
}

impl<K> Clone for SizeHintStrategy<K> {
    fn clone(&self) -> Self {
        match self {
            Self::Uniform(size) => Self::Uniform(*size),
            Self::AheadOfTime(f) => Self::AheadOfTime(Arc::clone(f)),
            Self::JustInTime { estimate } => Self::JustInTime {
                estimate: *estimate,
            },
            Self::Proxy { hint, fallback } => Self::Proxy {
                hint: Arc::clone(hint),
                fallback: *fallback,
            },
            Self::Role { role, fallback } => Self::Role {
                role: *role,
                fallback: *fallback,
            },
        }
    }
}

impl<K> core::fmt::Debug for SizeHintStrategy<K> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Uniform(size) => f.debug_tuple("Uniform").field(size).finish(),
            Self::AheadOfTime(_) => f.write_str("AheadOfTime(..)"),
            Self::JustInTime { estimate } => f
                .debug_struct("JustInTime")
                .field("estimate", estimate)
                .finish(),
            Self::Proxy { fallback, .. } => f
                .debug_struct("Proxy")
                .field("fallback", fallback)
                .finish_non_exhaustive(),
            Self::Role { role, fallback } => f
                .debug_struct("Role")
                .field("role", role)
                .field("fallback", fallback)
                .finish(),
        }
    }
}
