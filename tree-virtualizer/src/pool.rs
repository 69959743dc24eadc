use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use crate::view_item::ViewId;

/// Recycling pool for released view items plus the deferred destruction queue.
///
/// Released items are only parked here during a dispatch cycle; they become reusable (or are
/// destroyed) when the cycle ends, so no handle is torn down while a caller up the stack may
/// still be looking at it.
#[derive(Clone, Debug, Default)]
pub(crate) struct ViewPool {
    capacity: usize,
    buckets: BTreeMap<usize, Vec<ViewId>>,
    pooled: usize,
    returning: Vec<(ViewId, usize)>,
    doomed: Vec<ViewId>,
}

impl ViewPool {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    /// Number of reusable items.
    pub(crate) fn len(&self) -> usize {
        self.pooled
    }

    pub(crate) fn take(&mut self, bucket: Option<usize>) -> Option<ViewId> {
        let views = self.buckets.get_mut(&bucket?)?;
        let view = views.pop()?;
        self.pooled -= 1;
        Some(view)
    }

    /// Parks a released view when recycling is on and the pool has room.
    pub(crate) fn admit(&mut self, view: ViewId, bucket: Option<usize>) -> bool {
        let Some(bucket) = bucket else {
            return false;
        };
        if self.pooled + self.returning.len() >= self.capacity {
            return false;
        }
        self.returning.push((view, bucket));
        true
    }

    pub(crate) fn doom(&mut self, view: ViewId) {
        self.doomed.push(view);
    }

    pub(crate) fn has_pending(&self) -> bool {
        !self.returning.is_empty() || !self.doomed.is_empty()
    }

    pub(crate) fn drain_returning(&mut self) -> Vec<ViewId> {
        let mut out = Vec::with_capacity(self.returning.len());
        for (view, bucket) in self.returning.drain(..) {
            self.buckets.entry(bucket).or_default().push(view);
            self.pooled += 1;
            out.push(view);
        }
        out
    }

    pub(crate) fn drain_doomed(&mut self) -> Vec<ViewId> {
        core::mem::take(&mut self.doomed)
    }

    /// Removes every reusable item.
    pub(crate) fn drain_all(&mut self) -> Vec<ViewId> {
        let mut out: Vec<ViewId> = self.returning.drain(..).map(|(v, _)| v).collect();
        for (_, views) in core::mem::take(&mut self.buckets) {
            out.extend(views);
        }
        self.pooled = 0;
        out
    }

    /// Shrinks the pool to `capacity`, returning the evicted items.
    pub(crate) fn set_capacity(&mut self, capacity: usize) -> Vec<ViewId> {
        self.capacity = capacity;
        let mut evicted = Vec::new();
        while self.pooled > capacity {
            let Some(views) = self.buckets.values_mut().rev().find(|v| !v.is_empty()) else {
                break;
            };
            if let Some(view) = views.pop() {
                self.pooled -= 1;
                evicted.push(view);
            }
        }
        evicted
    }
}
