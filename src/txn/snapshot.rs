use std::collections::BTreeSet;

use crate::common::PageId;

/// Page bookkeeping of one paged file at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Pages `0..page_count` hold records.
    pub page_count: u32,
    /// Vacated pages at or past `page_count` still waiting for truncation.
    pub deleted: BTreeSet<PageId>,
}

impl Snapshot {
    pub fn new(page_count: u32) -> Self {
        Self {
            page_count,
            deleted: BTreeSet::new(),
        }
    }
}

/// Stack of snapshots giving nested begin/commit/rollback.
///
/// The committed state sits at the bottom and is never popped. `begin`
/// pushes a copy of the current state, `commit` pops the top and makes it the
/// state of the level below, `rollback` pops and discards it.
#[derive(Debug, Clone)]
pub struct SnapshotStack {
    base: Snapshot,
    segments: Vec<Snapshot>,
}

impl SnapshotStack {
    pub fn new(page_count: u32) -> Self {
        Self {
            base: Snapshot::new(page_count),
            segments: Vec::new(),
        }
    }

    pub fn current(&self) -> &Snapshot {
        self.segments.last().unwrap_or(&self.base)
    }

    pub fn current_mut(&mut self) -> &mut Snapshot {
        self.segments.last_mut().unwrap_or(&mut self.base)
    }

    /// Number of open segments.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn begin(&mut self) {
        let top = self.current().clone();
        self.segments.push(top);
    }

    /// Folds the top segment into the level below. No-op without a segment.
    pub fn commit(&mut self) {
        if let Some(top) = self.segments.pop() {
            *self.current_mut() = top;
        }
    }

    /// Discards the top segment. No-op without a segment.
    pub fn rollback(&mut self) {
        self.segments.pop();
    }
}
