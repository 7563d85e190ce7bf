//! Best-effort editor history: a bounded ring of serialized drafts.

use std::collections::VecDeque;

use crate::model::Layout;

const DEFAULT_CAPACITY: usize = 50;

/// Draft snapshots, oldest dropped past capacity.
///
/// This is intentionally not a full undo system: it only restores whole
/// serialized drafts, and history older than the window is gone.
pub struct HistoryBuffer {
    snapshots: VecDeque<Layout>,
    capacity: usize,
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryBuffer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            snapshots: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Record a draft. Consecutive identical drafts collapse to one entry.
    pub fn push(&mut self, draft: Layout) {
        if self
            .snapshots
            .back()
            .is_some_and(|last| last.elements == draft.elements)
        {
            return;
        }
        self.snapshots.push_back(draft);
        while self.snapshots.len() > self.capacity {
            self.snapshots.pop_front();
        }
    }

    /// Discard the newest draft and return the one before it.
    ///
    /// `None` when there is nothing earlier to restore.
    pub fn undo(&mut self) -> Option<Layout> {
        if self.snapshots.len() < 2 {
            return None;
        }
        self.snapshots.pop_back();
        self.snapshots.back().cloned()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }
}
