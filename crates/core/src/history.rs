use crate::config::DEFAULT_HISTORY_LIMIT;
use doc_model::AnnotationSet;
use std::collections::VecDeque;

/// Linear undo stack of whole annotation-set snapshots, each taken just
/// before a mutation. There is no redo.
#[derive(Debug, Clone)]
pub struct History {
    snapshots: VecDeque<AnnotationSet>,
    limit: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl History {
    pub fn new(limit: usize) -> Self {
        Self { snapshots: VecDeque::new(), limit: limit.max(1) }
    }

    /// Records `snapshot`, dropping the oldest one when the stack is full.
    pub fn push(&mut self, snapshot: AnnotationSet) {
        if self.snapshots.len() == self.limit {
            self.snapshots.pop_front();
        }
        self.snapshots.push_back(snapshot);
    }

    pub fn pop(&mut self) -> Option<AnnotationSet> {
        self.snapshots.pop_back()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}
