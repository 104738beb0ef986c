//! In-memory index of the most recent history summaries.

use std::collections::VecDeque;

use fitscout_shared::{HistoryId, HistorySummary};

/// Newest-first list of history summaries, capped at `limit` entries.
#[derive(Debug, Clone)]
pub struct HistoryIndex {
    limit: usize,
    entries: VecDeque<HistorySummary>,
}

impl HistoryIndex {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            entries: VecDeque::new(),
        }
    }

    /// Seed from summaries already sorted newest first.
    pub fn with_entries(limit: usize, entries: Vec<HistorySummary>) -> Self {
        let mut entries: VecDeque<_> = entries.into();
        entries.truncate(limit);
        Self { limit, entries }
    }

    /// Record a new summary, evicting the oldest past the limit.
    pub fn push(&mut self, summary: HistorySummary) {
        self.entries.push_front(summary);
        self.entries.truncate(self.limit);
    }

    pub fn remove(&mut self, id: &HistoryId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != *id);
        before != self.entries.len()
    }

    pub fn list(&self) -> Vec<HistorySummary> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
