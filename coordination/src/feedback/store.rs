//! In-memory feedback queue and history

use tracing::{debug, warn};

use super::types::{FeedbackEntry, FeedbackId};

/// Queue of pending corrections plus the history of distributed ones
#[derive(Debug, Clone)]
pub struct FeedbackStore {
    queue: Vec<FeedbackEntry>,
    history: Vec<FeedbackEntry>,
    /// Soft cap: exceeding it only logs.
    // TODO: oldest-first eviction once callers can tolerate losing undistributed corrections
    max_queue_size: usize,
}

impl FeedbackStore {
    pub fn new(max_queue_size: usize) -> Self {
        Self {
            queue: Vec::new(),
            history: Vec::new(),
            max_queue_size,
        }
    }

    /// Replace the queue with entries loaded from persistence
    pub fn restore(&mut self, queue: Vec<FeedbackEntry>) {
        debug!(entries = queue.len(), "Feedback queue restored");
        self.queue = queue;
    }

    /// Append a new entry to the queue
    pub fn enqueue(&mut self, entry: FeedbackEntry) {
        self.queue.push(entry);
        if self.queue.len() > self.max_queue_size {
            warn!(
                queue_len = self.queue.len(),
                max_queue_size = self.max_queue_size,
                "Feedback queue above soft cap; nothing is evicted"
            );
        }
    }

    /// Look up a queued entry. Distributed entries are not found here.
    pub fn queued(&self, id: &str) -> Option<&FeedbackEntry> {
        self.queue.iter().find(|e| e.id == id)
    }

    /// Remove a queued entry so its hooks can run without the store.
    /// A taken entry is no longer `queued` and is not persisted until archived.
    pub fn take_queued(&mut self, id: &str) -> Option<FeedbackEntry> {
        let pos = self.queue.iter().position(|e| e.id == id)?;
        Some(self.queue.remove(pos))
    }

    /// Record deliveries, set `processed`, and append to history
    pub fn archive(&mut self, mut entry: FeedbackEntry, delivered: &[String]) -> FeedbackEntry {
        for engine in delivered {
            entry.mark_distributed(engine);
        }
        entry.processed = true;
        self.history.push(entry.clone());
        entry
    }

    /// Take and archive in one step. Returns `None` if `id` is not queued.
    pub fn complete(&mut self, id: &str, delivered: &[String]) -> Option<FeedbackEntry> {
        let entry = self.take_queued(id)?;
        Some(self.archive(entry, delivered))
    }

    /// Drop every queued entry, returning them
    pub fn clear_queue(&mut self) -> Vec<FeedbackEntry> {
        std::mem::take(&mut self.queue)
    }

    pub fn queue(&self) -> &[FeedbackEntry] {
        &self.queue
    }

    pub fn history(&self) -> &[FeedbackEntry] {
        &self.history
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn queued_ids(&self) -> Vec<FeedbackId> {
        self.queue.iter().map(|e| e.id.clone()).collect()
    }
}

impl Default for FeedbackStore {
    fn default() -> Self {
        Self::new(10_000)
    }
}
