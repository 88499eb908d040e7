//! Shared in-memory index used by both queue backends
//!
//! Items live in a map keyed by id; a deque of ids is the FIFO
//! availability view. The deque may hold stale ids (removed items,
//! items already claimed or no longer available) - `next_available`
//! skips those lazily. Claiming pops the id, which is what makes a
//! claim exclusive.

use std::collections::{HashMap, VecDeque};

use reportq_types::{QueueItem, QueueItemStatus, QueueStats};

#[derive(Default)]
pub(crate) struct QueueIndex {
    items: HashMap<String, QueueItem>,
    available: VecDeque<String>,
}

impl QueueIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&QueueItem> {
        self.items.get(id)
    }

    /// Insert or write back an item; (re-)enqueue it if it is available.
    pub fn upsert(&mut self, item: QueueItem) {
        let id = item.id.clone();
        let available = item.is_available();
        self.items.insert(id.clone(), item);
        if available {
            self.enqueue(id);
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<QueueItem> {
        // The deque entry, if any, goes stale and is skipped later.
        self.items.remove(id)
    }

    /// Pop the oldest available item, skipping stale deque entries.
    pub fn next_available(&mut self) -> Option<QueueItem> {
        while let Some(id) = self.available.pop_front() {
            match self.items.get(&id) {
                Some(item) if item.is_available() => return Some(item.clone()),
                _ => continue,
            }
        }
        None
    }

    pub fn list_by_status(&self, status: QueueItemStatus) -> Vec<QueueItem> {
        let mut items: Vec<QueueItem> = self
            .items
            .values()
            .filter(|i| i.status == status)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        items
    }

    pub fn count_by_status(&self, status: QueueItemStatus) -> usize {
        self.items.values().filter(|i| i.status == status).count()
    }

    pub fn stats(&self) -> QueueStats {
        let mut stats = QueueStats::default();
        for item in self.items.values() {
            match item.status {
                QueueItemStatus::Pending => stats.pending += 1,
                QueueItemStatus::Processing => stats.processing += 1,
                QueueItemStatus::Completed => stats.completed += 1,
                QueueItemStatus::Failed => stats.failed += 1,
                QueueItemStatus::Suspended => stats.suspended += 1,
            }
        }
        stats.total = self.items.len();
        stats
    }

    /// Remove all items, or all items with the given status.
    /// Returns the removed items so the durable backend can delete files.
    pub fn drain(&mut self, status: Option<QueueItemStatus>) -> Vec<QueueItem> {
        match status {
            None => {
                self.available.clear();
                self.items.drain().map(|(_, item)| item).collect()
            }
            Some(status) => {
                let ids: Vec<String> = self
                    .items
                    .values()
                    .filter(|i| i.status == status)
                    .map(|i| i.id.clone())
                    .collect();
                ids.iter()
                    .filter_map(|id| self.items.remove(id))
                    .collect()
            }
        }
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut QueueItem> {
        self.items.get_mut(id)
    }

    /// Put an id back at the tail of the availability view.
    pub fn enqueue(&mut self, id: String) {
        if !self.available.contains(&id) {
            self.available.push_back(id);
        }
    }
}
