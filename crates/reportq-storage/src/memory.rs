//! In-memory queue backend
//!
//! Fast, non-durable queue for development and testing.
//! All items are lost when the process exits.

use async_trait::async_trait;
use parking_lot::Mutex;
use reportq_types::{
    Error, QueueConfig, QueueItem, QueueItemStatus, QueueStats, QueueSummary, Result,
};
use tracing::{debug, info};

use crate::index::QueueIndex;
use crate::traits::QueueStore;

/// In-memory queue implementation
pub struct MemoryQueue {
    config: QueueConfig,
    index: Mutex<QueueIndex>,
}

impl MemoryQueue {
    /// Create a new in-memory queue
    pub fn new(config: QueueConfig) -> Self {
        info!(max_size = config.max_size, "Initializing in-memory queue");
        Self {
            config,
            index: Mutex::new(QueueIndex::new()),
        }
    }

    /// Total number of items held (any status)
    pub fn size(&self) -> usize {
        self.index.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new(QueueConfig::default())
    }
}

#[async_trait]
impl QueueStore for MemoryQueue {
    // ==================== Item Operations ====================

    async fn add(&self, item: QueueItem) -> Result<QueueItem> {
        let mut index = self.index.lock();

        if self.config.max_size > 0 && index.len() >= self.config.max_size {
            return Err(Error::QueueFull(self.config.max_size));
        }
        if index.contains(&item.id) {
            return Err(Error::DuplicateItem(item.id.clone()));
        }

        index.upsert(item.clone());
        debug!(item_id = %item.id, "Item added");
        Ok(item)
    }

    async fn get(&self, id: &str) -> Result<Option<QueueItem>> {
        Ok(self.index.lock().get(id).cloned())
    }

    async fn get_next(&self) -> Result<Option<QueueItem>> {
        Ok(self.index.lock().next_available())
    }

    async fn get_next_batch(&self, max: usize) -> Result<Vec<QueueItem>> {
        let mut index = self.index.lock();
        let mut items = Vec::new();
        while items.len() < max {
            match index.next_available() {
                Some(item) => items.push(item),
                None => break,
            }
        }
        Ok(items)
    }

    async fn update(&self, item: &QueueItem) -> Result<()> {
        let mut index = self.index.lock();
        if !index.contains(&item.id) {
            return Err(Error::ItemNotFound(item.id.clone()));
        }
        index.upsert(item.clone());
        debug!(item_id = %item.id, status = %item.status, "Item updated");
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        let removed = self.index.lock().remove(id).is_some();
        if removed {
            debug!(item_id = %id, "Item removed");
        }
        Ok(removed)
    }

    // ==================== Queries ====================

    async fn list_by_status(&self, status: QueueItemStatus) -> Result<Vec<QueueItem>> {
        Ok(self.index.lock().list_by_status(status))
    }

    async fn count_by_status(&self, status: QueueItemStatus) -> Result<usize> {
        Ok(self.index.lock().count_by_status(status))
    }

    async fn stats(&self) -> Result<QueueStats> {
        Ok(self.index.lock().stats())
    }

    async fn summary(&self) -> Result<QueueSummary> {
        let index = self.index.lock();
        Ok(QueueSummary {
            pending: index.count_by_status(QueueItemStatus::Pending),
            failed: index.count_by_status(QueueItemStatus::Failed),
            folder: "memory".to_string(),
        })
    }

    // ==================== Administration ====================

    async fn clear(&self, status: Option<QueueItemStatus>) -> Result<usize> {
        let removed = self.index.lock().drain(status).len();
        info!(count = removed, "Queue cleared");
        Ok(removed)
    }

    async fn retry_failed(&self, id: &str) -> Result<bool> {
        let mut index = self.index.lock();
        match index.get_mut(id) {
            Some(item) if item.is_failed() => {
                item.reset_for_retry();
                index.enqueue(id.to_string());
                info!(item_id = %id, "Failed item reset for retry");
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
