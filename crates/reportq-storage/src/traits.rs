//! Queue store trait definition
//!
//! Defines the interface that all queue backends must implement.

use async_trait::async_trait;
use reportq_types::{QueueItem, QueueItemStatus, QueueStats, QueueSummary, Result};

/// Queue store trait - all backends implement this
///
/// Implementations guard their in-memory index (and any corresponding
/// file operations) with a single queue-wide lock, held only for the
/// duration of the mutation.
#[async_trait]
pub trait QueueStore: Send + Sync {
    // ==================== Item Operations ====================

    /// Insert a new item in PENDING state
    async fn add(&self, item: QueueItem) -> Result<QueueItem>;

    /// Get an item by id
    async fn get(&self, id: &str) -> Result<Option<QueueItem>>;

    /// Claim the oldest available item (FIFO), or None if nothing is ready.
    ///
    /// A claimed item is removed from the availability view until it is
    /// re-enqueued through `update`, so two concurrent callers can never
    /// claim the same item.
    async fn get_next(&self) -> Result<Option<QueueItem>>;

    /// Claim up to `max` available items at once
    async fn get_next_batch(&self, max: usize) -> Result<Vec<QueueItem>>;

    /// Write back an item's state; re-enqueues it if it became available
    async fn update(&self, item: &QueueItem) -> Result<()>;

    /// Remove an item entirely; false if it does not exist
    async fn remove(&self, id: &str) -> Result<bool>;

    // ==================== Queries ====================

    /// List all items with the given status
    async fn list_by_status(&self, status: QueueItemStatus) -> Result<Vec<QueueItem>>;

    /// Count items with the given status
    async fn count_by_status(&self, status: QueueItemStatus) -> Result<usize>;

    /// Per-status counts plus total
    async fn stats(&self) -> Result<QueueStats>;

    /// Cheap operator summary (pending, failed, backing folder)
    async fn summary(&self) -> Result<QueueSummary>;

    // ==================== Administration ====================

    /// Remove all items, optionally filtered by status; returns count removed
    async fn clear(&self, status: Option<QueueItemStatus>) -> Result<usize>;

    /// Give a FAILED item a fresh retry budget and return it to PENDING.
    ///
    /// Returns false if no failed item with that id exists.
    async fn retry_failed(&self, id: &str) -> Result<bool>;
}
