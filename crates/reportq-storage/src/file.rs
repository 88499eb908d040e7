//! File-backed queue backend
//!
//! Durable queue that mirrors its state to a directory tree, one JSON
//! file per item:
//!
//! ```text
//! <queue_dir>/
//!   pending/<item_id>.json
//!   completed/<item_id>.json      (unless delete_completed)
//!   failed/<item_id>.json
//! ```
//!
//! The in-memory index mirrors disk for fast queries. Files are written
//! to a `.tmp` sibling and renamed into place, so a reader never sees a
//! torn item. On open, `pending/` and `failed/` are rehydrated; items
//! persisted mid-delivery (PROCESSING) are reset to PENDING while they
//! have retry budget left and moved to FAILED otherwise, and
//! unparseable files are skipped with a warning. Completed archives are
//! left on disk but not re-indexed.
//!
//! The directory tree is owned by exactly one `FileQueue` instance at a
//! time; there is no cross-process locking.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use reportq_types::{
    Error, QueueConfig, QueueItem, QueueItemStatus, QueueStats, QueueSummary, Result,
};
use tracing::{debug, info, warn};

use crate::index::QueueIndex;
use crate::traits::QueueStore;

const PENDING_DIR: &str = "pending";
const COMPLETED_DIR: &str = "completed";
const FAILED_DIR: &str = "failed";

/// File-backed queue implementation
pub struct FileQueue {
    root: PathBuf,
    pending_dir: PathBuf,
    completed_dir: PathBuf,
    failed_dir: PathBuf,
    config: QueueConfig,
    index: Mutex<QueueIndex>,
}

impl FileQueue {
    /// Open (or create) a queue at the given directory and rehydrate
    /// its state from disk.
    pub fn open(dir: impl Into<PathBuf>, config: QueueConfig) -> Result<Self> {
        let root = dir.into();
        let pending_dir = root.join(PENDING_DIR);
        let completed_dir = root.join(COMPLETED_DIR);
        let failed_dir = root.join(FAILED_DIR);

        fs::create_dir_all(&pending_dir)?;
        fs::create_dir_all(&completed_dir)?;
        fs::create_dir_all(&failed_dir)?;

        let queue = Self {
            root,
            pending_dir,
            completed_dir,
            failed_dir,
            config,
            index: Mutex::new(QueueIndex::new()),
        };
        queue.load()?;

        let index = queue.index.lock();
        info!(
            folder = %queue.root.display(),
            pending = index.count_by_status(QueueItemStatus::Pending),
            failed = index.count_by_status(QueueItemStatus::Failed),
            "File queue opened"
        );
        drop(index);

        Ok(queue)
    }

    /// Total number of indexed items (any status)
    pub fn size(&self) -> usize {
        self.index.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Backing directory of this queue
    pub fn folder(&self) -> &Path {
        &self.root
    }

    // ==================== Disk layout ====================

    fn load(&self) -> Result<()> {
        let mut loaded = self.read_dir_items(&self.pending_dir)?;

        // Items persisted as PROCESSING are crash leftovers. With budget
        // left they go back to the worker, keeping their persisted attempt
        // count; an item interrupted on its final attempt has none, so it
        // goes straight to failed.
        for item in &mut loaded {
            if !item.is_processing() {
                continue;
            }
            if item.can_retry() {
                item.reset_to_pending().ok();
                self.write_item(&self.pending_dir, item)?;
                debug!(item_id = %item.id, "Recovered mid-delivery item to pending");
            } else {
                let reason = item
                    .last_error
                    .clone()
                    .unwrap_or_else(|| "delivery interrupted".to_string());
                item.mark_failed(reason).ok();
                self.write_item(&self.failed_dir, item)?;
                self.remove_item_file(&self.pending_dir, &item.id)?;
                warn!(
                    item_id = %item.id,
                    attempts = item.attempts,
                    "Recovered item out of retry budget, moved to failed"
                );
            }
        }

        let mut failed = self.read_dir_items(&self.failed_dir)?;
        loaded.append(&mut failed);

        // Oldest first, so the availability view preserves FIFO across restarts.
        loaded.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        let mut index = self.index.lock();
        for item in loaded {
            index.upsert(item);
        }
        Ok(())
    }

    fn read_dir_items(&self, dir: &Path) -> Result<Vec<QueueItem>> {
        let mut items = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match fs::read(&path).map_err(Error::from).and_then(|bytes| {
                serde_json::from_slice::<QueueItem>(&bytes).map_err(Error::from)
            }) {
                Ok(item) => items.push(item),
                Err(err) => {
                    warn!(file = %path.display(), %err, "Skipping unreadable item file");
                }
            }
        }
        Ok(items)
    }

    fn item_path(&self, dir: &Path, id: &str) -> PathBuf {
        dir.join(format!("{}.json", file_stem(id)))
    }

    /// Write an item file atomically (temp file + rename).
    fn write_item(&self, dir: &Path, item: &QueueItem) -> Result<()> {
        let path = self.item_path(dir, &item.id);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(item)?;
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove_item_file(&self, dir: &Path, id: &str) -> Result<()> {
        match fs::remove_file(self.item_path(dir, id)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn dir_for_status(&self, status: QueueItemStatus) -> &Path {
        match status {
            QueueItemStatus::Completed => &self.completed_dir,
            QueueItemStatus::Failed => &self.failed_dir,
            _ => &self.pending_dir,
        }
    }

    /// Status-driven file placement behind `update`.
    fn apply_update(&self, index: &mut QueueIndex, item: &QueueItem) -> Result<()> {
        match item.status {
            QueueItemStatus::Completed => {
                if self.config.delete_completed {
                    self.remove_item_file(&self.pending_dir, &item.id)?;
                    index.remove(&item.id);
                    debug!(item_id = %item.id, "Completed item deleted");
                } else {
                    self.write_item(&self.completed_dir, item)?;
                    self.remove_item_file(&self.pending_dir, &item.id)?;
                    index.upsert(item.clone());
                    debug!(item_id = %item.id, "Item archived to completed");
                }
            }
            QueueItemStatus::Failed => {
                // Final attempts count and error travel with the file.
                self.write_item(&self.failed_dir, item)?;
                self.remove_item_file(&self.pending_dir, &item.id)?;
                index.upsert(item.clone());
                debug!(item_id = %item.id, attempts = item.attempts, "Item moved to failed");
            }
            _ => {
                self.write_item(&self.pending_dir, item)?;
                // A failed item revived by hand leaves a stale failed file.
                self.remove_item_file(&self.failed_dir, &item.id)?;
                index.upsert(item.clone());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl QueueStore for FileQueue {
    // ==================== Item Operations ====================

    async fn add(&self, item: QueueItem) -> Result<QueueItem> {
        let mut index = self.index.lock();

        if self.config.max_size > 0 && index.len() >= self.config.max_size {
            return Err(Error::QueueFull(self.config.max_size));
        }
        if index.contains(&item.id) {
            return Err(Error::DuplicateItem(item.id.clone()));
        }

        // Write-then-index: a failed write surfaces to the caller and
        // leaves the index untouched, so memory and disk never diverge.
        self.write_item(&self.pending_dir, &item)?;
        index.upsert(item.clone());
        debug!(item_id = %item.id, "Item persisted to pending");
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

        let result = self.apply_update(&mut index, item);
        // A failed write leaves the indexed copy untouched, but the
        // caller's claim already popped the id from the availability
        // view; put it back so the item is offered again. Terminal
        // updates are not re-offered.
        if result.is_err()
            && !item.status.is_terminal()
            && index.get(&item.id).is_some_and(|i| i.is_available())
        {
            index.enqueue(item.id.clone());
        }
        result
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        let mut index = self.index.lock();
        match index.remove(id) {
            Some(item) => {
                self.remove_item_file(self.dir_for_status(item.status), id)?;
                debug!(item_id = %id, "Item removed");
                Ok(true)
            }
            None => Ok(false),
        }
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
            folder: self.root.display().to_string(),
        })
    }

    // ==================== Administration ====================

    async fn clear(&self, status: Option<QueueItemStatus>) -> Result<usize> {
        let mut index = self.index.lock();
        let removed = index.drain(status);
        for item in &removed {
            self.remove_item_file(self.dir_for_status(item.status), &item.id)?;
        }
        info!(count = removed.len(), "Queue cleared");
        Ok(removed.len())
    }

    async fn retry_failed(&self, id: &str) -> Result<bool> {
        let mut index = self.index.lock();
        let Some(item) = index.get(id) else {
            return Ok(false);
        };
        if !item.is_failed() {
            return Ok(false);
        }

        let mut revived = item.clone();
        revived.reset_for_retry();

        self.write_item(&self.pending_dir, &revived)?;
        self.remove_item_file(&self.failed_dir, id)?;
        index.upsert(revived);
        info!(item_id = %id, "Failed item reset for retry");
        Ok(true)
    }
}

/// Filesystem-safe stem for an item id. The JSON `id` field is
/// authoritative; the filename is only a key.
fn file_stem(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
