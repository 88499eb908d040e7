//! ReportQueueService - Administrative surface and worker lifecycle
//!
//! The service is the single entry point an application talks to: it
//! accepts payloads, exposes queue inspection, and owns the submission
//! worker task. Storage backend, transport, and connectivity signal are
//! all injected, so the same facade runs over a memory queue in tests
//! and a file queue in production.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use reportq_storage::QueueStore;
use reportq_types::{QueueConfig, QueueItem, QueueItemStatus, QueueStats, QueueSummary, Result};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::connection::ConnectionObserver;
use crate::transport::Transport;
use crate::worker::SubmissionWorker;

/// Queue facade owning the background worker
pub struct ReportQueueService {
    store: Arc<dyn QueueStore>,
    transport: Arc<dyn Transport>,
    connection: Arc<dyn ConnectionObserver>,
    config: QueueConfig,
    wake: Arc<Notify>,
    shutdown_tx: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ReportQueueService {
    pub fn new(
        store: Arc<dyn QueueStore>,
        transport: Arc<dyn Transport>,
        connection: Arc<dyn ConnectionObserver>,
        config: QueueConfig,
    ) -> Self {
        info!("Initializing report queue service");
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            store,
            transport,
            connection,
            config,
            wake: Arc::new(Notify::new()),
            shutdown_tx,
            worker: Mutex::new(None),
        }
    }

    /// Access the underlying store, for inspection beyond the admin surface
    pub fn store(&self) -> &dyn QueueStore {
        self.store.as_ref()
    }

    // ==================== Submission ====================

    /// Queue a payload for delivery.
    ///
    /// Returns true once the item is safely in the queue. A false
    /// return means the payload was NOT accepted (queue full, storage
    /// error) and the caller still owns it; the reason is logged.
    pub async fn submit(&self, payload: impl Into<bytes::Bytes>) -> bool {
        let item = QueueItem::new(payload).with_max_attempts(self.config.default_max_attempts);
        match self.enqueue(item).await {
            Ok(_) => true,
            Err(err) => {
                error!(%err, "Failed to queue payload");
                false
            }
        }
    }

    /// Queue a prebuilt item, keeping its id and metadata
    pub async fn enqueue(&self, item: QueueItem) -> Result<QueueItem> {
        let item = self.store.add(item).await?;
        info!(item_id = %item.id, "Item queued");
        self.wake.notify_one();
        Ok(item)
    }

    // ==================== Inspection ====================

    /// Pending/failed counts plus the storage location
    pub async fn get_status(&self) -> Result<QueueSummary> {
        self.store.summary().await
    }

    /// Items still awaiting delivery, oldest first
    pub async fn get_pending_reports(&self) -> Result<Vec<QueueItem>> {
        self.store.list_by_status(QueueItemStatus::Pending).await
    }

    /// Per-status counts
    pub async fn stats(&self) -> Result<QueueStats> {
        self.store.stats().await
    }

    /// Look up a single item by id
    pub async fn get(&self, id: &str) -> Result<Option<QueueItem>> {
        self.store.get(id).await
    }

    // ==================== Recovery ====================

    /// Give a failed item a fresh attempt budget and requeue it.
    ///
    /// Returns true if the item was requeued; false if it does not
    /// exist, is not failed, or storage refused the change.
    pub async fn retry_failed(&self, id: &str) -> bool {
        match self.store.retry_failed(id).await {
            Ok(true) => {
                info!(item_id = %id, "Failed item requeued");
                self.wake.notify_one();
                true
            }
            Ok(false) => {
                warn!(item_id = %id, "Item not eligible for retry");
                false
            }
            Err(err) => {
                error!(item_id = %id, %err, "Failed to requeue item");
                false
            }
        }
    }

    /// Remove items, optionally only those with the given status
    pub async fn clear(&self, status: Option<QueueItemStatus>) -> Result<usize> {
        self.store.clear(status).await
    }

    // ==================== Worker lifecycle ====================

    /// Start the background worker. No-op if it is already running.
    pub fn start(&self) {
        let mut worker = self.worker.lock();
        if let Some(handle) = worker.as_ref() {
            if !handle.is_finished() {
                return;
            }
        }

        self.shutdown_tx.send_replace(false);
        let task = SubmissionWorker::new(
            Arc::clone(&self.store),
            Arc::clone(&self.transport),
            Arc::clone(&self.connection),
            Duration::from_secs(self.config.retry_interval_secs),
            Arc::clone(&self.wake),
            self.shutdown_tx.subscribe(),
        );
        *worker = Some(tokio::spawn(task.run()));
    }

    /// Stop the background worker and wait for it to exit.
    ///
    /// An in-flight delivery is allowed to finish first. Queued items
    /// stay queued; a later `start` resumes where it left off.
    pub async fn stop(&self) {
        let handle = self.worker.lock().take();
        let Some(handle) = handle else {
            return;
        };

        self.shutdown_tx.send_replace(true);
        if let Err(err) = handle.await {
            error!(%err, "Worker task panicked");
        }
    }

    /// Whether the background worker is currently running
    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ConnectionState, ConnectionStatus};
    use crate::transport::TransportError;
    use async_trait::async_trait;
    use bytes::Bytes;
    use reportq_storage::{FileQueue, MemoryQueue};
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use tokio::time::sleep;

    /// Transport whose failure mode can be flipped at runtime.
    struct ToggleTransport {
        failing: AtomicBool,
        calls: AtomicU32,
    }

    impl ToggleTransport {
        fn new(failing: bool) -> Self {
            Self {
                failing: AtomicBool::new(failing),
                calls: AtomicU32::new(0),
            }
        }

        fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for ToggleTransport {
        async fn submit(&self, _payload: &Bytes) -> std::result::Result<String, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                Err(TransportError::Network("server unreachable".into()))
            } else {
                Ok("remote-1".into())
            }
        }
    }

    fn fast_config() -> QueueConfig {
        // retry_interval_secs floors at the worker minimum (100ms)
        QueueConfig {
            retry_interval_secs: 0,
            ..QueueConfig::default()
        }
    }

    fn memory_service(
        transport: Arc<ToggleTransport>,
    ) -> (ReportQueueService, Arc<ConnectionState>) {
        let connection = Arc::new(ConnectionState::new(ConnectionStatus::Online));
        let service = ReportQueueService::new(
            Arc::new(MemoryQueue::new(fast_config())),
            transport,
            Arc::clone(&connection) as Arc<dyn ConnectionObserver>,
            fast_config(),
        );
        (service, connection)
    }

    async fn wait_for_count(
        service: &ReportQueueService,
        status: QueueItemStatus,
        count: usize,
    ) {
        for _ in 0..200 {
            if service.store().count_by_status(status).await.unwrap() == count {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("queue never reached {count} {status} item(s)");
    }

    #[tokio::test]
    async fn test_submit_accepts_and_delivers() {
        let transport = Arc::new(ToggleTransport::new(false));
        let (service, _conn) = memory_service(Arc::clone(&transport));
        service.start();

        assert!(service.submit("report body").await);
        wait_for_count(&service, QueueItemStatus::Completed, 1).await;

        assert_eq!(transport.calls(), 1);
        service.stop().await;
    }

    #[tokio::test]
    async fn test_submit_reports_rejection() {
        let transport = Arc::new(ToggleTransport::new(false));
        let connection = Arc::new(ConnectionState::default());
        let service = ReportQueueService::new(
            Arc::new(MemoryQueue::new(QueueConfig {
                max_size: 1,
                ..fast_config()
            })),
            transport,
            connection as Arc<dyn ConnectionObserver>,
            fast_config(),
        );

        assert!(service.submit("first").await);
        assert!(!service.submit("second").await);
    }

    #[tokio::test]
    async fn test_get_status_counts_pending_and_failed() {
        let transport = Arc::new(ToggleTransport::new(true));
        let (service, _conn) = memory_service(Arc::clone(&transport));

        // One item burns through its budget while the worker runs
        service
            .enqueue(QueueItem::new("doomed").with_id("FAIL-1").with_max_attempts(1))
            .await
            .unwrap();
        service.start();
        wait_for_count(&service, QueueItemStatus::Failed, 1).await;
        service.stop().await;

        // Two more arrive while the worker is stopped
        assert!(service.submit("waiting-1").await);
        assert!(service.submit("waiting-2").await);

        let summary = service.get_status().await.unwrap();
        assert_eq!(summary.pending, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.folder, "memory");

        let pending = service.get_pending_reports().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|i| i.is_pending()));
    }

    #[tokio::test]
    async fn test_retry_failed_requeues_and_delivers() {
        let transport = Arc::new(ToggleTransport::new(true));
        let (service, _conn) = memory_service(Arc::clone(&transport));

        service
            .enqueue(QueueItem::new("flaky").with_id("FLAKY-1").with_max_attempts(1))
            .await
            .unwrap();
        service.start();
        wait_for_count(&service, QueueItemStatus::Failed, 1).await;

        // Server recovers; the operator requeues the failed item
        transport.set_failing(false);
        assert!(service.retry_failed("FLAKY-1").await);

        wait_for_count(&service, QueueItemStatus::Completed, 1).await;
        let item = service.get("FLAKY-1").await.unwrap().unwrap();
        assert_eq!(item.attempts, 1);
        assert!(item.last_error.is_none());
        service.stop().await;
    }

    #[tokio::test]
    async fn test_retry_failed_rejects_unknown_and_pending() {
        let transport = Arc::new(ToggleTransport::new(false));
        let (service, _conn) = memory_service(transport);

        assert!(!service.retry_failed("NO-SUCH-ITEM").await);

        service
            .enqueue(QueueItem::new("still pending").with_id("PEND-1"))
            .await
            .unwrap();
        assert!(!service.retry_failed("PEND-1").await);
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let transport = Arc::new(ToggleTransport::new(false));
        let (service, _conn) = memory_service(Arc::clone(&transport));

        service.start();
        service.start();
        service.start();
        assert!(service.is_running());

        assert!(service.submit("only once").await);
        wait_for_count(&service, QueueItemStatus::Completed, 1).await;

        // A second worker would have raced for the same item
        assert_eq!(transport.calls(), 1);
        service.stop().await;
        assert!(!service.is_running());
    }

    #[tokio::test]
    async fn test_stop_then_restart_resumes_backlog() {
        let transport = Arc::new(ToggleTransport::new(false));
        let (service, connection) = memory_service(Arc::clone(&transport));

        // Offline so the backlog survives the first worker
        connection.set_status(ConnectionStatus::Offline);
        service.start();
        assert!(service.submit("held back").await);
        sleep(Duration::from_millis(150)).await;
        service.stop().await;

        assert_eq!(transport.calls(), 0);
        assert_eq!(service.get_status().await.unwrap().pending, 1);

        connection.set_status(ConnectionStatus::Online);
        service.start();
        wait_for_count(&service, QueueItemStatus::Completed, 1).await;
        service.stop().await;
    }

    #[tokio::test]
    async fn test_failed_item_lands_in_failed_folder_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ToggleTransport::new(true));
        let connection = Arc::new(ConnectionState::new(ConnectionStatus::Online));
        let store = Arc::new(FileQueue::open(dir.path(), fast_config()).unwrap());
        let service = ReportQueueService::new(
            store,
            transport,
            connection as Arc<dyn ConnectionObserver>,
            fast_config(),
        );

        service
            .enqueue(QueueItem::new("report").with_id("DISK-1"))
            .await
            .unwrap();
        service.start();
        wait_for_count(&service, QueueItemStatus::Failed, 1).await;
        service.stop().await;

        assert!(dir.path().join("failed").join("DISK-1.json").exists());
        assert!(!dir.path().join("pending").join("DISK-1.json").exists());

        let item = service.get("DISK-1").await.unwrap().unwrap();
        assert_eq!(item.attempts, 3);
        assert!(item.last_error.is_some());
    }
}
