//! Submission worker - drains pending items through the transport
//!
//! One worker task per queue. The loop claims the oldest available
//! item, attempts delivery, and applies the retry policy: back to
//! pending while the item has budget left, failed once it is exhausted.
//! Backoff is a fixed interval, not exponential. While the connection
//! is known-offline no delivery is attempted at all; the worker wakes
//! immediately when the status flips to online or when a new item is
//! submitted.

use std::sync::Arc;
use std::time::Duration;

use reportq_storage::QueueStore;
use reportq_types::QueueItem;
use tokio::sync::{watch, Notify};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::connection::{ConnectionObserver, ConnectionStatus};
use crate::transport::Transport;

/// Floor for the poll interval, to avoid a busy loop on misconfiguration
pub const MIN_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Background delivery loop
pub struct SubmissionWorker {
    store: Arc<dyn QueueStore>,
    transport: Arc<dyn Transport>,
    connection: Arc<dyn ConnectionObserver>,
    retry_interval: Duration,
    wake: Arc<Notify>,
    shutdown: watch::Receiver<bool>,
}

impl SubmissionWorker {
    pub fn new(
        store: Arc<dyn QueueStore>,
        transport: Arc<dyn Transport>,
        connection: Arc<dyn ConnectionObserver>,
        retry_interval: Duration,
        wake: Arc<Notify>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            transport,
            connection,
            retry_interval: retry_interval.max(MIN_RETRY_INTERVAL),
            wake,
            shutdown,
        }
    }

    /// Run until the shutdown signal fires.
    ///
    /// An in-flight delivery is allowed to finish; the loop exits at
    /// the next suspension point.
    pub async fn run(mut self) {
        let mut conn_rx = self.connection.subscribe();
        info!("Submission worker started");

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            if self.connection.current_status() == ConnectionStatus::Offline {
                // Known offline: hold all delivery until the status
                // flips or the next poll tick.
                self.idle(&mut conn_rx).await;
                continue;
            }

            let next = match self.store.get_next().await {
                Ok(next) => next,
                Err(err) => {
                    error!(%err, "Failed to poll queue");
                    self.idle(&mut conn_rx).await;
                    continue;
                }
            };

            match next {
                Some(item) => {
                    let attempt_failed = self.deliver(item).await;
                    if attempt_failed {
                        // Fixed-interval backoff before the next attempt.
                        self.idle(&mut conn_rx).await;
                    }
                    // On success: no sleep, drain the backlog.
                }
                None => self.idle(&mut conn_rx).await,
            }
        }

        info!("Submission worker stopped");
    }

    /// Sleep one poll interval, or less if something happens: shutdown,
    /// a connectivity change, or a new submission.
    async fn idle(&mut self, conn_rx: &mut watch::Receiver<ConnectionStatus>) {
        tokio::select! {
            _ = self.shutdown.changed() => {}
            _ = conn_rx.changed() => {}
            _ = self.wake.notified() => {}
            _ = sleep(self.retry_interval) => {}
        }
    }

    /// Attempt one delivery. Returns true if the attempt failed.
    ///
    /// A delivery error never escapes this function; it is translated
    /// into the item's retry/failure state and logged.
    async fn deliver(&self, mut item: QueueItem) -> bool {
        if let Err(err) = item.mark_processing() {
            // A terminal item slipped into the availability view.
            error!(item_id = %item.id, %err, "Refusing to deliver item");
            return false;
        }
        if let Err(err) = self.store.update(&item).await {
            error!(item_id = %item.id, %err, "Failed to persist claim");
            // Leave the item available for a later poll.
            item.reset_to_pending().ok();
            if let Err(err) = self.store.update(&item).await {
                error!(item_id = %item.id, %err, "Failed to release claim");
            }
            return true;
        }

        debug!(item_id = %item.id, attempt = item.attempts, "Delivering item");
        match self.transport.submit(&item.payload).await {
            Ok(remote_id) => {
                info!(item_id = %item.id, %remote_id, "Item delivered");
                if let Err(err) = item.mark_completed() {
                    error!(item_id = %item.id, %err, "Failed to complete item");
                }
                if let Err(err) = self.store.update(&item).await {
                    error!(item_id = %item.id, %err, "Failed to persist completion");
                }
                false
            }
            Err(err) => {
                let reason = err.to_string();
                if item.can_retry() {
                    warn!(
                        item_id = %item.id,
                        attempt = item.attempts,
                        max_attempts = item.max_attempts,
                        %reason,
                        "Delivery failed, will retry"
                    );
                    item.record_error(&reason);
                    if let Err(err) = item.reset_to_pending() {
                        error!(item_id = %item.id, %err, "Failed to requeue item");
                    }
                } else {
                    warn!(
                        item_id = %item.id,
                        attempts = item.attempts,
                        %reason,
                        "Delivery failed permanently"
                    );
                    if let Err(err) = item.mark_failed(reason) {
                        error!(item_id = %item.id, %err, "Failed to mark item failed");
                    }
                }
                if let Err(err) = self.store.update(&item).await {
                    error!(item_id = %item.id, %err, "Failed to persist failure state");
                }
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionState;
    use crate::transport::TransportError;
    use async_trait::async_trait;
    use bytes::Bytes;
    use reportq_storage::MemoryQueue;
    use reportq_types::{QueueItem, QueueItemStatus};
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `fail_times` submissions, then succeeds.
    struct ScriptedTransport {
        fail_times: u32,
        calls: AtomicU32,
    }

    impl ScriptedTransport {
        fn new(fail_times: u32) -> Self {
            Self {
                fail_times,
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn submit(&self, _payload: &Bytes) -> Result<String, TransportError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.fail_times {
                Err(TransportError::Network(format!("attempt {n} refused")))
            } else {
                Ok(format!("remote-{n}"))
            }
        }
    }

    struct Harness {
        store: Arc<MemoryQueue>,
        transport: Arc<ScriptedTransport>,
        connection: Arc<ConnectionState>,
        wake: Arc<Notify>,
        shutdown_tx: watch::Sender<bool>,
        handle: tokio::task::JoinHandle<()>,
    }

    fn spawn_worker(fail_times: u32, status: ConnectionStatus) -> Harness {
        let store = Arc::new(MemoryQueue::default());
        let transport = Arc::new(ScriptedTransport::new(fail_times));
        let connection = Arc::new(ConnectionState::new(status));
        let wake = Arc::new(Notify::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let worker = SubmissionWorker::new(
            Arc::clone(&store) as Arc<dyn QueueStore>,
            Arc::clone(&transport) as Arc<dyn Transport>,
            Arc::clone(&connection) as Arc<dyn ConnectionObserver>,
            Duration::from_millis(100),
            Arc::clone(&wake),
            shutdown_rx,
        );
        let handle = tokio::spawn(worker.run());

        Harness {
            store,
            transport,
            connection,
            wake,
            shutdown_tx,
            handle,
        }
    }

    impl Harness {
        async fn stop(self) {
            self.shutdown_tx.send(true).unwrap();
            self.handle.await.unwrap();
        }
    }

    /// Poll until the store reaches `count` items of `status`, or fail after 2s.
    async fn wait_for_count(store: &MemoryQueue, status: QueueItemStatus, count: usize) {
        for _ in 0..200 {
            if store.count_by_status(status).await.unwrap() == count {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("queue never reached {count} {status} item(s)");
    }

    async fn status_of(store: &MemoryQueue, id: &str) -> QueueItemStatus {
        store.get(id).await.unwrap().unwrap().status
    }

    #[tokio::test]
    async fn test_successful_delivery_completes_item() {
        let h = spawn_worker(0, ConnectionStatus::Online);
        h.store
            .add(QueueItem::new("report").with_id("OK-1"))
            .await
            .unwrap();
        h.wake.notify_one();

        wait_for_count(&h.store, QueueItemStatus::Completed, 1).await;

        assert_eq!(h.transport.calls(), 1);
        let item = h.store.get("OK-1").await.unwrap().unwrap();
        assert_eq!(item.attempts, 1);
        assert!(item.last_error.is_none());
        h.stop().await;
    }

    #[tokio::test]
    async fn test_exhausted_retries_mark_item_failed() {
        // Transport raises on every attempt; max_attempts = 3
        let h = spawn_worker(u32::MAX, ConnectionStatus::Online);
        h.store
            .add(QueueItem::new("report").with_id("DOOMED-1").with_max_attempts(3))
            .await
            .unwrap();
        h.wake.notify_one();

        wait_for_count(&h.store, QueueItemStatus::Failed, 1).await;

        let item = h.store.get("DOOMED-1").await.unwrap().unwrap();
        assert_eq!(item.attempts, 3);
        assert!(item.last_error.is_some());
        assert_eq!(h.transport.calls(), 3);
        h.stop().await;
    }

    #[tokio::test]
    async fn test_retry_succeeds_within_budget() {
        // First attempt fails, second succeeds
        let h = spawn_worker(1, ConnectionStatus::Online);
        h.store
            .add(QueueItem::new("report").with_id("RETRY-1"))
            .await
            .unwrap();
        h.wake.notify_one();

        wait_for_count(&h.store, QueueItemStatus::Completed, 1).await;

        let item = h.store.get("RETRY-1").await.unwrap().unwrap();
        assert_eq!(item.attempts, 2);
        assert!(item.last_error.is_none());
        assert_eq!(h.transport.calls(), 2);
        h.stop().await;
    }

    #[tokio::test]
    async fn test_offline_worker_never_touches_transport() {
        let h = spawn_worker(0, ConnectionStatus::Offline);
        for i in 0..3 {
            h.store
                .add(QueueItem::new("report").with_id(format!("OFF-{i}")))
                .await
                .unwrap();
        }
        h.wake.notify_one();

        sleep(Duration::from_millis(300)).await;
        assert_eq!(h.transport.calls(), 0);
        assert_eq!(
            h.store.count_by_status(QueueItemStatus::Pending).await.unwrap(),
            3
        );

        // Flipping online wakes the worker and drains the backlog
        h.connection.set_status(ConnectionStatus::Online);
        wait_for_count(&h.store, QueueItemStatus::Completed, 3).await;
        assert_eq!(h.transport.calls(), 3);
        h.stop().await;
    }

    #[tokio::test]
    async fn test_one_bad_item_does_not_stall_the_queue() {
        // Only the first submission fails; the poisoned item has a
        // budget of 1 so it parks in failed while the rest drain.
        let h = spawn_worker(1, ConnectionStatus::Online);
        h.store
            .add(QueueItem::new("bad").with_id("BAD-1").with_max_attempts(1))
            .await
            .unwrap();
        h.store
            .add(QueueItem::new("good").with_id("GOOD-1"))
            .await
            .unwrap();
        h.wake.notify_one();

        wait_for_count(&h.store, QueueItemStatus::Completed, 1).await;
        wait_for_count(&h.store, QueueItemStatus::Failed, 1).await;

        assert_eq!(status_of(&h.store, "BAD-1").await, QueueItemStatus::Failed);
        assert_eq!(status_of(&h.store, "GOOD-1").await, QueueItemStatus::Completed);
        h.stop().await;
    }
}
