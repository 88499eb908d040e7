//! Connectivity signal for the submission worker
//!
//! The worker does not probe the network itself; something else (a
//! connection tester, an HTTP client noticing failures) owns that
//! knowledge and publishes it here. Subscribers get both the current
//! level and change notifications, so the worker can wake the moment
//! the server becomes reachable instead of waiting out a poll interval.

use tokio::sync::watch;
use tracing::info;

/// Server reachability as last reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Online,
    Offline,
}

/// Read side of the connectivity signal
pub trait ConnectionObserver: Send + Sync {
    /// Last reported status
    fn current_status(&self) -> ConnectionStatus;

    /// Receiver that fires on every status change
    fn subscribe(&self) -> watch::Receiver<ConnectionStatus>;
}

/// Watch-channel backed connectivity state.
///
/// The owner calls `set_status` when reachability changes; any number
/// of workers observe it.
pub struct ConnectionState {
    tx: watch::Sender<ConnectionStatus>,
}

impl ConnectionState {
    pub fn new(initial: ConnectionStatus) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Publish a status change; no-op if the status is unchanged
    pub fn set_status(&self, status: ConnectionStatus) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
        if changed {
            info!(?status, "Connection status changed");
        }
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new(ConnectionStatus::Offline)
    }
}

impl ConnectionObserver for ConnectionState {
    fn current_status(&self) -> ConnectionStatus {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_current_status_tracks_changes() {
        let state = ConnectionState::new(ConnectionStatus::Offline);
        assert_eq!(state.current_status(), ConnectionStatus::Offline);

        state.set_status(ConnectionStatus::Online);
        assert_eq!(state.current_status(), ConnectionStatus::Online);
    }

    #[tokio::test]
    async fn test_subscriber_sees_flip() {
        let state = ConnectionState::new(ConnectionStatus::Offline);
        let mut rx = state.subscribe();

        state.set_status(ConnectionStatus::Online);

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), ConnectionStatus::Online);
    }

    #[tokio::test]
    async fn test_redundant_set_does_not_notify() {
        let state = ConnectionState::new(ConnectionStatus::Offline);
        let mut rx = state.subscribe();
        rx.borrow_and_update();

        state.set_status(ConnectionStatus::Offline);
        assert!(!rx.has_changed().unwrap());
    }
}
