//! Queue item types for ReportQ
//!
//! Defines the core QueueItem struct and its lifecycle state machine.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Default retry budget for new items
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Lifecycle status of a queued item
///
/// Transitions are monotonic along
/// PENDING -> PROCESSING -> {COMPLETED | FAILED | PENDING (retry) | SUSPENDED};
/// COMPLETED and FAILED are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueItemStatus {
    /// Item is waiting to be delivered
    Pending,
    /// Item is being delivered by the worker
    Processing,
    /// Item was delivered successfully
    Completed,
    /// Item exhausted its retry budget
    Failed,
    /// Item is parked without consuming a retry attempt (backpressure)
    Suspended,
}

impl QueueItemStatus {
    /// Terminal states allow no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, QueueItemStatus::Completed | QueueItemStatus::Failed)
    }
}

impl std::fmt::Display for QueueItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            QueueItemStatus::Pending => "pending",
            QueueItemStatus::Processing => "processing",
            QueueItemStatus::Completed => "completed",
            QueueItemStatus::Failed => "failed",
            QueueItemStatus::Suspended => "suspended",
        };
        write!(f, "{s}")
    }
}

impl Default for QueueItemStatus {
    fn default() -> Self {
        Self::Pending
    }
}

/// A unit of work in the submission queue
///
/// Wraps an opaque payload (the transport-serialized report) with
/// lifecycle metadata. The queue never interprets the payload; it only
/// stores it and hands it to the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    /// Unique item identifier (generated unless supplied by the caller)
    pub id: String,

    /// Opaque payload bytes, stored as base64 on disk
    #[serde(with = "payload_serde")]
    pub payload: Bytes,

    /// Current lifecycle status
    #[serde(default)]
    pub status: QueueItemStatus,

    /// Number of delivery attempts made so far
    #[serde(default)]
    pub attempts: u32,

    /// Retry budget; once `attempts` reaches this, the next failure is terminal
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// When the item was created
    pub created_at: DateTime<Utc>,

    /// Refreshed on every status transition
    pub updated_at: DateTime<Utc>,

    /// When the item was last handed to the transport
    #[serde(default)]
    pub last_attempt: Option<DateTime<Utc>>,

    /// Last delivery error, cleared on success or administrative retry
    #[serde(rename = "error", default)]
    pub last_error: Option<String>,

    /// Caller-supplied metadata, persisted alongside the payload
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

impl QueueItem {
    /// Create a new pending item with a generated id
    pub fn new(payload: impl Into<Bytes>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            payload: payload.into(),
            status: QueueItemStatus::Pending,
            attempts: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            created_at: now,
            updated_at: now,
            last_attempt: None,
            last_error: None,
            metadata: HashMap::new(),
        }
    }

    /// Use a caller-supplied id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Override the retry budget
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Attach caller metadata
    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    // ==================== Status predicates ====================

    pub fn is_pending(&self) -> bool {
        self.status == QueueItemStatus::Pending
    }

    pub fn is_processing(&self) -> bool {
        self.status == QueueItemStatus::Processing
    }

    pub fn is_completed(&self) -> bool {
        self.status == QueueItemStatus::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.status == QueueItemStatus::Failed
    }

    /// Terminal items accept no further transitions
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// True if there is retry budget left and the item is not terminal
    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_attempts && !self.is_terminal()
    }

    /// Eligible to be handed out by `get_next`: pending or suspended,
    /// with retry budget remaining
    pub fn is_available(&self) -> bool {
        matches!(
            self.status,
            QueueItemStatus::Pending | QueueItemStatus::Suspended
        ) && self.can_retry()
    }

    // ==================== Transitions ====================

    /// Claim the item for delivery; consumes one attempt
    pub fn mark_processing(&mut self) -> Result<()> {
        self.check_not_terminal()?;
        self.status = QueueItemStatus::Processing;
        self.attempts += 1;
        self.last_attempt = Some(Utc::now());
        self.touch();
        Ok(())
    }

    /// Delivery succeeded; clears the last error
    pub fn mark_completed(&mut self) -> Result<()> {
        self.check_not_terminal()?;
        self.status = QueueItemStatus::Completed;
        self.last_error = None;
        self.touch();
        Ok(())
    }

    /// Delivery failed permanently (retry budget exhausted, or policy decision)
    pub fn mark_failed(&mut self, error: impl Into<String>) -> Result<()> {
        self.check_not_terminal()?;
        self.status = QueueItemStatus::Failed;
        self.last_error = Some(error.into());
        self.touch();
        Ok(())
    }

    /// Park the item without consuming a retry attempt
    pub fn mark_suspended(&mut self, reason: Option<String>) -> Result<()> {
        self.check_not_terminal()?;
        self.status = QueueItemStatus::Suspended;
        if reason.is_some() {
            self.last_error = reason;
        }
        self.touch();
        Ok(())
    }

    /// Return the item to the pending view for another attempt.
    ///
    /// Does not reset `attempts` and does not clear the last error; the
    /// administrative `reset_for_retry` is the only way to refresh the
    /// budget.
    pub fn reset_to_pending(&mut self) -> Result<()> {
        self.check_not_terminal()?;
        self.status = QueueItemStatus::Pending;
        self.touch();
        Ok(())
    }

    /// Administrative reset: fresh budget, error cleared, back to pending.
    ///
    /// The sanctioned way to revive a FAILED item.
    pub fn reset_for_retry(&mut self) {
        self.status = QueueItemStatus::Pending;
        self.attempts = 0;
        self.last_error = None;
        self.touch();
    }

    /// Stamp a delivery error without changing status
    pub fn record_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    fn check_not_terminal(&self) -> Result<()> {
        if self.is_terminal() {
            return Err(Error::InvalidTransition {
                id: self.id.clone(),
                from: self.status,
            });
        }
        Ok(())
    }

    /// Payload as a string, if it is valid UTF-8
    pub fn payload_as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

/// Base64 serialization for the opaque payload.
///
/// Base64 in both directions keeps the decode unambiguous, so binary
/// payloads survive a serialize/deserialize round trip.
mod payload_serde {
    use base64::Engine;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        encoded.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Bytes, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(s.as_bytes())
            .map_err(serde::de::Error::custom)?;
        Ok(Bytes::from(decoded))
    }
}
