//! Error types for ReportQ
//!
//! Defines all error types used throughout the queue.

use thiserror::Error;

use crate::item::QueueItemStatus;

/// Main error type for ReportQ operations
#[derive(Error, Debug)]
pub enum Error {
    /// Item not found
    #[error("Item not found: {0}")]
    ItemNotFound(String),

    /// Item with the same id already queued
    #[error("Item already exists: {0}")]
    DuplicateItem(String),

    /// Queue is at capacity
    #[error("Queue is full (max_size={0})")]
    QueueFull(usize),

    /// Illegal state transition (e.g. reviving a terminal item)
    #[error("Invalid transition for item {id}: {from} is terminal")]
    InvalidTransition {
        id: String,
        from: QueueItemStatus,
    },

    /// Filesystem error from the durable store
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for ReportQ operations
pub type Result<T> = std::result::Result<T, Error>;
