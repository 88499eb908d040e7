//! ReportQ Types - Core domain types for the submission queue
//!
//! This crate contains all shared types used across ReportQ components.

pub mod config;
pub mod error;
pub mod item;

// Re-export commonly used types
pub use config::{QueueConfig, QueueStats, QueueSummary};
pub use error::{Error, Result};
pub use item::{QueueItem, QueueItemStatus};
