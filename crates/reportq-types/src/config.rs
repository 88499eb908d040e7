//! Queue configuration and derived statistics
//!
//! Configuration is injected into each queue instance; there is no
//! process-wide state.

use serde::{Deserialize, Serialize};

/// Queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum number of items held at once (0 = unlimited)
    #[serde(default)]
    pub max_size: usize,

    /// Retry budget applied to items that do not specify their own
    #[serde(default = "default_max_attempts")]
    pub default_max_attempts: u32,

    /// Fixed wait between worker poll cycles and after a failed attempt
    #[serde(default = "default_retry_interval")]
    pub retry_interval_secs: u64,

    /// Delete item files on completion instead of archiving to `completed/`
    #[serde(default)]
    pub delete_completed: bool,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_interval() -> u64 {
    10
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_size: 0,
            default_max_attempts: default_max_attempts(),
            retry_interval_secs: default_retry_interval(),
            delete_completed: false,
        }
    }
}

/// Per-status item counts, computed on demand
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub suspended: usize,
    pub total: usize,
}

/// Cheap operator-facing summary returned by `get_status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSummary {
    /// Items waiting for delivery
    pub pending: usize,
    /// Items that exhausted their retry budget
    pub failed: usize,
    /// Backing directory, or a marker for volatile queues
    pub folder: String,
}
