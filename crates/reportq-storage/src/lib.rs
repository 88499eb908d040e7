//! ReportQ Storage - Queue backends for the submission queue
//!
//! This crate provides pluggable queue implementations.
//! Currently supports:
//! - In-memory queue (volatile, for tests and short-lived processes)
//! - File-backed queue (durable, one JSON file per item)

pub mod traits;

mod index;

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "file")]
pub mod file;

// Re-exports
pub use traits::QueueStore;

#[cfg(feature = "memory")]
pub use memory::MemoryQueue;

#[cfg(feature = "file")]
pub use file::FileQueue;
