//! ReportQ Core - Submission worker and service facade
//!
//! This crate contains the delivery side of the queue:
//! - Transport: collaborator interface for delivering payloads
//! - ConnectionObserver: reachability signal that wakes the worker
//! - SubmissionWorker: background drain loop with fixed-interval retry
//! - ReportQueueService: administrative surface and worker lifecycle

pub mod connection;
pub mod service;
pub mod transport;
pub mod worker;

// Re-exports
pub use connection::{ConnectionObserver, ConnectionState, ConnectionStatus};
pub use service::ReportQueueService;
pub use transport::{Transport, TransportError};
pub use worker::SubmissionWorker;
