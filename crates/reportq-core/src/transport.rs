//! Transport collaborator interface
//!
//! The queue never talks to the server itself; delivery goes through
//! this seam. HTTP-level concerns (connection pooling, request retries,
//! timeouts) belong to the implementation behind it - the queue's retry
//! loop only handles whole-submission failures.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Delivery failure reported by a transport.
///
/// The worker treats every variant the same way (retry until the item's
/// budget is exhausted); the classification exists for logs and for
/// implementations that want to extend the policy later.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Could not reach the server
    #[error("network error: {0}")]
    Network(String),

    /// Server received the payload and refused it
    #[error("rejected by server: {0}")]
    Rejected(String),

    /// The attempt exceeded the transport's own deadline
    #[error("delivery timed out: {0}")]
    Timeout(String),
}

/// Delivers a payload to the remote server.
///
/// A successful submit returns the remote id assigned to the report.
/// Implementations must bound a hung delivery with their own timeout;
/// the queue does not cancel in-flight calls.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn submit(&self, payload: &Bytes) -> Result<String, TransportError>;
}
