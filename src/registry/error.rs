//! Delivery error types
//!
//! Failures reported by a subscriber's send capability.

use std::time::Duration;

use thiserror::Error;

/// Error returned by a single delivery attempt to one subscriber
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// Connection is closed or reports itself not open
    #[error("subscriber connection closed")]
    Closed,

    /// Outbound queue is saturated; this frame is skipped for the subscriber
    #[error("subscriber queue full")]
    Full,

    /// Send did not complete within the configured bound
    #[error("send timed out after {0:?}")]
    Timeout(Duration),

    /// Transport-level write failure
    #[error("transport error: {0}")]
    Transport(String),
}

impl SendError {
    /// Whether this failure should evict the subscriber
    ///
    /// A saturated queue only drops the current frame; everything else means
    /// the connection can no longer be trusted to receive frames.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SendError::Full)
    }
}
