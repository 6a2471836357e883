//! Error types
//!
//! Errors surfaced by the upstream feed, the transport, and service setup.
//! Per-subscriber delivery failures live in [`crate::registry::SendError`]
//! since they never leave the broadcast path.

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug, Error)]
pub enum Error {
    /// Socket or listener I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The upstream frame feed failed
    #[error("upstream feed error: {0}")]
    Source(#[from] SourceError),

    /// WebSocket protocol error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Upstream feed failure
///
/// Every variant is fatal to the broadcast loop: frames that were never
/// received cannot be broadcast.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The feed was closed underneath an active receive
    #[error("upstream feed closed")]
    Closed,

    /// Reading from the ingest connection failed
    #[error("ingest I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The ingest peer sent something that is not a frame
    #[error("ingest protocol error: {0}")]
    Protocol(String),
}
