//! Viewer-facing WebSocket server
//!
//! Accepts viewer connections on one endpoint path, wraps each in a
//! [`WsSubscriber`], and keeps the registry in sync with connection
//! lifetimes.

pub mod config;
pub mod connection;
pub mod listener;

pub use config::ServerConfig;
pub use connection::{serve_connection, CloseReason, OutboundQueue, WsSubscriber};
pub use listener::FanoutServer;
