//! Server configuration

use std::net::SocketAddr;
use std::time::Duration;

/// Default viewer endpoint address
pub const DEFAULT_BIND_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 8081);

/// Default WebSocket endpoint path
pub const DEFAULT_PATH: &str = "/stream";

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// WebSocket endpoint path viewers connect to
    pub path: String,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Outbound messages queued per subscriber before frames are dropped
    pub subscriber_buffer: usize,

    /// WebSocket handshake must complete within this time
    pub handshake_timeout: Duration,

    /// A single write to a viewer socket must complete within this time
    pub write_timeout: Duration,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(DEFAULT_BIND_ADDR),
            path: DEFAULT_PATH.to_string(),
            max_connections: 0, // Unlimited
            subscriber_buffer: 8,
            handshake_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
            tcp_nodelay: true, // Important for low latency
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the endpoint path
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the per-subscriber queue length (at least 1)
    pub fn subscriber_buffer(mut self, size: usize) -> Self {
        self.subscriber_buffer = size.max(1);
        self
    }

    /// Set handshake timeout
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set write timeout
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Enable or disable TCP_NODELAY on accepted sockets
    pub fn tcp_nodelay(mut self, enabled: bool) -> Self {
        self.tcp_nodelay = enabled;
        self
    }
}
