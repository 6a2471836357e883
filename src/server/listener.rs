//! Viewer WebSocket listener
//!
//! Handles the TCP accept loop, performs the WebSocket handshake, and
//! registers each viewer with the subscriber registry for the lifetime of
//! its connection.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;

use crate::error::Result;
use crate::registry::{Subscriber, SubscriberRegistry};
use crate::server::config::ServerConfig;
use crate::server::connection::{serve_connection, WsSubscriber};

/// WebSocket server that turns viewer connections into subscribers
pub struct FanoutServer {
    config: ServerConfig,
    registry: Arc<SubscriberRegistry>,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl FanoutServer {
    /// Create a new server registering viewers into `registry`
    pub fn new(config: ServerConfig, registry: Arc<SubscriberRegistry>) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            config,
            registry,
            connection_semaphore,
        }
    }

    /// Get a reference to the subscriber registry
    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    /// Get the server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Bind the configured address
    pub async fn bind(&self) -> Result<TcpListener> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(
            addr = %listener.local_addr()?,
            path = %self.config.path,
            "Viewer endpoint listening"
        );
        Ok(listener)
    }

    /// Accept viewers on a bound listener until `shutdown` completes
    ///
    /// Accept errors are logged and the loop keeps going; only `shutdown`
    /// ends it. Connections still handshaking when it ends are turned away
    /// by the registry once it has been closed.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.accept_loop(&listener) => result,
        }
    }

    async fn accept_loop(&self, listener: &TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::error!(error = %e, "Failed to configure socket");
                return;
            }
        }

        let config = self.config.clone();
        let registry = Arc::clone(&self.registry);

        tokio::spawn(async move {
            let _permit = permit;
            let path = config.path.clone();

            let handshake = tokio_tungstenite::accept_hdr_async(
                socket,
                move |request: &Request, response: Response| check_path(&path, request, response),
            );

            let ws = match tokio::time::timeout(config.handshake_timeout, handshake).await {
                Ok(Ok(ws)) => ws,
                Ok(Err(e)) => {
                    tracing::debug!(peer = %peer_addr, error = %e, "WebSocket handshake failed");
                    return;
                }
                Err(_) => {
                    tracing::debug!(peer = %peer_addr, "WebSocket handshake timed out");
                    return;
                }
            };

            let (sink, queue) = WsSubscriber::new(config.subscriber_buffer);
            let subscriber = Subscriber::new(sink);

            tracing::debug!(
                subscriber_id = %subscriber.id(),
                peer = %peer_addr,
                "Viewer connected"
            );
            if !registry.add(subscriber.clone()) {
                // Registry already closed: the subscriber is closed, so the
                // connection only sends its close frame
                tracing::debug!(peer = %peer_addr, "Viewer arrived after shutdown");
            }

            serve_connection(ws, subscriber, queue, registry, peer_addr, config.write_timeout)
                .await;
        });
    }
}

fn check_path(
    expected: &str,
    request: &Request,
    response: Response,
) -> std::result::Result<Response, ErrorResponse> {
    if request.uri().path() == expected {
        return Ok(response);
    }

    tracing::debug!(path = %request.uri().path(), "Rejected handshake for unknown path");
    let mut error = ErrorResponse::new(Some("not found".to_string()));
    *error.status_mut() = StatusCode::NOT_FOUND;
    Err(error)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(path: &str) -> Request {
        Request::builder().uri(path).body(()).unwrap()
    }

    #[test]
    fn test_check_path_accepts_endpoint() {
        let result = check_path("/stream", &request("/stream"), Response::new(()));
        assert!(result.is_ok());
    }

    #[test]
    fn test_check_path_rejects_other_paths() {
        let result = check_path("/stream", &request("/admin"), Response::new(()));
        let error = result.unwrap_err();
        assert_eq!(error.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_check_path_ignores_query() {
        let result = check_path("/stream", &request("/stream?camera=1"), Response::new(()));
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_connection_limit_semaphore() {
        let server = FanoutServer::new(
            ServerConfig::default().max_connections(2),
            Arc::new(SubscriberRegistry::new()),
        );

        let sem = server.connection_semaphore.as_ref().unwrap();
        assert_eq!(sem.available_permits(), 2);

        let unlimited = FanoutServer::new(ServerConfig::default(), Arc::new(SubscriberRegistry::new()));
        assert!(unlimited.connection_semaphore.is_none());
    }
}
