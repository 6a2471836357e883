//! Frame service
//!
//! Owns the subscriber registry for the lifetime of the process and wires it
//! into both the viewer server and the broadcast loop. When the service
//! stops, every remaining viewer connection is closed.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::broadcast::{BroadcastConfig, BroadcastLoop, FrameSource, TcpIngestSource};
use crate::error::{Error, Result};
use crate::registry::SubscriberRegistry;
use crate::server::{FanoutServer, ServerConfig};
use crate::stats::StatsSnapshot;

/// Combined service configuration
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    /// Viewer endpoint settings
    pub server: ServerConfig,

    /// Broadcast loop settings
    pub broadcast: BroadcastConfig,

    /// Address of the TCP ingest listener, if frames arrive over TCP
    pub ingest_addr: Option<SocketAddr>,
}

impl ServiceConfig {
    pub fn server(mut self, server: ServerConfig) -> Self {
        self.server = server;
        self
    }

    pub fn broadcast(mut self, broadcast: BroadcastConfig) -> Self {
        self.broadcast = broadcast;
        self
    }

    pub fn ingest_addr(mut self, addr: SocketAddr) -> Self {
        self.ingest_addr = Some(addr);
        self
    }
}

/// Viewer server plus broadcast loop sharing one registry
pub struct FrameService {
    config: ServiceConfig,
    registry: Arc<SubscriberRegistry>,
}

impl FrameService {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            registry: Arc::new(SubscriberRegistry::new()),
        }
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.registry.stats().snapshot()
    }

    /// Run with frames from `source` until shutdown or the feed ends
    ///
    /// Returns the feed error if the upstream failed.
    pub async fn run_until<S, F>(&self, source: S, shutdown: F) -> Result<()>
    where
        S: FrameSource,
        F: Future<Output = ()>,
    {
        let server = FanoutServer::new(self.config.server.clone(), Arc::clone(&self.registry));
        let listener = server.bind().await?;
        self.serve(&server, listener, source, shutdown).await
    }

    /// Run with frames from the configured TCP ingest listener
    pub async fn run_ingest_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let addr = self
            .config
            .ingest_addr
            .ok_or_else(|| Error::Config("no ingest address configured".to_string()))?;
        let source = TcpIngestSource::bind(addr).await?;

        self.run_until(source, shutdown).await
    }

    /// Run on an already bound viewer listener
    pub async fn serve_on<S, F>(&self, listener: TcpListener, source: S, shutdown: F) -> Result<()>
    where
        S: FrameSource,
        F: Future<Output = ()>,
    {
        let server = FanoutServer::new(self.config.server.clone(), Arc::clone(&self.registry));
        self.serve(&server, listener, source, shutdown).await
    }

    async fn serve<S, F>(
        &self,
        server: &FanoutServer,
        listener: TcpListener,
        source: S,
        shutdown: F,
    ) -> Result<()>
    where
        S: FrameSource,
        F: Future<Output = ()>,
    {
        let mut broadcast_loop = BroadcastLoop::new(
            source,
            Arc::clone(&self.registry),
            self.config.broadcast.clone(),
        );

        let result = tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = broadcast_loop.run() => result.map_err(Error::from),
            result = server.serve(listener, std::future::pending()) => result,
        };

        let closed = self.registry.close_all();
        let stats = self.stats();
        tracing::info!(
            closed_subscribers = closed,
            frames = stats.frames_received,
            deliveries = stats.deliveries,
            evictions = stats.evictions,
            "Frame service stopped"
        );

        result
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::broadcast::{ChannelSource, Frame};
    use crate::error::SourceError;
    use crate::registry::FrameSink;
    use crate::registry::subscriber::testing::{subscriber, Behavior};

    #[tokio::test]
    async fn test_missing_ingest_addr() {
        let service = FrameService::new(ServiceConfig::default());

        let result = service.run_ingest_until(std::future::ready(())).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_feed_end_closes_subscribers() {
        let service = FrameService::new(ServiceConfig::default());
        let (sub, sink) = subscriber(Behavior::Accept);
        service.registry().add(sub.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (tx, source) = ChannelSource::channel(4);
        tx.send(Frame::new(vec![0xA1, 0xB2])).await.unwrap();
        drop(tx);

        service
            .serve_on(listener, source, std::future::pending())
            .await
            .unwrap();

        assert_eq!(sink.received().len(), 1);
        assert!(sub.is_removed());
        assert!(service.registry().is_empty());
        assert_eq!(service.stats().deliveries, 1);
    }

    struct BrokenFeed;

    impl FrameSource for BrokenFeed {
        async fn recv(&mut self) -> std::result::Result<Option<Frame>, SourceError> {
            Err(SourceError::Protocol("bad length".to_string()))
        }
    }

    #[tokio::test]
    async fn test_feed_failure_is_returned_and_closes_subscribers() {
        let service = FrameService::new(ServiceConfig::default());
        let (sub, sink) = subscriber(Behavior::Accept);
        service.registry().add(sub.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let result = service
            .serve_on(listener, BrokenFeed, std::future::pending())
            .await;

        assert!(matches!(result, Err(Error::Source(SourceError::Protocol(_)))));
        assert!(service.registry().is_empty());
        assert!(service.registry().is_closed());
        assert!(sub.is_removed());
        assert!(!sink.is_open());
        assert!(sink.received().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_stops_service() {
        let service = FrameService::new(ServiceConfig::default());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (_tx, source) = ChannelSource::channel(4);

        let result = service
            .serve_on(listener, source, tokio::time::sleep(Duration::from_millis(20)))
            .await;

        assert!(result.is_ok());
    }

    #[test]
    fn test_config_builder() {
        let addr: SocketAddr = "127.0.0.1:9100".parse().unwrap();
        let config = ServiceConfig::default()
            .server(ServerConfig::default().path("/live"))
            .broadcast(BroadcastConfig::default().topic("door-cam"))
            .ingest_addr(addr);

        assert_eq!(config.server.path, "/live");
        assert_eq!(config.broadcast.topic, "door-cam");
        assert_eq!(config.ingest_addr, Some(addr));
    }
}
