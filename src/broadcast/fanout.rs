//! Broadcast loop
//!
//! Pulls frames from the upstream feed one at a time and fans each one out
//! to a snapshot of the registry. Every send in a cycle runs concurrently
//! under its own timeout, so a cycle lasts at most `send_timeout` no matter
//! how many subscribers stall.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;

use crate::error::SourceError;
use crate::registry::{SendError, Subscriber, SubscriberRegistry};

use super::frame::{EncodedFrame, Frame, FrameEncoding};
use super::source::FrameSource;

/// Broadcast configuration
#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    /// Upper bound on a single delivery attempt
    pub send_timeout: Duration,

    /// Wire representation sent to subscribers
    pub encoding: FrameEncoding,

    /// Upstream topic name, for logging
    pub topic: String,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            send_timeout: Duration::from_secs(2),
            encoding: FrameEncoding::Base64,
            topic: "camera-stream".to_string(),
        }
    }
}

impl BroadcastConfig {
    /// Set the per-send timeout
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Set the wire encoding
    pub fn encoding(mut self, encoding: FrameEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Set the upstream topic name
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }
}

/// Outcome of broadcasting one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Subscribers in the snapshot
    pub recipients: usize,
    /// Successful deliveries
    pub delivered: usize,
    /// Skipped because the subscriber's queue was full
    pub dropped: usize,
    /// Evicted after a failed send
    pub evicted: usize,
    /// Already removed after the snapshot was taken
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Sent,
    Dropped,
    Evicted,
    Skipped,
}

/// Fans one frame out to every registered subscriber
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<SubscriberRegistry>,
    config: BroadcastConfig,
}

impl Broadcaster {
    pub fn new(registry: Arc<SubscriberRegistry>, config: BroadcastConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &BroadcastConfig {
        &self.config
    }

    /// Deliver a frame to the current snapshot
    ///
    /// The frame is encoded once. Failed subscribers are evicted; the
    /// failure never affects delivery to anyone else.
    pub async fn broadcast(&self, frame: &Frame) -> BroadcastReport {
        let stats = self.registry.stats();
        stats.record_frame(frame.len());

        let snapshot = self.registry.snapshot();
        if snapshot.is_empty() {
            tracing::trace!(sequence = ?frame.sequence, "No subscribers, frame discarded");
            return BroadcastReport::default();
        }

        let payload = self.config.encoding.encode(frame);
        let outcomes = join_all(
            snapshot
                .iter()
                .map(|subscriber| self.deliver(subscriber, payload.clone())),
        )
        .await;

        let mut report = BroadcastReport {
            recipients: snapshot.len(),
            ..Default::default()
        };
        for outcome in outcomes {
            match outcome {
                Delivery::Sent => report.delivered += 1,
                Delivery::Dropped => report.dropped += 1,
                Delivery::Evicted => report.evicted += 1,
                Delivery::Skipped => report.skipped += 1,
            }
        }

        stats.record_broadcast();
        tracing::trace!(
            sequence = ?frame.sequence,
            bytes = payload.len(),
            age_ms = frame.age().as_millis() as u64,
            recipients = report.recipients,
            delivered = report.delivered,
            dropped = report.dropped,
            evicted = report.evicted,
            "Frame broadcast"
        );

        report
    }

    async fn deliver(&self, subscriber: &Subscriber, payload: EncodedFrame) -> Delivery {
        // Removed after the snapshot was taken
        if subscriber.is_removed() {
            return Delivery::Skipped;
        }

        if !subscriber.is_open() {
            return self.fail(subscriber, SendError::Closed);
        }

        let timeout = self.config.send_timeout;
        let result = match tokio::time::timeout(timeout, subscriber.send(payload)).await {
            Ok(result) => result,
            Err(_) => Err(SendError::Timeout(timeout)),
        };

        match result {
            Ok(()) => {
                self.registry.stats().record_delivery();
                Delivery::Sent
            }
            Err(e) => self.fail(subscriber, e),
        }
    }

    fn fail(&self, subscriber: &Subscriber, error: SendError) -> Delivery {
        if !error.is_fatal() {
            self.registry.stats().record_drop();
            tracing::debug!(
                subscriber_id = %subscriber.id(),
                "Subscriber saturated, frame dropped"
            );
            return Delivery::Dropped;
        }

        if self.registry.evict(subscriber, &error) {
            Delivery::Evicted
        } else {
            // Concurrently removed by the transport
            Delivery::Skipped
        }
    }
}

/// Single consumer of the upstream feed
pub struct BroadcastLoop<S> {
    source: S,
    broadcaster: Broadcaster,
}

impl<S: FrameSource> BroadcastLoop<S> {
    pub fn new(source: S, registry: Arc<SubscriberRegistry>, config: BroadcastConfig) -> Self {
        Self {
            source,
            broadcaster: Broadcaster::new(registry, config),
        }
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// Run until the feed ends or fails
    ///
    /// Returns `Ok(())` when the feed ends cleanly. A feed error is logged and
    /// returned; the loop does not retry.
    pub async fn run(&mut self) -> Result<(), SourceError> {
        tracing::info!(
            topic = %self.broadcaster.config.topic,
            encoding = ?self.broadcaster.config.encoding,
            send_timeout_ms = self.broadcaster.config.send_timeout.as_millis() as u64,
            "Broadcast loop started"
        );

        loop {
            match self.source.recv().await {
                Ok(Some(frame)) => {
                    self.broadcaster.broadcast(&frame).await;
                }
                Ok(None) => {
                    tracing::info!(topic = %self.broadcaster.config.topic, "Upstream feed ended");
                    return Ok(());
                }
                Err(e) => {
                    tracing::error!(
                        topic = %self.broadcaster.config.topic,
                        error = %e,
                        "Upstream feed failed"
                    );
                    return Err(e);
                }
            }
        }
    }

    /// Run until the feed ends, fails, or `shutdown` completes
    ///
    /// An in-flight broadcast is abandoned on shutdown.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<(), SourceError>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            _ = shutdown => {
                tracing::info!("Broadcast loop shutting down");
                Ok(())
            }
            result = self.run() => result,
        }
    }
}
