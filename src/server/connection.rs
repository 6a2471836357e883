//! Viewer connection
//!
//! Each accepted WebSocket gets a [`WsSubscriber`] (the send capability
//! registered with the registry) and a task that drains the subscriber's
//! bounded queue into the socket while watching for the viewer going away.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, Notify};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::broadcast::EncodedFrame;
use crate::registry::{FrameSink, SendError, SendFuture, Subscriber, SubscriberRegistry};

#[derive(Debug, Default)]
struct ConnectionState {
    closed: AtomicBool,
    shutdown: Notify,
}

impl ConnectionState {
    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.shutdown.notify_one();
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Send capability of one WebSocket viewer
///
/// Sends never touch the socket: they enqueue into a bounded channel drained
/// by the connection task, and fail with [`SendError::Full`] when it is
/// saturated.
pub struct WsSubscriber {
    tx: mpsc::Sender<Message>,
    state: Arc<ConnectionState>,
}

/// Receiving half of a [`WsSubscriber`], owned by the connection task
pub struct OutboundQueue {
    rx: mpsc::Receiver<Message>,
    state: Arc<ConnectionState>,
}

impl WsSubscriber {
    /// Create a subscriber with a queue of `capacity` messages
    pub fn new(capacity: usize) -> (Self, OutboundQueue) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let state = Arc::new(ConnectionState::default());

        (
            Self {
                tx,
                state: Arc::clone(&state),
            },
            OutboundQueue { rx, state },
        )
    }

    fn try_enqueue(&self, message: Message) -> Result<(), SendError> {
        if self.state.is_closed() {
            return Err(SendError::Closed);
        }

        self.tx.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::Full,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }
}

impl FrameSink for WsSubscriber {
    fn send(&self, frame: EncodedFrame) -> SendFuture<'_> {
        let result = self.try_enqueue(frame.into_message());
        Box::pin(std::future::ready(result))
    }

    fn close(&self) {
        self.state.close();
    }

    fn is_open(&self) -> bool {
        !self.state.is_closed() && !self.tx.is_closed()
    }
}

impl OutboundQueue {
    /// Receive the next queued message directly (without a socket)
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    pub fn is_closed(&self) -> bool {
        self.state.is_closed()
    }
}

/// Why a viewer connection ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Viewer sent a close frame or the stream ended
    Remote,
    /// Closed locally (eviction or shutdown)
    Local,
    /// Socket read or write failed
    Error(String),
    /// A write did not complete within the write timeout
    WriteTimeout,
}

/// Drive one viewer connection until it closes
///
/// The subscriber must already be registered. On return it has been removed
/// from the registry and marked closed.
pub async fn serve_connection<S>(
    ws: WebSocketStream<S>,
    subscriber: Subscriber,
    mut queue: OutboundQueue,
    registry: Arc<SubscriberRegistry>,
    peer_addr: SocketAddr,
    write_timeout: Duration,
) -> CloseReason
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut write, mut read) = ws.split();
    let state = Arc::clone(&queue.state);

    let reason = loop {
        tokio::select! {
            outbound = queue.rx.recv() => {
                let Some(message) = outbound else {
                    break CloseReason::Local;
                };
                match tokio::time::timeout(write_timeout, write.send(message)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => break CloseReason::Error(e.to_string()),
                    Err(_) => break CloseReason::WriteTimeout,
                }
            }
            inbound = read.next() => {
                match inbound {
                    Some(Ok(Message::Close(_))) | None => break CloseReason::Remote,
                    // Viewers are receive-only; pings are answered by the protocol layer
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break CloseReason::Error(e.to_string()),
                }
            }
            _ = state.shutdown.notified() => {
                let _ = tokio::time::timeout(write_timeout, write.send(Message::Close(None))).await;
                break CloseReason::Local;
            }
        }
    };

    state.close();
    registry.remove(&subscriber);

    match &reason {
        CloseReason::Error(error) => {
            tracing::debug!(
                subscriber_id = %subscriber.id(),
                peer = %peer_addr,
                error = %error,
                "Viewer connection failed"
            );
        }
        _ => {
            tracing::debug!(
                subscriber_id = %subscriber.id(),
                peer = %peer_addr,
                reason = ?reason,
                "Viewer connection closed"
            );
        }
    }

    reason
}
