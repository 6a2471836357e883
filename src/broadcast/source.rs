//! Upstream frame feeds
//!
//! The broadcast loop pulls frames through [`FrameSource`]. Two feeds are
//! provided: an in-process channel for co-located ingestion, and a TCP
//! ingest listener reading length-delimited frames.

use std::future::Future;
use std::io;
use std::net::SocketAddr;

use futures_util::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, LengthDelimitedCodec};

use crate::error::SourceError;

use super::frame::Frame;

/// Largest frame accepted from the ingest connection (16 MiB)
pub const MAX_INGEST_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Ordered feed of frames from the ingestion pipeline
pub trait FrameSource: Send {
    /// Wait for the next frame
    ///
    /// Returns `Ok(None)` once the feed has ended. Any error is fatal to the
    /// consumer.
    fn recv(&mut self) -> impl Future<Output = Result<Option<Frame>, SourceError>> + Send;
}

/// Feed backed by an in-process channel
pub struct ChannelSource {
    rx: mpsc::Receiver<Frame>,
}

impl ChannelSource {
    /// Create a bounded feed and the sender the producer pushes into
    pub fn channel(capacity: usize) -> (mpsc::Sender<Frame>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { rx })
    }
}

impl FrameSource for ChannelSource {
    async fn recv(&mut self) -> Result<Option<Frame>, SourceError> {
        Ok(self.rx.recv().await)
    }
}

/// Feed that accepts a single ingest connection over TCP
///
/// Each frame is a 4-byte big-endian length followed by the payload. Frames
/// are numbered in arrival order. The feed ends when the ingest peer closes
/// its connection.
pub struct TcpIngestSource {
    listener: TcpListener,
    reader: Option<FramedRead<TcpStream, LengthDelimitedCodec>>,
    next_sequence: u64,
    finished: bool,
}

impl TcpIngestSource {
    /// Bind the ingest listener
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(addr = %listener.local_addr()?, "Ingest listener bound");

        Ok(Self {
            listener,
            reader: None,
            next_sequence: 0,
            finished: false,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    fn codec() -> LengthDelimitedCodec {
        LengthDelimitedCodec::builder()
            .length_field_length(4)
            .big_endian()
            .max_frame_length(MAX_INGEST_FRAME_SIZE)
            .new_codec()
    }

    async fn accept(&mut self) -> Result<(), SourceError> {
        let (socket, peer_addr) = self.listener.accept().await?;
        socket.set_nodelay(true)?;
        tracing::info!(peer = %peer_addr, "Ingest connection accepted");

        self.reader = Some(FramedRead::new(socket, Self::codec()));
        Ok(())
    }
}

impl FrameSource for TcpIngestSource {
    async fn recv(&mut self) -> Result<Option<Frame>, SourceError> {
        if self.finished {
            return Ok(None);
        }

        if self.reader.is_none() {
            self.accept().await?;
        }

        let Some(reader) = self.reader.as_mut() else {
            return Err(SourceError::Closed);
        };

        match reader.next().await {
            Some(Ok(data)) => {
                let sequence = self.next_sequence;
                self.next_sequence += 1;
                Ok(Some(Frame::new(data.freeze()).with_sequence(sequence)))
            }
            Some(Err(e)) if e.kind() == io::ErrorKind::InvalidData => {
                self.finished = true;
                Err(SourceError::Protocol(e.to_string()))
            }
            Some(Err(e)) => {
                self.finished = true;
                Err(SourceError::Io(e))
            }
            None => {
                tracing::info!(frames = self.next_sequence, "Ingest connection closed");
                self.finished = true;
                self.reader = None;
                Ok(None)
            }
        }
    }
}
