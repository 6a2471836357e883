//! framecast: live video frame fan-out
//!
//! Takes one ordered stream of opaque video frames and delivers every frame
//! to all connected WebSocket viewers, isolating slow or broken viewers from
//! everyone else.
//!
//! # Components
//!
//! - [`registry`]: concurrent copy-on-write set of subscribers
//! - [`broadcast`]: upstream feeds and the per-frame fan-out loop
//! - [`server`]: WebSocket endpoint that turns viewers into subscribers
//! - [`stats`]: delivery, drop, and eviction counters
//! - [`service`]: owns the registry and runs server and loop together
//!
//! # Example
//!
//! ```rust,no_run
//! use framecast::{ChannelSource, Frame, FrameService, ServiceConfig};
//!
//! # async fn example() -> framecast::Result<()> {
//! let service = FrameService::new(ServiceConfig::default());
//! let (frames, source) = ChannelSource::channel(64);
//!
//! tokio::spawn(async move {
//!     let _ = frames.send(Frame::new(vec![0xFF, 0xD8, 0xFF])).await;
//! });
//!
//! service
//!     .run_until(source, async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await
//! # }
//! ```

pub mod broadcast;
pub mod error;
pub mod registry;
pub mod server;
pub mod service;
pub mod stats;

pub use broadcast::{
    BroadcastConfig, BroadcastLoop, BroadcastReport, Broadcaster, ChannelSource, EncodedFrame,
    Frame, FrameEncoding, FrameSource, TcpIngestSource,
};
pub use error::{Error, Result, SourceError};
pub use registry::{FrameSink, SendError, Snapshot, Subscriber, SubscriberId, SubscriberRegistry};
pub use server::{FanoutServer, ServerConfig, WsSubscriber};
pub use service::{FrameService, ServiceConfig};
pub use stats::{FanoutStats, StatsSnapshot};
