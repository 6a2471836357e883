//! Frame broadcast
//!
//! One consumer pulls frames from the upstream feed and pushes each of them
//! to every subscriber in the registry.
//!
//! ```text
//!  [FrameSource] ──recv()──► BroadcastLoop ──encode once──► EncodedFrame
//!                                                              │
//!                               snapshot() ◄── registry        │ clone (refcount)
//!                                   │                          ▼
//!                                   ├──► send ─ timeout ─► subscriber 1
//!                                   ├──► send ─ timeout ─► subscriber 2
//!                                   └──► send ─ timeout ─► subscriber N
//!                                                              │
//!                                        evict() ◄── failure ──┘
//! ```
//!
//! Sends for one frame run concurrently, each bounded by
//! [`BroadcastConfig::send_timeout`]. A saturated subscriber only misses the
//! frame; a closed, broken, or stalled one is evicted.

pub mod fanout;
pub mod frame;
pub mod source;

pub use fanout::{BroadcastConfig, BroadcastLoop, BroadcastReport, Broadcaster};
pub use frame::{EncodedFrame, Frame, FrameEncoding};
pub use source::{ChannelSource, FrameSource, TcpIngestSource, MAX_INGEST_FRAME_SIZE};
