//! Statistics and metrics for frame fan-out

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Live counters shared by the registry and the broadcast loop
#[derive(Debug)]
pub struct FanoutStats {
    started_at: Instant,
    frames_received: AtomicU64,
    frames_broadcast: AtomicU64,
    bytes_received: AtomicU64,
    deliveries: AtomicU64,
    dropped_frames: AtomicU64,
    evictions: AtomicU64,
    subscribers_added: AtomicU64,
    subscribers_removed: AtomicU64,
}

impl FanoutStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            frames_received: AtomicU64::new(0),
            frames_broadcast: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            deliveries: AtomicU64::new(0),
            dropped_frames: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            subscribers_added: AtomicU64::new(0),
            subscribers_removed: AtomicU64::new(0),
        }
    }

    /// Record a frame pulled from the upstream feed
    pub fn record_frame(&self, bytes: usize) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Record a frame that had at least one recipient
    pub fn record_broadcast(&self) {
        self.frames_broadcast.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivery(&self) {
        self.deliveries.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a frame skipped for one saturated subscriber
    pub fn record_drop(&self) {
        self.dropped_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_added(&self) {
        self.subscribers_added.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_removed(&self) {
        self.subscribers_removed.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current counter values
    pub fn snapshot(&self) -> StatsSnapshot {
        let subscribers_added = self.subscribers_added.load(Ordering::Relaxed);
        let subscribers_removed = self.subscribers_removed.load(Ordering::Relaxed);

        StatsSnapshot {
            uptime: self.started_at.elapsed(),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_broadcast: self.frames_broadcast.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            dropped_frames: self.dropped_frames.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            subscribers_added,
            subscribers_removed,
            active_subscribers: subscribers_added.saturating_sub(subscribers_removed),
        }
    }
}

impl Default for FanoutStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`FanoutStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Time since the counters were created
    pub uptime: Duration,
    /// Frames pulled from the upstream feed
    pub frames_received: u64,
    /// Frames delivered to at least one subscriber snapshot
    pub frames_broadcast: u64,
    /// Raw payload bytes received
    pub bytes_received: u64,
    /// Successful per-subscriber deliveries
    pub deliveries: u64,
    /// Frames skipped for saturated subscribers
    pub dropped_frames: u64,
    /// Subscribers removed after a failed delivery
    pub evictions: u64,
    /// Total subscribers ever registered
    pub subscribers_added: u64,
    /// Total subscribers removed, for any reason
    pub subscribers_removed: u64,
    /// Currently registered subscribers
    pub active_subscribers: u64,
}

impl StatsSnapshot {
    /// Inbound bitrate in bits per second
    pub fn bitrate(&self) -> u64 {
        let secs = self.uptime.as_secs();
        if secs > 0 {
            (self.bytes_received * 8) / secs
        } else {
            0
        }
    }
}
