//! Subscriber handles
//!
//! A [`Subscriber`] wraps the send capability a transport connection exposes
//! ([`FrameSink`]) together with the identity the registry tracks it by.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::broadcast::EncodedFrame;

use super::error::SendError;

/// Future returned by [`FrameSink::send`]
pub type SendFuture<'a> = Pin<Box<dyn Future<Output = Result<(), SendError>> + Send + 'a>>;

/// Send capability implemented by a transport connection
///
/// `send` must not block on the network: implementations either hand the
/// payload to a bounded queue or perform one write, and report
/// [`SendError::Full`] when the queue is saturated.
pub trait FrameSink: Send + Sync + 'static {
    /// Deliver one encoded frame
    fn send(&self, frame: EncodedFrame) -> SendFuture<'_>;

    /// Close the underlying connection
    fn close(&self);

    /// Whether the connection still accepts frames
    fn is_open(&self) -> bool;
}

/// Registry identity of a subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

static NEXT_SUBSCRIBER_ID: AtomicU64 = AtomicU64::new(1);

impl SubscriberId {
    fn next() -> Self {
        Self(NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct SubscriberInner {
    id: SubscriberId,
    sink: Box<dyn FrameSink>,
    removed: AtomicBool,
}

/// One live viewer
///
/// Cheap to clone; all clones share the same identity and removal latch.
/// Once removed, a subscriber never becomes eligible again: a reconnecting
/// viewer gets a new `Subscriber`.
#[derive(Clone)]
pub struct Subscriber {
    inner: Arc<SubscriberInner>,
}

impl Subscriber {
    /// Wrap a send capability, assigning a fresh identity
    pub fn new(sink: impl FrameSink) -> Self {
        Self {
            inner: Arc::new(SubscriberInner {
                id: SubscriberId::next(),
                sink: Box::new(sink),
                removed: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    /// Whether the registry has removed this subscriber
    pub fn is_removed(&self) -> bool {
        self.inner.removed.load(Ordering::Acquire)
    }

    /// Whether frames should still be delivered
    pub fn is_open(&self) -> bool {
        !self.is_removed() && self.inner.sink.is_open()
    }

    /// Attempt a single delivery
    pub fn send(&self, frame: EncodedFrame) -> SendFuture<'_> {
        self.inner.sink.send(frame)
    }

    /// Close the underlying connection
    pub fn close(&self) {
        self.inner.sink.close();
    }

    /// Latch the removed flag, returning whether it was already set
    pub(super) fn mark_removed(&self) -> bool {
        self.inner.removed.swap(true, Ordering::AcqRel)
    }
}

impl PartialEq for Subscriber {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Subscriber {}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.inner.id)
            .field("removed", &self.is_removed())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory sinks shared by unit tests across the crate

    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    /// How a [`RecordingSink`] responds to sends
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Behavior {
        Accept,
        Full,
        Fail,
        Hang,
    }

    /// Sink that records every payload it accepts
    #[derive(Clone)]
    pub struct RecordingSink {
        pub received: Arc<Mutex<Vec<EncodedFrame>>>,
        pub open: Arc<AtomicBool>,
        pub closed_calls: Arc<AtomicBool>,
        behavior: Behavior,
    }

    impl RecordingSink {
        pub fn new(behavior: Behavior) -> Self {
            Self {
                received: Arc::new(Mutex::new(Vec::new())),
                open: Arc::new(AtomicBool::new(true)),
                closed_calls: Arc::new(AtomicBool::new(false)),
                behavior,
            }
        }

        pub fn received(&self) -> Vec<EncodedFrame> {
            self.received.lock().clone()
        }
    }

    impl FrameSink for RecordingSink {
        fn send(&self, frame: EncodedFrame) -> SendFuture<'_> {
            Box::pin(async move {
                match self.behavior {
                    Behavior::Accept => {
                        self.received.lock().push(frame);
                        Ok(())
                    }
                    Behavior::Full => Err(SendError::Full),
                    Behavior::Fail => Err(SendError::Transport("broken pipe".into())),
                    Behavior::Hang => std::future::pending().await,
                }
            })
        }

        fn close(&self) {
            self.open.store(false, Ordering::SeqCst);
            self.closed_calls.store(true, Ordering::SeqCst);
        }

        fn is_open(&self) -> bool {
            self.open.load(Ordering::SeqCst)
        }
    }

    pub fn subscriber(behavior: Behavior) -> (Subscriber, RecordingSink) {
        let sink = RecordingSink::new(behavior);
        (Subscriber::new(sink.clone()), sink)
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{subscriber, Behavior};

    #[test]
    fn test_ids_are_unique_and_increasing() {
        let (a, _) = subscriber(Behavior::Accept);
        let (b, _) = subscriber(Behavior::Accept);

        assert_ne!(a.id(), b.id());
        assert!(b.id() > a.id());
    }

    #[test]
    fn test_clones_share_identity() {
        let (a, _) = subscriber(Behavior::Accept);
        let b = a.clone();

        assert_eq!(a, b);
        assert!(!b.mark_removed());
        assert!(a.is_removed());
    }

    #[test]
    fn test_is_open_follows_sink() {
        let (sub, sink) = subscriber(Behavior::Accept);
        assert!(sub.is_open());

        sub.close();
        assert!(!sub.is_open());
        assert!(!sink.open.load(std::sync::atomic::Ordering::SeqCst));
    }
}
