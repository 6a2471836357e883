//! Subscriber registry implementation
//!
//! Membership is stored copy-on-write: every add/remove builds a new list
//! and swaps it in, while readers clone the current `Arc`. The lock is held
//! only for the swap or the clone, never across I/O.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::stats::FanoutStats;

use super::error::SendError;
use super::subscriber::{Subscriber, SubscriberId};

/// Point-in-time view of registry membership
///
/// Independent of later adds and removes.
#[derive(Debug, Clone)]
pub struct Snapshot {
    subscribers: Arc<Vec<Subscriber>>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Subscriber> {
        self.subscribers.iter()
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.subscribers.iter().any(|s| s.id() == id)
    }

    /// Identities in registration order
    pub fn ids(&self) -> Vec<SubscriberId> {
        self.subscribers.iter().map(Subscriber::id).collect()
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = &'a Subscriber;
    type IntoIter = std::slice::Iter<'a, Subscriber>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Set of subscribers eligible for future frames
///
/// Created once per service and shared (`Arc`) between the connection
/// acceptor and the broadcast loop. After [`close_all`](Self::close_all)
/// the registry is closed and turns every later subscriber away.
pub struct SubscriberRegistry {
    subscribers: RwLock<Arc<Vec<Subscriber>>>,
    /// Only written with the `subscribers` write lock held
    closed: AtomicBool,
    stats: Arc<FanoutStats>,
}

impl SubscriberRegistry {
    /// Create an empty registry with its own counters
    pub fn new() -> Self {
        Self::with_stats(Arc::new(FanoutStats::new()))
    }

    /// Create an empty registry reporting into shared counters
    pub fn with_stats(stats: Arc<FanoutStats>) -> Self {
        Self {
            subscribers: RwLock::new(Arc::new(Vec::new())),
            closed: AtomicBool::new(false),
            stats,
        }
    }

    pub fn stats(&self) -> &Arc<FanoutStats> {
        &self.stats
    }

    /// Register a subscriber
    ///
    /// Returns `false` without changing membership if the subscriber is
    /// already registered or has been removed before. Once the registry is
    /// closed, the subscriber is removed and closed instead of added.
    pub fn add(&self, subscriber: Subscriber) -> bool {
        if subscriber.is_removed() {
            tracing::debug!(
                subscriber_id = %subscriber.id(),
                "Ignoring add of removed subscriber"
            );
            return false;
        }

        let count = {
            let mut guard = self.subscribers.write();
            if self.closed.load(Ordering::Acquire) {
                drop(guard);
                subscriber.mark_removed();
                subscriber.close();
                tracing::debug!(
                    subscriber_id = %subscriber.id(),
                    "Registry closed, subscriber rejected"
                );
                return false;
            }
            if guard.iter().any(|s| s.id() == subscriber.id()) {
                return false;
            }

            let mut next = Vec::with_capacity(guard.len() + 1);
            next.extend(guard.iter().cloned());
            next.push(subscriber.clone());
            let count = next.len();
            *guard = Arc::new(next);
            count
        };

        self.stats.record_added();
        tracing::info!(
            subscriber_id = %subscriber.id(),
            subscribers = count,
            "Subscriber added"
        );

        true
    }

    /// Remove a subscriber if present
    ///
    /// The subscriber is latched as removed before membership changes, so
    /// deliveries from snapshots taken earlier skip it from here on. Returns
    /// whether this call removed it from membership.
    pub fn remove(&self, subscriber: &Subscriber) -> bool {
        subscriber.mark_removed();

        let remaining = {
            let mut guard = self.subscribers.write();
            let Some(pos) = guard.iter().position(|s| s.id() == subscriber.id()) else {
                return false;
            };

            let mut next: Vec<Subscriber> = (**guard).clone();
            next.remove(pos);
            let remaining = next.len();
            *guard = Arc::new(next);
            remaining
        };

        self.stats.record_removed();
        tracing::debug!(
            subscriber_id = %subscriber.id(),
            subscribers = remaining,
            "Subscriber removed"
        );

        true
    }

    /// Remove a subscriber after a failed delivery and close its connection
    pub fn evict(&self, subscriber: &Subscriber, reason: &SendError) -> bool {
        let removed = self.remove(subscriber);
        subscriber.close();

        if removed {
            self.stats.record_eviction();
            tracing::warn!(
                subscriber_id = %subscriber.id(),
                reason = %reason,
                "Subscriber evicted"
            );
        }

        removed
    }

    /// Current membership
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            subscribers: self.subscribers.read().clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.read().is_empty()
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.subscribers.read().iter().any(|s| s.id() == id)
    }

    /// Whether [`close_all`](Self::close_all) has run
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close the registry, then remove and close every subscriber
    ///
    /// Used at shutdown. Returns the number of subscribers closed.
    pub fn close_all(&self) -> usize {
        let drained = {
            let mut guard = self.subscribers.write();
            self.closed.store(true, Ordering::Release);
            std::mem::take(&mut *guard)
        };

        for subscriber in drained.iter() {
            subscriber.mark_removed();
            subscriber.close();
            self.stats.record_removed();
        }

        if !drained.is_empty() {
            tracing::info!(closed = drained.len(), "Closed all subscribers");
        }

        drained.len()
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::super::subscriber::testing::{subscriber, Behavior};
    use super::*;

    #[test]
    fn test_add_remove() {
        let registry = SubscriberRegistry::new();
        let (a, _) = subscriber(Behavior::Accept);
        let (b, _) = subscriber(Behavior::Accept);

        assert!(registry.add(a.clone()));
        assert!(registry.add(b.clone()));
        assert_eq!(registry.len(), 2);

        assert!(registry.remove(&a));
        assert_eq!(registry.len(), 1);
        assert!(!registry.contains(a.id()));
        assert!(registry.contains(b.id()));
    }

    #[test]
    fn test_add_is_idempotent() {
        let registry = SubscriberRegistry::new();
        let (a, _) = subscriber(Behavior::Accept);

        assert!(registry.add(a.clone()));
        assert!(!registry.add(a.clone()));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.stats().snapshot().subscribers_added, 1);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let registry = SubscriberRegistry::new();
        let (a, _) = subscriber(Behavior::Accept);
        let (b, _) = subscriber(Behavior::Accept);
        registry.add(b.clone());

        assert!(!registry.remove(&a));
        assert_eq!(registry.len(), 1);

        // Transport close racing with eviction
        assert!(registry.remove(&b));
        assert!(!registry.remove(&b));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_removed_subscriber_cannot_rejoin() {
        let registry = SubscriberRegistry::new();
        let (a, _) = subscriber(Behavior::Accept);

        registry.add(a.clone());
        registry.remove(&a);

        assert!(!registry.add(a.clone()));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_snapshot_is_independent() {
        let registry = SubscriberRegistry::new();
        let (a, _) = subscriber(Behavior::Accept);
        let (b, _) = subscriber(Behavior::Accept);
        let (c, _) = subscriber(Behavior::Accept);
        registry.add(a.clone());
        registry.add(b.clone());

        let snapshot = registry.snapshot();

        registry.remove(&a);
        registry.add(c.clone());

        assert_eq!(snapshot.ids(), vec![a.id(), b.id()]);
        assert_eq!(registry.snapshot().ids(), vec![b.id(), c.id()]);

        // Removal is still visible through the stale snapshot's handle
        let stale = snapshot.iter().find(|s| s.id() == a.id()).unwrap();
        assert!(stale.is_removed());
    }

    #[test]
    fn test_evict_closes_and_counts() {
        let registry = SubscriberRegistry::new();
        let (a, sink) = subscriber(Behavior::Fail);
        registry.add(a.clone());

        assert!(registry.evict(&a, &SendError::Closed));
        assert!(sink.closed_calls.load(Ordering::SeqCst));
        assert!(registry.is_empty());

        // A second eviction of the same subscriber is not counted again
        assert!(!registry.evict(&a, &SendError::Closed));
        assert_eq!(registry.stats().snapshot().evictions, 1);
    }

    #[test]
    fn test_close_all() {
        let registry = SubscriberRegistry::new();
        let (a, sink_a) = subscriber(Behavior::Accept);
        let (b, sink_b) = subscriber(Behavior::Accept);
        registry.add(a.clone());
        registry.add(b.clone());

        assert_eq!(registry.close_all(), 2);
        assert!(registry.is_empty());
        assert!(a.is_removed() && b.is_removed());
        assert!(sink_a.closed_calls.load(Ordering::SeqCst));
        assert!(sink_b.closed_calls.load(Ordering::SeqCst));
        assert_eq!(registry.close_all(), 0);
    }

    #[test]
    fn test_add_after_close_all_is_rejected() {
        let registry = SubscriberRegistry::new();
        registry.close_all();
        assert!(registry.is_closed());

        let (late, sink) = subscriber(Behavior::Accept);

        assert!(!registry.add(late.clone()));
        assert!(registry.is_empty());
        assert!(late.is_removed());
        assert!(sink.closed_calls.load(Ordering::SeqCst));
        assert_eq!(registry.stats().snapshot().subscribers_added, 0);
    }

    #[test]
    fn test_concurrent_add_remove() {
        let registry = Arc::new(SubscriberRegistry::new());
        let mut handles = Vec::new();

        for _ in 0..8 {
            let registry = Arc::clone(&registry);
            handles.push(std::thread::spawn(move || {
                let mut kept = Vec::new();
                for i in 0..100 {
                    let (sub, _) = subscriber(Behavior::Accept);
                    registry.add(sub.clone());
                    let _ = registry.snapshot();
                    if i % 2 == 0 {
                        registry.remove(&sub);
                    } else {
                        kept.push(sub.id());
                    }
                }
                kept
            }));
        }

        let kept: Vec<_> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), kept.len());
        assert!(kept.iter().all(|id| snapshot.contains(*id)));
    }
}
