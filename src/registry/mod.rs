//! Subscriber registry
//!
//! The registry tracks every viewer currently eligible to receive frames.
//! Connection handlers add and remove subscribers; the broadcast loop takes
//! one snapshot per frame and evicts subscribers whose delivery fails.
//!
//! # Architecture
//!
//! ```text
//!                     Arc<SubscriberRegistry>
//!                 ┌───────────────────────────────┐
//!                 │ RwLock<Arc<Vec<Subscriber>>>  │
//!                 └──────┬─────────────────┬──────┘
//!          add / remove  │                 │  snapshot (Arc clone)
//!     (swap in new Vec)  │                 │
//!                        ▼                 ▼
//!               [Connection task]    [Broadcast loop]
//!               ws accept / close    per-frame fan-out
//!                                          │
//!                                          └──► evict() on failed send
//! ```
//!
//! # Copy-on-Write
//!
//! Mutations build a fresh `Vec` and swap it in under a short write lock;
//! a snapshot is one `Arc` clone under a read lock. Neither lock is ever
//! held across network I/O, so connection churn and frame delivery do not
//! wait on each other.

pub mod error;
pub mod store;
pub mod subscriber;

pub use error::SendError;
pub use store::{Snapshot, SubscriberRegistry};
pub use subscriber::{FrameSink, SendFuture, Subscriber, SubscriberId};
