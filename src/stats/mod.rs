//! Fan-out statistics
//!
//! Counters for frames, deliveries, and subscriber churn. Evictions are
//! counted here as well as logged, so failed subscribers never disappear
//! silently.

pub mod metrics;

pub use metrics::{FanoutStats, StatsSnapshot};
