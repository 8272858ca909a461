//! Observability counters for the ingestion pipeline
//!
//! Plain atomic counters shared across the delivery loop, the
//! subscription manager, and the writer task. Exported as a sorted
//! map for log-based exposition.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Core counters for the ingestion pipeline.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    // Delivery and decoding
    pub messages_received: AtomicU64,
    pub decode_failures: AtomicU64,
    pub ticks_decoded: AtomicU64,
    pub non_finite_dropped: AtomicU64,

    // Subscription expansion
    pub unknown_index: AtomicU64,
    pub resolutions_attempted: AtomicU64,
    pub resolution_failures: AtomicU64,
    pub subscriptions_active: AtomicU64,

    // Persistence
    pub ticks_enqueued: AtomicU64,
    pub ticks_dropped_shutdown: AtomicU64,
    pub batches_flushed: AtomicU64,
    pub flush_failures: AtomicU64,
    pub rows_written: AtomicU64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bump a counter by one.
    pub fn incr(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Bump a counter by `n`.
    pub fn add(&self, counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Set a gauge-style counter to an absolute value.
    pub fn set(&self, counter: &AtomicU64, value: u64) {
        counter.store(value, Ordering::Relaxed);
    }

    /// Export all counters for exposition.
    pub fn export(&self) -> BTreeMap<&'static str, u64> {
        let mut m = BTreeMap::new();
        let mut put = |name, counter: &AtomicU64| {
            m.insert(name, counter.load(Ordering::Relaxed));
        };
        put("messages_received", &self.messages_received);
        put("decode_failures", &self.decode_failures);
        put("ticks_decoded", &self.ticks_decoded);
        put("non_finite_dropped", &self.non_finite_dropped);
        put("unknown_index", &self.unknown_index);
        put("resolutions_attempted", &self.resolutions_attempted);
        put("resolution_failures", &self.resolution_failures);
        put("subscriptions_active", &self.subscriptions_active);
        put("ticks_enqueued", &self.ticks_enqueued);
        put("ticks_dropped_shutdown", &self.ticks_dropped_shutdown);
        put("batches_flushed", &self.batches_flushed);
        put("flush_failures", &self.flush_failures);
        put("rows_written", &self.rows_written);
        m
    }
}
