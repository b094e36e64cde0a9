//! Controller gauges and counters.
//!
//! Readers outside the event loop (e.g. an HTTP metrics endpoint) may only read these
//! volatile scalar snapshots, never the `ControllerContext` itself — see the
//! concurrency model's "Shared resources" note.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Point-in-time snapshot of controller gauges, safe to read from any thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerMetricsSnapshot {
    pub active_controller_count: i64,
    pub offline_partitions_count: u64,
    pub global_topic_count: u64,
    pub global_partition_count: u64,
    pub events_processed: u64,
}

/// Atomic counters backing the five gauges from the controller's external
/// interfaces, plus an event-processing counter used for the per-state rate
/// histograms approximated here as a running total.
#[derive(Debug, Default)]
pub struct ControllerMetrics {
    active_controller_count: AtomicI64,
    offline_partitions_count: AtomicU64,
    global_topic_count: AtomicU64,
    global_partition_count: AtomicU64,
    events_processed: AtomicU64,
}

impl ControllerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_active_controller(&self, active: bool) {
        self.active_controller_count
            .store(if active { 1 } else { 0 }, Ordering::Relaxed);
    }

    pub fn set_offline_partitions_count(&self, count: u64) {
        self.offline_partitions_count.store(count, Ordering::Relaxed);
    }

    pub fn set_global_topic_count(&self, count: u64) {
        self.global_topic_count.store(count, Ordering::Relaxed);
    }

    pub fn set_global_partition_count(&self, count: u64) {
        self.global_partition_count.store(count, Ordering::Relaxed);
    }

    pub fn record_event_processed(&self) {
        self.events_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ControllerMetricsSnapshot {
        ControllerMetricsSnapshot {
            active_controller_count: self.active_controller_count.load(Ordering::Relaxed),
            offline_partitions_count: self.offline_partitions_count.load(Ordering::Relaxed),
            global_topic_count: self.global_topic_count.load(Ordering::Relaxed),
            global_partition_count: self.global_partition_count.load(Ordering::Relaxed),
            events_processed: self.events_processed.load(Ordering::Relaxed),
        }
    }
}
