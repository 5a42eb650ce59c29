//! Engine observability counters
//!
//! Cheap atomic counters shared across all symbol workers. A
//! [`MetricsSnapshot`] gives operators a serializable point-in-time
//! reading.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters for the synchronization engine.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    events_applied: AtomicU64,
    resyncs: AtomicU64,
    snapshots_fetched: AtomicU64,
    snapshot_failures: AtomicU64,
    updates_published: AtomicU64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_event_applied(&self) {
        self.events_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_resync(&self) {
        self.resyncs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_snapshot_fetched(&self) {
        self.snapshots_fetched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_snapshot_failure(&self) {
        self.snapshot_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_update_published(&self) {
        self.updates_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn events_applied(&self) -> u64 {
        self.events_applied.load(Ordering::Relaxed)
    }

    pub fn resyncs(&self) -> u64 {
        self.resyncs.load(Ordering::Relaxed)
    }

    pub fn snapshots_fetched(&self) -> u64 {
        self.snapshots_fetched.load(Ordering::Relaxed)
    }

    pub fn snapshot_failures(&self) -> u64 {
        self.snapshot_failures.load(Ordering::Relaxed)
    }

    pub fn updates_published(&self) -> u64 {
        self.updates_published.load(Ordering::Relaxed)
    }

    /// Point-in-time reading of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_applied: self.events_applied(),
            resyncs: self.resyncs(),
            snapshots_fetched: self.snapshots_fetched(),
            snapshot_failures: self.snapshot_failures(),
            updates_published: self.updates_published(),
        }
    }
}

/// Serializable counter reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub events_applied: u64,
    pub resyncs: u64,
    pub snapshots_fetched: u64,
    pub snapshot_failures: u64,
    pub updates_published: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = EngineMetrics::new();

        metrics.record_event_applied();
        metrics.record_event_applied();
        metrics.record_resync();
        metrics.record_snapshot_fetched();
        metrics.record_snapshot_failure();
        metrics.record_update_published();

        let snap = metrics.snapshot();
        assert_eq!(snap.events_applied, 2);
        assert_eq!(snap.resyncs, 1);
        assert_eq!(snap.snapshots_fetched, 1);
        assert_eq!(snap.snapshot_failures, 1);
        assert_eq!(snap.updates_published, 1);
    }
}
