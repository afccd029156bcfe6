// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Metrics collaborator interface and the in-crate registry implementation.
//!
//! The receiver reports a named timer (per-dispatch latency) and a named
//! counter (dispatch rejections) through [`MetricsSink`]. The sink is
//! purely observational: nothing it does influences control flow.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Observational metrics collaborator.
///
/// Implementations must be cheap and non-blocking; the counter path runs
/// on the reader hot path under overload.
pub trait MetricsSink: Send + Sync {
    /// Record one sample of a named timer.
    fn record_timer(&self, name: &str, elapsed: Duration);

    /// Add `delta` to a named monotonic counter.
    fn increment_counter(&self, name: &str, delta: u64);
}

/// Aggregate view of a named timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerSnapshot {
    /// Number of recorded samples.
    pub count: u64,
    /// Sum of all samples.
    pub total: Duration,
    /// Largest single sample.
    pub max: Duration,
}

#[derive(Default)]
struct TimerCell {
    count: AtomicU64,
    total_ns: AtomicU64,
    max_ns: AtomicU64,
}

/// Lock-free metrics registry keyed by metric name.
///
/// Counter increment: single atomic add once the name exists (the first
/// touch of a name allocates its entry).
#[derive(Default)]
pub struct MetricsRegistry {
    counters: DashMap<String, AtomicU64>,
    timers: DashMap<String, TimerCell>,
}

impl MetricsRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a named counter (0 if never incremented).
    #[must_use]
    pub fn counter(&self, name: &str) -> u64 {
        self.counters
            .get(name)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Aggregate view of a named timer, if any sample was recorded.
    #[must_use]
    pub fn timer(&self, name: &str) -> Option<TimerSnapshot> {
        self.timers.get(name).map(|cell| TimerSnapshot {
            count: cell.count.load(Ordering::Relaxed),
            total: Duration::from_nanos(cell.total_ns.load(Ordering::Relaxed)),
            max: Duration::from_nanos(cell.max_ns.load(Ordering::Relaxed)),
        })
    }
}

impl MetricsSink for MetricsRegistry {
    fn record_timer(&self, name: &str, elapsed: Duration) {
        let ns = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        if let Some(cell) = self.timers.get(name) {
            cell.count.fetch_add(1, Ordering::Relaxed);
            cell.total_ns.fetch_add(ns, Ordering::Relaxed);
            cell.max_ns.fetch_max(ns, Ordering::Relaxed);
            return;
        }
        let cell = self.timers.entry(name.to_owned()).or_default();
        cell.count.fetch_add(1, Ordering::Relaxed);
        cell.total_ns.fetch_add(ns, Ordering::Relaxed);
        cell.max_ns.fetch_max(ns, Ordering::Relaxed);
    }

    fn increment_counter(&self, name: &str, delta: u64) {
        if let Some(counter) = self.counters.get(name) {
            counter.fetch_add(delta, Ordering::Relaxed);
            return;
        }
        self.counters
            .entry(name.to_owned())
            .or_default()
            .fetch_add(delta, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_accumulates() {
        let registry = MetricsRegistry::new();
        assert_eq!(registry.counter("udp-rejected"), 0);

        registry.increment_counter("udp-rejected", 1);
        registry.increment_counter("udp-rejected", 5);
        assert_eq!(registry.counter("udp-rejected"), 6);

        // Other names are independent
        assert_eq!(registry.counter("other"), 0);
    }

    #[test]
    fn timer_tracks_count_total_and_max() {
        let registry = MetricsRegistry::new();
        assert!(registry.timer("udp-timer").is_none());

        registry.record_timer("udp-timer", Duration::from_micros(100));
        registry.record_timer("udp-timer", Duration::from_micros(300));
        registry.record_timer("udp-timer", Duration::from_micros(200));

        let snap = registry.timer("udp-timer").expect("timer should exist");
        assert_eq!(snap.count, 3);
        assert_eq!(snap.total, Duration::from_micros(600));
        assert_eq!(snap.max, Duration::from_micros(300));
    }

    #[test]
    fn concurrent_increments_do_not_lose_updates() {
        use std::sync::Arc;

        let registry = Arc::new(MetricsRegistry::new());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let r = Arc::clone(&registry);
            handles.push(std::thread::spawn(move || {
                for _ in 0..1000 {
                    r.increment_counter("contended", 1);
                }
            }));
        }
        for h in handles {
            h.join().expect("worker thread should not panic");
        }
        assert_eq!(registry.counter("contended"), 4000);
    }
}
