//! Per-route metrics consumed by the prioritizer to compute adaptive scores.

use crate::route::RouteKind;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Clone, Copy, Debug, Default)]
pub struct RouteMetrics {
    pub total_time: f64,
    pub calls: u64,
    pub added: u64,
    pub batched: u64,
}

impl RouteMetrics {
    /// `(added + 0.5 * batched) / calls`, 0 when `calls = 0`.
    pub fn score(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            (self.added as f64 + 0.5 * self.batched as f64) / self.calls as f64
        }
    }
}

/// Guarded by a single lock: route metrics are touched by many workers
/// concurrently on the multi-threaded runtime (unlike a single-threaded
/// cooperative scheduler, no suspension-free update is safe here).
pub struct MetricsTable {
    inner: Mutex<HashMap<RouteKind, RouteMetrics>>,
}

impl MetricsTable {
    pub fn new() -> Self {
        let mut inner = HashMap::new();
        for kind in RouteKind::ALL {
            inner.insert(kind, RouteMetrics::default());
        }
        Self {
            inner: Mutex::new(inner),
        }
    }

    /// Record a successful response's outcome against its route kind.
    pub fn record(&self, kind: RouteKind, call_time: Duration, added: u64, batched: u64) {
        let mut table = self.inner.lock();
        let entry = table.entry(kind).or_default();
        entry.total_time += call_time.as_secs_f64();
        entry.calls += 1;
        entry.added += added;
        entry.batched += batched;
    }

    /// Snapshot of `{route_kind: score}` for every route, consumed by the
    /// prioritizer's `set_priority`.
    pub fn scores(&self) -> HashMap<RouteKind, f64> {
        self.inner
            .lock()
            .iter()
            .map(|(kind, metrics)| (*kind, metrics.score()))
            .collect()
    }
}

impl Default for MetricsTable {
    fn default() -> Self {
        Self::new()
    }
}
