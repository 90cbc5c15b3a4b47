//! Scheduler / prioritizer: per-route staging queues with online reprioritization.

use crate::route::{Endpoint, RouteKind};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

/// Holds the mutable priority ordering over route kinds and the per-route
/// staging queues that hold newly discovered endpoints awaiting a flush.
///
/// One lock per route's queue, and a separate lock guarding the priority
/// order — so `put` on one route never contends with `put` on another, or
/// with a concurrent `set_priority`.
pub struct Prioritizer {
    staging: HashMap<RouteKind, Mutex<VecDeque<Endpoint>>>,
    priority: Mutex<Vec<RouteKind>>,
}

impl Prioritizer {
    pub fn new() -> Self {
        let mut staging = HashMap::new();
        for kind in RouteKind::ALL {
            staging.insert(kind, Mutex::new(VecDeque::new()));
        }
        Self {
            staging,
            priority: Mutex::new(RouteKind::ALL.to_vec()),
        }
    }

    /// Append a discovered endpoint to its route's staging queue.
    pub fn put(&self, route_kind: RouteKind, endpoint: Endpoint) {
        self.staging[&route_kind].lock().push_back(endpoint);
    }

    /// True when every staging queue is empty — consulted by the
    /// orchestrator's termination predicate.
    pub fn is_empty(&self) -> bool {
        self.staging.values().all(|q| q.lock().is_empty())
    }

    /// Sort route kinds by `scores[k]` descending and install atomically.
    /// A route kind missing from `scores` keeps a score of 0.
    pub fn set_priority(&self, scores: &HashMap<RouteKind, f64>) {
        let mut order = RouteKind::ALL.to_vec();
        order.sort_by(|a, b| {
            let sa = scores.get(a).copied().unwrap_or(0.0);
            let sb = scores.get(b).copied().unwrap_or(0.0);
            sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal)
        });
        *self.priority.lock() = order;
    }

    /// Pop up to `n` endpoints total, visiting route kinds in current
    /// priority order; from each route take `min(remaining_budget, len)`
    /// from its head.
    pub fn flush(&self, n: usize) -> Vec<Endpoint> {
        let mut output = Vec::with_capacity(n);
        let priority = self.priority.lock().clone();
        for kind in priority {
            if output.len() >= n {
                break;
            }
            let mut queue = self.staging[&kind].lock();
            let take = (n - output.len()).min(queue.len());
            output.extend(queue.drain(..take));
        }
        output
    }
}

impl Default for Prioritizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn ep(path: &str, kind: RouteKind) -> Endpoint {
        Endpoint::with_route_kind(path, BTreeMap::new(), kind)
    }

    #[test]
    fn priority_flush_respects_installed_order() {
        let prioritizer = Prioritizer::new();
        let mut scores = HashMap::new();
        scores.insert(RouteKind::Artists, 2.0);
        scores.insert(RouteKind::Search, 1.0);
        prioritizer.set_priority(&scores);

        prioritizer.put(RouteKind::Artists, ep("/artists/x", RouteKind::Artists));
        prioritizer.put(RouteKind::Search, ep("/search/y", RouteKind::Search));
        prioritizer.put(RouteKind::Artists, ep("/artists/z", RouteKind::Artists));

        let first = prioritizer.flush(2);
        assert_eq!(
            first.iter().map(Endpoint::path).collect::<Vec<_>>(),
            vec!["/artists/x", "/artists/z"]
        );

        let second = prioritizer.flush(1);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].path(), "/search/y");
    }

    #[test]
    fn flush_stops_at_budget_across_routes() {
        let prioritizer = Prioritizer::new();
        let mut scores = HashMap::new();
        scores.insert(RouteKind::Artists, 3.0);
        scores.insert(RouteKind::Albums, 2.0);
        prioritizer.set_priority(&scores);

        for i in 0..5 {
            prioritizer.put(RouteKind::Artists, ep(&format!("/artists/{i}"), RouteKind::Artists));
        }
        for i in 0..5 {
            prioritizer.put(RouteKind::Albums, ep(&format!("/albums/{i}"), RouteKind::Albums));
        }

        let flushed = prioritizer.flush(7);
        assert_eq!(flushed.len(), 7);
        let artists = flushed.iter().filter(|e| e.path().starts_with("/artists")).count();
        let albums = flushed.iter().filter(|e| e.path().starts_with("/albums")).count();
        assert_eq!(artists, 5);
        assert_eq!(albums, 2);
    }

    #[test]
    fn is_empty_tracks_all_routes() {
        let prioritizer = Prioritizer::new();
        assert!(prioritizer.is_empty());
        prioritizer.put(RouteKind::Search, ep("/search/x", RouteKind::Search));
        assert!(!prioritizer.is_empty());
        prioritizer.flush(100);
        assert!(prioritizer.is_empty());
    }
}
