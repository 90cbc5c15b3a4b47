//! Two-tier work queue: primary and secondary FIFOs, plus in-flight accounting.

use crate::route::Endpoint;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, Notify};

/// Which tier an item was drawn from, so the caller knows where to reinject
/// it on a transient failure and where to signal completion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tier {
    Primary,
    Secondary,
}

/// Primary and secondary FIFO queues with an in-flight counter, so the
/// orchestrator's termination check can distinguish "empty and idle" from
/// "empty but a worker is still mid-fetch".
///
/// Primary is drained before secondary whenever both are non-empty at the
/// instant a worker asks for work (no stronger ordering is promised).
pub struct QueueFabric {
    primary: Mutex<VecDeque<Endpoint>>,
    secondary: Mutex<VecDeque<Endpoint>>,
    in_flight: AtomicUsize,
    notify: Notify,
}

impl QueueFabric {
    pub fn new() -> Self {
        Self {
            primary: Mutex::new(VecDeque::new()),
            secondary: Mutex::new(VecDeque::new()),
            in_flight: AtomicUsize::new(0),
            notify: Notify::new(),
        }
    }

    /// Push onto primary (seeds, batched artist-detail requests).
    pub async fn push_primary(&self, endpoint: Endpoint) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.primary.lock().await.push_back(endpoint);
        self.notify.notify_one();
    }

    /// Push onto secondary (retries, overflow, flushed staging).
    pub async fn push_secondary(&self, endpoint: Endpoint) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.secondary.lock().await.push_back(endpoint);
        self.notify.notify_one();
    }

    /// Push a batch of endpoints onto secondary (flush output).
    pub async fn push_secondary_many(&self, endpoints: Vec<Endpoint>) {
        if endpoints.is_empty() {
            return;
        }
        self.in_flight.fetch_add(endpoints.len(), Ordering::SeqCst);
        let mut secondary = self.secondary.lock().await;
        secondary.extend(endpoints);
        drop(secondary);
        self.notify.notify_waiters();
    }

    /// Pop the next endpoint per the precedence rule: primary if non-empty,
    /// otherwise secondary. Returns `None` if both are currently empty
    /// (the caller decides whether to wait or treat this as terminal).
    pub async fn try_pop(&self) -> Option<(Endpoint, Tier)> {
        {
            let mut primary = self.primary.lock().await;
            if let Some(endpoint) = primary.pop_front() {
                return Some((endpoint, Tier::Primary));
            }
        }
        let mut secondary = self.secondary.lock().await;
        secondary.pop_front().map(|e| (e, Tier::Secondary))
    }

    /// Wait until either queue gains an item or `timeout` elapses. Used by
    /// workers to avoid busy-polling an empty-but-not-done queue.
    pub async fn wait_for_work(&self, timeout: std::time::Duration) {
        let notified = self.notify.notified();
        tokio::select! {
            _ = notified => {}
            _ = tokio::time::sleep(timeout) => {}
        }
    }

    /// Signal that a previously popped (or staged) item has finished
    /// processing, regardless of outcome (including drops).
    pub fn task_done(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    /// Reinject an endpoint on secondary without affecting the in-flight
    /// counter (the original `push` already accounted for it; this is the
    /// same logical item, not a new one).
    pub async fn reinject(&self, endpoint: Endpoint) {
        self.secondary.lock().await.push_back(endpoint);
        self.notify.notify_one();
    }

    pub async fn primary_is_empty(&self) -> bool {
        self.primary.lock().await.is_empty()
    }

    pub async fn secondary_is_empty(&self) -> bool {
        self.secondary.lock().await.is_empty()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

impl Default for QueueFabric {
    fn default() -> Self {
        Self::new()
    }
}
