//! Global backoff/rate-limit state machine with full-jitter exponential wait.

use parking_lot::Mutex;
use rand::Rng;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

const BASE_SECS: f64 = 1.0;

struct State {
    attempts: u32,
    retry_after: Option<f64>,
}

/// Shared, lock-protected backoff state consulted by every worker before
/// each fetch. Not per-route — a 429 anywhere throttles the whole crawl.
pub struct BackoffController {
    state: Mutex<State>,
    cap_secs: f64,
    rate_limit_hits: AtomicU32,
    safety_threshold: u32,
}

impl BackoffController {
    pub fn new(cap_secs: f64, safety_threshold: u32) -> Self {
        Self {
            state: Mutex::new(State {
                attempts: 0,
                retry_after: None,
            }),
            cap_secs,
            rate_limit_hits: AtomicU32::new(0),
            safety_threshold,
        }
    }

    /// `a <- a + 1`.
    pub fn incr_attempts(&self) {
        self.state.lock().attempts += 1;
    }

    /// `retry_after <- min(retry_after, r)`, with `None` replaced by `r`.
    pub fn set_retry_after(&self, r: f64) {
        let mut state = self.state.lock();
        state.retry_after = Some(match state.retry_after {
            Some(current) => current.min(r),
            None => r,
        });
    }

    /// Full-jitter exponential backoff: `uniform(0, min(cap, base * 2^(a-1)))`,
    /// clamped further by any observed `Retry-After` suggestion.
    pub fn get_backoff(&self) -> Duration {
        let state = self.state.lock();
        if state.attempts == 0 {
            return Duration::ZERO;
        }
        let exp = BASE_SECS * 2f64.powi((state.attempts - 1) as i32);
        let ceiling = exp.min(self.cap_secs);
        let jitter = rand::thread_rng().gen_range(0.0..=ceiling);
        let wait = match state.retry_after {
            Some(retry_after) => retry_after.min(jitter),
            None => jitter,
        };
        Duration::from_secs_f64(wait.max(0.0))
    }

    /// Increment the 429 safety counter. Returns the new count.
    pub fn record_rate_limit_hit(&self) -> u32 {
        self.rate_limit_hits.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// True once the safety counter has reached the configured threshold —
    /// a kill-switch, not a retry policy.
    pub fn safety_tripped(&self) -> bool {
        self.rate_limit_hits.load(Ordering::SeqCst) >= self.safety_threshold
    }
}
