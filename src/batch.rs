//! Batch coalescer: accumulates artist-detail IDs until a batch is full.

use parking_lot::Mutex;
use std::collections::HashSet;

/// The API's cap on artist IDs per `/artists?ids=...` request.
pub const MAX_BATCH_SIZE: usize = 50;

struct State {
    pending: HashSet<String>,
}

/// Stateful accumulator for artist-detail IDs. `add` is idempotent; `build`
/// atomically snapshots and clears the pending set so an ID can never appear
/// in more than one in-flight batch request.
pub struct BatchCoalescer {
    state: Mutex<State>,
    size: usize,
}

impl BatchCoalescer {
    pub fn new(size: usize) -> Self {
        Self {
            state: Mutex::new(State {
                pending: HashSet::new(),
            }),
            size,
        }
    }

    /// Idempotent insertion into the unique pending set.
    pub fn add(&self, id: impl Into<String>) {
        self.state.lock().pending.insert(id.into());
    }

    /// True when the pending count has reached the configured size.
    pub fn is_full(&self) -> bool {
        self.state.lock().pending.len() >= self.size
    }

    /// Atomically snapshot and clear the pending set, returning the IDs
    /// joined by commas (the wire format the API expects).
    pub fn build(&self) -> String {
        let mut state = self.state.lock();
        let ids: Vec<String> = state.pending.drain().collect();
        ids.join(",")
    }

    /// Atomically check-and-drain under one lock: `None` if the pending
    /// count hasn't reached the configured size, else `Some` of the built
    /// batch. Using this instead of separate `is_full`/`build` calls closes
    /// the race where two callers both observe "full" and both drain —
    /// the second would otherwise build an empty, invalid batch.
    pub fn build_if_full(&self) -> Option<String> {
        let mut state = self.state.lock();
        if state.pending.len() < self.size {
            return None;
        }
        let ids: Vec<String> = state.pending.drain().collect();
        Some(ids.join(","))
    }
}

impl Default for BatchCoalescer {
    fn default() -> Self {
        Self::new(MAX_BATCH_SIZE)
    }
}
