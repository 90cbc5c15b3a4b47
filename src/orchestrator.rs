//! Orchestrator: owns the worker pool, termination, and the shared state
//! every component and dispatch handler operates on.

use crate::backoff::BackoffController;
use crate::batch::BatchCoalescer;
use crate::cache::DedupCache;
use crate::dispatch;
use crate::errors::InitError;
use crate::http_client::{Credentials, FetchOutcome, HttpClientAdapter};
use crate::metrics::MetricsTable;
use crate::prioritizer::Prioritizer;
use crate::queue::{QueueFabric, Tier};
use crate::route::{Endpoint, RouteKind};
use crate::writer::ArtistWriter;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Re-rank route priority every `PRIORITY_CADENCE` written artists.
const PRIORITY_CADENCE: u64 = 20;
/// Flush staging into secondary every `FLUSH_CADENCE` written artists.
const FLUSH_CADENCE: u64 = 50;
/// How many endpoints a single flush moves from staging to secondary.
const FLUSH_BATCH_SIZE: usize = 100;
/// Backoff cap, seconds.
const BACKOFF_CAP_SECS: f64 = 1800.0;
/// Consecutive 429s before the safety valve trips.
const SAFETY_THRESHOLD: u32 = 5;
/// Poll interval while waiting on an empty-but-maybe-not-done queue.
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// All shared, independently-locked state the worker pool and dispatch
/// handlers cooperate through. Each field is locked or made atomic
/// independently so no path through the crawl relies on cooperative,
/// single-threaded scheduling.
pub struct Shared {
    pub queues: QueueFabric,
    pub prioritizer: Prioritizer,
    pub cache: DedupCache,
    pub batch: BatchCoalescer,
    pub writer: ArtistWriter,
    pub metrics: MetricsTable,
    pub backoff: BackoffController,
    pub http: HttpClientAdapter,
    pub total: AtomicU64,
    pub quota: u64,
    /// How many `PRIORITY_CADENCE`-sized chunks of written artists have
    /// already triggered a re-rank. `total` can jump by more than one per
    /// dispatch (a single `/artists` batch response writes many rows before
    /// the cadence check runs once), so an exact `total % CADENCE == 0` test
    /// would miss a crossing that steps over the multiple. Comparing chunk
    /// counts via `fetch_max` catches every crossing exactly once, even
    /// under concurrent writers.
    pub priority_mark: AtomicU64,
    /// Same scheme as `priority_mark`, for the staging flush cadence.
    pub flush_mark: AtomicU64,
}

impl Shared {
    /// True once the artist quota has been reached (I4: never exceeded).
    pub fn quota_reached(&self) -> bool {
        self.total.load(Ordering::SeqCst) >= self.quota
    }

    /// Attempt to claim one unit of quota for a pending write. Returns
    /// `true` if the caller may proceed to write; enforces I4 even under
    /// concurrent writers racing the last remaining slots.
    pub fn try_claim_quota(&self) -> bool {
        loop {
            let current = self.total.load(Ordering::SeqCst);
            if current >= self.quota {
                return false;
            }
            if self
                .total
                .compare_exchange(current, current + 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return true;
            }
        }
    }
}

/// The nine seed endpoints crawled at startup.
fn genre_seed_endpoint() -> Endpoint {
    Endpoint::with_route_kind(
        "/recommendations/available-genre-seeds",
        BTreeMap::new(),
        RouteKind::GenreSeeds,
    )
}

fn categories_seed_endpoint() -> Endpoint {
    Endpoint::with_route_kind("/browse/categories", BTreeMap::new(), RouteKind::Categories)
}

/// Owns the worker pool and the single public operation, `run`.
pub struct Orchestrator {
    shared: Arc<Shared>,
    num_workers: usize,
}

impl Orchestrator {
    pub async fn new(
        credentials: Credentials,
        cache: DedupCache,
        writer: ArtistWriter,
        quota: u64,
        num_workers: usize,
    ) -> Result<Self, InitError> {
        let http = HttpClientAdapter::new(credentials)?;
        http.refresh_token().await?;

        let shared = Arc::new(Shared {
            queues: QueueFabric::new(),
            prioritizer: Prioritizer::new(),
            cache,
            batch: BatchCoalescer::default(),
            writer,
            metrics: MetricsTable::new(),
            backoff: BackoffController::new(BACKOFF_CAP_SECS, SAFETY_THRESHOLD),
            http,
            total: AtomicU64::new(0),
            quota,
            priority_mark: AtomicU64::new(0),
            flush_mark: AtomicU64::new(0),
        });

        Ok(Self {
            shared,
            num_workers,
        })
    }

    /// Run the crawl to completion: enqueue the seed endpoints, spawn the
    /// worker pool, and block until the termination predicate holds.
    pub async fn run(&self) -> Result<u64, InitError> {
        self.shared.queues.push_primary(genre_seed_endpoint()).await;
        self.shared
            .queues
            .push_primary(categories_seed_endpoint())
            .await;

        let token = CancellationToken::new();
        let mut handles = Vec::with_capacity(self.num_workers);
        for id in 0..self.num_workers {
            let shared = self.shared.clone();
            let token = token.clone();
            handles.push(tokio::spawn(worker_loop(id, shared, token)));
        }

        self.wait_for_termination().await;
        token.cancel();

        for handle in handles {
            let _ = handle.await;
        }

        self.shared.writer.flush().await?;
        Ok(self.shared.total.load(Ordering::SeqCst))
    }

    async fn wait_for_termination(&self) {
        loop {
            if self.shared.quota_reached() {
                return;
            }
            let primary_empty = self.shared.queues.primary_is_empty().await;
            let secondary_empty = self.shared.queues.secondary_is_empty().await;
            let staging_empty = self.shared.prioritizer.is_empty();
            let idle = self.shared.queues.in_flight_count() == 0;

            if primary_empty && secondary_empty && staging_empty && idle {
                return;
            }

            if primary_empty && secondary_empty && !staging_empty {
                // Liveness: never let workers starve on empty active queues
                // while staging still holds undrained work.
                let flushed = self.shared.prioritizer.flush(FLUSH_BATCH_SIZE);
                self.shared.queues.push_secondary_many(flushed).await;
            }

            tokio::time::sleep(IDLE_POLL_INTERVAL).await;
        }
    }
}

async fn worker_loop(worker_id: usize, shared: Arc<Shared>, token: CancellationToken) {
    loop {
        if token.is_cancelled() {
            return;
        }

        let popped = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            popped = shared.queues.try_pop() => popped,
        };

        let Some((endpoint, tier)) = popped else {
            shared.queues.wait_for_work(IDLE_POLL_INTERVAL).await;
            continue;
        };

        if shared.quota_reached() {
            shared.queues.task_done();
            continue;
        }

        let span = tracing::debug_span!("fetch_cycle", worker_id, path = endpoint.path());
        run_fetch_cycle(&shared, endpoint, tier).instrument(span).await;
    }
}

/// The fetch cycle in §4.7: safety valve, backoff wait, request, and
/// outcome-driven branching. Dispatch errors are caught and logged; they
/// never propagate out and never kill the worker.
async fn run_fetch_cycle(shared: &Arc<Shared>, endpoint: Endpoint, _tier: Tier) {
    if shared.backoff.safety_tripped() {
        shared.queues.task_done();
        return;
    }

    let wait = shared.backoff.get_backoff();
    if !wait.is_zero() {
        tokio::time::sleep(wait).await;
    }

    let outcome = shared.http.fetch(endpoint.path(), endpoint.params()).await;

    match outcome {
        FetchOutcome::Transport => {
            tracing::warn!(path = endpoint.path(), "transport failure, reinjecting");
            shared.queues.reinject(endpoint).await;
        }
        FetchOutcome::RateLimited { retry_after } => {
            let hits = shared.backoff.record_rate_limit_hit();
            if let Some(retry_after) = retry_after {
                shared.backoff.set_retry_after(retry_after);
            }
            shared.backoff.incr_attempts();
            tracing::warn!(path = endpoint.path(), hits, "rate limited, reinjecting");
            shared.queues.reinject(endpoint).await;
        }
        FetchOutcome::TokenExpired => {
            if let Err(err) = shared.http.refresh_token().await {
                tracing::error!(error = %err, "token refresh failed");
            }
            shared.queues.reinject(endpoint).await;
        }
        FetchOutcome::Forbidden => {
            tracing::error!(path = endpoint.path(), "forbidden, dropping endpoint");
            shared.queues.task_done();
        }
        FetchOutcome::Success { data, call_time } => {
            let route_kind = endpoint.route_kind();
            let (added, batched) = dispatch::dispatch(shared, &endpoint, data).await;
            shared.metrics.record(route_kind, call_time, added, batched);
            shared.queues.task_done();
            maybe_reprioritize_and_flush(shared).await;
        }
    }
}

async fn maybe_reprioritize_and_flush(shared: &Arc<Shared>) {
    let total = shared.total.load(Ordering::SeqCst);

    let priority_chunk = total / PRIORITY_CADENCE;
    if priority_chunk > 0 && shared.priority_mark.fetch_max(priority_chunk, Ordering::SeqCst) < priority_chunk {
        shared.prioritizer.set_priority(&shared.metrics.scores());
    }

    let flush_chunk = total / FLUSH_CADENCE;
    if flush_chunk > 0 && shared.flush_mark.fetch_max(flush_chunk, Ordering::SeqCst) < flush_chunk {
        let flushed = shared.prioritizer.flush(FLUSH_BATCH_SIZE);
        shared.queues.push_secondary_many(flushed).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::route::Endpoint;

    fn test_shared(quota: u64, tag: &str) -> Shared {
        let http = HttpClientAdapter::new(Credentials {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
        })
        .unwrap();
        let dir = std::env::temp_dir().join(format!(
            "catalog-crawler-orchestrator-test-{}-{tag}-{}",
            std::process::id(),
            {
                use std::time::{SystemTime, UNIX_EPOCH};
                SystemTime::now().duration_since(UNIX_EPOCH).unwrap().subsec_nanos()
            }
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let writer = ArtistWriter::new(dir.join("artists.csv"), true).unwrap();
        Shared {
            queues: QueueFabric::new(),
            prioritizer: Prioritizer::new(),
            cache: DedupCache::new(Arc::new(MemoryCache::new())),
            batch: BatchCoalescer::default(),
            writer,
            metrics: MetricsTable::new(),
            backoff: BackoffController::new(1800.0, 5),
            http,
            total: AtomicU64::new(0),
            quota,
            priority_mark: AtomicU64::new(0),
            flush_mark: AtomicU64::new(0),
        }
    }

    /// A single `/artists` batch response can write many rows before
    /// `maybe_reprioritize_and_flush` runs once afterward, so `total` may
    /// step clean over a `PRIORITY_CADENCE` multiple (19 -> 21) without ever
    /// landing on it. The chunk-crossing counter must still catch that.
    #[tokio::test]
    async fn priority_reranks_on_a_burst_that_steps_over_the_cadence_multiple() {
        let shared = Arc::new(test_shared(1000, "priority-burst"));

        shared.total.store(21, Ordering::SeqCst);
        maybe_reprioritize_and_flush(&shared).await;
        assert_eq!(shared.priority_mark.load(Ordering::SeqCst), 1);

        // Still within the same cadence chunk: must not re-trigger.
        shared.total.store(25, Ordering::SeqCst);
        maybe_reprioritize_and_flush(&shared).await;
        assert_eq!(shared.priority_mark.load(Ordering::SeqCst), 1);

        // Crossing into the next chunk triggers again.
        shared.total.store(41, Ordering::SeqCst);
        maybe_reprioritize_and_flush(&shared).await;
        assert_eq!(shared.priority_mark.load(Ordering::SeqCst), 2);
    }

    /// Same burst-crossing problem, for the staging flush cadence: a jump
    /// straight to 51 must still drain staging into secondary.
    #[tokio::test]
    async fn flush_drains_staging_on_a_burst_that_steps_over_the_cadence_multiple() {
        let shared = Arc::new(test_shared(1000, "flush-burst"));
        shared.prioritizer.put(
            RouteKind::Search,
            Endpoint::with_route_kind("/search/x", BTreeMap::new(), RouteKind::Search),
        );
        assert!(shared.queues.secondary_is_empty().await);

        shared.total.store(51, Ordering::SeqCst);
        maybe_reprioritize_and_flush(&shared).await;

        assert!(!shared.queues.secondary_is_empty().await);
        assert_eq!(shared.flush_mark.load(Ordering::SeqCst), 1);
    }
}
