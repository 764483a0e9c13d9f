//! Request dispatcher: drives the planned queue through the fetch protocol
//! under a concurrency cap, paced dispatch with jitter, bounded retries with
//! session refresh, and a consecutive-failure circuit breaker.
//!
//! Scheduling model: a bounded worker pool over one shared queue. Requests
//! launch in queue order (subject to the concurrency bound) but may complete
//! out of order; the aggregator's slot fan-out is order-independent.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use futures_util::future::join_all;
use governor::{DefaultDirectRateLimiter, Jitter, Quota, RateLimiter};
use tokio::sync::{Mutex as AsyncMutex, Semaphore};
use tracing::{info, warn};

use common::config::TuningConfig;
use common::{FetchResolution, MonthFetcher, MonthRequest, Route, RouteAvailability};

use crate::aggregator::Aggregator;
use crate::progress::{Progress, RunStats};

#[derive(Debug, Clone)]
pub struct DispatchOptions {
    pub max_in_flight: usize,
    /// Minimum spacing between network-bound dispatches; zero disables
    /// pacing. Cache-hit-predicted requests are exempt.
    pub interval: Duration,
    pub jitter: Duration,
    /// Full protocol passes per request before it resolves failed.
    pub retry_limit: u32,
    pub failure_abort_threshold: usize,
    pub destination_concurrency: usize,
    pub force_fresh: bool,
}

impl DispatchOptions {
    pub fn from_tuning(tuning: &TuningConfig, force_fresh: bool) -> Self {
        Self {
            max_in_flight: tuning.max_in_flight,
            interval: Duration::from_millis(tuning.dispatch_interval_ms),
            jitter: Duration::from_millis(tuning.dispatch_jitter_ms),
            retry_limit: tuning.retry_limit,
            failure_abort_threshold: tuning.failure_abort_threshold,
            destination_concurrency: tuning.destination_concurrency,
            force_fresh,
        }
    }
}

/// Everything `dispatch` hands back: completed routes, codes dropped for
/// having no availability, run statistics, and whether the breaker tripped.
#[derive(Debug)]
pub struct DispatchReport {
    pub routes: std::collections::HashMap<String, RouteAvailability>,
    pub dropped_routes: Vec<String>,
    pub stats: RunStats,
    pub tripped: bool,
}

struct RunState {
    queue: Mutex<VecDeque<MonthRequest>>,
    fetcher: Arc<dyn MonthFetcher>,
    aggregator: Aggregator,
    progress: Progress,
    limiter: Option<DefaultDirectRateLimiter>,
    jitter: Option<Jitter>,
    dest_gates: DashMap<String, Arc<Semaphore>>,
    /// Bumped after every refresh attempt; lets a request that failed
    /// before someone else's refresh skip triggering a duplicate.
    refresh_gen: AsyncMutex<u64>,
    consecutive_failures: AtomicUsize,
    abort: AtomicBool,
    opts: DispatchOptions,
}

impl RunState {
    fn destination_gate(&self, destination: &str) -> Arc<Semaphore> {
        self.dest_gates
            .entry(destination.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.opts.destination_concurrency.max(1))))
            .clone()
    }

    async fn current_refresh_gen(&self) -> u64 {
        *self.refresh_gen.lock().await
    }

    /// Refresh the session unless someone already did since `seen_gen`.
    /// Waiting on the lock while another refresh runs *is* the piggyback.
    async fn refresh_session_if_stale(&self, seen_gen: u64) {
        let mut gen = self.refresh_gen.lock().await;
        if *gen != seen_gen {
            return;
        }
        match self.fetcher.refresh_session().await {
            Ok(()) => info!("session refreshed"),
            Err(e) => warn!("session refresh failed: {e}"),
        }
        // Advance even on failure so the same request never retries it.
        *gen += 1;
    }
}

/// One request's full dispatcher-level lifecycle: protocol pass, then up to
/// `retry_limit - 1` further passes, each preceded by (at most one) session
/// refresh.
async fn run_request(state: &RunState, request: &MonthRequest) -> FetchResolution {
    let attempts = state.opts.retry_limit.max(1);
    let mut refreshed = false;

    let mut seen_gen = state.current_refresh_gen().await;
    let mut resolution = state
        .fetcher
        .fetch_month(&request.key, state.opts.force_fresh)
        .await;

    let mut attempt = 1;
    while resolution.is_failed() && attempt < attempts {
        if let Some(reason) = &resolution.reason {
            warn!("{}: attempt {attempt} failed: {reason}", request.key);
        }
        if !refreshed {
            state.refresh_session_if_stale(seen_gen).await;
            refreshed = true;
        }
        seen_gen = state.current_refresh_gen().await;
        resolution = state
            .fetcher
            .fetch_month(&request.key, state.opts.force_fresh)
            .await;
        attempt += 1;
    }
    resolution
}

async fn worker(state: Arc<RunState>) {
    loop {
        // The breaker stops new dispatches; in-flight work has already been
        // popped and drains on its own.
        if state.abort.load(Ordering::SeqCst) {
            break;
        }
        let next = state
            .queue
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front();
        let Some(request) = next else { break };

        // Only network-bound dispatches respect the pacing window.
        if !request.likely_cache_hit {
            if let Some(limiter) = &state.limiter {
                match state.jitter {
                    Some(jitter) => limiter.until_ready_with_jitter(jitter).await,
                    None => limiter.until_ready().await,
                }
            }
        }

        let gate = state.destination_gate(&request.key.destination);
        let permit = gate.acquire_owned().await.expect("destination gate closed");
        let resolution = run_request(&state, &request).await;
        drop(permit);

        state.aggregator.apply(&request, &resolution.days);
        state.progress.record(&request.key, &resolution);

        if resolution.is_failed() {
            let failures = state.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
            if failures >= state.opts.failure_abort_threshold
                && !state.abort.swap(true, Ordering::SeqCst)
            {
                warn!("circuit breaker: {failures} consecutive failures, stopping new dispatches");
            }
        } else {
            state.consecutive_failures.store(0, Ordering::SeqCst);
        }
    }
}

/// Drive the planned queue to completion (or breaker abort).
///
/// `routes` must be the normalized list the queue was planned from.
pub async fn dispatch(
    queue: Vec<MonthRequest>,
    routes: &[Route],
    fetcher: Arc<dyn MonthFetcher>,
    opts: DispatchOptions,
) -> DispatchReport {
    let total = queue.len();
    let workers = opts.max_in_flight.max(1).min(total.max(1));

    let state = Arc::new(RunState {
        queue: Mutex::new(queue.into()),
        fetcher,
        aggregator: Aggregator::new(routes),
        progress: Progress::new(total),
        limiter: Quota::with_period(opts.interval).map(RateLimiter::direct),
        jitter: (!opts.jitter.is_zero()).then(|| Jitter::up_to(opts.jitter)),
        dest_gates: DashMap::new(),
        refresh_gen: AsyncMutex::new(0),
        consecutive_failures: AtomicUsize::new(0),
        abort: AtomicBool::new(false),
        opts,
    });

    info!(
        "dispatching {total} month requests ({} workers, interval {:?})",
        workers, state.opts.interval
    );

    let handles: Vec<_> = (0..workers)
        .map(|_| tokio::spawn(worker(state.clone())))
        .collect();
    join_all(handles).await;

    let state = Arc::try_unwrap(state)
        .ok()
        .expect("workers still hold run state");
    let tripped = state.abort.load(Ordering::SeqCst);
    let stats = state.progress.snapshot();
    let (completed, dropped_routes) = state.aggregator.finish();

    DispatchReport {
        routes: completed,
        dropped_routes,
        stats,
        tripped,
    }
}
