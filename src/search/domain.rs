//! The search driver: owns the shared structures, seeds the search, runs the
//! worker pool and folds the per-worker statistics into a [`SearchResult`].
//!
//! ```text
//!   Domain::run(generator)
//!     │
//!     ├─ seed: insert initial states, queue them on worker 0
//!     │        (counted with a seeding credit, synced before any worker starts)
//!     │
//!     ├─ thread::scope ──► reach-worker-0 … reach-worker-{N-1}
//!     │      │               Worker::step loop, park when idle
//!     │      └─ caller thread: time-limit watchdog (if configured)
//!     │
//!     └─ join, merge WorkerStats, rebuild violation trace, re-raise panics
//! ```

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_utils::sync::{Parker, Unparker};

use super::config::SearchConfig;
use super::error::{SearchError, StopReason, ViolationKind};
use super::generator::{Generator, GeneratorError};
use super::metrics::{SearchMetrics, WorkerStats};
use super::queue::{QueueItem, WorkQueue};
use super::signal::{StopHandle, StopSignal};
use super::termination::SharedCounter;
use super::worker::{SearchCtx, Worker};
use crate::store::{ConcurrentStateStore, StateId};

/// A property violation with its counterexample.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    pub kind: ViolationKind,
    pub state: StateId,
    /// Ids from an initial state to `state`, inclusive.
    pub trace: Vec<StateId>,
}

/// Aggregate outcome of a search.
#[derive(Clone, Debug)]
pub struct SearchResult {
    /// Distinct states stored.
    pub visited: u64,
    /// States whose successor lists were fully processed.
    pub expanded: u64,
    /// Successor edges generated.
    pub transitions: u64,
    /// Distinct error states found.
    pub errors: u64,
    /// Distinct accepting states found.
    pub accepting: u64,
    /// Expanded states without successors.
    pub deadlocks: u64,
    /// The search ran to completion.
    pub fully_explored: bool,
    /// Why the search stopped early, if it did.
    pub stop_reason: Option<StopReason>,
    /// The violation that stopped the search; without a violation stop, the
    /// first error state found, else the first deadlock.
    pub violation: Option<Violation>,
    pub metrics: SearchMetrics,
    pub elapsed: Duration,
}

impl SearchResult {
    fn empty() -> Self {
        Self {
            visited: 0,
            expanded: 0,
            transitions: 0,
            errors: 0,
            accepting: 0,
            deadlocks: 0,
            fully_explored: false,
            stop_reason: None,
            violation: None,
            metrics: SearchMetrics::default(),
            elapsed: Duration::ZERO,
        }
    }

    fn failed(err: SearchError) -> Self {
        Self {
            stop_reason: Some(StopReason::Failed(err)),
            ..Self::empty()
        }
    }

    fn add(&mut self, w: &WorkerStats) {
        self.visited += w.visited;
        self.expanded += w.expanded;
        self.transitions += w.transitions;
        self.errors += w.errors;
        self.accepting += w.accepting;
        self.deadlocks += w.deadlocks;
    }
}

/// Explore everything reachable from `generator` with `workers` threads and
/// default settings.
pub fn run<G: Generator>(generator: &G, workers: usize) -> SearchResult {
    match Domain::new(SearchConfig::with_workers(workers)) {
        Ok(mut domain) => domain.run(generator),
        Err(e) => SearchResult::failed(e),
    }
}

/// Owner of one search's shared state.
pub struct Domain {
    cfg: SearchConfig,
    store: ConcurrentStateStore,
    counter: SharedCounter,
    signal: Arc<StopSignal>,
    started: bool,
}

impl Domain {
    /// Build the store and the coordination state.
    ///
    /// # Panics
    ///
    /// Panics if `cfg` is invalid (see [`SearchConfig::validate`]).
    ///
    /// # Errors
    ///
    /// [`SearchError::StoreExhausted`] if the initial table cannot be allocated.
    pub fn new(cfg: SearchConfig) -> Result<Self, SearchError> {
        cfg.validate();
        Ok(Self {
            cfg,
            store: ConcurrentStateStore::new(cfg.store)?,
            counter: SharedCounter::new(),
            signal: Arc::new(StopSignal::new()),
            started: false,
        })
    }

    pub fn config(&self) -> &SearchConfig {
        &self.cfg
    }

    /// The state store, for inspecting states and traces after a run.
    pub fn store(&self) -> &ConcurrentStateStore {
        &self.store
    }

    /// Handle for stopping the search from another thread. May be taken
    /// before `run`; a stop requested before `run` makes it return at once.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle::new(Arc::clone(&self.signal))
    }

    /// Run the search to completion, stop, or failure.
    ///
    /// # Panics
    ///
    /// Panics if called twice, and re-raises a worker panic that happened
    /// outside the generator (an internal invariant violation).
    pub fn run<G: Generator>(&mut self, generator: &G) -> SearchResult {
        assert!(!self.started, "Domain::run called twice");
        self.started = true;

        let start = Instant::now();
        let workers = self.cfg.workers;
        tracing::info!(workers, credit_block = self.cfg.credit_block, "search starting");

        let queues: Vec<WorkQueue<QueueItem<G::Label>>> =
            (0..workers).map(|_| WorkQueue::for_search(&self.cfg)).collect();
        let seeded = seed(generator, &self.cfg, &self.store, &queues[0], &self.counter, &self.signal);

        let parkers: Vec<Parker> = (0..workers).map(|_| Parker::new()).collect();
        let unparkers: Vec<Unparker> = parkers.iter().map(|p| p.unparker().clone()).collect();
        for u in &unparkers {
            self.signal.register_waiter(u.clone());
        }
        let watchdog = Parker::new();
        self.signal.register_waiter(watchdog.unparker().clone());

        let ctx = SearchCtx {
            store: &self.store,
            queues: &queues,
            unparkers: &unparkers,
            counter: &self.counter,
            signal: &self.signal,
        };
        let cfg = self.cfg;
        let signal: &StopSignal = &self.signal;

        let per_worker: Vec<WorkerStats> = thread::scope(|s| {
            let mut handles = Vec::with_capacity(workers);
            for (id, parker) in parkers.into_iter().enumerate() {
                let spawned = thread::Builder::new()
                    .name(format!("reach-worker-{id}"))
                    .spawn_scoped(s, move || {
                        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                            Worker::new(id, cfg, generator, ctx).run(&parker)
                        }));
                        match outcome {
                            Ok(stats) => stats,
                            Err(payload) => {
                                tracing::error!(worker = id, "worker panicked");
                                signal.record_panic(id, payload);
                                WorkerStats::default()
                            }
                        }
                    });
                match spawned {
                    Ok(h) => handles.push(h),
                    Err(e) => {
                        signal.stop(StopReason::Failed(SearchError::Spawn {
                            worker: id,
                            message: e.to_string(),
                        }));
                        break;
                    }
                }
            }

            if let Some(limit) = cfg.time_limit {
                let deadline = start + limit;
                while !signal.is_tripped() {
                    let now = Instant::now();
                    if now >= deadline {
                        if signal.stop(StopReason::TimeLimit) {
                            tracing::info!(limit_ms = limit.as_millis() as u64, "time limit reached");
                        }
                        break;
                    }
                    watchdog.park_timeout(deadline - now);
                }
            }

            handles
                .into_iter()
                .enumerate()
                .map(|(id, h)| {
                    h.join().unwrap_or_else(|payload| {
                        signal.record_panic(id, payload);
                        WorkerStats::default()
                    })
                })
                .collect()
        });

        self.signal.clear_waiters();
        if let Some(payload) = self.signal.take_panic() {
            panic::resume_unwind(payload);
        }

        let mut result = SearchResult::empty();
        result.add(&seeded);
        for w in &per_worker {
            result.add(w);
            result.metrics.merge_worker(w);
        }
        result.metrics.store_generations = self.store.generation();
        result.metrics.store_capacity = self.store.capacity();

        result.fully_explored = self.signal.is_finished();
        result.stop_reason = self.signal.reason().cloned();
        result.violation = self.signal.violation().map(|(kind, state)| Violation {
            kind,
            state,
            trace: self.store.trace(state),
        });
        result.elapsed = start.elapsed();

        debug_assert!(!result.fully_explored || result.visited as usize == self.store.len());
        tracing::info!(
            visited = result.visited,
            transitions = result.transitions,
            errors = result.errors,
            deadlocks = result.deadlocks,
            fully_explored = result.fully_explored,
            elapsed_ms = result.elapsed.as_millis() as u64,
            "search finished"
        );
        if let Some(reason) = &result.stop_reason {
            tracing::debug!(%reason, "search stopped early");
        }
        tracing::debug!(
            steals = result.metrics.steals,
            steal_attempts = result.metrics.steal_attempts,
            peer_pushes = result.metrics.peer_pushes,
            parks = result.metrics.parks,
            "scheduling summary"
        );
        result
    }
}

impl std::fmt::Debug for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Domain")
            .field("cfg", &self.cfg)
            .field("store", &self.store)
            .field("signal", &self.signal)
            .finish()
    }
}

/// Insert the initial states and queue them on `queue`.
///
/// Returns the statistics of the seeding pass (initial states count as
/// visited). Failures and violations trip `signal` like they would in a
/// worker. The seeding credit is synced before returning, so the shared
/// counter equals the number of queued seeds.
pub(crate) fn seed<G: Generator>(
    generator: &G,
    cfg: &SearchConfig,
    store: &ConcurrentStateStore,
    queue: &WorkQueue<QueueItem<G::Label>>,
    counter: &SharedCounter,
    signal: &StopSignal,
) -> WorkerStats {
    let mut stats = WorkerStats::default();
    let mut credit = counter.credit(cfg.credit_block);

    let initial = match panic::catch_unwind(AssertUnwindSafe(|| generator.initial_states())) {
        Ok(states) => states,
        Err(payload) => {
            let source = GeneratorError::from_panic(&*payload);
            tracing::warn!(error = %source, "initial_states panicked");
            signal.stop(StopReason::Failed(SearchError::InitialStates(source)));
            return stats;
        }
    };

    for state in initial {
        if signal.is_tripped() {
            break;
        }
        let ins = match store.try_insert(state, None) {
            Ok(ins) => ins,
            Err(e) => {
                tracing::warn!(error = %e, "resource exhausted while seeding");
                signal.stop(StopReason::Failed(e.into()));
                break;
            }
        };
        if !ins.inserted {
            continue;
        }
        stats.visited += 1;

        let s = store.get(ins.id);
        let classified = panic::catch_unwind(AssertUnwindSafe(|| {
            (generator.is_error(s), generator.is_accepting(s))
        }));
        let (is_error, is_accepting) = match classified {
            Ok(c) => c,
            Err(payload) => {
                let source = GeneratorError::from_panic(&*payload);
                tracing::warn!(error = %source, "generator failed while seeding");
                signal.stop(StopReason::Failed(SearchError::Generator {
                    state: ins.id,
                    source,
                }));
                break;
            }
        };
        if is_accepting {
            stats.accepting += 1;
        }
        if is_error {
            stats.errors += 1;
            signal.record_violation(ViolationKind::Error, ins.id);
            if cfg.stop_on_error {
                signal.stop(StopReason::PropertyViolation(ViolationKind::Error));
                break;
            }
        }

        credit.increment();
        if let Err(e) = queue.push(QueueItem::initial(ins.id)) {
            credit.decrement();
            tracing::warn!(error = %e, "resource exhausted while seeding");
            signal.stop(StopReason::Failed(e.into()));
            break;
        }
    }

    credit.sync();
    stats
}
