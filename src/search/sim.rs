//! Deterministic step-interleaving harness.
//!
//! Runs N real [`Worker`]s on the calling thread. A seeded RNG picks which
//! worker takes the next [`Worker::step`], so every interleaving of phase
//! transitions is reachable and any failing schedule is replayable from its
//! seed. `ShouldPark` is treated as "pick someone else".
//!
//! After every step the harness checks the termination accounting exactly:
//!
//! ```text
//!   shared − Σ local credit == Σ queue lengths + items held by workers
//! ```
//!
//! and that the search is never declared finished while a queue is non-empty
//! or a worker holds an item.

#![cfg(any(test, feature = "sim-harness"))]

use super::config::SearchConfig;
use super::domain::seed;
use super::error::StopReason;
use super::generator::Generator;
use super::metrics::WorkerStats;
use super::queue::{QueueItem, WorkQueue};
use super::rng::XorShift64;
use super::signal::StopSignal;
use super::termination::SharedCounter;
use super::worker::{Phase, SearchCtx, StepOutcome, Worker};
use crate::store::ConcurrentStateStore;

/// Outcome of one simulated search.
#[derive(Clone, Debug)]
pub struct SimReport {
    /// Seeding and worker statistics summed.
    pub totals: WorkerStats,
    pub fully_explored: bool,
    pub stop_reason: Option<StopReason>,
    /// Steps taken across all workers.
    pub steps: u64,
    /// States in the store at the end.
    pub stored: usize,
}

/// Run a search with `cfg.workers` simulated workers, choosing the next
/// worker to step with `schedule_seed`.
///
/// # Panics
///
/// Panics if an accounting check fails or the search does not finish within
/// `max_steps` steps.
pub fn simulate<G: Generator>(
    generator: &G,
    cfg: SearchConfig,
    schedule_seed: u64,
    max_steps: u64,
) -> SimReport {
    cfg.validate();
    let store = match ConcurrentStateStore::new(cfg.store) {
        Ok(s) => s,
        Err(e) => panic!("simulation store allocation failed: {e}"),
    };
    let queues: Vec<WorkQueue<QueueItem<G::Label>>> =
        (0..cfg.workers).map(|_| WorkQueue::for_search(&cfg)).collect();
    let counter = SharedCounter::new();
    let signal = StopSignal::new();

    let mut totals = seed(generator, &cfg, &store, &queues[0], &counter, &signal);

    let ctx = SearchCtx {
        store: &store,
        queues: &queues,
        unparkers: &[],
        counter: &counter,
        signal: &signal,
    };
    let mut workers: Vec<Worker<'_, G>> = (0..cfg.workers)
        .map(|id| Worker::new(id, cfg, generator, ctx))
        .collect();

    let mut rng = XorShift64::new(schedule_seed);
    let mut steps = 0u64;
    loop {
        let live: Vec<usize> = workers
            .iter()
            .filter(|w| w.phase() != Phase::Done)
            .map(|w| w.id())
            .collect();
        if live.is_empty() {
            break;
        }
        assert!(
            steps < max_steps,
            "simulation did not terminate within {max_steps} steps (seed {schedule_seed})"
        );
        let pick = live[rng.next_usize(live.len())];
        let outcome = workers[pick].step();
        steps += 1;
        check_accounting(&workers, &queues, &counter, &signal, steps, outcome);
    }

    for w in workers {
        let s = w.into_stats();
        totals.visited += s.visited;
        totals.expanded += s.expanded;
        totals.transitions += s.transitions;
        totals.errors += s.errors;
        totals.accepting += s.accepting;
        totals.deadlocks += s.deadlocks;
        totals.steals += s.steals;
        totals.peer_pushes += s.peer_pushes;
    }

    SimReport {
        totals,
        fully_explored: signal.is_finished(),
        stop_reason: signal.reason().cloned(),
        steps,
        stored: store.len(),
    }
}

fn check_accounting<G: Generator>(
    workers: &[Worker<'_, G>],
    queues: &[WorkQueue<QueueItem<G::Label>>],
    counter: &SharedCounter,
    signal: &StopSignal,
    step: u64,
    outcome: StepOutcome,
) {
    let queued: usize = queues.iter().map(|q| q.len()).sum();
    let held = workers.iter().filter(|w| w.holds_item()).count();
    let local: isize = workers.iter().map(|w| w.local_credit()).sum();

    for w in workers {
        assert!(
            w.local_credit() >= 0,
            "step {step}: worker {} has negative credit",
            w.id()
        );
    }
    assert_eq!(
        counter.load() - local,
        (queued + held) as isize,
        "step {step} ({outcome:?}): counter does not match outstanding work"
    );
    if counter.is_zero() || signal.is_finished() {
        assert_eq!(queued, 0, "step {step}: zero counter with queued items");
        assert_eq!(held, 0, "step {step}: zero counter with an item in flight");
    }
}
