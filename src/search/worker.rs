//! The worker state machine.
//!
//! A worker owns one queue, one termination credit and its statistics. It
//! is driven by [`Worker::step`], which performs exactly one phase
//! transition and never blocks. The threaded runner calls `step` in a loop
//! and parks when asked to; the simulation harness interleaves the steps of
//! many workers on one thread.
//!
//! ```text
//!        ┌──────────────────────────────────────────────────────────┐
//!        │                                                          │
//!        ▼        queue non-empty                                   │
//!     ┌──────┐ ─────────────────► ┌──────────┐  successors()  ┌───────────┐
//!     │ Idle │                    │ Fetching │ ─────────────► │ Expanding │
//!     └──────┘ ◄──── pop empty ── └──────────┘                └─────┬─────┘
//!        │  ▲                          ▲                             │ insert,
//!  queue │  └─── decrement() ──┐       │ own queue refilled          │ increment,
//!  empty ▼                     │       │ or batch stolen             ▼ enqueue
//!     ┌─────────┐          ┌────────────┐                     (Publishing)
//!     │ Syncing │ ─────────┘            │
//!     └────┬────┘ ──────────────────────┘
//!          │ sync(); counter == 0
//!          ▼
//!      ┌──────┐
//!      │ Done │  (also entered from any phase once the stop signal trips)
//!      └──────┘
//! ```
//!
//! # Accounting
//!
//! - Every newly inserted state is counted with `increment()` before it is
//!   queued.
//! - The item being expanded is retired with `decrement()` only after all
//!   of its successors have been inserted and queued, so the shared counter
//!   cannot reach zero while the expansion is in progress.
//! - Every exit path that drops an item (stop, failure) returns its credit.
//!
//! # Idle policy
//!
//! An idle worker syncs, probes up to `steal_tries` random peers, then backs
//! off: spin for `spin_iters` rounds (yielding every 16th), then ask to be
//! parked for `park_timeout`. Peers pushing work to it unpark it.

use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::Duration;

use crossbeam_utils::sync::{Parker, Unparker};

use super::config::SearchConfig;
use super::error::{SearchError, StopReason, ViolationKind};
use super::generator::{Generator, GeneratorError};
use super::metrics::WorkerStats;
use super::queue::{QueueError, QueueItem, WorkQueue};
use super::rng::XorShift64;
use super::signal::StopSignal;
use super::termination::{SharedCounter, TerminationCredit};
use crate::store::{ConcurrentStateStore, State, StateId};

/// Worker phases.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Fetching,
    Expanding,
    Publishing,
    Syncing,
    Done,
}

/// Result of one [`Worker::step`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// A phase transition happened.
    Progress,
    /// No work found; the caller should step again.
    Idle,
    /// No work found for a while; the caller may park for up to the timeout.
    ShouldPark(Duration),
    /// The worker has retired.
    Done,
}

/// Everything a worker shares with its peers.
pub(crate) struct SearchCtx<'a, L> {
    pub(crate) store: &'a ConcurrentStateStore,
    pub(crate) queues: &'a [WorkQueue<QueueItem<L>>],
    pub(crate) unparkers: &'a [Unparker],
    pub(crate) counter: &'a SharedCounter,
    pub(crate) signal: &'a StopSignal,
}

impl<L> Clone for SearchCtx<'_, L> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<L> Copy for SearchCtx<'_, L> {}

enum IdleAction {
    Continue,
    Park { timeout: Duration },
}

/// Spin, then yield every 16th round, then park.
struct TieredIdle {
    idle_rounds: u32,
}

impl TieredIdle {
    fn new() -> Self {
        Self { idle_rounds: 0 }
    }

    fn on_work(&mut self) {
        self.idle_rounds = 0;
    }

    fn on_idle(&mut self, cfg: &SearchConfig) -> IdleAction {
        self.idle_rounds = self.idle_rounds.saturating_add(1);

        if self.idle_rounds <= cfg.spin_iters {
            std::hint::spin_loop();
            return IdleAction::Continue;
        }

        if (self.idle_rounds & 0xF) == 0 {
            thread::yield_now();
        }

        IdleAction::Park {
            timeout: cfg.park_timeout,
        }
    }
}

/// One search worker. See the module docs.
pub struct Worker<'a, G: Generator> {
    id: usize,
    cfg: SearchConfig,
    generator: &'a G,
    ctx: SearchCtx<'a, G::Label>,
    credit: TerminationCredit<'a>,
    rng: XorShift64,
    idle: TieredIdle,
    phase: Phase,
    /// Item popped in `Fetching` and not yet retired.
    current: Option<StateId>,
    scratch: Vec<(State, G::Label)>,
    stolen: Vec<QueueItem<G::Label>>,
    share_tick: u32,
    next_peer: usize,
    stats: WorkerStats,
}

impl<'a, G: Generator> Worker<'a, G> {
    pub(crate) fn new(
        id: usize,
        cfg: SearchConfig,
        generator: &'a G,
        ctx: SearchCtx<'a, G::Label>,
    ) -> Self {
        debug_assert!(id < ctx.queues.len());
        Self {
            id,
            cfg,
            generator,
            ctx,
            credit: ctx.counter.credit(cfg.credit_block),
            rng: XorShift64::for_worker(cfg.seed, id),
            idle: TieredIdle::new(),
            phase: Phase::Idle,
            current: None,
            scratch: Vec::new(),
            stolen: Vec::new(),
            share_tick: 0,
            next_peer: id,
            stats: WorkerStats::default(),
        }
    }

    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    #[inline]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[inline]
    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Unsynced credit held by this worker.
    #[inline]
    pub(crate) fn local_credit(&self) -> isize {
        self.credit.local()
    }

    /// `true` while an item has been popped but not yet retired.
    #[inline]
    pub(crate) fn holds_item(&self) -> bool {
        self.current.is_some()
    }

    /// Perform one phase transition.
    pub fn step(&mut self) -> StepOutcome {
        if self.phase == Phase::Done {
            return StepOutcome::Done;
        }
        if self.ctx.signal.is_tripped() {
            return self.retire();
        }

        match self.phase {
            Phase::Idle => {
                self.phase = if self.own_queue().is_empty() {
                    Phase::Syncing
                } else {
                    Phase::Fetching
                };
                StepOutcome::Progress
            }
            Phase::Fetching => self.fetch(),
            Phase::Expanding => self.expand(),
            Phase::Publishing => self.publish(),
            Phase::Syncing => self.sync_or_steal(),
            Phase::Done => StepOutcome::Done,
        }
    }

    /// Step until retired, parking on `parker` when idle.
    pub(crate) fn run(mut self, parker: &Parker) -> WorkerStats {
        loop {
            match self.step() {
                StepOutcome::Progress | StepOutcome::Idle => {}
                StepOutcome::ShouldPark(timeout) => parker.park_timeout(timeout),
                StepOutcome::Done => break,
            }
        }
        self.into_stats()
    }

    pub(crate) fn into_stats(mut self) -> WorkerStats {
        self.retire();
        std::mem::take(&mut self.stats)
    }

    // ========================================================================
    // Phases
    // ========================================================================

    fn fetch(&mut self) -> StepOutcome {
        let Some(item) = self.own_queue().pop() else {
            self.phase = Phase::Idle;
            return StepOutcome::Progress;
        };
        self.current = Some(item.id);

        let state = self.ctx.store.get(item.id);
        let generator = self.generator;
        let scratch = &mut self.scratch;
        scratch.clear();
        let produced = panic::catch_unwind(AssertUnwindSafe(|| generator.successors(state, scratch)))
            .unwrap_or_else(|payload| Err(GeneratorError::from_panic(&*payload)));

        match produced {
            Ok(()) => {
                self.phase = Phase::Expanding;
                StepOutcome::Progress
            }
            Err(source) => {
                self.scratch.clear();
                self.fail(SearchError::Generator {
                    state: item.id,
                    source,
                })
            }
        }
    }

    fn expand(&mut self) -> StepOutcome {
        let Some(from) = self.current else {
            self.phase = Phase::Idle;
            return StepOutcome::Progress;
        };

        let fanout = self.scratch.len();
        if fanout == 0 {
            self.stats.deadlocks += 1;
            self.ctx.signal.record_violation(ViolationKind::Deadlock, from);
            if self.cfg.stop_on_deadlock {
                self.ctx
                    .signal
                    .stop(StopReason::PropertyViolation(ViolationKind::Deadlock));
            }
        }

        let mut successors = std::mem::take(&mut self.scratch);
        let mut failure = None;
        let mut cut_short = false;
        for (state, label) in successors.drain(..) {
            if self.ctx.signal.is_tripped() {
                cut_short = true;
                break;
            }
            self.stats.transitions += 1;
            match self.ctx.store.try_insert(state, Some(from)) {
                Ok(ins) if !ins.inserted => {}
                Ok(ins) => {
                    if let Err(e) = self.discovered(ins.id, from, label) {
                        failure = Some(e);
                        break;
                    }
                }
                Err(e) => {
                    failure = Some(SearchError::from(e));
                    break;
                }
            }
        }
        successors.clear();
        self.scratch = successors;

        if let Some(e) = failure {
            return self.fail(e);
        }
        // Only fully processed successor lists count as expansions.
        if !cut_short {
            self.stats.expanded += 1;
            self.stats.fanout.record(fanout as u64);
        }
        self.phase = Phase::Publishing;
        StepOutcome::Progress
    }

    fn publish(&mut self) -> StepOutcome {
        if self.current.take().is_some() {
            self.credit.decrement();
        }
        self.idle.on_work();
        self.phase = Phase::Idle;
        StepOutcome::Progress
    }

    fn sync_or_steal(&mut self) -> StepOutcome {
        self.credit.sync();
        self.stats.syncs += 1;

        if !self.own_queue().is_empty() {
            self.idle.on_work();
            self.phase = Phase::Fetching;
            return StepOutcome::Progress;
        }

        if self.ctx.counter.is_zero() {
            if self.ctx.signal.finish() {
                tracing::debug!(worker = self.id, "state space exhausted");
            }
            return self.retire();
        }

        match self.try_steal() {
            Ok(true) => {
                self.idle.on_work();
                self.phase = Phase::Fetching;
                return StepOutcome::Progress;
            }
            Ok(false) => {}
            Err(e) => return self.fail(e.into()),
        }

        match self.idle.on_idle(&self.cfg) {
            IdleAction::Continue => StepOutcome::Idle,
            IdleAction::Park { timeout } => {
                self.stats.parks += 1;
                StepOutcome::ShouldPark(timeout)
            }
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Account, classify and enqueue a state this worker inserted first.
    fn discovered(
        &mut self,
        id: StateId,
        from: StateId,
        label: G::Label,
    ) -> Result<(), SearchError> {
        self.credit.increment();
        self.stats.visited += 1;

        let (is_error, is_accepting) = match self.classify(id) {
            Ok(c) => c,
            Err(source) => {
                self.credit.decrement();
                return Err(SearchError::Generator { state: id, source });
            }
        };
        if is_accepting {
            self.stats.accepting += 1;
        }
        if is_error {
            self.stats.errors += 1;
            self.ctx.signal.record_violation(ViolationKind::Error, id);
            if self.cfg.stop_on_error {
                // Never queued, so nothing beyond it is explored.
                self.credit.decrement();
                self.ctx
                    .signal
                    .stop(StopReason::PropertyViolation(ViolationKind::Error));
                return Ok(());
            }
        }

        let target = self.pick_target();
        let item = QueueItem {
            id,
            parent: Some(from),
            label: Some(label),
        };
        if let Err(e) = self.ctx.queues[target].push(item) {
            self.credit.decrement();
            return Err(e.into());
        }
        if target != self.id {
            self.stats.peer_pushes += 1;
            if let Some(u) = self.ctx.unparkers.get(target) {
                u.unpark();
            }
        }
        Ok(())
    }

    fn classify(&self, id: StateId) -> Result<(bool, bool), GeneratorError> {
        let state = self.ctx.store.get(id);
        let generator = self.generator;
        panic::catch_unwind(AssertUnwindSafe(|| {
            (generator.is_error(state), generator.is_accepting(state))
        }))
        .map_err(|payload| GeneratorError::from_panic(&*payload))
    }

    /// Own queue, or every `share_interval`-th time the next peer's.
    fn pick_target(&mut self) -> usize {
        let n = self.ctx.queues.len();
        if n < 2 || self.cfg.share_interval == 0 {
            return self.id;
        }
        self.share_tick += 1;
        if self.share_tick < self.cfg.share_interval {
            return self.id;
        }
        self.share_tick = 0;
        self.next_peer = (self.next_peer + 1) % n;
        if self.next_peer == self.id {
            self.next_peer = (self.next_peer + 1) % n;
        }
        self.next_peer
    }

    /// Move a batch from a random peer into the own queue.
    fn try_steal(&mut self) -> Result<bool, QueueError> {
        let n = self.ctx.queues.len();
        if n < 2 {
            return Ok(false);
        }
        for _ in 0..self.cfg.steal_tries {
            let victim = self.rng.next_other(n, self.id);
            self.stats.steal_attempts += 1;
            self.stolen.clear();
            if self.ctx.queues[victim].steal_into(self.cfg.steal_batch, &mut self.stolen) == 0 {
                continue;
            }
            self.stats.steals += 1;
            let own = self.own_queue();
            for item in self.stolen.drain(..) {
                own.push(item)?;
            }
            return Ok(true);
        }
        Ok(false)
    }

    /// Report a failure, return held credit and retire.
    fn fail(&mut self, err: SearchError) -> StepOutcome {
        if err.is_resource_exhaustion() {
            tracing::warn!(worker = self.id, error = %err, "resource exhausted, stopping search");
        } else {
            tracing::warn!(worker = self.id, error = %err, "generator failed, stopping search");
        }
        self.ctx.signal.stop(StopReason::Failed(err));
        self.retire()
    }

    fn retire(&mut self) -> StepOutcome {
        if self.phase != Phase::Done {
            if self.current.take().is_some() {
                self.credit.decrement();
            }
            self.credit.sync();
            self.phase = Phase::Done;
            tracing::debug!(
                worker = self.id,
                visited = self.stats.visited,
                expanded = self.stats.expanded,
                steals = self.stats.steals,
                "worker done"
            );
        }
        StepOutcome::Done
    }

    #[inline]
    fn own_queue(&self) -> &'a WorkQueue<QueueItem<G::Label>> {
        let queues: &'a [WorkQueue<QueueItem<G::Label>>] = self.ctx.queues;
        &queues[self.id]
    }
}
