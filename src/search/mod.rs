//! Parallel reachability search.
//!
//! # Architecture
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────────┐
//!                 │                         Domain                           │
//!                 │                                                          │
//!   Generator ◄───┼──── successors() ───┐                                    │
//!                 │                     │                                    │
//!                 │   ┌─────────────────┴──────────────────────────────┐     │
//!                 │   │  Worker 0      │  Worker 1      │  Worker N-1  │     │
//!                 │   │  ┌──────────┐  │  ┌──────────┐  │  ┌────────┐  │     │
//!                 │   │  │WorkQueue │◄─┼─►│WorkQueue │◄─┼─►│WorkQ.  │  │     │
//!                 │   │  └──────────┘  │  └──────────┘  │  └────────┘  │     │
//!                 │   │  credit, rng,  │  credit, rng,  │  credit, rng,│     │
//!                 │   │  stats         │  stats         │  stats       │     │
//!                 │   └───────┬────────┴───────┬────────┴──────┬───────┘     │
//!                 │           ▼                ▼               ▼             │
//!                 │   ConcurrentStateStore   SharedCounter   StopSignal      │
//!                 └──────────────────────────────────────────────────────────┘
//! ```
//!
//! - N worker threads, each driving a [`Worker`] state machine.
//! - Per-worker FIFO queues; every `share_interval`-th discovery goes to a
//!   peer, and idle workers steal batches from random peers.
//! - Batched termination detection ([`termination`]).
//! - Cooperative cancellation through one polled [`StopSignal`].
//!
//! # Correctness Invariants
//!
//! - **At-most-once expansion**: only the worker whose insert wins queues a
//!   state, so every distinct state is expanded at most once.
//! - **Safe termination**: the shared counter never undercounts outstanding
//!   items, so a worker that reads zero right after its own sync knows the
//!   search is complete.
//! - **No hang on failure**: every path that drops an item returns its credit
//!   and trips the stop signal.
//! - **Schedule-independent totals**: visited, transitions, errors and
//!   deadlocks do not depend on worker count or interleaving.

pub mod config;
pub mod domain;
pub mod error;
pub mod generator;
pub mod metrics;
pub mod queue;
pub mod rng;
pub mod signal;
#[cfg(any(test, feature = "sim-harness"))]
pub mod sim;
pub mod termination;
pub mod worker;

pub use config::SearchConfig;
pub use domain::{run, Domain, SearchResult, Violation};
pub use error::{SearchError, StopReason, ViolationKind};
pub use generator::{Generator, GeneratorError};
pub use metrics::{Log2Hist, SearchMetrics, WorkerStats};
pub use queue::{QueueError, QueueItem, WorkQueue};
pub use signal::{StopHandle, StopSignal};
pub use termination::{SharedCounter, TerminationCredit};
pub use worker::{Phase, StepOutcome, Worker};
