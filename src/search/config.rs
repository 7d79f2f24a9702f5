//! Search configuration.

use std::time::Duration;

use super::queue::DEFAULT_CHUNK_CAPACITY;
use crate::store::StoreConfig;

/// Search configuration.
///
/// Defaults are conservative. Profile with your model before tuning.
///
/// | Knob             | Sensitive to                                        |
/// |------------------|-----------------------------------------------------|
/// | `workers`        | CPU count, generator cost                           |
/// | `credit_block`   | Discovery rate; larger means fewer shared atomics   |
/// | `share_interval` | Branching factor; smaller spreads work sooner        |
/// | `steal_tries`    | Worker count, frontier shape                        |
/// | `steal_batch`    | Expansion cost per state                            |
/// | `spin_iters`     | How quickly idle workers find new work              |
/// | `park_timeout`   | Idle CPU burn vs. wake-up latency                   |
/// | `queue_chunk_*`  | Frontier size; the limit caps queue memory          |
#[derive(Clone, Copy, Debug)]
pub struct SearchConfig {
    /// Number of worker threads.
    pub workers: usize,

    /// Seed for victim selection. Same seed gives the same steal pattern
    /// modulo timing.
    pub seed: u64,

    /// Termination-counter block size `B`.
    pub credit_block: usize,

    /// Every `share_interval`-th newly discovered state goes to the next
    /// peer's queue instead of the worker's own. 0 disables sharing.
    pub share_interval: u32,

    /// Peers probed per idle round before backing off.
    pub steal_tries: u32,

    /// Maximum items taken per steal.
    pub steal_batch: usize,

    /// Idle rounds spent spinning before parking.
    pub spin_iters: u32,

    /// Park timeout once spinning is exhausted.
    pub park_timeout: Duration,

    /// Stop at the first error state.
    pub stop_on_error: bool,

    /// Stop at the first deadlock.
    pub stop_on_deadlock: bool,

    /// Stop the search after this much wall time.
    pub time_limit: Option<Duration>,

    /// Items per work-queue chunk.
    pub queue_chunk_capacity: usize,

    /// Maximum chunks per worker queue. Running out is reported like a
    /// failed chunk allocation and stops the search.
    pub queue_chunk_limit: Option<usize>,

    /// State store sizing.
    pub store: StoreConfig,
}

impl SearchConfig {
    /// Default configuration with `workers` threads.
    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers,
            ..Self::default()
        }
    }

    /// Validate configuration. Panics on invalid values.
    pub fn validate(&self) {
        assert!(self.workers > 0, "workers must be > 0");
        assert!(self.credit_block > 0, "credit_block must be > 0");
        assert!(
            self.credit_block <= isize::MAX as usize / 2,
            "credit_block is too large"
        );
        assert!(self.steal_tries > 0, "steal_tries must be > 0");
        assert!(self.steal_batch > 0, "steal_batch must be > 0");
        assert!(self.spin_iters > 0, "spin_iters must be > 0");
        assert!(
            self.park_timeout > Duration::ZERO,
            "park_timeout must be > 0"
        );
        assert!(
            self.queue_chunk_capacity > 0,
            "queue_chunk_capacity must be > 0"
        );
        if let Some(limit) = self.queue_chunk_limit {
            assert!(limit > 0, "queue_chunk_limit must be > 0");
        }
        assert!(
            self.store.initial_capacity > 0,
            "store.initial_capacity must be > 0"
        );
        if let Some(max) = self.store.max_states {
            assert!(max > 0, "store.max_states must be > 0");
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            seed: 0x853c_49e6_748f_ea9b,
            credit_block: 4096,
            share_interval: 32,
            steal_tries: 4,
            steal_batch: 32,
            spin_iters: 200,
            park_timeout: Duration::from_micros(200),
            stop_on_error: false,
            stop_on_deadlock: false,
            time_limit: None,
            queue_chunk_capacity: DEFAULT_CHUNK_CAPACITY,
            queue_chunk_limit: None,
            store: StoreConfig::default(),
        }
    }
}
