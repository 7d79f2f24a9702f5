//! Per-worker statistics and their post-run aggregation.
//!
//! Hot-path updates are plain integer adds on a worker-owned, cache-line
//! aligned struct; nothing is shared until the workers have joined and the
//! domain folds every [`WorkerStats`] into one [`SearchMetrics`].

/// Log2 histogram. Bucket `k` counts values in `[2^k, 2^(k+1))`; bucket 0
/// also holds 0.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Log2Hist {
    pub buckets: [u64; 64],
    pub count: u64,
    pub sum: u64,
    pub max: u64,
}

impl Default for Log2Hist {
    fn default() -> Self {
        Self::new()
    }
}

impl Log2Hist {
    pub const fn new() -> Self {
        Self {
            buckets: [0; 64],
            count: 0,
            sum: 0,
            max: 0,
        }
    }

    #[inline]
    pub fn record(&mut self, v: u64) {
        let b = bucket_index(v);
        self.buckets[b] = self.buckets[b].wrapping_add(1);
        self.count = self.count.wrapping_add(1);
        self.sum = self.sum.wrapping_add(v);
        self.max = self.max.max(v);
    }

    /// Lower bound of the bucket holding the `p` quantile, `None` if empty.
    pub fn percentile_lower_bound(&self, p: f64) -> Option<u64> {
        if self.count == 0 {
            return None;
        }
        debug_assert!((0.0..=1.0).contains(&p), "percentile must be in [0.0, 1.0]");
        let target = ((self.count as f64) * p).ceil().max(1.0) as u64;
        let mut seen = 0u64;
        for (i, &c) in self.buckets.iter().enumerate() {
            seen = seen.wrapping_add(c);
            if seen >= target {
                return Some(bucket_lower_bound(i));
            }
        }
        Some(bucket_lower_bound(63))
    }

    #[inline]
    pub fn p50(&self) -> Option<u64> {
        self.percentile_lower_bound(0.50)
    }

    #[inline]
    pub fn p99(&self) -> Option<u64> {
        self.percentile_lower_bound(0.99)
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum as f64 / self.count as f64
        }
    }

    pub fn merge(&mut self, other: &Log2Hist) {
        for (a, b) in self.buckets.iter_mut().zip(other.buckets.iter()) {
            *a = a.wrapping_add(*b);
        }
        self.count = self.count.wrapping_add(other.count);
        self.sum = self.sum.wrapping_add(other.sum);
        self.max = self.max.max(other.max);
    }
}

#[inline]
fn bucket_index(v: u64) -> usize {
    if v < 2 {
        0
    } else {
        (63 - v.leading_zeros()) as usize
    }
}

#[inline]
fn bucket_lower_bound(i: usize) -> u64 {
    if i == 0 {
        0
    } else {
        1u64 << i
    }
}

/// Counters owned by one worker.
///
/// Aligned to a cache line so adjacent workers' counters never share one.
#[repr(align(64))]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// States this worker inserted first.
    pub visited: u64,
    /// States this worker expanded.
    pub expanded: u64,
    /// Successor edges generated.
    pub transitions: u64,
    /// Newly inserted states classified as errors.
    pub errors: u64,
    /// Newly inserted states classified as accepting.
    pub accepting: u64,
    /// Expanded states without successors.
    pub deadlocks: u64,

    /// Successful steals.
    pub steals: u64,
    /// Steal attempts, successful or not.
    pub steal_attempts: u64,
    /// New states handed to a peer's queue.
    pub peer_pushes: u64,
    /// Termination-credit syncs.
    pub syncs: u64,
    /// Times the worker asked to be parked.
    pub parks: u64,
    /// Successors per expanded state.
    pub fanout: Log2Hist,
}

/// Scheduling metrics merged over all workers.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SearchMetrics {
    pub workers: usize,
    pub steals: u64,
    pub steal_attempts: u64,
    pub peer_pushes: u64,
    pub syncs: u64,
    pub parks: u64,
    pub fanout: Log2Hist,
    /// States expanded by each worker, indexed by worker id.
    pub expanded_per_worker: Vec<u64>,
    /// Table growths performed by the store.
    pub store_generations: usize,
    /// Table cells at the end of the run.
    pub store_capacity: usize,
}

impl SearchMetrics {
    pub fn merge_worker(&mut self, w: &WorkerStats) {
        self.workers += 1;
        self.steals += w.steals;
        self.steal_attempts += w.steal_attempts;
        self.peer_pushes += w.peer_pushes;
        self.syncs += w.syncs;
        self.parks += w.parks;
        self.fanout.merge(&w.fanout);
        self.expanded_per_worker.push(w.expanded);
    }

    /// Fraction of steal attempts that found work.
    pub fn steal_success_rate(&self) -> f64 {
        if self.steal_attempts == 0 {
            0.0
        } else {
            self.steals as f64 / self.steal_attempts as f64
        }
    }
}
