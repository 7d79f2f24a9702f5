//! Batched termination detection.
//!
//! One global signed counter over-approximates the number of outstanding
//! work items (queued or being expanded). Workers do not touch it per item:
//! each holds a local *credit*, a pre-reserved slice of the counter.
//!
//! ```text
//!   shared ─────────────────────────────────────────── 1 atomic, cache-padded
//!     ▲ +B (reserve_block)          ▲ −credit (sync)
//!     │                             │
//!   credit ── increment: −1 ──► decrement: +1 ─────────── plain integer, per worker
//! ```
//!
//! # Invariant
//!
//! `shared − Σ credit == outstanding`, and every credit is `>= 0`.
//! Hence `shared` never undercounts, and `shared == 0` implies that no item
//! is outstanding anywhere. A worker may conclude global termination only
//! from a read of zero taken immediately after its own [`TerminationCredit::sync`];
//! before that its own unsynced credit keeps `shared` positive.
//!
//! # Block size
//!
//! | `B`      | Shared-counter traffic            | Latency to detect termination |
//! |----------|-----------------------------------|-------------------------------|
//! | 1        | one atomic per discovery          | immediate                     |
//! | 4096     | one atomic per 4096 discoveries   | one sync per idle worker      |
//!
//! Credits are returned to `shared` only by `sync` (and on drop), so an idle
//! worker's first action is always a sync.

#[cfg(loom)]
use loom::sync::atomic::{AtomicIsize, Ordering};
#[cfg(not(loom))]
use std::sync::atomic::{AtomicIsize, Ordering};

use crossbeam_utils::CachePadded;

/// Global outstanding-work counter.
#[derive(Debug)]
pub struct SharedCounter {
    value: CachePadded<AtomicIsize>,
}

impl SharedCounter {
    pub fn new() -> Self {
        Self {
            value: CachePadded::new(AtomicIsize::new(0)),
        }
    }

    /// `true` when no work is outstanding.
    ///
    /// Only conclusive right after the caller's own [`TerminationCredit::sync`].
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.load() == 0
    }

    /// Current value. Panics if the counter is negative.
    pub fn load(&self) -> isize {
        let v = self.value.load(Ordering::SeqCst);
        assert!(v >= 0, "termination counter is negative ({v})");
        v
    }

    /// Open a credit account of block size `block` against this counter.
    ///
    /// # Panics
    ///
    /// Panics if `block` is 0.
    pub fn credit(&self, block: usize) -> TerminationCredit<'_> {
        assert!(block > 0, "credit block must be > 0");
        TerminationCredit {
            shared: self,
            local: 0,
            block: block as isize,
        }
    }
}

impl Default for SharedCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// A worker's local share of the [`SharedCounter`].
///
/// Not `Sync`; owned by exactly one worker. Dropping it returns any unsynced
/// credit to the shared counter.
#[derive(Debug)]
pub struct TerminationCredit<'a> {
    shared: &'a SharedCounter,
    local: isize,
    block: isize,
}

impl<'a> TerminationCredit<'a> {
    /// Add one block to the shared counter and hold it locally.
    pub fn reserve_block(&mut self) {
        self.shared.value.fetch_add(self.block, Ordering::SeqCst);
        self.local += self.block;
    }

    /// Account for one newly queued item.
    #[inline]
    pub fn increment(&mut self) {
        if self.local == 0 {
            self.reserve_block();
        }
        self.local -= 1;
    }

    /// Account for one fully processed item. The credit stays local until
    /// the next [`sync`](Self::sync).
    #[inline]
    pub fn decrement(&mut self) {
        self.local += 1;
    }

    /// Return the whole local credit to the shared counter.
    ///
    /// The subtraction floors at zero. A negative shared value is an
    /// accounting bug and panics.
    pub fn sync(&mut self) {
        debug_assert!(self.local >= 0, "local credit underflow ({})", self.local);
        if self.local == 0 {
            return;
        }
        let mut cur = self.shared.value.load(Ordering::SeqCst);
        loop {
            assert!(cur >= 0, "termination counter is negative ({cur})");
            let next = (cur - self.local).max(0);
            match self.shared.value.compare_exchange_weak(
                cur,
                next,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(actual) => cur = actual,
            }
        }
        self.local = 0;
    }

    /// Credit held locally.
    #[inline]
    pub fn local(&self) -> isize {
        self.local
    }

    /// The counter this credit draws from.
    #[inline]
    pub fn shared(&self) -> &'a SharedCounter {
        self.shared
    }
}

impl Drop for TerminationCredit<'_> {
    fn drop(&mut self) {
        // Never start a second panic while unwinding.
        if std::thread::panicking() {
            if self.local > 0 {
                self.shared.value.fetch_sub(self.local, Ordering::SeqCst);
                self.local = 0;
            }
            return;
        }
        self.sync();
    }
}


// ---------------------------------------------------------------------------
// Loom concurrency tests
// ---------------------------------------------------------------------------

#[cfg(loom)]
mod loom_tests {
    use super::*;
    use loom::sync::atomic::AtomicBool;
    use loom::sync::Arc;
    use loom::thread;

    /// A worker hands its only item to a peer. Once both have synced the
    /// counter equals exactly the number of unretired items.
    #[test]
    fn synced_counter_matches_outstanding() {
        loom::model(|| {
            let shared = Arc::new(SharedCounter::new());
            let handed_off = Arc::new(AtomicBool::new(false));
            let retired = Arc::new(AtomicBool::new(false));

            let (s2, h2, r2) = (shared.clone(), handed_off.clone(), retired.clone());
            let producer = thread::spawn(move || {
                let mut c = s2.credit(2);
                c.increment();
                h2.store(true, Ordering::SeqCst);
                c.sync();
            });

            let mut c = shared.credit(2);
            if handed_off.load(Ordering::SeqCst) {
                c.decrement();
                r2.store(true, Ordering::SeqCst);
            }
            c.sync();

            producer.join().unwrap();
            // The item is either retired here or still outstanding.
            if !retired.load(Ordering::SeqCst) {
                assert_eq!(shared.load(), 1);
            } else {
                assert!(shared.is_zero());
            }
        });
    }

    /// Two credits reserving concurrently never lose a block.
    #[test]
    fn concurrent_reservations_sum() {
        loom::model(|| {
            let shared = Arc::new(SharedCounter::new());
            let s2 = shared.clone();

            let h = thread::spawn(move || {
                let mut c = s2.credit(3);
                c.increment();
                c.decrement();
                c.sync();
            });

            let mut c = shared.credit(5);
            c.increment();
            c.decrement();
            c.sync();

            h.join().unwrap();
            assert!(shared.is_zero());
        });
    }
}
