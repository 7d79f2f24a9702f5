//! Tiny deterministic RNG for scheduling decisions (steal victims, and the
//! interleaving choices of the simulation harness).
//!
//! XorShift64 is fast and reproducible: the same seed gives the same victim
//! sequence. Bounded sampling uses Lemire's multiply-shift with rejection,
//! with a bitmask fast path for powers of two.

/// Deterministic RNG. Not `Copy`: copying would duplicate the stream.
#[derive(Clone, Debug)]
pub struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    /// Seed 0 is remapped to avoid the all-zero fixed point.
    #[inline]
    pub fn new(seed: u64) -> Self {
        let seed = if seed == 0 { 0x9E37_79B9_7F4A_7C15 } else { seed };
        Self { state: seed }
    }

    /// Per-worker stream derived from a master seed.
    #[inline]
    pub fn for_worker(seed: u64, worker: usize) -> Self {
        Self::new(seed ^ (worker as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
    }

    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    /// Uniform value in `[0, upper)`.
    #[inline]
    pub fn next_usize(&mut self, upper: usize) -> usize {
        debug_assert!(upper > 0, "upper bound must be > 0");
        if upper.is_power_of_two() {
            return (self.next_u64() as usize) & (upper - 1);
        }
        let upper = upper as u64;
        let threshold = upper.wrapping_neg() % upper;
        loop {
            let m = (self.next_u64() as u128) * (upper as u128);
            if (m as u64) >= threshold {
                return (m >> 64) as usize;
            }
        }
    }

    /// Uniform index in `[0, n)` other than `exclude`. Requires `n >= 2`.
    #[inline]
    pub fn next_other(&mut self, n: usize, exclude: usize) -> usize {
        debug_assert!(n >= 2 && exclude < n);
        let v = self.next_usize(n - 1);
        if v >= exclude {
            v + 1
        } else {
            v
        }
    }
}
