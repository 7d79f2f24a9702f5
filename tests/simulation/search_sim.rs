#![cfg(feature = "sim-harness")]
//! Seeded schedules over real workers: replayability, failure draining and
//! knob sweeps, with the harness checking termination accounting per step.

use reach_rs::search::sim::simulate;
use reach_rs::{
    Generator, GeneratorError, SearchConfig, SearchError, State, StopReason, StoreConfig,
};

/// `n x n` lattice with an optional failing cell.
struct Lattice {
    n: u8,
    fail_at: Option<(u8, u8)>,
}

impl Generator for Lattice {
    type Label = bool;

    fn initial_states(&self) -> Vec<State> {
        vec![State::new(vec![0, 0])]
    }

    fn successors(&self, s: &State, out: &mut Vec<(State, bool)>) -> Result<(), GeneratorError> {
        let (x, y) = (s.bytes()[0], s.bytes()[1]);
        if self.fail_at == Some((x, y)) {
            return Err(GeneratorError::new("lattice cell rejected"));
        }
        if x + 1 < self.n {
            out.push((State::new(vec![x + 1, y]), true));
        }
        if y + 1 < self.n {
            out.push((State::new(vec![x, y + 1]), false));
        }
        Ok(())
    }
}

fn cfg(workers: usize) -> SearchConfig {
    SearchConfig {
        credit_block: 2,
        share_interval: 2,
        steal_batch: 2,
        spin_iters: 1,
        store: StoreConfig {
            initial_capacity: 8,
            max_states: None,
        },
        ..SearchConfig::with_workers(workers)
    }
}

#[test]
fn same_seed_replays_the_same_schedule() {
    let g = Lattice { n: 12, fail_at: None };
    let a = simulate(&g, cfg(4), 7, 1_000_000);
    let b = simulate(&g, cfg(4), 7, 1_000_000);
    assert!(a.fully_explored);
    assert_eq!(a.steps, b.steps);
    assert_eq!(a.totals, b.totals);
}

#[test]
fn every_schedule_reaches_the_same_totals() {
    let g = Lattice { n: 10, fail_at: None };
    for seed in 0..64 {
        let r = simulate(&g, cfg(1 + (seed as usize % 5)), seed, 1_000_000);
        assert!(r.fully_explored, "seed {seed}");
        assert_eq!(r.totals.visited, 100, "seed {seed}");
        assert_eq!(r.totals.transitions, 2 * 9 * 10, "seed {seed}");
        assert_eq!(r.totals.deadlocks, 1, "seed {seed}");
        assert_eq!(r.stored, 100);
    }
}

#[test]
fn store_exhaustion_drains_every_worker() {
    let g = Lattice { n: 40, fail_at: None };
    for seed in 0..32 {
        let c = SearchConfig {
            store: StoreConfig {
                initial_capacity: 8,
                max_states: Some(50),
            },
            ..cfg(4)
        };
        let r = simulate(&g, c, seed, 200_000);
        assert!(!r.fully_explored, "seed {seed}");
        assert_eq!(r.stored, 50);
        match r.stop_reason {
            Some(StopReason::Failed(e)) => assert!(e.is_resource_exhaustion(), "{e}"),
            other => panic!("seed {seed}: unexpected stop reason {other:?}"),
        }
    }
}

#[test]
fn queue_exhaustion_drains_every_worker() {
    let g = Lattice { n: 40, fail_at: None };
    for seed in 0..32 {
        let c = SearchConfig {
            queue_chunk_capacity: 2,
            queue_chunk_limit: Some(1),
            ..cfg(4)
        };
        let r = simulate(&g, c, seed, 200_000);
        assert!(!r.fully_explored, "seed {seed}");
        assert!(
            matches!(r.stop_reason, Some(StopReason::Failed(SearchError::QueueExhausted(_)))),
            "seed {seed}: {:?}",
            r.stop_reason
        );
    }
}

#[test]
fn generator_failure_drains_every_worker() {
    let g = Lattice {
        n: 20,
        fail_at: Some((3, 4)),
    };
    for seed in 0..32 {
        let r = simulate(&g, cfg(3), seed, 200_000);
        assert!(!r.fully_explored, "seed {seed}");
        assert!(
            matches!(r.stop_reason, Some(StopReason::Failed(SearchError::Generator { .. }))),
            "seed {seed}: {:?}",
            r.stop_reason
        );
    }
}

#[test]
fn unit_credit_blocks_and_no_sharing() {
    let g = Lattice { n: 9, fail_at: None };
    for seed in 0..16 {
        let c = SearchConfig {
            credit_block: 1,
            share_interval: 0,
            ..cfg(3)
        };
        let r = simulate(&g, c, seed, 1_000_000);
        assert!(r.fully_explored);
        assert_eq!(r.totals.visited, 81);
        // With sharing disabled, peers only get work by stealing.
        assert_eq!(r.totals.peer_pushes, 0);
    }
}
