//! Totals must not depend on worker count or scheduling knobs.

use reach_rs::{Domain, SearchConfig, SearchResult, StoreConfig};

use crate::generators::{Counting, Graph, Grid};

fn totals(r: &SearchResult) -> (u64, u64, u64, u64, u64, u64) {
    (
        r.visited,
        r.expanded,
        r.transitions,
        r.errors,
        r.accepting,
        r.deadlocks,
    )
}

fn run_with(cfg: SearchConfig, g: &impl reach_rs::Generator) -> SearchResult {
    let mut domain = Domain::new(cfg).unwrap();
    let r = domain.run(g);
    assert!(r.fully_explored, "{:?}", r.stop_reason);
    assert_eq!(r.visited as usize, domain.store().len());
    r
}

#[test]
fn worker_count_does_not_change_totals() {
    let g = Grid {
        w: 120,
        h: 90,
        err_mod: Some(5),
    };
    let base = totals(&run_with(SearchConfig::with_workers(1), &g));
    for workers in [2, 8] {
        let r = run_with(SearchConfig::with_workers(workers), &g);
        assert_eq!(totals(&r), base, "workers={workers}");
    }
}

#[test]
fn scheduling_knobs_do_not_change_totals() {
    let g = Grid {
        w: 80,
        h: 80,
        err_mod: Some(3),
    };
    let base = totals(&run_with(SearchConfig::with_workers(1), &g));
    let variants = [
        SearchConfig {
            credit_block: 1,
            share_interval: 1,
            ..SearchConfig::with_workers(4)
        },
        SearchConfig {
            share_interval: 0,
            steal_batch: 1,
            ..SearchConfig::with_workers(4)
        },
        SearchConfig {
            credit_block: 7,
            steal_tries: 1,
            spin_iters: 1,
            ..SearchConfig::with_workers(6)
        },
        SearchConfig {
            seed: 42,
            store: StoreConfig {
                initial_capacity: 16,
                max_states: None,
            },
            ..SearchConfig::with_workers(8)
        },
    ];
    for cfg in variants {
        assert_eq!(totals(&run_with(cfg, &g)), base, "{cfg:?}");
    }
}

#[test]
fn every_state_is_expanded_exactly_once() {
    let g = Counting::new(Grid {
        w: 100,
        h: 100,
        err_mod: None,
    });
    let r = run_with(
        SearchConfig {
            store: StoreConfig {
                initial_capacity: 32,
                max_states: None,
            },
            ..SearchConfig::with_workers(8)
        },
        &g,
    );
    assert_eq!(r.errors, 0);
    let calls = g.calls.lock().unwrap();
    assert_eq!(calls.len(), 100 * 100);
    assert_eq!(r.expanded, 100 * 100);
    for (state, n) in calls.iter() {
        assert_eq!(*n, 1, "state {state:?} expanded {n} times");
    }
}

#[test]
fn accepting_states_are_counted_once() {
    // Dense graph: every node links to the next three, wrapping around.
    let n = 2_000u32;
    let mut g = Graph::new((0..n).map(|i| vec![(i + 1) % n, (i + 2) % n, (i + 3) % n]).collect());
    g.accepting = (0..n).filter(|i| i % 10 == 0).collect();
    for workers in [1, 2, 8] {
        let r = run_with(SearchConfig::with_workers(workers), &g);
        assert_eq!(r.visited, u64::from(n));
        assert_eq!(r.transitions, 3 * u64::from(n));
        assert_eq!(r.accepting, u64::from(n / 10));
        assert_eq!(r.deadlocks, 0);
    }
}

#[test]
fn table_grows_under_contention() {
    let g = Grid {
        w: 250,
        h: 200,
        err_mod: None,
    };
    let r = run_with(
        SearchConfig {
            store: StoreConfig {
                initial_capacity: 16,
                max_states: None,
            },
            ..SearchConfig::with_workers(8)
        },
        &g,
    );
    assert_eq!(r.visited, 250 * 200);
    assert_eq!(r.errors, 0);
    assert!(r.metrics.store_generations > 1);
    assert!(r.metrics.store_capacity >= 250 * 200);
}
