//! Small end-to-end scenarios with exactly known outcomes.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use reach_rs::{
    run, Domain, SearchConfig, SearchError, StopReason, StoreConfig, StoreError, ViolationKind,
};

use crate::generators::{u32_of, Graph, Grid};

#[test]
fn single_state_without_successors_is_a_deadlock() {
    let g = Graph::new(vec![vec![]]);
    let r = run(&g, 1);
    assert!(r.fully_explored);
    assert_eq!(r.visited, 1);
    assert_eq!(r.expanded, 1);
    assert_eq!(r.transitions, 0);
    assert_eq!(r.deadlocks, 1);
    assert!(r.stop_reason.is_none());
    let v = r.violation.expect("deadlock recorded");
    assert_eq!(v.kind, ViolationKind::Deadlock);
    assert_eq!(v.trace, vec![v.state]);
}

#[test]
fn three_cycle_for_every_worker_count() {
    let g = Graph::new(vec![vec![1], vec![2], vec![0]]);
    for workers in 1..=8 {
        let r = run(&g, workers);
        assert!(r.fully_explored, "workers={workers}");
        assert_eq!(r.visited, 3, "workers={workers}");
        assert_eq!(r.expanded, 3, "workers={workers}");
        assert_eq!(r.transitions, 3, "workers={workers}");
        assert_eq!(r.errors, 0, "workers={workers}");
        assert_eq!(r.deadlocks, 0, "workers={workers}");
        assert!(r.violation.is_none());
        assert_eq!(r.metrics.workers, workers);
    }
}

#[test]
fn stop_on_error_never_visits_states_beyond_it() {
    let mut g = Graph::chain(10);
    g.errors = vec![5];
    for workers in [1, 2, 4, 8] {
        let mut domain = Domain::new(SearchConfig {
            stop_on_error: true,
            ..SearchConfig::with_workers(workers)
        })
        .unwrap();
        let r = domain.run(&g);
        assert!(!r.fully_explored);
        assert_eq!(r.errors, 1);
        assert!(matches!(
            r.stop_reason,
            Some(StopReason::PropertyViolation(ViolationKind::Error))
        ));
        assert_eq!(r.visited, 6, "workers={workers}");
        assert_eq!(domain.store().len(), 6);
        for (_, s) in domain.store().iter() {
            assert!(u32_of(s) <= 5, "visited s{} beyond the error", u32_of(s));
        }
    }
}

#[test]
fn error_states_are_expanded_without_stop_on_error() {
    let mut g = Graph::chain(10);
    g.errors = vec![5];
    let r = run(&g, 3);
    assert!(r.fully_explored);
    assert_eq!(r.visited, 10);
    assert_eq!(r.errors, 1);
    assert_eq!(r.deadlocks, 1);
    assert!(r.stop_reason.is_none());
}

#[test]
fn store_exhaustion_stops_every_worker() {
    let limit = 500;
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let g = Grid {
            w: 200,
            h: 200,
            err_mod: None,
        };
        let mut domain = Domain::new(SearchConfig {
            store: StoreConfig {
                initial_capacity: 64,
                max_states: Some(limit),
            },
            ..SearchConfig::with_workers(8)
        })
        .unwrap();
        let r = domain.run(&g);
        let _ = tx.send((r, domain.store().len()));
    });

    let (r, stored) = rx
        .recv_timeout(Duration::from_secs(30))
        .expect("search hung after store exhaustion");
    assert!(!r.fully_explored);
    assert_eq!(r.errors, 0);
    assert_eq!(stored, limit);
    assert_eq!(r.visited, limit as u64);
    match r.stop_reason {
        Some(StopReason::Failed(SearchError::StoreExhausted(StoreError::Exhausted { limit: l }))) => {
            assert_eq!(l, limit)
        }
        other => panic!("unexpected stop reason: {other:?}"),
    }
}

#[test]
fn queue_exhaustion_stops_every_worker() {
    for workers in [1, 4] {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let g = Grid {
                w: 200,
                h: 200,
                err_mod: None,
            };
            let mut domain = Domain::new(SearchConfig {
                queue_chunk_capacity: 2,
                queue_chunk_limit: Some(1),
                ..SearchConfig::with_workers(workers)
            })
            .unwrap();
            let r = domain.run(&g);
            let _ = tx.send(r);
        });

        let r = rx
            .recv_timeout(Duration::from_secs(30))
            .expect("search hung after queue exhaustion");
        assert!(!r.fully_explored, "workers={workers}");
        assert!(r.visited < 200 * 200, "workers={workers}");
        match r.stop_reason {
            Some(StopReason::Failed(ref e @ SearchError::QueueExhausted(_))) => {
                assert!(e.is_resource_exhaustion())
            }
            other => panic!("workers={workers}: unexpected stop reason: {other:?}"),
        }
        assert!(r.violation.is_none());
    }
}

#[test]
fn exhaustion_while_seeding_is_reported() {
    let mut g = Graph::new(vec![vec![], vec![], vec![]]);
    g.roots = vec![0, 1, 2];
    let mut domain = Domain::new(SearchConfig {
        store: StoreConfig {
            initial_capacity: 16,
            max_states: Some(2),
        },
        ..SearchConfig::with_workers(2)
    })
    .unwrap();
    let r = domain.run(&g);
    assert!(!r.fully_explored);
    assert_eq!(r.visited, 2);
    let err = r.stop_reason.as_ref().and_then(StopReason::error).unwrap();
    assert!(err.is_resource_exhaustion());
}

#[test]
fn grid_totals_match_closed_form() {
    let g = Grid {
        w: 60,
        h: 40,
        err_mod: Some(7),
    };
    let r = run(&g, 4);
    assert!(r.fully_explored);
    assert_eq!(r.visited, 60 * 40);
    assert_eq!(r.expanded, 60 * 40);
    assert_eq!(r.transitions, g.expected_transitions());
    assert_eq!(r.errors, g.expected_errors());
    assert_eq!(r.deadlocks, 1);
}

#[test]
fn empty_initial_set_finishes_immediately() {
    let mut g = Graph::new(vec![]);
    g.roots.clear();
    let r = run(&g, 4);
    assert!(r.fully_explored);
    assert_eq!(r.visited, 0);
    assert_eq!(r.transitions, 0);
}

#[test]
fn duplicate_initial_states_are_stored_once() {
    let mut g = Graph::new(vec![vec![1], vec![]]);
    g.roots = vec![0, 0, 1, 0];
    let r = run(&g, 2);
    assert!(r.fully_explored);
    assert_eq!(r.visited, 2);
    assert_eq!(r.transitions, 1);
}
