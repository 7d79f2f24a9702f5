//! Parallel on-the-fly explicit-state reachability engine.
//!
//! ## Scope
//! Given an implicit transition system (initial states plus a successor
//! function, see [`Generator`]), explore every reachable state exactly once
//! with many worker threads sharing memory, detect error states and
//! deadlocks, and report aggregate statistics. States are opaque byte
//! strings; computing successors is the generator's job.
//!
//! ## Key invariants
//! - Every distinct state is stored and expanded at most once, no matter how
//!   many workers race to discover it.
//! - Termination is declared only when no work is queued or in flight
//!   anywhere, without a barrier per discovery.
//! - Resource exhaustion and generator failures stop the search cleanly and
//!   are reported in the [`SearchResult`]; they never hang or abort.
//! - Totals (visited, transitions, errors, deadlocks) are independent of the
//!   worker count and the schedule.
//!
//! ## Flow
//! `initial_states -> store + queue 0 -> workers: pop -> successors -> insert
//! -> queue (own or peer) -> ... -> counter zero -> SearchResult`
//!
//! ## Notable entry points
//! - [`run`]: explore with default settings.
//! - [`Domain`] / [`SearchConfig`]: configure, run, stop and inspect a search.
//! - [`ConcurrentStateStore`]: the concurrent deduplicating state set.
//!
//! ## Example
//!
//! ```
//! use reach_rs::{run, Generator, GeneratorError, State};
//!
//! /// Counter modulo 5.
//! struct Ring;
//!
//! impl Generator for Ring {
//!     type Label = ();
//!
//!     fn initial_states(&self) -> Vec<State> {
//!         vec![State::new(vec![0])]
//!     }
//!
//!     fn successors(&self, s: &State, out: &mut Vec<(State, ())>) -> Result<(), GeneratorError> {
//!         out.push((State::new(vec![(s.bytes()[0] + 1) % 5]), ()));
//!         Ok(())
//!     }
//! }
//!
//! let result = run(&Ring, 2);
//! assert!(result.fully_explored);
//! assert_eq!(result.visited, 5);
//! assert_eq!(result.transitions, 5);
//! ```

pub mod search;
pub mod stdx;
pub mod store;

pub use search::{
    run, Domain, Generator, GeneratorError, SearchConfig, SearchError, SearchResult, StopHandle,
    StopReason, Violation, ViolationKind,
};
pub use store::{ConcurrentStateStore, State, StateId, StoreConfig, StoreError};
