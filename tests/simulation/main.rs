//! Deterministic interleaving tests for the search workers.
//!
//! Feature gates:
//! - `sim-harness` exposes `reach_rs::search::sim` outside unit tests.
//!
//! Run with: `cargo test --features sim-harness --test simulation`

#[cfg(feature = "sim-harness")]
mod search_sim;
