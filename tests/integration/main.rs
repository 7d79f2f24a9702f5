//! End-to-end search tests.
//!
//! Run with: `cargo test --test integration`

mod generators;
mod invariance;
mod scenarios;
