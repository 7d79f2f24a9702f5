//! Property-based tests against sequential models.
//!
//! Run with: `cargo test --test property`

mod store_model;
