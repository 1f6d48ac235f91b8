//! inkwell/crates/api-adapters/src/lib.rs
//!
//! The read-mostly HTTP surface the rendering layer talks to. Voting is the
//! only write it exposes.

pub mod metrics;
#[cfg(feature = "web-axum")]
pub mod web;

pub use metrics::Metrics;
#[cfg(feature = "web-axum")]
pub use web::{router, AppState};
