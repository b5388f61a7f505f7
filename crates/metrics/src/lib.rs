//! Metrics collection and export for attache.
//!
//! A thin layer over the `metrics` crate facade. Crates record through the
//! re-exported macros using the names in [`definitions`]; with the
//! `prometheus` feature the recorder renders them for `/metrics`.
//!
//! ```rust,ignore
//! use attache_metrics::{counter, cache};
//!
//! counter!(cache::HITS_TOTAL).increment(1);
//! ```

mod definitions;
mod recorder;

pub use {
    definitions::*,
    recorder::{MetricsHandle, MetricsRecorderConfig, init_metrics},
};

// Re-export metrics macros for convenience
pub use metrics::{counter, gauge, histogram};
