//! Metrics collection and export for courier.
//!
//! Every crate records through the `metrics` facade; nothing is kept unless a
//! recorder is installed with [`init_metrics`]. With the `prometheus` feature
//! the recorder renders Prometheus text for a scrape endpoint.
//!
//! ```rust,ignore
//! use courier_metrics::{counter, dispatch};
//!
//! counter!(dispatch::UPDATES_RECEIVED_TOTAL, "source" => "polling").increment(1);
//! ```

mod definitions;
pub mod error;
mod recorder;

pub use {
    definitions::*,
    error::{Error, Result},
    recorder::{MetricsHandle, MetricsRecorderConfig, init_metrics},
};

// Re-export metrics macros for convenience
pub use metrics::{counter, gauge, histogram};
