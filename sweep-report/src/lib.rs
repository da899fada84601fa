//! Aggregation and reporting for serving sweeps.
//!
//! [`ReportAggregator`] owns the [`Outcome`](sweep_common::Outcome) sequence
//! of a sweep (or the accepted artifacts reloaded from a results directory)
//! and derives everything an operator reads afterwards: descriptive
//! statistics, per-model tables, best-configuration call-outs and the
//! machine-readable exports.

pub mod aggregator;
pub mod error;
pub mod export;
pub mod reload;
pub mod render;
pub mod stats;
pub mod strategy;

pub use aggregator::{ReportAggregator, SweepTotals};
pub use error::ReportError;
pub use reload::load_results_dir;
pub use render::SummaryContext;
pub use stats::Stats;
pub use strategy::{Direction, METRIC_STRATEGIES, MetricStrategy};
