//! Shared types and utilities for the serving sweep runner.
//!
//! This crate holds everything the orchestrator and the report layer agree
//! on: the [`Configuration`] that identifies one run, the [`Outcome`] and
//! [`MetricsArtifact`] records a run produces, the [`ConfigurationSpace`]
//! that expands sweep axes, the failure taxonomy, and the ambient
//! configuration/logging/console plumbing.

pub mod config;
pub mod console;
pub mod errors;
pub mod logging;
pub mod space;
pub mod types;
pub mod util;

pub use config::{ConfigError, EnvError, EnvParser, Profile, SweepConfig};
pub use errors::{ErrorCategory, SweepError};
pub use logging::{LogConfig, LogFormat, LoggingGuards, init_logging};
pub use space::{Axes, ConfigurationSpace, SkipRule, SkippedConfiguration, SweepPlan};
pub use types::{Configuration, Metric, MetricsArtifact, Outcome, OutcomeError};
