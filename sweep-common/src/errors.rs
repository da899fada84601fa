//! Failure taxonomy for sweep runs.
//!
//! Every per-configuration failure is a [`SweepError`] whose
//! [`category`](SweepError::category) is recorded in the run's outcome.
//! Categories carry a stable code and a remediation hint, since slow startup
//! and a crashed server call for different fixes.
//!
//! # Code ranges
//!
//! | Range     | Stage      |
//! |-----------|------------|
//! | SWP-E0xx  | Planning   |
//! | SWP-E1xx  | Startup    |
//! | SWP-E2xx  | Benchmark  |
//! | SWP-E3xx  | Validation |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Stable classification of why a configuration did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Excluded by a compatibility rule before execution. Not a failure and
    /// never recorded as an outcome.
    ConfigurationSkipped,
    /// Sweep-level precondition unmet; the sweep does not start.
    PreconditionFailed,
    /// The launch call itself failed.
    ServerStartFailed,
    /// No successful readiness probe before the startup deadline.
    StartupTimedOut,
    /// The server process exited before becoming ready.
    ServerDiedDuringStartup,
    /// The benchmark client exceeded its wall-clock budget and was killed.
    BenchmarkTimedOut,
    /// The benchmark client exited non-zero or could not be launched.
    BenchmarkProcessFailed,
    /// The results artifact was not written or could not be parsed.
    ArtifactMissing,
    /// The artifact reports failed requests or zero completions.
    BenchmarkUnhealthy,
}

impl ErrorCategory {
    pub fn code(self) -> &'static str {
        match self {
            Self::ConfigurationSkipped => "SWP-E001",
            Self::PreconditionFailed => "SWP-E002",
            Self::ServerStartFailed => "SWP-E101",
            Self::StartupTimedOut => "SWP-E102",
            Self::ServerDiedDuringStartup => "SWP-E103",
            Self::BenchmarkTimedOut => "SWP-E201",
            Self::BenchmarkProcessFailed => "SWP-E202",
            Self::ArtifactMissing => "SWP-E301",
            Self::BenchmarkUnhealthy => "SWP-E302",
        }
    }

    pub fn remediation(self) -> &'static str {
        match self {
            Self::ConfigurationSkipped => "None needed; the combination is excluded by a skip rule.",
            Self::PreconditionFailed => {
                "Install the missing tooling or fix the results directory, then rerun."
            }
            Self::ServerStartFailed => {
                "Check that the server binary and setup script exist and are executable."
            }
            Self::StartupTimedOut => {
                "Server is alive but slow: raise the startup timeout or check model download/compile time."
            }
            Self::ServerDiedDuringStartup => {
                "Server crashed: read the server log for OOM, unsupported flags or device errors."
            }
            Self::BenchmarkTimedOut => {
                "Raise the benchmark timeout or reduce prompt count / output length."
            }
            Self::BenchmarkProcessFailed => "Read the benchmark log for the client-side error.",
            Self::ArtifactMissing => {
                "The client exited without writing results; check --save-result and the artifact path."
            }
            Self::BenchmarkUnhealthy => {
                "Requests failed against a live server; check the server log around the benchmark window."
            }
        }
    }

    /// Whether this category is a recorded failure (as opposed to a skip or a
    /// sweep-level abort).
    pub fn is_run_failure(self) -> bool {
        !matches!(self, Self::ConfigurationSkipped | Self::PreconditionFailed)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::ConfigurationSkipped => "configuration_skipped",
            Self::PreconditionFailed => "precondition_failed",
            Self::ServerStartFailed => "server_start_failed",
            Self::StartupTimedOut => "startup_timed_out",
            Self::ServerDiedDuringStartup => "server_died_during_startup",
            Self::BenchmarkTimedOut => "benchmark_timed_out",
            Self::BenchmarkProcessFailed => "benchmark_process_failed",
            Self::ArtifactMissing => "artifact_missing",
            Self::BenchmarkUnhealthy => "benchmark_unhealthy",
        };
        f.write_str(label)
    }
}

/// Errors raised while driving one configuration (plus the sweep-fatal
/// precondition failure).
#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error("server start failed: {0}")]
    ServerStartFailed(String),

    #[error("server not ready within {}", fmt_duration(.0))]
    StartupTimedOut(Duration),

    #[error("server process died during startup ({} after launch)", fmt_duration(.elapsed))]
    ServerDiedDuringStartup { elapsed: Duration },

    #[error("benchmark timed out after {}", fmt_duration(.0))]
    BenchmarkTimedOut(Duration),

    #[error("benchmark process failed ({}): {detail}", exit_label(.exit_code))]
    BenchmarkProcessFailed {
        exit_code: Option<i32>,
        detail: String,
    },

    #[error("benchmark artifact missing or malformed at {}: {reason}", .path.display())]
    ArtifactMissing { path: PathBuf, reason: String },

    #[error("benchmark had {failed} failed and {completed} completed requests")]
    BenchmarkUnhealthy { completed: u64, failed: u64 },

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),
}

fn fmt_duration(duration: &Duration) -> humantime::FormattedDuration {
    humantime::format_duration(*duration)
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code".to_string(),
    }
}

impl SweepError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ServerStartFailed(_) => ErrorCategory::ServerStartFailed,
            Self::StartupTimedOut(_) => ErrorCategory::StartupTimedOut,
            Self::ServerDiedDuringStartup { .. } => ErrorCategory::ServerDiedDuringStartup,
            Self::BenchmarkTimedOut(_) => ErrorCategory::BenchmarkTimedOut,
            Self::BenchmarkProcessFailed { .. } => ErrorCategory::BenchmarkProcessFailed,
            Self::ArtifactMissing { .. } => ErrorCategory::ArtifactMissing,
            Self::BenchmarkUnhealthy { .. } => ErrorCategory::BenchmarkUnhealthy,
            Self::PreconditionFailed(_) => ErrorCategory::PreconditionFailed,
        }
    }

    /// Exit code carried by a benchmark failure, if any.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::BenchmarkProcessFailed { exit_code, .. } => *exit_code,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const ALL: [ErrorCategory; 9] = [
        ErrorCategory::ConfigurationSkipped,
        ErrorCategory::PreconditionFailed,
        ErrorCategory::ServerStartFailed,
        ErrorCategory::StartupTimedOut,
        ErrorCategory::ServerDiedDuringStartup,
        ErrorCategory::BenchmarkTimedOut,
        ErrorCategory::BenchmarkProcessFailed,
        ErrorCategory::ArtifactMissing,
        ErrorCategory::BenchmarkUnhealthy,
    ];

    #[test]
    fn test_codes_are_unique() {
        let codes: HashSet<_> = ALL.iter().map(|c| c.code()).collect();
        assert_eq!(codes.len(), ALL.len());
    }

    #[test]
    fn test_display_matches_serde() {
        for category in ALL {
            let json = serde_json::to_string(&category).unwrap();
            assert_eq!(json.trim_matches('"'), category.to_string());
        }
    }

    #[test]
    fn test_startup_timeout_and_death_are_distinct() {
        let timed_out = SweepError::StartupTimedOut(Duration::from_secs(300));
        let died = SweepError::ServerDiedDuringStartup {
            elapsed: Duration::from_secs(40),
        };
        assert_ne!(timed_out.category(), died.category());
        assert_ne!(
            timed_out.category().remediation(),
            died.category().remediation()
        );
    }

    #[test]
    fn test_messages() {
        let err = SweepError::BenchmarkTimedOut(Duration::from_secs(1800));
        assert_eq!(err.to_string(), "benchmark timed out after 30m");

        let err = SweepError::BenchmarkProcessFailed {
            exit_code: Some(2),
            detail: "bad args".into(),
        };
        assert_eq!(err.to_string(), "benchmark process failed (exit code 2): bad args");
        assert_eq!(err.exit_code(), Some(2));

        let err = SweepError::BenchmarkUnhealthy {
            completed: 0,
            failed: 0,
        };
        assert!(err.to_string().contains("0 failed and 0 completed"));
    }

    #[test]
    fn test_run_failure_classification() {
        assert!(!ErrorCategory::ConfigurationSkipped.is_run_failure());
        assert!(!ErrorCategory::PreconditionFailed.is_run_failure());
        assert!(ErrorCategory::BenchmarkUnhealthy.is_run_failure());
    }
}
