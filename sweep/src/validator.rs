//! Benchmark artifact parsing and the health rule.

use serde_json::Value;
use std::path::{Path, PathBuf};
use sweep_common::{MetricsArtifact, SweepError};
use tracing::{debug, warn};

/// A parsed artifact: the full JSON as written by the client plus the
/// extracted metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct RawArtifact {
    pub path: PathBuf,
    pub json: Value,
    pub metrics: MetricsArtifact,
}

impl RawArtifact {
    /// Pretty-print the full artifact to `dest`.
    pub fn persist(&self, dest: &Path) -> std::io::Result<()> {
        let mut text = serde_json::to_string_pretty(&self.json).map_err(std::io::Error::other)?;
        text.push('\n');
        std::fs::write(dest, text)
    }
}

/// Why an artifact was refused.
#[derive(Debug)]
pub struct Rejection {
    pub error: SweepError,
    /// Present when the artifact parsed but failed the health rule, so it can
    /// be kept for inspection.
    pub artifact: Option<RawArtifact>,
}

impl From<SweepError> for Rejection {
    fn from(error: SweepError) -> Self {
        Self {
            error,
            artifact: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResultValidator;

impl ResultValidator {
    /// Parse the artifact at `path`. A missing, unreadable or non-object file
    /// is `ArtifactMissing`. Absent metrics stay `None`.
    pub fn load(&self, path: &Path) -> Result<RawArtifact, SweepError> {
        let missing = |reason: String| SweepError::ArtifactMissing {
            path: path.to_path_buf(),
            reason,
        };

        let text = std::fs::read_to_string(path).map_err(|e| missing(e.to_string()))?;
        let json: Value = serde_json::from_str(&text).map_err(|e| missing(e.to_string()))?;
        if !json.is_object() {
            return Err(missing("artifact is not a JSON object".into()));
        }
        let metrics: MetricsArtifact =
            serde_json::from_value(json.clone()).map_err(|e| missing(e.to_string()))?;

        debug!(
            path = %path.display(),
            completed = metrics.completed,
            failed = metrics.failed,
            "Parsed benchmark artifact"
        );
        Ok(RawArtifact {
            path: path.to_path_buf(),
            json,
            metrics,
        })
    }

    /// Any failed request, or no completed ones, makes the run unhealthy even
    /// if the client exited 0.
    pub fn check(&self, metrics: &MetricsArtifact) -> Result<(), SweepError> {
        if metrics.failed > 0 || metrics.completed == 0 {
            warn!(
                completed = metrics.completed,
                failed = metrics.failed,
                "Benchmark reported unhealthy results"
            );
            return Err(SweepError::BenchmarkUnhealthy {
                completed: metrics.completed,
                failed: metrics.failed,
            });
        }
        Ok(())
    }

    pub fn validate(&self, path: &Path) -> Result<RawArtifact, Rejection> {
        let artifact = self.load(path)?;
        match self.check(&artifact.metrics) {
            Ok(()) => Ok(artifact),
            Err(error) => Err(Rejection {
                error,
                artifact: Some(artifact),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sweep_common::ErrorCategory;

    fn write(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("artifact.json");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_accepts_healthy_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            r#"{"completed": 100, "failed": 0, "request_throughput": 12.5, "date": "x"}"#,
        );
        let artifact = ResultValidator.validate(&path).unwrap();
        assert_eq!(artifact.metrics.completed, 100);
        assert_eq!(artifact.metrics.request_throughput, Some(12.5));
        assert_eq!(artifact.metrics.mean_ttft_ms, None);
        assert_eq!(artifact.json["date"], "x");
    }

    #[test]
    fn test_zero_completions_is_unhealthy() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, r#"{"completed": 0, "failed": 0}"#);
        let rejection = ResultValidator.validate(&path).unwrap_err();
        assert_eq!(rejection.error.category(), ErrorCategory::BenchmarkUnhealthy);
        assert!(rejection.artifact.is_some());
    }

    #[test]
    fn test_any_failed_request_is_unhealthy() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, r#"{"completed": 99, "failed": 1}"#);
        let rejection = ResultValidator.validate(&path).unwrap_err();
        assert!(matches!(
            rejection.error,
            SweepError::BenchmarkUnhealthy {
                completed: 99,
                failed: 1
            }
        ));
    }

    #[test]
    fn test_missing_and_malformed_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let missing = ResultValidator
            .validate(&dir.path().join("nope.json"))
            .unwrap_err();
        assert_eq!(missing.error.category(), ErrorCategory::ArtifactMissing);
        assert!(missing.artifact.is_none());

        for body in ["{truncated", "[1, 2]", r#"{"completed": "many"}"#] {
            let path = write(&dir, body);
            let rejection = ResultValidator.validate(&path).unwrap_err();
            assert_eq!(rejection.error.category(), ErrorCategory::ArtifactMissing, "{body}");
        }
    }

    #[test]
    fn test_persist_pretty_prints() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, r#"{"completed":1,"failed":0}"#);
        let artifact = ResultValidator.load(&path).unwrap();
        let dest = dir.path().join("out.json");
        artifact.persist(&dest).unwrap();
        let text = std::fs::read_to_string(dest).unwrap();
        assert!(text.contains("\n  \"completed\": 1"));
    }
}
