//! Core records shared by the orchestrator and the report layer.

use crate::errors::{ErrorCategory, SweepError};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Quantization label used in names and tables when a run is unquantized.
pub const UNQUANTIZED: &str = "none";

/// One point in the sweep's parameter space.
///
/// Immutable once constructed. The canonical [`name`](Self::name) is used for
/// every file a run produces and for log correlation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Configuration {
    model: String,
    parallelism: NonZeroU32,
    quantization: Option<String>,
    eager: bool,
}

impl Configuration {
    pub fn new(
        model: impl Into<String>,
        parallelism: NonZeroU32,
        quantization: Option<String>,
        eager: bool,
    ) -> Self {
        Self {
            model: model.into(),
            parallelism,
            quantization: quantization.and_then(|q| normalize_quantization(&q)),
            eager,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn parallelism(&self) -> u32 {
        self.parallelism.get()
    }

    /// Quantization mode, `None` when unquantized.
    pub fn quantization(&self) -> Option<&str> {
        self.quantization.as_deref()
    }

    /// Quantization as displayed in names and tables.
    pub fn quantization_label(&self) -> &str {
        self.quantization.as_deref().unwrap_or(UNQUANTIZED)
    }

    pub fn eager(&self) -> bool {
        self.eager
    }

    /// Canonical name: `<model>_tp<N>_quant-<q>_eager-<bool>` with `/` in the
    /// model replaced by `_`.
    pub fn name(&self) -> String {
        format!(
            "{}_tp{}_quant-{}_eager-{}",
            self.model.replace('/', "_"),
            self.parallelism,
            self.quantization_label(),
            self.eager
        )
    }

    /// Recover a configuration from a canonical name (or a file name that
    /// starts with one, e.g. `<name>_results.json`).
    ///
    /// The model comes back with `/` replaced by `_`, since the name does not
    /// keep the separator.
    pub fn parse_name(name: &str) -> Option<Self> {
        let stem = name
            .strip_suffix(".json")
            .map(|s| s.strip_suffix("_results").unwrap_or(s))
            .unwrap_or(name);

        let (rest, eager) = stem.rsplit_once("_eager-")?;
        let eager = match eager {
            "true" => true,
            "false" => false,
            _ => return None,
        };
        let (rest, quant) = rest.rsplit_once("_quant-")?;
        let (model, tp) = rest.rsplit_once("_tp")?;
        let parallelism = tp.parse::<NonZeroU32>().ok()?;
        if model.is_empty() || quant.is_empty() {
            return None;
        }

        Some(Self::new(model, parallelism, Some(quant.to_string()), eager))
    }
}

impl std::fmt::Display for Configuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Parse a user-supplied quantization value; `none` (any case) and the empty
/// string mean unquantized.
pub fn normalize_quantization(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(UNQUANTIZED) {
        None
    } else {
        Some(trimmed.to_ascii_lowercase())
    }
}

/// Parsed benchmark results.
///
/// Request counts default to zero when the artifact omits them; the four
/// headline metrics stay `None` when not reported so statistics can exclude
/// them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MetricsArtifact {
    #[serde(default)]
    pub completed: u64,
    #[serde(default)]
    pub failed: u64,
    #[serde(default)]
    pub request_throughput: Option<f64>,
    #[serde(default)]
    pub output_throughput: Option<f64>,
    #[serde(default)]
    pub mean_ttft_ms: Option<f64>,
    #[serde(default)]
    pub mean_tpot_ms: Option<f64>,
}

impl MetricsArtifact {
    pub fn value(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::RequestThroughput => self.request_throughput,
            Metric::OutputThroughput => self.output_throughput,
            Metric::MeanTtft => self.mean_ttft_ms,
            Metric::MeanTpot => self.mean_tpot_ms,
        }
    }
}

/// The four headline metrics a benchmark artifact reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    RequestThroughput,
    OutputThroughput,
    MeanTtft,
    MeanTpot,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::RequestThroughput,
        Metric::OutputThroughput,
        Metric::MeanTtft,
        Metric::MeanTpot,
    ];

    /// Field name in the benchmark artifact.
    pub fn key(self) -> &'static str {
        match self {
            Self::RequestThroughput => "request_throughput",
            Self::OutputThroughput => "output_throughput",
            Self::MeanTtft => "mean_ttft_ms",
            Self::MeanTpot => "mean_tpot_ms",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Self::RequestThroughput => "req/s",
            Self::OutputThroughput => "tok/s",
            Self::MeanTtft | Self::MeanTpot => "ms",
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Failure detail attached to an unsuccessful [`Outcome`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeError {
    pub category: ErrorCategory,
    pub message: String,
}

impl std::fmt::Display for OutcomeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.category, self.message)
    }
}

/// Terminal record for one configuration's run. Created once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    configuration: Configuration,
    success: bool,
    error: Option<OutcomeError>,
    duration_secs: f64,
    metrics: Option<MetricsArtifact>,
    artifact_path: Option<PathBuf>,
}

impl Outcome {
    pub fn succeeded(
        configuration: Configuration,
        duration: Duration,
        metrics: MetricsArtifact,
        artifact_path: PathBuf,
    ) -> Self {
        Self {
            configuration,
            success: true,
            error: None,
            duration_secs: duration.as_secs_f64(),
            metrics: Some(metrics),
            artifact_path: Some(artifact_path),
        }
    }

    pub fn failed(configuration: Configuration, duration: Duration, error: &SweepError) -> Self {
        Self {
            configuration,
            success: false,
            error: Some(OutcomeError {
                category: error.category(),
                message: error.to_string(),
            }),
            duration_secs: duration.as_secs_f64(),
            metrics: None,
            artifact_path: None,
        }
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn error(&self) -> Option<&OutcomeError> {
        self.error.as_ref()
    }

    pub fn category(&self) -> Option<ErrorCategory> {
        self.error.as_ref().map(|e| e.category)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_secs.max(0.0))
    }

    pub fn metrics(&self) -> Option<&MetricsArtifact> {
        self.metrics.as_ref()
    }

    pub fn artifact_path(&self) -> Option<&Path> {
        self.artifact_path.as_deref()
    }

    /// File name of the persisted artifact, for report cross-references.
    pub fn artifact_file_name(&self) -> Option<String> {
        self.artifact_path
            .as_deref()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
    }
}
