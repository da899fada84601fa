//! Machine-readable exports: `raw_results.json`, `results_summary.csv` and
//! `outcomes.json`.

use crate::aggregator::ReportAggregator;
use crate::error::ReportError;
use crate::render::metric_cell;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use sweep_common::{Metric, MetricsArtifact};
use tracing::debug;

pub const RAW_RESULTS_FILE: &str = "raw_results.json";
pub const CSV_FILE: &str = "results_summary.csv";
pub const OUTCOMES_FILE: &str = "outcomes.json";
pub const ANALYSIS_FILE: &str = "detailed_analysis.txt";
pub const SUMMARY_FILE: &str = "summary.txt";

pub const CSV_HEADER: [&str; 9] = [
    "Model",
    "TP",
    "Quantization",
    "EnforceEager",
    "ReqThroughput_req_s",
    "OutThroughput_tok_s",
    "TTFT_ms",
    "TPOT_ms",
    "Filename",
];

#[derive(Debug, Serialize)]
struct RawConfig<'a> {
    model: &'a str,
    tp: u32,
    quant: &'a str,
    eager: bool,
}

#[derive(Debug, Serialize)]
struct RawEntry<'a> {
    filename: String,
    config: RawConfig<'a>,
    data: &'a MetricsArtifact,
}

/// Paths of the files written by [`ReportAggregator::write_analysis_exports`].
#[derive(Debug, Clone)]
pub struct ExportPaths {
    pub analysis: PathBuf,
    pub raw_results: PathBuf,
    pub csv: PathBuf,
}

impl ReportAggregator {
    /// One entry per accepted artifact, in recording order.
    pub fn write_raw_json(&self, path: &Path) -> Result<(), ReportError> {
        let entries: Vec<RawEntry<'_>> = self
            .successes()
            .filter_map(|outcome| {
                let c = outcome.configuration();
                outcome.metrics().map(|data| RawEntry {
                    filename: outcome.artifact_file_name().unwrap_or_default(),
                    config: RawConfig {
                        model: c.model(),
                        tp: c.parallelism(),
                        quant: c.quantization_label(),
                        eager: c.eager(),
                    },
                    data,
                })
            })
            .collect();
        write_json(path, &entries)
    }

    /// One header row, then one row per accepted artifact. Absent metrics
    /// are empty cells.
    pub fn write_csv(&self, path: &Path) -> Result<(), ReportError> {
        let file = File::create(path).map_err(ReportError::io(path))?;
        let mut wtr = csv::Writer::from_writer(file);
        wtr.write_record(CSV_HEADER)?;

        for outcome in self.successes() {
            let c = outcome.configuration();
            let cell = |metric| metric_cell(outcome, metric).map(|v| v.to_string()).unwrap_or_default();
            wtr.write_record([
                c.model().to_string(),
                c.parallelism().to_string(),
                c.quantization_label().to_string(),
                c.eager().to_string(),
                cell(Metric::RequestThroughput),
                cell(Metric::OutputThroughput),
                cell(Metric::MeanTtft),
                cell(Metric::MeanTpot),
                outcome.artifact_file_name().unwrap_or_default(),
            ])?;
        }

        wtr.flush().map_err(ReportError::io(path))?;
        Ok(())
    }

    /// Every outcome (successes and failures) as a JSON array.
    pub fn write_outcomes_json(&self, path: &Path) -> Result<(), ReportError> {
        write_json(path, self.outcomes())
    }

    /// `detailed_analysis.txt`, `raw_results.json` and `results_summary.csv`
    /// in `dir`.
    pub fn write_analysis_exports(
        &self,
        dir: &Path,
        generated: chrono::DateTime<chrono::Local>,
    ) -> Result<ExportPaths, ReportError> {
        let paths = ExportPaths {
            analysis: dir.join(ANALYSIS_FILE),
            raw_results: dir.join(RAW_RESULTS_FILE),
            csv: dir.join(CSV_FILE),
        };

        write_text(&paths.analysis, &self.render_analysis(generated))?;
        self.write_raw_json(&paths.raw_results)?;
        self.write_csv(&paths.csv)?;
        debug!(dir = %dir.display(), "Wrote analysis exports");
        Ok(paths)
    }
}

pub fn write_text(path: &Path, text: &str) -> Result<(), ReportError> {
    let mut file = File::create(path).map_err(ReportError::io(path))?;
    file.write_all(text.as_bytes())
        .map_err(ReportError::io(path))
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), ReportError> {
    let text = serde_json::to_string_pretty(value).map_err(ReportError::json(path))?;
    write_text(path, &(text + "\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroU32;
    use std::time::Duration;
    use sweep_common::{Configuration, Outcome, SweepError};

    fn outcome(tp: u32, req: Option<f64>) -> Outcome {
        let c = Configuration::new("org/model", NonZeroU32::new(tp).unwrap(), None, true);
        let path = PathBuf::from(format!("/r/{}_results.json", c.name()));
        Outcome::succeeded(
            c,
            Duration::from_secs(1),
            MetricsArtifact {
                completed: 10,
                request_throughput: req,
                mean_ttft_ms: Some(12.25),
                ..Default::default()
            },
            path,
        )
    }

    fn aggregator() -> ReportAggregator {
        let mut agg = ReportAggregator::new();
        agg.record(outcome(2, Some(12.5)));
        agg.record(outcome(4, None));
        agg.record(Outcome::failed(
            Configuration::new("org/model", NonZeroU32::new(8).unwrap(), None, true),
            Duration::from_secs(1),
            &SweepError::ArtifactMissing {
                path: PathBuf::from("/tmp/x.json"),
                reason: "not found".into(),
            },
        ));
        agg
    }

    #[test]
    fn test_csv_has_one_header_and_one_row_per_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CSV_FILE);
        aggregator().write_csv(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_HEADER.join(","));
        assert_eq!(
            lines[1],
            "org/model,2,none,true,12.5,,12.25,,org_model_tp2_quant-none_eager-true_results.json"
        );
        assert!(lines[2].starts_with("org/model,4,none,true,,,12.25,,"));
    }

    #[test]
    fn test_raw_json_lists_only_accepted_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(RAW_RESULTS_FILE);
        aggregator().write_raw_json(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let entries = value.as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["config"]["tp"], 2);
        assert_eq!(entries[0]["config"]["quant"], "none");
        assert_eq!(entries[0]["data"]["request_throughput"], 12.5);
        assert!(entries[1]["data"]["request_throughput"].is_null());
    }

    #[test]
    fn test_outcomes_json_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(OUTCOMES_FILE);
        let agg = aggregator();
        agg.write_outcomes_json(&path).unwrap();

        let back: Vec<Outcome> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back, agg.outcomes());
    }

    #[test]
    fn test_analysis_exports_written_together() {
        let dir = tempfile::tempdir().unwrap();
        let paths = aggregator()
            .write_analysis_exports(dir.path(), chrono::Local::now())
            .unwrap();
        assert!(paths.analysis.exists());
        assert!(paths.raw_results.exists());
        assert!(paths.csv.exists());
    }
}
