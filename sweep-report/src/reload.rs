//! Rebuild an aggregator from the accepted artifacts in a results directory.

use crate::aggregator::ReportAggregator;
use crate::error::ReportError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use sweep_common::{Configuration, MetricsArtifact, Outcome};
use tracing::{debug, warn};

pub const RESULTS_SUFFIX: &str = "_results.json";

/// Load every `*_results.json` in `dir` (not recursive), in file-name order.
///
/// Files that cannot be read or parsed, or whose name is not a canonical
/// configuration name, are reported and skipped. Reloaded outcomes carry a
/// zero duration; the original timing lives in the sweep's `outcomes.json`.
pub fn load_results_dir(dir: &Path) -> Result<ReportAggregator, ReportError> {
    if !dir.is_dir() {
        return Err(ReportError::MissingDirectory(dir.to_path_buf()));
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(ReportError::io(dir))?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(RESULTS_SUFFIX))
        })
        .collect();
    if files.is_empty() {
        return Err(ReportError::NoResults(dir.to_path_buf()));
    }
    files.sort();
    debug!(count = files.len(), dir = %dir.display(), "Found result files");

    let mut aggregator = ReportAggregator::new();
    for path in files {
        match load_one(&path) {
            Ok(outcome) => aggregator.record(outcome),
            Err(reason) => warn!(path = %path.display(), %reason, "Skipping result file"),
        }
    }
    Ok(aggregator)
}

fn load_one(path: &Path) -> Result<Outcome, String> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| "non UTF-8 file name".to_string())?;
    let configuration = Configuration::parse_name(name)
        .ok_or_else(|| format!("'{name}' is not a configuration name"))?;
    let text = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    let artifact: MetricsArtifact = serde_json::from_str(&text).map_err(|e| e.to_string())?;

    Ok(Outcome::succeeded(
        configuration,
        Duration::ZERO,
        artifact,
        path.to_path_buf(),
    ))
}
