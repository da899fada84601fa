//! On-disk layout of one sweep run.

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use sweep_common::Configuration;
use sweep_common::util::run_dir_name;

pub const LOGS_DIR: &str = "logs";
pub const SWEEP_LOG_FILE: &str = "sweep.jsonl";

/// `<results_dir>/<YYYYMMDD_HHMM>/` plus its `logs/` subdirectory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLayout {
    root: PathBuf,
    logs: PathBuf,
}

impl RunLayout {
    /// Paths for a run started at `now`, without touching the filesystem.
    pub fn plan(results_dir: &Path, now: DateTime<Local>) -> Self {
        Self::at(results_dir.join(run_dir_name(now)))
    }

    /// Use `root` directly as the run directory.
    pub fn at(root: PathBuf) -> Self {
        let logs = root.join(LOGS_DIR);
        Self { root, logs }
    }

    pub fn create(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.logs)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn logs(&self) -> &Path {
        &self.logs
    }

    pub fn sweep_log(&self) -> PathBuf {
        self.logs.join(SWEEP_LOG_FILE)
    }

    pub fn server_log(&self, configuration: &Configuration) -> PathBuf {
        self.logs.join(format!("{}_server.log", configuration.name()))
    }

    pub fn benchmark_log(&self, configuration: &Configuration) -> PathBuf {
        self.logs.join(format!("{}_benchmark.log", configuration.name()))
    }

    pub fn results_file(&self, configuration: &Configuration) -> PathBuf {
        self.root.join(format!("{}_results.json", configuration.name()))
    }

    pub fn rejected_file(&self, configuration: &Configuration) -> PathBuf {
        self.root.join(format!("{}_rejected.json", configuration.name()))
    }

    /// Where the benchmark client writes its raw result before validation.
    pub fn scratch_artifact(&self, configuration: &Configuration) -> PathBuf {
        self.logs.join(format!("{}_raw.json", configuration.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::num::NonZeroU32;

    #[test]
    fn test_paths_follow_configuration_name() {
        let now = Local.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap();
        let layout = RunLayout::plan(Path::new("/results"), now);
        let c = Configuration::new("org/m", NonZeroU32::new(2).unwrap(), None, false);

        assert_eq!(layout.root(), Path::new("/results/20250314_0926"));
        assert_eq!(
            layout.server_log(&c),
            PathBuf::from("/results/20250314_0926/logs/org_m_tp2_quant-none_eager-false_server.log")
        );
        assert_eq!(
            layout.results_file(&c),
            PathBuf::from("/results/20250314_0926/org_m_tp2_quant-none_eager-false_results.json")
        );
        assert!(layout.rejected_file(&c).ends_with("org_m_tp2_quant-none_eager-false_rejected.json"));
        assert!(layout.scratch_artifact(&c).starts_with(layout.logs()));
    }

    #[test]
    fn test_create_makes_logs_dir() {
        let dir = tempfile::tempdir().unwrap();
        let layout = RunLayout::at(dir.path().join("run"));
        layout.create().unwrap();
        assert!(layout.logs().is_dir());
    }
}
