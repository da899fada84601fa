//! Sweep-level prerequisites, checked once before the loop starts.

use serde::{Deserialize, Serialize};
use std::path::Path;
use sweep_common::{SweepConfig, SweepError};
use tracing::debug;

/// Severity level for a failed check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational only.
    Info,
    /// Degrades a feature but the sweep can run.
    Warning,
    /// The sweep cannot start.
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckItem {
    pub check: String,
    pub ok: bool,
    /// Severity if the check failed.
    pub severity: Severity,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl CheckItem {
    fn pass(check: &str, detail: impl Into<String>) -> Self {
        Self {
            check: check.to_string(),
            ok: true,
            severity: Severity::Info,
            detail: detail.into(),
            remediation: None,
        }
    }

    fn fail(check: &str, severity: Severity, detail: impl Into<String>, remediation: &str) -> Self {
        Self {
            check: check.to_string(),
            ok: false,
            severity,
            detail: detail.into(),
            remediation: Some(remediation.to_string()),
        }
    }

    /// Failed with [`Severity::Error`].
    pub fn is_blocking(&self) -> bool {
        !self.ok && self.severity == Severity::Error
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreflightReport {
    pub items: Vec<CheckItem>,
}

impl PreflightReport {
    pub fn is_ready(&self) -> bool {
        !self.items.iter().any(CheckItem::is_blocking)
    }

    pub fn blocking(&self) -> impl Iterator<Item = &CheckItem> {
        self.items.iter().filter(|item| item.is_blocking())
    }

    /// `PreconditionFailed` naming every blocking check.
    pub fn into_result(self) -> Result<(), SweepError> {
        if self.is_ready() {
            return Ok(());
        }
        let problems: Vec<String> = self
            .blocking()
            .map(|item| format!("{}: {}", item.check, item.detail))
            .collect();
        Err(SweepError::PreconditionFailed(problems.join("; ")))
    }
}

/// Check the tooling and output location a sweep over `config` needs.
pub fn run_preflight(config: &SweepConfig) -> PreflightReport {
    let mut report = PreflightReport::default();

    report.items.push(tool_check(
        "server_binary",
        &config.server.binary,
        Severity::Error,
        "Install the inference server or set [server] binary / SWEEP_SERVER_BINARY",
    ));
    report.items.push(tool_check(
        "bash",
        "bash",
        Severity::Error,
        "Install bash; server and benchmark commands run through it",
    ));
    report.items.push(tool_check(
        "curl",
        "curl",
        Severity::Info,
        "Optional; useful for probing the health endpoint by hand",
    ));
    report.items.push(tool_check(
        "pgrep",
        "pgrep",
        Severity::Warning,
        "Install procps; stray servers from earlier runs cannot be reaped without it",
    ));

    if let Some(script) = &config.environment.setup_script {
        report.items.push(if script.is_file() {
            CheckItem::pass("setup_script", script.display().to_string())
        } else {
            CheckItem::fail(
                "setup_script",
                Severity::Error,
                format!("{} does not exist", script.display()),
                "Fix [environment] setup_script or SWEEP_SETUP_SCRIPT",
            )
        });
    }

    report.items.push(results_dir_check(&config.sweep.results_dir));
    debug!(ready = report.is_ready(), "Preflight complete");
    report
}

fn tool_check(check: &str, binary: &str, severity: Severity, remediation: &str) -> CheckItem {
    match which::which(binary) {
        Ok(path) => CheckItem::pass(check, path.display().to_string()),
        Err(e) => CheckItem::fail(check, severity, format!("{binary}: {e}"), remediation),
    }
}

fn results_dir_check(dir: &Path) -> CheckItem {
    const CHECK: &str = "results_dir";
    const REMEDIATION: &str = "Choose a writable --results-dir";

    if let Err(e) = std::fs::create_dir_all(dir) {
        return CheckItem::fail(
            CHECK,
            Severity::Error,
            format!("cannot create {}: {e}", dir.display()),
            REMEDIATION,
        );
    }
    let probe = dir.join(".sweep_write_test");
    match std::fs::write(&probe, b"ok") {
        Ok(()) => {
            let _ = std::fs::remove_file(&probe);
            CheckItem::pass(CHECK, dir.display().to_string())
        }
        Err(e) => CheckItem::fail(
            CHECK,
            Severity::Error,
            format!("{} is not writable: {e}", dir.display()),
            REMEDIATION,
        ),
    }
}
