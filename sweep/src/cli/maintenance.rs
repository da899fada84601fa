//! Maintenance subcommands: status, stop, check, clean, backup, logs.

use anyhow::{Context, Result, bail};
use chrono::Local;
use dialoguer::Confirm;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use sweep::preflight::Severity;
use sweep::process::{self, Signal};
use sweep::run_preflight;
use sweep_common::util::{backup_suffix, copy_dir, dir_size, human_bytes};
use sweep_common::{SweepConfig, console};
use tokio::time::{Instant, sleep};

const SUMMARY_PREVIEW_LINES: usize = 20;
const FOLLOW_POLL: Duration = Duration::from_millis(500);

pub fn status(config: &SweepConfig) -> Result<()> {
    console::banner("Sweep status");

    let pids = process::find_by_pattern(&config.server.process_pattern);
    if pids.is_empty() {
        console::log("Server: not running");
    } else {
        console::success(&format!("Server: running (PIDs {pids:?})"));
    }

    let dir = &config.sweep.results_dir;
    if !dir.is_dir() {
        console::warning(&format!("Results directory does not exist: {}", dir.display()));
        return Ok(());
    }

    let files = collect_files(dir)?;
    let results = files.iter().filter(|p| has_suffix(p, "_results.json")).count();
    let logs = files.iter().filter(|p| has_suffix(p, ".log")).count();
    console::log(&format!("Results directory: {}", dir.display()));
    console::log(&format!("Result files: {results}"));
    console::log(&format!("Log files: {logs}"));

    if let Some(summary) = latest(&files, |p| has_suffix(p, "summary.txt")) {
        console::log(&format!("Latest summary: {}", summary.display()));
        let text = std::fs::read_to_string(&summary)
            .with_context(|| format!("failed to read {}", summary.display()))?;
        for line in text.lines().take(SUMMARY_PREVIEW_LINES) {
            println!("  {line}");
        }
    }
    Ok(())
}

pub async fn stop(config: &SweepConfig) -> Result<()> {
    let pattern = config.server.process_pattern.as_str();
    let pids = process::find_by_pattern(pattern);
    if pids.is_empty() {
        console::log("No server process found");
        return Ok(());
    }

    console::log(&format!("Stopping server processes {pids:?}..."));
    process::kill_by_pattern(pattern, Signal::Term);

    let deadline = Instant::now() + config.timeouts.stop_grace();
    while Instant::now() < deadline {
        if process::find_by_pattern(pattern).is_empty() {
            console::success("Server stopped");
            return Ok(());
        }
        sleep(FOLLOW_POLL).await;
    }

    console::warning("Server still running; sending KILL");
    process::kill_by_pattern(pattern, Signal::Kill);
    sleep(Duration::from_secs(1)).await;
    let survivors = process::find_by_pattern(pattern);
    if !survivors.is_empty() {
        bail!("server processes {survivors:?} survived KILL");
    }
    console::success("Server stopped");
    Ok(())
}

pub fn check(config: &SweepConfig, json: bool) -> Result<ExitCode> {
    let report = run_preflight(config);
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        console::banner("Prerequisite check");
        for item in &report.items {
            let line = format!("{}: {}", item.check, item.detail);
            match (item.ok, item.severity) {
                (true, _) => console::success(&line),
                (false, Severity::Error) => console::error(&line),
                (false, _) => console::warning(&line),
            }
            if !item.ok
                && let Some(hint) = &item.remediation
            {
                console::log(&format!("  hint: {hint}"));
            }
        }
    }

    if report.is_ready() {
        if !json {
            console::success("All critical prerequisites met");
        }
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

pub fn clean(config: &SweepConfig, yes: bool) -> Result<()> {
    let dir = &config.sweep.results_dir;
    if !dir.exists() {
        console::log(&format!("Nothing to clean: {} does not exist", dir.display()));
        return Ok(());
    }

    let size = dir_size(dir).unwrap_or_default();
    let confirmed = yes
        || Confirm::new()
            .with_prompt(format!(
                "Delete {} ({})?",
                dir.display(),
                human_bytes(size)
            ))
            .default(false)
            .interact()
            .context("confirmation prompt failed; pass --yes to skip it")?;
    if !confirmed {
        console::log("Cancelled");
        return Ok(());
    }

    std::fs::remove_dir_all(dir).with_context(|| format!("failed to delete {}", dir.display()))?;
    console::success(&format!("Deleted {}", dir.display()));
    Ok(())
}

pub fn backup(config: &SweepConfig) -> Result<()> {
    let dir = &config.sweep.results_dir;
    if !dir.is_dir() {
        bail!("results directory {} does not exist", dir.display());
    }

    let dest = backup_path(dir, &backup_suffix(Local::now()));
    console::log(&format!("Backing up {} to {}...", dir.display(), dest.display()));
    let bytes = copy_dir(dir, &dest)
        .with_context(|| format!("failed to copy {} to {}", dir.display(), dest.display()))?;
    console::success(&format!("Backup complete: {} ({})", dest.display(), human_bytes(bytes)));
    Ok(())
}

pub async fn logs(config: &SweepConfig, no_follow: bool) -> Result<()> {
    let dir = &config.sweep.results_dir;
    let files = if dir.is_dir() {
        collect_files(dir)?
    } else {
        Vec::new()
    };
    let Some(log) = latest(&files, |p| has_suffix(p, "_server.log")) else {
        bail!("no server logs under {}", dir.display());
    };

    console::log(&format!("Following: {}", log.display()));
    let mut file =
        std::fs::File::open(&log).with_context(|| format!("failed to open {}", log.display()))?;
    let mut pending = String::new();
    print_new(&mut file, &mut pending)?;
    if no_follow {
        return Ok(());
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            () = sleep(FOLLOW_POLL) => print_new(&mut file, &mut pending)?,
        }
    }
}

/// Print whole lines appended since the last call.
fn print_new(file: &mut std::fs::File, pending: &mut String) -> Result<()> {
    let len = file.metadata()?.len();
    let pos = file.stream_position()?;
    if len < pos {
        // truncated or rotated
        file.seek(SeekFrom::Start(0))?;
    }

    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    pending.push_str(&String::from_utf8_lossy(&buf));
    while let Some(idx) = pending.find('\n') {
        println!("{}", &pending[..idx]);
        pending.drain(..=idx);
    }
    Ok(())
}

fn backup_path(dir: &Path, suffix: &str) -> PathBuf {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "results".to_string());
    dir.with_file_name(format!("{name}_{suffix}"))
}

fn has_suffix(path: &Path, suffix: &str) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(suffix))
}

fn collect_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let entries = std::fs::read_dir(&current)
            .with_context(|| format!("failed to read {}", current.display()))?;
        for entry in entries.filter_map(Result::ok) {
            let path = entry.path();
            match entry.file_type() {
                Ok(t) if t.is_dir() => stack.push(path),
                Ok(t) if t.is_file() => out.push(path),
                _ => {}
            }
        }
    }
    Ok(out)
}

fn latest(files: &[PathBuf], matches: impl Fn(&Path) -> bool) -> Option<PathBuf> {
    files
        .iter()
        .filter(|p| matches(p))
        .filter_map(|p| {
            let modified = p.metadata().and_then(|m| m.modified()).ok()?;
            Some((modified, p))
        })
        .max_by_key(|(modified, _)| *modified)
        .map(|(_, p)| p.clone())
}
