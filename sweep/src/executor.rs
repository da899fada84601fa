//! Bounded-time benchmark client execution.

use crate::commands::ShellCommand;
use crate::process::{self, Signal};
use crate::stream::{Console, spawn_pump};
use std::path::Path;
use std::time::Duration;
use sweep_common::SweepError;
use tokio::time::{Instant, sleep_until, timeout};
use tracing::{debug, info, warn};

/// Lines of benchmark output kept for diagnostics.
pub const DEFAULT_TAIL_LINES: usize = 200;

const REAP_TIMEOUT: Duration = Duration::from_secs(5);

/// How a benchmark run ended. A timeout is not an exit code: the process
/// group has already been killed when `TimedOut` is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecOutcome {
    TimedOut {
        elapsed: Duration,
    },
    Completed {
        /// `None` when the client was terminated by a signal.
        exit_code: Option<i32>,
        /// Last lines of combined output. The artifact is authoritative;
        /// this is for error messages only.
        output: String,
        elapsed: Duration,
    },
}

impl ExecOutcome {
    /// Map anything other than a clean exit to the matching failure.
    pub fn into_result(self, timeout: Duration) -> Result<Duration, SweepError> {
        match self {
            Self::TimedOut { .. } => Err(SweepError::BenchmarkTimedOut(timeout)),
            Self::Completed {
                exit_code: Some(0),
                elapsed,
                ..
            } => Ok(elapsed),
            Self::Completed {
                exit_code, output, ..
            } => Err(SweepError::BenchmarkProcessFailed {
                exit_code,
                detail: last_line(&output),
            }),
        }
    }
}

fn last_line(output: &str) -> String {
    output
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("no output")
        .trim()
        .to_string()
}

#[derive(Debug, Clone)]
pub struct BenchmarkExecutor {
    tail_lines: usize,
}

impl Default for BenchmarkExecutor {
    fn default() -> Self {
        Self {
            tail_lines: DEFAULT_TAIL_LINES,
        }
    }
}

impl BenchmarkExecutor {
    /// Run `command` in the foreground, streaming its output to `log_path`
    /// and the console, for at most `limit`.
    ///
    /// Errors only when the client cannot be launched at all.
    pub async fn run(
        &self,
        command: &ShellCommand,
        log_path: &Path,
        label: &str,
        limit: Duration,
        console: &mut Console,
    ) -> Result<ExecOutcome, SweepError> {
        let launch_failed = |detail: String| SweepError::BenchmarkProcessFailed {
            exit_code: None,
            detail,
        };

        let started = Instant::now();
        let deadline = started + limit;
        let mut child = command
            .to_command()
            .spawn()
            .map_err(|e| launch_failed(format!("spawn bash: {e}")))?;
        let pid = child.id().unwrap_or_default();
        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            process::signal_group(pid, Signal::Kill);
            return Err(launch_failed("output was not captured".into()));
        };
        let mut pump = match spawn_pump(
            stdout,
            stderr,
            log_path,
            label,
            console.sender(),
            self.tail_lines,
        )
        .await
        {
            Ok(pump) => pump,
            Err(e) => {
                process::signal_group(pid, Signal::Kill);
                return Err(launch_failed(format!("open log {}: {e}", log_path.display())));
            }
        };
        let guard = process::GroupGuard::new(pid);
        info!(pid, timeout_secs = limit.as_secs(), "Benchmark started");

        let status = loop {
            tokio::select! {
                status = child.wait() => break Some(status),
                () = sleep_until(deadline) => break None,
                line = console.recv() => if let Some(line) = line {
                    console.emit(&line);
                },
            }
        };

        let elapsed = started.elapsed();
        let exit_code = match status {
            None => {
                warn!(pid, elapsed_secs = elapsed.as_secs(), "Benchmark timed out; killing");
                process::signal_group(pid, Signal::Kill);
                let _ = child.start_kill();
                if timeout(REAP_TIMEOUT, child.wait()).await.is_err() {
                    warn!(pid, "Benchmark not reaped after KILL");
                }
                None
            }
            Some(Ok(status)) => Some(status.code()),
            Some(Err(e)) => {
                warn!(pid, error = %e, "Failed to wait for benchmark");
                process::signal_group(pid, Signal::Kill);
                Some(None)
            }
        };

        // Stragglers holding the pipes open would keep the pump alive.
        if process::is_group_alive(pid) {
            process::signal_group(pid, Signal::Kill);
        }
        let tail = match timeout(REAP_TIMEOUT, &mut pump).await {
            Ok(Ok(summary)) => summary.tail,
            Ok(Err(e)) => {
                warn!(pid, error = %e, "Benchmark output task failed");
                Vec::new()
            }
            Err(_) => {
                pump.abort();
                Vec::new()
            }
        };
        console.drain();
        guard.disarm();

        Ok(match exit_code {
            None => ExecOutcome::TimedOut { elapsed },
            Some(exit_code) => {
                debug!(pid, ?exit_code, elapsed_ms = elapsed.as_millis() as u64, "Benchmark exited");
                ExecOutcome::Completed {
                    exit_code,
                    output: tail.join("\n"),
                    elapsed,
                }
            }
        })
    }
}
