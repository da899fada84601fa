//! Ownership of the single live server process.
//!
//! [`ProcessSupervisor::start`] launches the server in its own process group
//! and hands back a [`ServerHandle`]. The handle is the only way to reach the
//! process; [`ServerHandle::stop`] tears the whole group down (TERM, grace,
//! KILL) and is safe to call any number of times.

use crate::commands::ShellCommand;
use crate::process::{self, Signal};
use crate::stream::{OutputLine, PumpSummary, spawn_pump};
use std::path::{Path, PathBuf};
use std::time::Duration;
use sweep_common::SweepError;
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout};
use tracing::{debug, info, warn};

/// Default wait between TERM and KILL.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(10);

/// How long to wait for the output pump to drain after the group is gone.
const PUMP_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to wait for the reaper after a KILL.
const KILL_WAIT: Duration = Duration::from_secs(5);

/// Anything whose liveness can be polled. Implemented by [`ServerHandle`];
/// tests substitute scripted fakes.
pub trait Liveness {
    fn is_alive(&mut self) -> bool;
}

#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    stop_grace: Duration,
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new(DEFAULT_STOP_GRACE)
    }
}

impl ProcessSupervisor {
    pub fn new(stop_grace: Duration) -> Self {
        Self { stop_grace }
    }

    /// Launch `command` detached in a new process group. Its stdout and
    /// stderr are pumped line by line into `log_path` and `console`.
    pub async fn start(
        &self,
        command: &ShellCommand,
        log_path: &Path,
        label: &str,
        console: mpsc::UnboundedSender<OutputLine>,
    ) -> Result<ServerHandle, SweepError> {
        let mut child = command
            .to_command()
            .spawn()
            .map_err(|e| SweepError::ServerStartFailed(format!("spawn bash: {e}")))?;

        let pid = child.id().ok_or_else(|| {
            SweepError::ServerStartFailed("process exited before its pid was read".into())
        })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SweepError::ServerStartFailed("stdout was not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SweepError::ServerStartFailed("stderr was not captured".into()))?;

        let pump = match spawn_pump(stdout, stderr, log_path, label, console, 0).await {
            Ok(pump) => pump,
            Err(e) => {
                process::signal_group(pid, Signal::Kill);
                let _ = child.start_kill();
                return Err(SweepError::ServerStartFailed(format!(
                    "open log {}: {e}",
                    log_path.display()
                )));
            }
        };

        info!(pid, label, log = %log_path.display(), "Server process started");
        Ok(ServerHandle {
            child,
            pid,
            label: label.to_string(),
            log_path: log_path.to_path_buf(),
            started_at: Instant::now(),
            stop_grace: self.stop_grace,
            pump: Some(pump),
            released: false,
        })
    }
}

/// The live server process. At most one exists per orchestrator.
#[derive(Debug)]
pub struct ServerHandle {
    child: Child,
    pid: u32,
    label: String,
    log_path: PathBuf,
    started_at: Instant,
    stop_grace: Duration,
    pump: Option<JoinHandle<PumpSummary>>,
    released: bool,
}

impl ServerHandle {
    /// Process id, which is also the process group id.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Terminate the process group: TERM, wait up to the grace period, then
    /// KILL. Never fails; the handle is released afterwards no matter what
    /// the signals did.
    pub async fn stop(&mut self) {
        if self.released {
            debug!(pid = self.pid, "Server already released");
            return;
        }

        let pid = self.pid;
        match self.child.try_wait() {
            Ok(Some(status)) => debug!(pid, ?status, "Server already exited"),
            _ => {
                debug!(pid, "Sending TERM to server process group");
                process::signal_group(pid, Signal::Term);
                match timeout(self.stop_grace, self.child.wait()).await {
                    Ok(Ok(status)) => debug!(pid, ?status, "Server exited after TERM"),
                    Ok(Err(e)) => warn!(pid, error = %e, "Failed to wait for server"),
                    Err(_) => {
                        warn!(
                            pid,
                            grace_secs = self.stop_grace.as_secs(),
                            "Server ignored TERM; sending KILL"
                        );
                        process::signal_group(pid, Signal::Kill);
                        let _ = self.child.start_kill();
                        if timeout(KILL_WAIT, self.child.wait()).await.is_err() {
                            warn!(pid, "Server still not reaped after KILL");
                        }
                    }
                }
            }
        }

        // Children the server forked share its group and may outlive it.
        if process::is_group_alive(pid) {
            process::signal_group(pid, Signal::Kill);
        }

        if let Some(mut pump) = self.pump.take() {
            match timeout(PUMP_DRAIN_TIMEOUT, &mut pump).await {
                Ok(Ok(summary)) => debug!(pid, lines = summary.lines, "Server output drained"),
                Ok(Err(e)) => warn!(pid, error = %e, "Server output task failed"),
                Err(_) => {
                    warn!(pid, "Server output did not close; abandoning pump");
                    pump.abort();
                }
            }
        }

        self.released = true;
        info!(
            pid,
            label = %self.label,
            log = %self.log_path.display(),
            uptime_secs = self.started_at.elapsed().as_secs(),
            "Server stopped"
        );
    }
}

impl Liveness for ServerHandle {
    /// Reaps the child first so an exited server is never mistaken for a
    /// running one, then falls back to the process table.
    fn is_alive(&mut self) -> bool {
        if self.released {
            return false;
        }
        match self.child.try_wait() {
            Ok(Some(_)) => false,
            Ok(None) => process::is_process_alive(self.pid),
            Err(e) => {
                debug!(pid = self.pid, error = %e, "try_wait failed; using process table");
                process::is_process_alive(self.pid)
            }
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if !self.released {
            warn!(pid = self.pid, "Server handle dropped without stop; killing group");
            process::signal_group(self.pid, Signal::Kill);
            if let Some(pump) = self.pump.take() {
                pump.abort();
            }
        }
    }
}
