//! OS-level process helpers: signals, liveness, pattern lookup.
//!
//! Signals go through the `kill` utility so no unsafe FFI is needed. Every
//! helper is best effort and never fails the caller.

use std::path::Path;
use std::process::{Command, Stdio};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Term,
    Kill,
}

impl Signal {
    fn flag(self) -> &'static str {
        match self {
            Self::Term => "-TERM",
            Self::Kill => "-KILL",
        }
    }
}

/// Signal every process in a process group.
pub fn signal_group(pgid: u32, signal: Signal) -> bool {
    if pgid == 0 {
        return false;
    }
    run_kill(&[signal.flag(), "--", &format!("-{pgid}")])
}

/// Whether any process in the group is still running. On Linux, exited but
/// unreaped members (zombies) do not count.
pub fn is_group_alive(pgid: u32) -> bool {
    if pgid == 0 {
        return false;
    }

    if cfg!(target_os = "linux")
        && let Ok(entries) = std::fs::read_dir("/proc")
    {
        return entries
            .filter_map(Result::ok)
            .filter_map(|entry| entry.file_name().to_str()?.parse::<u32>().ok())
            .filter_map(proc_stat)
            .any(|(state, pgrp)| pgrp == pgid && is_running(state));
    }

    run_kill(&["-0", "--", &format!("-{pgid}")])
}

/// Whether a process exists and has not exited. On Linux, zombies count as
/// gone; elsewhere they count as alive until reaped.
pub fn is_process_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }

    if cfg!(target_os = "linux") && Path::new("/proc/self/stat").exists() {
        return proc_stat(pid).is_some_and(|(state, _)| is_running(state));
    }

    run_kill(&["-0", &pid.to_string()])
}

/// State letter and process group id from `/proc/<pid>/stat`.
fn proc_stat(pid: u32) -> Option<(char, u32)> {
    let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    // The command name may contain spaces or parentheses.
    let rest = &stat[stat.rfind(')')? + 1..];
    let mut fields = rest.split_whitespace();
    let state = fields.next()?.chars().next()?;
    let pgrp = fields.nth(1)?.parse().ok()?;
    Some((state, pgrp))
}

fn is_running(state: char) -> bool {
    !matches!(state, 'Z' | 'X' | 'x')
}

/// PIDs whose full command line matches `pattern` (`pgrep -f`).
pub fn find_by_pattern(pattern: &str) -> Vec<u32> {
    match Command::new("pgrep").arg("-f").arg(pattern).output() {
        Ok(output) => String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(|line| line.trim().parse().ok())
            .filter(|pid| *pid != std::process::id())
            .collect(),
        Err(e) => {
            debug!(pattern, error = %e, "pgrep unavailable");
            Vec::new()
        }
    }
}

/// Kill every process matching `pattern` (`pkill -f`). Returns whether
/// anything matched.
pub fn kill_by_pattern(pattern: &str, signal: Signal) -> bool {
    Command::new("pkill")
        .arg(signal.flag())
        .arg("-f")
        .arg(pattern)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Kills a process group when dropped unless disarmed. Covers the paths where
/// a future owning a child is cancelled mid-await.
#[derive(Debug)]
pub struct GroupGuard {
    pgid: u32,
    armed: bool,
}

impl GroupGuard {
    pub fn new(pgid: u32) -> Self {
        Self { pgid, armed: true }
    }

    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        if self.armed && is_group_alive(self.pgid) {
            debug!(pgid = self.pgid, "Guard killing process group");
            signal_group(self.pgid, Signal::Kill);
        }
    }
}

fn run_kill(args: &[&str]) -> bool {
    match Command::new("kill")
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
    {
        Ok(status) => status.success(),
        Err(e) => {
            debug!(?args, error = %e, "Failed to run kill");
            false
        }
    }
}
