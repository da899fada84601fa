//! Line-by-line output pumping.
//!
//! A pump task owns a child's stdout and stderr plus its log file. Each line
//! is written to the log and forwarded to the [`Console`] over a one-way
//! channel; the control loop prints forwarded lines only at points where it
//! would otherwise be idle. Nothing beyond the current line (and an optional
//! bounded tail) is kept in memory.

use std::collections::VecDeque;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::warn;

/// One line of subprocess output tagged with where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub source: String,
    pub text: String,
}

/// Receiving end of the output channel, owned by the control loop.
#[derive(Debug)]
pub struct Console {
    tx: mpsc::UnboundedSender<OutputLine>,
    rx: mpsc::UnboundedReceiver<OutputLine>,
    echo: bool,
}

impl Console {
    /// `echo = false` drops forwarded lines after draining (quiet runs,
    /// tests).
    pub fn new(echo: bool) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx, echo }
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<OutputLine> {
        self.tx.clone()
    }

    /// Print everything pending without waiting.
    pub fn drain(&mut self) {
        while let Ok(line) = self.rx.try_recv() {
            self.emit(&line);
        }
    }

    /// Wait for the next line. Never resolves to `None` while the console
    /// holds its own sender.
    pub async fn recv(&mut self) -> Option<OutputLine> {
        self.rx.recv().await
    }

    /// Print forwarded lines as they arrive until `deadline`. Used where the
    /// control loop would otherwise just sleep.
    pub async fn idle_until(&mut self, deadline: Instant) {
        loop {
            tokio::select! {
                () = sleep_until(deadline) => break,
                line = self.rx.recv() => match line {
                    Some(line) => self.emit(&line),
                    None => {
                        sleep_until(deadline).await;
                        break;
                    }
                },
            }
        }
        self.drain();
    }

    pub fn emit(&self, line: &OutputLine) {
        if self.echo {
            sweep_common::console::stream_line(&line.source, &line.text);
        }
    }
}

/// What a finished pump hands back.
#[derive(Debug, Default)]
pub struct PumpSummary {
    pub lines: u64,
    /// Last lines seen, when a tail was requested.
    pub tail: Vec<String>,
}

/// Spawn a task copying `stdout` and `stderr` into `log_path` and the
/// console channel until both streams close.
pub async fn spawn_pump<O, E>(
    stdout: O,
    stderr: E,
    log_path: &Path,
    source: impl Into<String>,
    console: mpsc::UnboundedSender<OutputLine>,
    tail_capacity: usize,
) -> std::io::Result<JoinHandle<PumpSummary>>
where
    O: AsyncRead + Unpin + Send + 'static,
    E: AsyncRead + Unpin + Send + 'static,
{
    let file = File::create(log_path).await?;
    let source = source.into();

    Ok(tokio::spawn(async move {
        let mut log = BufWriter::new(file);
        let mut out = BufReader::new(stdout).lines();
        let mut err = BufReader::new(stderr).lines();
        let mut out_open = true;
        let mut err_open = true;
        let mut tail: VecDeque<String> = VecDeque::with_capacity(tail_capacity);
        let mut lines = 0u64;
        let mut log_ok = true;

        while out_open || err_open {
            let next = tokio::select! {
                line = out.next_line(), if out_open => match line {
                    Ok(Some(line)) => Some(line),
                    _ => { out_open = false; None }
                },
                line = err.next_line(), if err_open => match line {
                    Ok(Some(line)) => Some(line),
                    _ => { err_open = false; None }
                },
            };
            let Some(text) = next else { continue };
            lines += 1;

            if log_ok {
                let written = async {
                    log.write_all(text.as_bytes()).await?;
                    log.write_all(b"\n").await?;
                    log.flush().await
                }
                .await;
                if let Err(e) = written {
                    warn!(source = %source, error = %e, "Log write failed; continuing console-only");
                    log_ok = false;
                }
            }

            if tail_capacity > 0 {
                if tail.len() == tail_capacity {
                    tail.pop_front();
                }
                tail.push_back(text.clone());
            }

            // receiver gone means nobody is watching; keep logging
            let _ = console.send(OutputLine {
                source: source.clone(),
                text,
            });
        }

        if log_ok && let Err(e) = log.flush().await {
            warn!(source = %source, error = %e, "Final log flush failed");
        }

        PumpSummary {
            lines,
            tail: tail.into_iter().collect(),
        }
    }))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Stdio;
    use tokio::process::Command;

    #[tokio::test]
    async fn test_pump_writes_log_and_forwards_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("out.log");
        let mut console = Console::new(false);

        let mut child = Command::new("sh")
            .arg("-c")
            .arg("echo one; echo two 1>&2; echo three")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();
        let stdout = child.stdout.take().unwrap();
        let stderr = child.stderr.take().unwrap();

        let pump = spawn_pump(stdout, stderr, &log_path, "test", console.sender(), 2)
            .await
            .unwrap();
        child.wait().await.unwrap();
        let summary = pump.await.unwrap();

        assert_eq!(summary.lines, 3);
        assert_eq!(summary.tail.len(), 2);

        let log = std::fs::read_to_string(&log_path).unwrap();
        for word in ["one", "two", "three"] {
            assert!(log.contains(word));
        }

        let mut forwarded = Vec::new();
        while let Ok(line) = console.rx.try_recv() {
            assert_eq!(line.source, "test");
            forwarded.push(line.text);
        }
        assert_eq!(forwarded.len(), 3);
    }

    #[tokio::test]
    async fn test_pump_without_tail_keeps_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("quiet.log");
        let console = Console::new(false);

        let mut child = Command::new("sh")
            .arg("-c")
            .arg("for i in 1 2 3 4 5; do echo line$i; done")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();
        let pump = spawn_pump(
            child.stdout.take().unwrap(),
            child.stderr.take().unwrap(),
            &log_path,
            "q",
            console.sender(),
            0,
        )
        .await
        .unwrap();
        child.wait().await.unwrap();
        let summary = pump.await.unwrap();
        assert_eq!(summary.lines, 5);
        assert!(summary.tail.is_empty());
    }
}
