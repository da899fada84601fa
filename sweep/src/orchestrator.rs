//! The per-configuration state machine and the sequential sweep loop.
//!
//! ```text
//! Idle → Starting → AwaitingHealth → {Ready | StartupFailed}
//!      → Benchmarking → {BenchmarkFailed | BenchmarkTimedOut}
//!      → Validating → {Succeeded | ValidationFailed}
//!      → TearingDown → Idle
//! ```
//!
//! Every path ends in `TearingDown`. The orchestrator owns at most one
//! [`ServerHandle`] at a time and stops it before the next configuration
//! starts, so servers never overlap on the shared port.

use crate::commands::CommandBuilder;
use crate::executor::BenchmarkExecutor;
use crate::health::{HealthConfig, HealthGate, ReadinessProbe};
use crate::layout::RunLayout;
use crate::process::{self, Signal};
use crate::stream::Console;
use crate::supervisor::{ProcessSupervisor, ServerHandle};
use crate::validator::ResultValidator;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use sweep_common::{
    Configuration, ConfigurationSpace, MetricsArtifact, Outcome, SweepConfig, SweepError, console,
};
use sweep_report::ReportAggregator;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// How long a stray server gets to exit after TERM before being killed.
const STRAY_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Starting,
    AwaitingHealth,
    Ready,
    StartupFailed,
    Benchmarking,
    BenchmarkFailed,
    BenchmarkTimedOut,
    Validating,
    Succeeded,
    ValidationFailed,
    TearingDown,
}

impl RunState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::AwaitingHealth => "awaiting_health",
            Self::Ready => "ready",
            Self::StartupFailed => "startup_failed",
            Self::Benchmarking => "benchmarking",
            Self::BenchmarkFailed => "benchmark_failed",
            Self::BenchmarkTimedOut => "benchmark_timed_out",
            Self::Validating => "validating",
            Self::Succeeded => "succeeded",
            Self::ValidationFailed => "validation_failed",
            Self::TearingDown => "tearing_down",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timing and behaviour knobs, normally derived from a [`SweepConfig`].
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub health: HealthConfig,
    pub stop_grace: Duration,
    pub benchmark_timeout: Duration,
    pub cooldown: Duration,
    /// Fixed artifact location; per-configuration scratch file when unset.
    pub artifact_path: Option<PathBuf>,
    /// Print streamed subprocess output to stdout.
    pub echo_output: bool,
}

impl OrchestratorSettings {
    pub fn from_config(config: &SweepConfig) -> Self {
        Self {
            health: HealthConfig::from(&config.timeouts),
            stop_grace: config.timeouts.stop_grace(),
            benchmark_timeout: config.timeouts.benchmark(),
            cooldown: config.timeouts.cooldown(),
            artifact_path: config.benchmark.artifact_path.clone(),
            echo_output: true,
        }
    }
}

pub struct ExperimentOrchestrator<B, P> {
    builder: B,
    probe: P,
    layout: RunLayout,
    supervisor: ProcessSupervisor,
    gate: HealthGate,
    executor: BenchmarkExecutor,
    validator: ResultValidator,
    benchmark_timeout: Duration,
    cooldown: Duration,
    artifact_path: Option<PathBuf>,
    console: Console,
    active: Option<ServerHandle>,
    state: RunState,
}

impl<B, P> ExperimentOrchestrator<B, P>
where
    B: CommandBuilder,
    P: ReadinessProbe,
{
    pub fn new(builder: B, probe: P, layout: RunLayout, settings: OrchestratorSettings) -> Self {
        Self {
            builder,
            probe,
            layout,
            supervisor: ProcessSupervisor::new(settings.stop_grace),
            gate: HealthGate::new(settings.health),
            executor: BenchmarkExecutor::default(),
            validator: ResultValidator,
            benchmark_timeout: settings.benchmark_timeout,
            cooldown: settings.cooldown,
            artifact_path: settings.artifact_path,
            console: Console::new(settings.echo_output),
            active: None,
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn layout(&self) -> &RunLayout {
        &self.layout
    }

    /// Whether a server handle is currently held.
    pub fn has_active_server(&self) -> bool {
        self.active.is_some()
    }

    /// Run every configuration the space yields, one at a time, with the
    /// cooldown between consecutive runs. Failures are recorded, never
    /// raised.
    pub async fn run_sweep(&mut self, mut space: ConfigurationSpace) -> ReportAggregator {
        let sweep_started = Instant::now();
        let mut aggregator = ReportAggregator::new();
        let mut index = 0usize;

        while let Some(configuration) = space.next() {
            if index > 0 && !self.cooldown.is_zero() {
                console::log(&format!(
                    "Cooling down for {}s before next experiment...",
                    self.cooldown.as_secs()
                ));
                self.console.idle_until(Instant::now() + self.cooldown).await;
            }
            index += 1;
            console::log(&format!("Experiment {index}"));

            let outcome = self.run_configuration(&configuration).await;
            aggregator.record(outcome);
        }

        let mut aggregator = aggregator.with_skipped(space.skipped().to_vec());
        aggregator.set_wall_clock(sweep_started.elapsed());
        info!(
            runs = aggregator.outcomes().len(),
            skipped = aggregator.skipped().len(),
            "Sweep loop finished"
        );
        aggregator
    }

    /// Drive one configuration to its terminal state and tear down. Always
    /// returns an outcome; the server is stopped before this returns.
    pub async fn run_configuration(&mut self, configuration: &Configuration) -> Outcome {
        let name = configuration.name();
        console::banner(&format!("Starting experiment: {name}"));
        console::log(&format!("Model: {}", configuration.model()));
        console::log(&format!("Tensor Parallelism: {}", configuration.parallelism()));
        console::log(&format!("Quantization: {}", configuration.quantization_label()));
        console::log(&format!("Enforce Eager: {}", configuration.eager()));

        let started = Instant::now();
        self.transition(RunState::Starting, &name);
        let result = self.drive(configuration, &name).await;
        let duration = started.elapsed();

        self.teardown(&name).await;

        match result {
            Ok((metrics, artifact_path)) => {
                console::success(&format!(
                    "Experiment completed successfully in {:.1}s",
                    duration.as_secs_f64()
                ));
                Outcome::succeeded(configuration.clone(), duration, metrics, artifact_path)
            }
            Err(error) => {
                console::error(&format!("{}: {error}", error.category()));
                console::log(&format!("  hint: {}", error.category().remediation()));
                warn!(
                    config = %name,
                    category = %error.category(),
                    code = error.category().code(),
                    error = %error,
                    "Experiment failed"
                );
                Outcome::failed(configuration.clone(), duration, &error)
            }
        }
    }

    async fn drive(
        &mut self,
        configuration: &Configuration,
        name: &str,
    ) -> Result<(MetricsArtifact, PathBuf), SweepError> {
        self.reap_strays().await;

        let server_log = self.layout.server_log(configuration);
        let command = self.builder.server_command(configuration);
        console::log("Starting server...");
        console::log(&format!("Server logs will be saved to: {}", server_log.display()));
        debug!(config = %name, command = command.command_line(), "Server command");

        let handle = match self
            .supervisor
            .start(&command, &server_log, "server", self.console.sender())
            .await
        {
            Ok(handle) => handle,
            Err(e) => {
                self.transition(RunState::StartupFailed, name);
                return Err(e);
            }
        };
        self.transition(RunState::AwaitingHealth, name);
        let handle = self.active.insert(handle);
        let status = self
            .gate
            .wait(handle, &self.probe, &mut self.console)
            .await;
        match status.into_result(self.gate.config().overall_timeout) {
            Ok(elapsed) => {
                self.transition(RunState::Ready, name);
                console::success(&format!("Server is ready after {}s", elapsed.as_secs()));
            }
            Err(e) => {
                self.transition(RunState::StartupFailed, name);
                return Err(e);
            }
        }

        self.transition(RunState::Benchmarking, name);
        let artifact = self
            .artifact_path
            .clone()
            .unwrap_or_else(|| self.layout.scratch_artifact(configuration));
        remove_stale(&artifact);
        let benchmark_log = self.layout.benchmark_log(configuration);
        let command = self.builder.benchmark_command(configuration, &artifact);
        console::log("Running benchmark...");
        console::log(&format!("Benchmark logs will be saved to: {}", benchmark_log.display()));
        debug!(config = %name, command = command.command_line(), "Benchmark command");

        let finished = self
            .executor
            .run(
                &command,
                &benchmark_log,
                "benchmark",
                self.benchmark_timeout,
                &mut self.console,
            )
            .await
            .and_then(|outcome| outcome.into_result(self.benchmark_timeout));
        if let Err(e) = finished {
            let state = match e {
                SweepError::BenchmarkTimedOut(_) => RunState::BenchmarkTimedOut,
                _ => RunState::BenchmarkFailed,
            };
            self.transition(state, name);
            return Err(e);
        }

        self.transition(RunState::Validating, name);
        match self.validator.validate(&artifact) {
            Ok(raw) => {
                let dest = self.layout.results_file(configuration);
                let stored = match raw.persist(&dest) {
                    Ok(()) => {
                        console::success(&format!("Results saved to: {}", dest.display()));
                        dest
                    }
                    Err(e) => {
                        warn!(config = %name, path = %dest.display(), error = %e, "Failed to save results copy");
                        raw.path.clone()
                    }
                };
                self.transition(RunState::Succeeded, name);
                Ok((raw.metrics, stored))
            }
            Err(rejection) => {
                if let Some(raw) = rejection.artifact {
                    let dest = self.layout.rejected_file(configuration);
                    match raw.persist(&dest) {
                        Ok(()) => console::warning(&format!(
                            "Rejected results kept at: {}",
                            dest.display()
                        )),
                        Err(e) => warn!(config = %name, error = %e, "Failed to keep rejected artifact"),
                    }
                }
                self.transition(RunState::ValidationFailed, name);
                Err(rejection.error)
            }
        }
    }

    async fn teardown(&mut self, name: &str) {
        self.transition(RunState::TearingDown, name);
        if let Some(mut handle) = self.active.take() {
            console::log("Stopping server...");
            handle.stop().await;
        }
        self.console.drain();
        self.transition(RunState::Idle, name);
    }

    /// Stop the active server, if any. Used when the sweep is interrupted
    /// between state transitions.
    pub async fn shutdown(&mut self) {
        if self.active.is_some() {
            self.teardown("interrupted").await;
        }
    }

    /// Kill servers left behind by an earlier crashed run. Best effort.
    async fn reap_strays(&mut self) {
        let Some(pattern) = self.builder.stray_pattern() else {
            return;
        };
        let strays = process::find_by_pattern(pattern);
        if strays.is_empty() {
            return;
        }
        console::warning(&format!(
            "Found stray server processes {strays:?}; stopping them"
        ));
        process::kill_by_pattern(pattern, Signal::Term);
        self.console.idle_until(Instant::now() + STRAY_GRACE).await;
        if !process::find_by_pattern(pattern).is_empty() {
            process::kill_by_pattern(pattern, Signal::Kill);
        }
    }

    fn transition(&mut self, next: RunState, name: &str) {
        debug!(config = %name, from = %self.state, to = %next, "State transition");
        self.state = next;
    }
}

fn remove_stale(artifact: &Path) {
    match std::fs::remove_file(artifact) {
        Ok(()) => debug!(path = %artifact.display(), "Removed stale artifact"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %artifact.display(), error = %e, "Failed to remove stale artifact"),
    }
}
