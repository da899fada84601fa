//! Orchestration core for serving-configuration sweeps.
//!
//! One configuration at a time, the [`ExperimentOrchestrator`] launches the
//! inference server through the [`ProcessSupervisor`], waits on the
//! [`HealthGate`], runs the load generator with the [`BenchmarkExecutor`],
//! checks the artifact with the [`ResultValidator`] and always tears the
//! server down before moving on.

pub mod commands;
pub mod executor;
pub mod health;
pub mod layout;
pub mod orchestrator;
pub mod preflight;
pub mod process;
pub mod stream;
pub mod supervisor;
pub mod validator;

pub use commands::{CommandBuilder, ServingCommandBuilder, ShellCommand};
pub use executor::{BenchmarkExecutor, ExecOutcome};
pub use health::{FnProbe, HealthConfig, HealthGate, HealthStatus, HttpProbe, ReadinessProbe};
pub use layout::RunLayout;
pub use orchestrator::{ExperimentOrchestrator, OrchestratorSettings, RunState};
pub use preflight::{CheckItem, PreflightReport, Severity, run_preflight};
pub use stream::{Console, OutputLine};
pub use supervisor::{Liveness, ProcessSupervisor, ServerHandle};
pub use validator::{RawArtifact, Rejection, ResultValidator};
