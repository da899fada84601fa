use std::path::{Path, PathBuf};
use std::time::Duration;
use sweep::{
    CommandBuilder, ExperimentOrchestrator, FnProbe, HealthConfig, OrchestratorSettings,
    RunLayout, ShellCommand,
};
use sweep_common::Configuration;
use tempfile::TempDir;

/// How a fake server behaves after launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerScript {
    /// Marks itself ready and stays up.
    Healthy,
    /// Stays up but never marks itself ready.
    NeverReady,
    /// Exits immediately.
    Crashes,
}

/// How a fake benchmark client behaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BenchmarkScript {
    /// Writes this JSON to the artifact path and exits 0.
    Artifact(String),
    /// Exits 0 without writing anything.
    NoArtifact,
    /// Exits with this code.
    Exit(i32),
    /// Sleeps far past any test timeout.
    Hang,
}

type Choose<T> = Box<dyn Fn(&Configuration) -> T + Send + Sync>;
pub type TestProbe = FnProbe<Box<dyn Fn() -> bool + Send + Sync>>;

/// Shell-script stand-ins for the server and benchmark client.
///
/// Every server appends its pid to `pids` and, before doing so, records any
/// earlier server that is still alive in `overlap`.
pub struct FixtureCommands {
    work: PathBuf,
    server: Choose<ServerScript>,
    benchmark: Choose<BenchmarkScript>,
}

impl FixtureCommands {
    pub fn new(work: &Path) -> Self {
        Self {
            work: work.to_path_buf(),
            server: Box::new(|_| ServerScript::Healthy),
            benchmark: Box::new(|_| BenchmarkScript::Artifact(healthy_artifact(10.0))),
        }
    }

    pub fn server(mut self, choose: impl Fn(&Configuration) -> ServerScript + Send + Sync + 'static) -> Self {
        self.server = Box::new(choose);
        self
    }

    pub fn benchmark(
        mut self,
        choose: impl Fn(&Configuration) -> BenchmarkScript + Send + Sync + 'static,
    ) -> Self {
        self.benchmark = Box::new(choose);
        self
    }

    fn file(&self, name: &str) -> String {
        self.work.join(name).display().to_string()
    }
}

impl CommandBuilder for FixtureCommands {
    fn server_command(&self, configuration: &Configuration) -> ShellCommand {
        let pids = self.file("pids");
        let overlap = self.file("overlap");
        let ready = self.file("ready");
        let guard = format!(
            "for p in $(cat '{pids}' 2>/dev/null); do if kill -0 $p 2>/dev/null; then echo $p >> '{overlap}'; fi; done; echo $$ >> '{pids}'"
        );
        let body = match (self.server)(configuration) {
            ServerScript::Healthy => format!(
                "touch '{ready}'; echo 'serving {}'; exec sleep 300",
                configuration.name()
            ),
            ServerScript::NeverReady => format!("rm -f '{ready}'; echo loading; exec sleep 300"),
            ServerScript::Crashes => {
                format!("rm -f '{ready}'; echo 'out of device memory' >&2; exit 1")
            }
        };
        ShellCommand::new(format!("{guard}; {body}"))
    }

    fn benchmark_command(&self, configuration: &Configuration, artifact: &Path) -> ShellCommand {
        let artifact = artifact.display();
        let script = match (self.benchmark)(configuration) {
            BenchmarkScript::Artifact(json) => {
                format!("echo running benchmark; cat > '{artifact}' <<'JSON'\n{json}\nJSON")
            }
            BenchmarkScript::NoArtifact => "echo finished without saving".to_string(),
            BenchmarkScript::Exit(code) => format!("echo 'request error' >&2; exit {code}"),
            BenchmarkScript::Hang => "exec sleep 30".to_string(),
        };
        ShellCommand::new(script)
    }
}

pub fn healthy_artifact(request_throughput: f64) -> String {
    format!(
        r#"{{"completed": 100, "failed": 0, "request_throughput": {request_throughput}, "output_throughput": 1200.0, "mean_ttft_ms": 85.5, "mean_tpot_ms": 12.0}}"#
    )
}

/// A temporary results directory plus a work directory for fixture state.
pub struct TestSweep {
    pub dir: TempDir,
    pub layout: RunLayout,
    pub work: PathBuf,
}

impl TestSweep {
    pub fn new() -> Self {
        crate::test_log!("FIXTURE: Creating test sweep directory");

        let dir = TempDir::new().expect("Failed to create temp dir");
        let layout = RunLayout::at(dir.path().join("run"));
        layout.create().expect("Failed to create run layout");
        let work = dir.path().join("work");
        std::fs::create_dir_all(&work).expect("Failed to create work dir");
        Self { dir, layout, work }
    }

    pub fn commands(&self) -> FixtureCommands {
        FixtureCommands::new(&self.work)
    }

    /// Ready once the current server has written its marker.
    pub fn probe(&self) -> TestProbe {
        let ready = self.work.join("ready");
        FnProbe(Box::new(move || ready.exists()))
    }

    pub fn settings() -> OrchestratorSettings {
        OrchestratorSettings {
            health: HealthConfig {
                startup_grace: Duration::from_millis(100),
                poll_interval: Duration::from_millis(100),
                overall_timeout: Duration::from_millis(1500),
                liveness_every: 2,
            },
            stop_grace: Duration::from_secs(2),
            benchmark_timeout: Duration::from_secs(10),
            cooldown: Duration::ZERO,
            artifact_path: None,
            echo_output: false,
        }
    }

    pub fn orchestrator(
        &self,
        commands: FixtureCommands,
        settings: OrchestratorSettings,
    ) -> ExperimentOrchestrator<FixtureCommands, TestProbe> {
        ExperimentOrchestrator::new(commands, self.probe(), self.layout.clone(), settings)
    }

    pub fn server_pids(&self) -> Vec<u32> {
        std::fs::read_to_string(self.work.join("pids"))
            .unwrap_or_default()
            .lines()
            .filter_map(|l| l.trim().parse().ok())
            .collect()
    }

    /// Whether any server started while an earlier one was still alive.
    pub fn servers_overlapped(&self) -> bool {
        self.work.join("overlap").exists()
    }
}
