//! Server and benchmark command construction.
//!
//! The orchestrator treats commands as opaque [`ShellCommand`]s; everything
//! that knows about server flags lives behind [`CommandBuilder`].

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use sweep_common::Configuration;
use sweep_common::config::{BenchmarkSection, EnvironmentSection, ServerSection, SweepConfig};
use tokio::process::Command;

/// A script run through `bash [--login] -c`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    pub script: String,
    pub login: bool,
}

impl ShellCommand {
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            login: false,
        }
    }

    pub fn with_login(mut self, login: bool) -> Self {
        self.login = login;
        self
    }

    /// The final line of the script, i.e. the command itself without the
    /// environment prelude.
    pub fn command_line(&self) -> &str {
        self.script.lines().last().unwrap_or_default()
    }

    /// A process in its own group with piped output and no stdin, killed if
    /// the handle is dropped.
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new("bash");
        if self.login {
            cmd.arg("--login");
        }
        cmd.arg("-c")
            .arg(&self.script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }
}

/// Produces the commands for one configuration.
pub trait CommandBuilder {
    fn server_command(&self, configuration: &Configuration) -> ShellCommand;

    /// Benchmark invocation writing its result to `artifact`.
    fn benchmark_command(&self, configuration: &Configuration, artifact: &Path) -> ShellCommand;

    /// `pgrep -f` pattern matching a server left over from an earlier run.
    fn stray_pattern(&self) -> Option<&str> {
        None
    }
}

/// Builds OpenAI-compatible serving commands (`<binary> serve` /
/// `<binary> bench serve`) from a [`SweepConfig`].
#[derive(Debug, Clone)]
pub struct ServingCommandBuilder {
    server: ServerSection,
    benchmark: BenchmarkSection,
    environment: EnvironmentSection,
}

impl ServingCommandBuilder {
    pub fn new(config: &SweepConfig) -> Self {
        Self {
            server: config.server.clone(),
            benchmark: config.benchmark.clone(),
            environment: config.environment.clone(),
        }
    }

    pub fn server_args(&self, configuration: &Configuration) -> Vec<String> {
        let s = &self.server;
        let mut args = vec![
            "serve".to_string(),
            escape(configuration.model()),
            format!("--dtype={}", s.dtype),
            format!("--port {}", s.port),
            format!("--block-size {}", s.block_size),
            format!("--gpu-memory-util {}", s.gpu_memory_utilization),
            "--no-enable-prefix-caching".to_string(),
        ];
        if s.trust_remote_code {
            args.push("--trust-remote-code".to_string());
        }
        args.extend([
            "--disable-sliding-window".to_string(),
            "--disable-log-requests".to_string(),
            format!("--max-num-batched-tokens={}", s.max_num_batched_tokens),
            format!("--max-model-len {}", s.max_model_len),
            format!("-tp={}", configuration.parallelism()),
        ]);
        if configuration.eager() {
            args.push("--enforce-eager".to_string());
        }
        if let Some(quant) = configuration.quantization() {
            args.push(format!("--quantization {}", escape(quant)));
        }
        args.extend(s.extra_args.iter().map(|a| escape(a)));
        args
    }

    pub fn benchmark_args(&self, configuration: &Configuration, artifact: &Path) -> Vec<String> {
        let b = &self.benchmark;
        let mut args = vec![
            "bench serve".to_string(),
            format!("--host {}", escape(&self.server.host)),
            format!("--port {}", self.server.port),
            format!("--model {}", escape(configuration.model())),
        ];
        if self.server.trust_remote_code {
            args.push("--trust-remote-code".to_string());
        }
        args.extend([
            "--dataset-name random".to_string(),
            format!("--random-input-len {}", b.input_len),
            format!("--random-output-len {}", b.output_len),
            "--ignore-eos".to_string(),
            format!("--max-concurrency {}", b.concurrency),
            format!("--num-prompts {}", b.num_prompts),
            format!("--num-warmup {}", b.num_warmup),
            "--save-result".to_string(),
            format!("--result-filename {}", escape(&artifact.to_string_lossy())),
        ]);
        args.extend(b.extra_args.iter().map(|a| escape(a)));
        args
    }

    fn wrap(&self, args: Vec<String>) -> ShellCommand {
        let env_prefix = env_prefix(&self.environment.vars);
        let mut line = escape(&self.server.binary);
        for arg in args {
            line.push(' ');
            line.push_str(&arg);
        }
        if !env_prefix.is_empty() {
            line = format!("{env_prefix} {line}");
        }

        let mut script = self.prelude();
        script.push(line);
        ShellCommand::new(script.join("\n")).with_login(self.environment.login_shell)
    }

    fn prelude(&self) -> Vec<String> {
        let env = &self.environment;
        let mut lines = Vec::new();
        if let Some(setup) = &env.setup_script {
            lines.push(format!("source {}", escape(&setup.to_string_lossy())));
        }
        if !env.no_proxy.is_empty() {
            let value = escape(&env.no_proxy);
            lines.push(format!("export no_proxy={value}"));
            lines.push(format!("export NO_PROXY={value}"));
        }
        if env.clear_proxy {
            for var in ["HTTP_PROXY", "HTTPS_PROXY", "http_proxy", "https_proxy"] {
                lines.push(format!("export {var}="));
            }
        }
        lines
    }
}

impl CommandBuilder for ServingCommandBuilder {
    fn server_command(&self, configuration: &Configuration) -> ShellCommand {
        self.wrap(self.server_args(configuration))
    }

    fn benchmark_command(&self, configuration: &Configuration, artifact: &Path) -> ShellCommand {
        self.wrap(self.benchmark_args(configuration, artifact))
    }

    fn stray_pattern(&self) -> Option<&str> {
        Some(self.server.process_pattern.as_str()).filter(|p| !p.is_empty())
    }
}

fn escape(value: &str) -> String {
    shell_escape::escape(Cow::Borrowed(value)).into_owned()
}

fn env_prefix(vars: &BTreeMap<String, String>) -> String {
    vars.iter()
        .map(|(k, v)| format!("{k}={}", escape(v)))
        .collect::<Vec<_>>()
        .join(" ")
}
