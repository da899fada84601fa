//! Layered sweep configuration.
//!
//! Precedence, lowest to highest:
//! 1. [`Profile`] defaults
//! 2. an optional TOML file
//! 3. `SWEEP_*` environment variables ([`EnvParser`])
//! 4. CLI flags (applied by the binary)
//!
//! All durations in the file are whole seconds.

pub mod env;
pub mod profiles;

pub use env::{EnvError, EnvParser};
pub use profiles::Profile;

use crate::space::{Axes, SkipRule};
use crate::types::normalize_quantization;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to merge configuration layers: {0}")]
    Merge(String),

    #[error("invalid environment: {}", join_errors(.0))]
    Env(Vec<EnvError>),

    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

fn join_errors(errors: &[EnvError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Axes, output location and skip rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepSection {
    pub models: Vec<String>,
    pub parallelism: Vec<u32>,
    /// `"none"` means unquantized.
    pub quantization: Vec<String>,
    pub eager: Vec<bool>,
    pub results_dir: PathBuf,
    pub skip: Vec<SkipRule>,
}

impl Default for SweepSection {
    fn default() -> Self {
        Self {
            models: Vec::new(),
            parallelism: vec![2],
            quantization: vec!["none".to_string(), "fp8".to_string()],
            eager: vec![true, false],
            results_dir: PathBuf::from("./experiment_results"),
            skip: vec![SkipRule::fp8_without_eager()],
        }
    }
}

/// Fixed serving parameters for the inference server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub binary: String,
    pub host: String,
    pub port: u16,
    pub dtype: String,
    pub block_size: u32,
    pub gpu_memory_utilization: f64,
    pub max_num_batched_tokens: u32,
    pub max_model_len: u32,
    pub trust_remote_code: bool,
    pub extra_args: Vec<String>,
    pub health_path: String,
    /// `pgrep -f`/`pkill -f` pattern matching a running server.
    pub process_pattern: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            binary: "vllm".to_string(),
            host: "localhost".to_string(),
            port: 8000,
            dtype: "bfloat16".to_string(),
            block_size: 64,
            gpu_memory_utilization: 0.9,
            max_num_batched_tokens: 8192,
            max_model_len: 16384,
            trust_remote_code: true,
            extra_args: Vec::new(),
            health_path: "/health".to_string(),
            process_pattern: "vllm serve".to_string(),
        }
    }
}

impl ServerSection {
    pub fn health_url(&self) -> String {
        format!("http://{}:{}{}", self.host, self.port, self.health_path)
    }
}

/// Workload parameters for the benchmark client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkSection {
    pub input_len: u32,
    pub output_len: u32,
    pub concurrency: u32,
    pub num_prompts: u32,
    pub num_warmup: u32,
    pub extra_args: Vec<String>,
    /// Where the client writes its raw result. Unset means a per-run scratch
    /// file under the results directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<PathBuf>,
}

impl Default for BenchmarkSection {
    fn default() -> Self {
        Self {
            input_len: 1024,
            output_len: 1024,
            concurrency: 32,
            num_prompts: 160,
            num_warmup: 3,
            extra_args: Vec::new(),
            artifact_path: None,
        }
    }
}

/// Timeouts and pacing, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsSection {
    pub startup: u64,
    pub benchmark: u64,
    pub startup_grace: u64,
    pub poll_interval: u64,
    /// Liveness is re-checked every this many seconds of health polling.
    pub liveness_interval: u64,
    pub probe_timeout: u64,
    pub stop_grace: u64,
    pub cooldown: u64,
}

impl Default for TimeoutsSection {
    fn default() -> Self {
        Self {
            startup: 300,
            benchmark: 1800,
            startup_grace: 10,
            poll_interval: 5,
            liveness_interval: 30,
            probe_timeout: 10,
            stop_grace: 10,
            cooldown: 10,
        }
    }
}

impl TimeoutsSection {
    pub fn startup(&self) -> Duration {
        Duration::from_secs(self.startup)
    }

    pub fn benchmark(&self) -> Duration {
        Duration::from_secs(self.benchmark)
    }

    pub fn startup_grace(&self) -> Duration {
        Duration::from_secs(self.startup_grace)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown)
    }

    /// Number of poll intervals between liveness checks (at least one).
    pub fn liveness_every(&self) -> u32 {
        let polls = self.liveness_interval / self.poll_interval.max(1);
        u32::try_from(polls.max(1)).unwrap_or(u32::MAX)
    }
}

/// Shell environment the server and benchmark run in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentSection {
    /// Sourced before every command (e.g. a toolkit's `setvars.sh`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setup_script: Option<PathBuf>,
    pub login_shell: bool,
    pub no_proxy: String,
    /// Clear HTTP(S)_PROXY so local probes never go through a proxy.
    pub clear_proxy: bool,
    pub vars: BTreeMap<String, String>,
}

impl Default for EnvironmentSection {
    fn default() -> Self {
        Self {
            setup_script: None,
            login_shell: true,
            no_proxy: "localhost,127.0.0.1".to_string(),
            clear_proxy: true,
            vars: BTreeMap::new(),
        }
    }
}

/// The complete, merged configuration for one sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    #[serde(default)]
    pub sweep: SweepSection,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub benchmark: BenchmarkSection,
    #[serde(default)]
    pub timeouts: TimeoutsSection,
    #[serde(default)]
    pub environment: EnvironmentSection,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Profile::Full.defaults()
    }
}

impl SweepConfig {
    /// Profile defaults, then the file at `path` (or the user config file if
    /// one exists), then `SWEEP_*` variables.
    pub fn load(profile: Profile, path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => Some(path.to_path_buf()),
            None => default_config_path().filter(|p| p.is_file()),
        };

        let mut config = match file {
            Some(path) => {
                debug!(path = %path.display(), %profile, "Loading config file");
                let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                    path: path.clone(),
                    source,
                })?;
                Self::from_toml_str(profile, &text).map_err(|err| match err {
                    ConfigError::Parse { source, .. } => ConfigError::Parse { path, source },
                    other => other,
                })?
            }
            None => profile.defaults(),
        };

        let mut parser = EnvParser::new();
        config.apply_env(&mut parser);
        if parser.has_errors() {
            return Err(ConfigError::Env(parser.take_errors()));
        }
        if !parser.applied().is_empty() {
            debug!(vars = ?parser.applied(), "Applied environment overrides");
        }
        Ok(config)
    }

    /// Overlay a TOML document onto the profile defaults. Keys absent from the
    /// document keep the profile's values.
    pub fn from_toml_str(profile: Profile, text: &str) -> Result<Self, ConfigError> {
        let overlay: toml::Table = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        let toml::Value::Table(mut base) = toml::Value::try_from(profile.defaults())
            .map_err(|e| ConfigError::Merge(e.to_string()))?
        else {
            return Err(ConfigError::Merge("profile defaults are not a table".into()));
        };
        merge_tables(&mut base, overlay);

        toml::Value::Table(base)
            .try_into()
            .map_err(|source| ConfigError::Parse {
                path: PathBuf::new(),
                source,
            })
    }

    /// Apply `SWEEP_*` overrides. Errors are collected on the parser.
    pub fn apply_env(&mut self, env: &mut EnvParser) {
        if let Some(models) = env.get_string_list("MODELS") {
            self.sweep.models = models;
        }
        if let Some(tp) = env.get_u32_list("TP", 1, 1024) {
            self.sweep.parallelism = tp;
        }
        if let Some(quant) = env.get_string_list("QUANTIZATION") {
            self.sweep.quantization = quant;
        }
        if let Some(eager) = env.get_bool_list("ENFORCE_EAGER") {
            self.sweep.eager = eager;
        }
        if let Some(dir) = env.get_path("RESULTS_DIR") {
            self.sweep.results_dir = dir;
        }

        if let Some(binary) = env.get_nonempty_string("SERVER_BINARY") {
            self.server.binary = binary;
        }
        if let Some(host) = env.get_nonempty_string("HOST") {
            self.server.host = host;
        }
        if let Some(port) = env.get_u32_range("PORT", 1, u32::from(u16::MAX)) {
            self.server.port = u16::try_from(port).unwrap_or(self.server.port);
        }
        if let Some(path) = env.get_string("HEALTH_PATH") {
            self.server.health_path = path;
        }
        if let Some(util) = env.get_f64_range("GPU_MEMORY_UTILIZATION", 0.01, 1.0) {
            self.server.gpu_memory_utilization = util;
        }
        if let Some(len) = env.get_u32_range("MAX_MODEL_LEN", 1, u32::MAX) {
            self.server.max_model_len = len;
        }

        if let Some(n) = env.get_u32_range("INPUT_LEN", 1, u32::MAX) {
            self.benchmark.input_len = n;
        }
        if let Some(n) = env.get_u32_range("OUTPUT_LEN", 1, u32::MAX) {
            self.benchmark.output_len = n;
        }
        if let Some(n) = env.get_u32_range("CONCURRENCY", 1, u32::MAX) {
            self.benchmark.concurrency = n;
        }
        if let Some(n) = env.get_u32_range("NUM_PROMPTS", 1, u32::MAX) {
            self.benchmark.num_prompts = n;
        }

        if let Some(secs) = env.get_u64_range("TIMEOUT_STARTUP", 1, 86_400) {
            self.timeouts.startup = secs;
        }
        if let Some(secs) = env.get_u64_range("TIMEOUT_BENCHMARK", 1, 7 * 86_400) {
            self.timeouts.benchmark = secs;
        }
        if let Some(secs) = env.get_u64_range("COOLDOWN", 0, 3_600) {
            self.timeouts.cooldown = secs;
        }

        if let Some(script) = env.get_path("SETUP_SCRIPT") {
            self.environment.setup_script = Some(script);
        }
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if self.sweep.parallelism.contains(&0) {
            problems.push("parallelism values must be positive".to_string());
        }
        for (name, secs) in [
            ("startup", self.timeouts.startup),
            ("benchmark", self.timeouts.benchmark),
            ("poll_interval", self.timeouts.poll_interval),
            ("probe_timeout", self.timeouts.probe_timeout),
        ] {
            if secs == 0 {
                problems.push(format!("timeouts.{name} must be greater than zero"));
            }
        }
        if self.timeouts.poll_interval > self.timeouts.startup {
            problems.push(format!(
                "timeouts.poll_interval ({}s) exceeds timeouts.startup ({}s)",
                self.timeouts.poll_interval, self.timeouts.startup
            ));
        }
        if self.server.health_path.trim().is_empty() {
            problems.push("server.health_path must not be empty".to_string());
        } else if !self.server.health_path.starts_with('/') {
            problems.push(format!(
                "server.health_path must start with '/': {}",
                self.server.health_path
            ));
        }
        if self.server.port == 0 {
            problems.push("server.port must be non-zero".to_string());
        }
        if self.server.binary.trim().is_empty() {
            problems.push("server.binary must not be empty".to_string());
        }
        if !(self.server.gpu_memory_utilization > 0.0 && self.server.gpu_memory_utilization <= 1.0)
        {
            problems.push(format!(
                "server.gpu_memory_utilization must be in (0, 1]: {}",
                self.server.gpu_memory_utilization
            ));
        }
        if self.benchmark.concurrency == 0 || self.benchmark.num_prompts == 0 {
            problems.push("benchmark.concurrency and benchmark.num_prompts must be positive".into());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }

    /// The sweep axes. Zero parallelism values are rejected by
    /// [`validate`](Self::validate) and dropped here.
    pub fn axes(&self) -> Axes {
        Axes::new(
            self.sweep.models.iter().cloned(),
            self.sweep
                .parallelism
                .iter()
                .filter_map(|&tp| NonZeroU32::new(tp)),
            self.sweep
                .quantization
                .iter()
                .map(|q| normalize_quantization(q)),
            self.sweep.eager.iter().copied(),
        )
    }

    /// Render as TOML. `sweep run --dry-run` prints this after the plan.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Merge(e.to_string()))
    }
}

/// `~/.config/serving-sweep/config.toml` (platform equivalent).
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("serving-sweep").join("config.toml"))
}

fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_overrides_only_named_keys() {
        let config = SweepConfig::from_toml_str(
            Profile::Sanity,
            r#"
            [benchmark]
            concurrency = 8

            [timeouts]
            startup = 120
            "#,
        )
        .unwrap();

        assert_eq!(config.benchmark.concurrency, 8);
        assert_eq!(config.timeouts.startup, 120);
        // untouched keys keep the sanity profile's values
        assert_eq!(config.benchmark.input_len, 8);
        assert_eq!(config.timeouts.cooldown, 5);
        assert_eq!(config.server.max_model_len, 2048);
    }

    #[test]
    fn test_skip_rules_from_file_replace_defaults() {
        let config = SweepConfig::from_toml_str(
            Profile::Full,
            r#"
            [[sweep.skip]]
            model = "openai/gpt-oss-20b"
            quantization = "fp8"
            reason = "unsupported"
            "#,
        )
        .unwrap();

        assert_eq!(config.sweep.skip.len(), 1);
        assert_eq!(config.sweep.skip[0].reason, "unsupported");
        assert_eq!(config.sweep.skip[0].eager, None);
    }

    #[test]
    fn test_environment_vars_table() {
        let config = SweepConfig::from_toml_str(
            Profile::Full,
            r#"
            [environment]
            setup_script = "/opt/toolkit/setvars.sh"

            [environment.vars]
            VLLM_WORKER_MULTIPROC_METHOD = "spawn"
            "#,
        )
        .unwrap();

        assert_eq!(
            config.environment.setup_script.as_deref(),
            Some(Path::new("/opt/toolkit/setvars.sh"))
        );
        assert_eq!(
            config.environment.vars.get("VLLM_WORKER_MULTIPROC_METHOD").map(String::as_str),
            Some("spawn")
        );
        assert!(config.environment.login_shell);
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let err = SweepConfig::from_toml_str(Profile::Full, "[timeouts\nstartup = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Profile::Full.defaults();
        config.sweep.parallelism = vec![0, 2];
        config.timeouts.benchmark = 0;
        config.timeouts.poll_interval = 600;
        config.server.health_path = String::new();

        let Err(ConfigError::Invalid(problems)) = config.validate() else {
            panic!("expected validation failure");
        };
        assert_eq!(problems.len(), 4);
    }

    #[test]
    fn test_defaults_validate() {
        assert!(SweepConfig::default().validate().is_ok());
    }

    #[test]
    fn test_axes_normalize_quantization() {
        let config = Profile::Sanity.defaults();
        let axes = config.axes();
        assert_eq!(axes.quantization(), &[None, Some("fp8".to_string())]);
        assert_eq!(axes.cardinality(), 4);
    }

    #[test]
    fn test_liveness_every_rounds_to_polls() {
        let timeouts = TimeoutsSection::default();
        assert_eq!(timeouts.liveness_every(), 6);

        let timeouts = TimeoutsSection {
            liveness_interval: 1,
            ..TimeoutsSection::default()
        };
        assert_eq!(timeouts.liveness_every(), 1);
    }

    #[test]
    fn test_rendered_toml_loads_back_unchanged() {
        let mut config = Profile::Sanity.defaults();
        config.server.port = 9100;
        config.sweep.skip.push(SkipRule {
            model: Some("org/m".to_string()),
            quantization: None,
            eager: Some(true),
            reason: "unsupported".to_string(),
        });

        let text = config.to_toml_string().unwrap();
        assert!(text.contains("port = 9100"), "{text}");

        let loaded = SweepConfig::from_toml_str(Profile::Full, &text).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_health_url() {
        let server = ServerSection::default();
        assert_eq!(server.health_url(), "http://localhost:8000/health");
    }

    #[test]
    fn test_load_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sweep.toml");
        std::fs::write(&path, "[server]\nport = 9000\n").unwrap();

        let config = SweepConfig::load(Profile::Full, Some(&path)).unwrap();
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn test_load_missing_file_is_read_error() {
        let err = SweepConfig::load(Profile::Full, Some(Path::new("/nonexistent/sweep.toml")))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
