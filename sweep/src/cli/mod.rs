//! Command-line surface of the `sweep` binary.

pub mod analyze;
pub mod maintenance;
pub mod run;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use sweep_common::{LogConfig, LoggingGuards, Profile, SweepConfig, init_logging};

#[derive(Parser)]
#[command(name = "sweep")]
#[command(author, version, about = "Serving configuration sweep runner")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a sweep over the configured axes
    Run(RunArgs),

    /// Regenerate analysis reports from a results directory
    Analyze {
        /// Directory holding `*_results.json` files
        results_dir: PathBuf,
    },

    /// Show server process and results directory status
    Status(ConfigArgs),

    /// Stop a stray server process (TERM, then KILL)
    Stop(ConfigArgs),

    /// Check prerequisites for running a sweep
    Check {
        #[command(flatten)]
        config: ConfigArgs,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete the results directory
    Clean {
        #[command(flatten)]
        config: ConfigArgs,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Copy the results directory to a timestamped backup
    Backup(ConfigArgs),

    /// Follow the most recent server log
    Logs {
        #[command(flatten)]
        config: ConfigArgs,

        /// Print the current contents and exit
        #[arg(long)]
        no_follow: bool,
    },
}

/// Options shared by every subcommand that reads the sweep configuration.
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Built-in defaults to start from (full, sanity)
    #[arg(long, default_value_t = Profile::Full)]
    pub profile: Profile,

    /// TOML config file layered over the profile
    #[arg(long, env = "SWEEP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Results directory
    #[arg(long)]
    pub results_dir: Option<PathBuf>,
}

impl ConfigArgs {
    pub fn load(&self) -> Result<SweepConfig> {
        let mut config = SweepConfig::load(self.profile, self.config.as_deref())
            .context("failed to load sweep configuration")?;
        if let Some(dir) = &self.results_dir {
            config.sweep.results_dir = dir.clone();
        }
        Ok(config)
    }
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Models to test
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    pub models: Vec<String>,

    /// Tensor parallelism values
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    pub tp: Vec<u32>,

    /// Quantization methods ("none" = unquantized)
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    pub quantization: Vec<String>,

    /// Enforce eager values (true/false)
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    pub enforce_eager: Vec<bool>,

    /// Server startup timeout in seconds
    #[arg(long)]
    pub timeout_startup: Option<u64>,

    /// Benchmark timeout in seconds
    #[arg(long)]
    pub timeout_benchmark: Option<u64>,

    /// Pause between experiments in seconds
    #[arg(long)]
    pub cooldown: Option<u64>,

    /// Input length in tokens
    #[arg(long)]
    pub input_len: Option<u32>,

    /// Output length in tokens
    #[arg(long)]
    pub output_len: Option<u32>,

    /// Maximum concurrent requests
    #[arg(long)]
    pub concurrency: Option<u32>,

    /// Number of prompts
    #[arg(long)]
    pub num_prompts: Option<u32>,

    /// Server port
    #[arg(long)]
    pub port: Option<u16>,

    /// Print the scheduled configurations and exit
    #[arg(long)]
    pub dry_run: bool,

    /// Do not echo server and benchmark output
    #[arg(short, long)]
    pub quiet: bool,
}

impl RunArgs {
    /// Layer the flags over a loaded configuration.
    pub fn apply(&self, config: &mut SweepConfig) {
        if !self.models.is_empty() {
            config.sweep.models = self.models.clone();
        }
        if !self.tp.is_empty() {
            config.sweep.parallelism = self.tp.clone();
        }
        if !self.quantization.is_empty() {
            config.sweep.quantization = self.quantization.clone();
        }
        if !self.enforce_eager.is_empty() {
            config.sweep.eager = self.enforce_eager.clone();
        }
        if let Some(v) = self.timeout_startup {
            config.timeouts.startup = v;
        }
        if let Some(v) = self.timeout_benchmark {
            config.timeouts.benchmark = v;
        }
        if let Some(v) = self.cooldown {
            config.timeouts.cooldown = v;
        }
        if let Some(v) = self.input_len {
            config.benchmark.input_len = v;
        }
        if let Some(v) = self.output_len {
            config.benchmark.output_len = v;
        }
        if let Some(v) = self.concurrency {
            config.benchmark.concurrency = v;
        }
        if let Some(v) = self.num_prompts {
            config.benchmark.num_prompts = v;
        }
        if let Some(v) = self.port {
            config.server.port = v;
        }
    }
}

/// Install logging for one invocation, optionally with a JSON-lines file.
pub fn setup_logging(verbose: bool, file: Option<&Path>) -> Result<LoggingGuards> {
    let mut config = LogConfig::from_env("info");
    if verbose {
        config = config.with_level("debug");
    }
    if let Some(file) = file {
        config = config.with_file(file);
    }
    init_logging(&config).context("failed to initialise logging")
}
