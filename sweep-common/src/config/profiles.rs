//! Built-in sweep profiles.

use super::{
    BenchmarkSection, EnvironmentSection, ServerSection, SweepConfig, SweepSection,
    TimeoutsSection,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Starting point for a sweep's configuration, before file, environment and
/// CLI overrides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Production-sized workload over the full default axes.
    #[default]
    Full,
    /// Minimal smoke run: one small model, tiny workload.
    Sanity,
}

impl Profile {
    pub fn defaults(self) -> SweepConfig {
        match self {
            Self::Full => SweepConfig {
                sweep: SweepSection {
                    models: vec![
                        "openai/gpt-oss-20b".to_string(),
                        "Qwen/Qwen3-30B-A3B".to_string(),
                        "Qwen/Qwen3-4B-Thinking-2507".to_string(),
                    ],
                    parallelism: vec![2, 4, 8],
                    ..SweepSection::default()
                },
                server: ServerSection::default(),
                benchmark: BenchmarkSection::default(),
                timeouts: TimeoutsSection::default(),
                environment: EnvironmentSection::default(),
            },
            Self::Sanity => SweepConfig {
                sweep: SweepSection {
                    models: vec!["Qwen/Qwen3-4B-Thinking-2507".to_string()],
                    parallelism: vec![2],
                    ..SweepSection::default()
                },
                server: ServerSection {
                    max_model_len: 2048,
                    ..ServerSection::default()
                },
                benchmark: BenchmarkSection {
                    input_len: 8,
                    output_len: 8,
                    concurrency: 2,
                    num_prompts: 4,
                    ..BenchmarkSection::default()
                },
                timeouts: TimeoutsSection {
                    benchmark: 600,
                    cooldown: 5,
                    ..TimeoutsSection::default()
                },
                environment: EnvironmentSection::default(),
            },
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => f.write_str("full"),
            Self::Sanity => f.write_str("sanity"),
        }
    }
}

impl FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "full" | "production" | "prod" => Ok(Self::Full),
            "sanity" | "smoke" => Ok(Self::Sanity),
            other => Err(format!("unknown profile '{other}' (expected full or sanity)")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_profile_matches_production_workload() {
        let config = Profile::Full.defaults();
        assert_eq!(config.sweep.models.len(), 3);
        assert_eq!(config.sweep.parallelism, vec![2, 4, 8]);
        assert_eq!(config.benchmark.input_len, 1024);
        assert_eq!(config.benchmark.concurrency, 32);
        assert_eq!(config.benchmark.num_prompts, 160);
        assert_eq!(config.server.max_model_len, 16384);
        assert_eq!(config.timeouts.startup, 300);
        assert_eq!(config.timeouts.benchmark, 1800);
        assert_eq!(config.timeouts.cooldown, 10);
    }

    #[test]
    fn test_sanity_profile_is_small() {
        let config = Profile::Sanity.defaults();
        assert_eq!(config.sweep.models, vec!["Qwen/Qwen3-4B-Thinking-2507"]);
        assert_eq!(config.sweep.parallelism, vec![2]);
        assert_eq!(config.sweep.quantization, vec!["none", "fp8"]);
        assert_eq!(config.benchmark.input_len, 8);
        assert_eq!(config.benchmark.num_prompts, 4);
        assert_eq!(config.server.max_model_len, 2048);
        assert_eq!(config.timeouts.benchmark, 600);
        assert_eq!(config.timeouts.cooldown, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_profile_from_str() {
        assert_eq!("Sanity".parse::<Profile>(), Ok(Profile::Sanity));
        assert_eq!("prod".parse::<Profile>(), Ok(Profile::Full));
        assert!("fast".parse::<Profile>().is_err());
    }
}
