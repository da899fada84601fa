//! Tracing subscriber bootstrap.
//!
//! A human-readable (or JSON) layer goes to stderr; when a log file is
//! configured, every event is also written there as JSON lines through a
//! non-blocking appender.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

/// Console log rendering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "pretty" | "text" | "human" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Directive for crates in this workspace (`info`, `debug`, ...), or a
    /// full `EnvFilter` expression when it contains `=`.
    pub level: String,
    pub format: LogFormat,
    pub stderr: bool,
    pub file: Option<PathBuf>,
}

impl LogConfig {
    /// Read `SWEEP_LOG_LEVEL`, `SWEEP_LOG_FORMAT` and `SWEEP_LOG_FILE`.
    /// Unparseable values fall back to the defaults.
    pub fn from_env(default_level: &str) -> Self {
        let level = std::env::var("SWEEP_LOG_LEVEL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| default_level.to_string());
        let format = std::env::var("SWEEP_LOG_FORMAT")
            .ok()
            .and_then(|v| LogFormat::parse(&v))
            .unwrap_or_default();
        let file = std::env::var("SWEEP_LOG_FILE")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        Self {
            level,
            format,
            stderr: true,
            file,
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    #[must_use]
    pub fn with_stderr(mut self, enabled: bool) -> Self {
        self.stderr = enabled;
        self
    }

    /// Add a JSON-lines file sink. An explicit `SWEEP_LOG_FILE` wins.
    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        if self.file.is_none() {
            self.file = Some(path.into());
        }
        self
    }

    fn filter(&self) -> EnvFilter {
        let directive = if self.level.contains('=') {
            self.level.clone()
        } else {
            format!(
                "sweep={lvl},sweep_common={lvl},sweep_report={lvl}",
                lvl = self.level
            )
        };
        EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            stderr: true,
            file: None,
        }
    }
}

/// Keeps the non-blocking writers flushing. Hold for the life of the process.
#[must_use = "dropping the guards stops file logging"]
pub struct LoggingGuards {
    _file: Option<WorkerGuard>,
    installed: bool,
}

impl LoggingGuards {
    /// False when a global subscriber already existed (e.g. under test).
    pub fn installed(&self) -> bool {
        self.installed
    }
}

/// Install the global subscriber. Safe to call more than once; later calls
/// leave the first subscriber in place.
pub fn init_logging(config: &LogConfig) -> std::io::Result<LoggingGuards> {
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    if config.stderr {
        let layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false);
        match config.format {
            LogFormat::Pretty => layers.push(layer.compact().boxed()),
            LogFormat::Json => layers.push(layer.json().boxed()),
        }
    }

    let mut file_guard = None;
    if let Some(path) = &config.file {
        let file = open_log_file(path)?;
        let (writer, guard) = tracing_appender::non_blocking(file);
        layers.push(
            fmt::layer()
                .json()
                .with_writer(writer)
                .with_current_span(true)
                .boxed(),
        );
        file_guard = Some(guard);
    }

    let installed = tracing_subscriber::registry()
        .with(layers)
        .with(config.filter())
        .try_init()
        .is_ok();

    Ok(LoggingGuards {
        _file: file_guard,
        installed,
    })
}

fn open_log_file(path: &Path) -> std::io::Result<std::fs::File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear() {
        for var in ["SWEEP_LOG_LEVEL", "SWEEP_LOG_FORMAT", "SWEEP_LOG_FILE"] {
            // SAFETY: env tests are #[serial]
            unsafe { std::env::remove_var(var) };
        }
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear();
        let config = LogConfig::from_env("warn");
        assert_eq!(config.level, "warn");
        assert_eq!(config.format, LogFormat::Pretty);
        assert!(config.file.is_none());
        assert!(config.stderr);
    }

    #[test]
    #[serial]
    fn test_from_env_reads_vars() {
        clear();
        // SAFETY: env tests are #[serial]
        unsafe {
            std::env::set_var("SWEEP_LOG_LEVEL", "debug");
            std::env::set_var("SWEEP_LOG_FORMAT", "JSON");
            std::env::set_var("SWEEP_LOG_FILE", "/tmp/explicit.jsonl");
        }
        let config = LogConfig::from_env("info").with_file("/tmp/other.jsonl");
        assert_eq!(config.level, "debug");
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.file.as_deref(), Some(Path::new("/tmp/explicit.jsonl")));
        clear();
    }

    #[test]
    fn test_builder() {
        let config = LogConfig::default()
            .with_level("trace")
            .with_stderr(false)
            .with_file("/tmp/sweep.jsonl");
        assert_eq!(config.level, "trace");
        assert!(!config.stderr);
        assert_eq!(config.file.as_deref(), Some(Path::new("/tmp/sweep.jsonl")));
    }

    #[test]
    fn test_init_creates_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("sweep.jsonl");
        let config = LogConfig::default().with_stderr(false).with_file(&path);

        let guards = init_logging(&config).unwrap();
        assert!(path.exists());
        // second call must not fail even though a subscriber exists
        let again = init_logging(&LogConfig::default().with_stderr(false)).unwrap();
        assert!(!again.installed());
        drop(guards);
    }
}
