//! Environment variable parsing with type safety.
//!
//! Every getter returns `None` when the variable is unset, so callers only
//! override the lower configuration layers for variables that are present.
//! Invalid values are collected rather than failing on the first one, so all
//! issues can be reported at once.

use std::env;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during environment variable parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvError {
    /// Invalid value for a variable.
    #[error("Invalid value for {var}: expected {expected}, got '{value}'")]
    InvalidValue {
        var: String,
        expected: String,
        value: String,
    },

    /// Value out of valid range.
    #[error("Value out of range for {var}: {value} (valid: {min}..={max})")]
    OutOfRange {
        var: String,
        value: String,
        min: String,
        max: String,
    },

    /// Invalid log level.
    #[error("Invalid log level for {var}: {value}")]
    InvalidLogLevel { var: String, value: String },
}

/// Type-safe environment variable parser for `SWEEP_*` variables.
pub struct EnvParser {
    prefix: &'static str,
    errors: Vec<EnvError>,
    applied: Vec<String>,
}

impl EnvParser {
    /// Create a new parser with the SWEEP_ prefix.
    pub fn new() -> Self {
        Self {
            prefix: "SWEEP_",
            errors: Vec::new(),
            applied: Vec::new(),
        }
    }

    pub fn errors(&self) -> &[EnvError] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn take_errors(&mut self) -> Vec<EnvError> {
        std::mem::take(&mut self.errors)
    }

    /// Names of the variables that were present and parsed successfully.
    pub fn applied(&self) -> &[String] {
        &self.applied
    }

    fn var_name(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    fn read(&self, name: &str) -> Option<(String, String)> {
        let var_name = self.var_name(name);
        env::var(&var_name).ok().map(|value| (var_name, value))
    }

    fn accept<T>(&mut self, var_name: String, value: T) -> Option<T> {
        self.applied.push(var_name);
        Some(value)
    }

    pub fn get_string(&mut self, name: &str) -> Option<String> {
        let (var_name, value) = self.read(name)?;
        self.accept(var_name, value)
    }

    /// Optional string, where an empty value counts as unset.
    pub fn get_nonempty_string(&mut self, name: &str) -> Option<String> {
        let (var_name, value) = self.read(name)?;
        if value.trim().is_empty() {
            return None;
        }
        self.accept(var_name, value)
    }

    /// Accepts: 1, true, yes, on (for true)
    ///          0, false, no, off, "" (for false)
    pub fn get_bool(&mut self, name: &str) -> Option<bool> {
        let (var_name, value) = self.read(name)?;
        match value.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => self.accept(var_name, true),
            "0" | "false" | "no" | "off" | "" => self.accept(var_name, false),
            _ => {
                self.errors.push(EnvError::InvalidValue {
                    var: var_name,
                    expected: "boolean (true/false/1/0/yes/no)".to_string(),
                    value,
                });
                None
            }
        }
    }

    pub fn get_u32_range(&mut self, name: &str, min: u32, max: u32) -> Option<u32> {
        let (var_name, value) = self.read(name)?;
        match value.trim().parse::<u32>() {
            Ok(n) if n >= min && n <= max => self.accept(var_name, n),
            Ok(n) => {
                self.errors.push(EnvError::OutOfRange {
                    var: var_name,
                    value: n.to_string(),
                    min: min.to_string(),
                    max: max.to_string(),
                });
                None
            }
            Err(_) => {
                self.errors.push(EnvError::InvalidValue {
                    var: var_name,
                    expected: "unsigned 32-bit integer".to_string(),
                    value,
                });
                None
            }
        }
    }

    pub fn get_u64_range(&mut self, name: &str, min: u64, max: u64) -> Option<u64> {
        let (var_name, value) = self.read(name)?;
        match value.trim().parse::<u64>() {
            Ok(n) if n >= min && n <= max => self.accept(var_name, n),
            Ok(n) => {
                self.errors.push(EnvError::OutOfRange {
                    var: var_name,
                    value: n.to_string(),
                    min: min.to_string(),
                    max: max.to_string(),
                });
                None
            }
            Err(_) => {
                self.errors.push(EnvError::InvalidValue {
                    var: var_name,
                    expected: "unsigned 64-bit integer".to_string(),
                    value,
                });
                None
            }
        }
    }

    pub fn get_f64_range(&mut self, name: &str, min: f64, max: f64) -> Option<f64> {
        let (var_name, value) = self.read(name)?;
        match value.trim().parse::<f64>() {
            Ok(n) if n >= min && n <= max => self.accept(var_name, n),
            Ok(n) => {
                self.errors.push(EnvError::OutOfRange {
                    var: var_name,
                    value: n.to_string(),
                    min: min.to_string(),
                    max: max.to_string(),
                });
                None
            }
            Err(_) => {
                self.errors.push(EnvError::InvalidValue {
                    var: var_name,
                    expected: "floating-point number".to_string(),
                    value,
                });
                None
            }
        }
    }

    /// Path value with `~/` expanded to the home directory.
    pub fn get_path(&mut self, name: &str) -> Option<PathBuf> {
        let (var_name, value) = self.read(name)?;
        if value.trim().is_empty() {
            return None;
        }
        self.accept(var_name, expand_tilde(&value))
    }

    pub fn get_log_level(&mut self, name: &str) -> Option<String> {
        let (var_name, value) = self.read(name)?;
        let lower = value.to_lowercase();
        match lower.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" | "off" => self.accept(var_name, lower),
            _ => {
                self.errors
                    .push(EnvError::InvalidLogLevel { var: var_name, value });
                None
            }
        }
    }

    /// Comma-separated list of strings; empty items are dropped.
    pub fn get_string_list(&mut self, name: &str) -> Option<Vec<String>> {
        let (var_name, value) = self.read(name)?;
        let items: Vec<String> = value
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        self.accept(var_name, items)
    }

    /// Comma-separated list of integers in `min..=max`. Any bad item rejects
    /// the whole list.
    pub fn get_u32_list(&mut self, name: &str, min: u32, max: u32) -> Option<Vec<u32>> {
        let (var_name, value) = self.read(name)?;
        let mut items = Vec::new();
        for item in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match item.parse::<u32>() {
                Ok(n) if n >= min && n <= max => items.push(n),
                Ok(n) => {
                    self.errors.push(EnvError::OutOfRange {
                        var: var_name,
                        value: n.to_string(),
                        min: min.to_string(),
                        max: max.to_string(),
                    });
                    return None;
                }
                Err(_) => {
                    self.errors.push(EnvError::InvalidValue {
                        var: var_name,
                        expected: "comma-separated unsigned integers".to_string(),
                        value: value.clone(),
                    });
                    return None;
                }
            }
        }
        self.accept(var_name, items)
    }

    /// Comma-separated list of booleans (`true`/`false`).
    pub fn get_bool_list(&mut self, name: &str) -> Option<Vec<bool>> {
        let (var_name, value) = self.read(name)?;
        let mut items = Vec::new();
        for item in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match item.to_lowercase().as_str() {
                "true" | "1" | "yes" => items.push(true),
                "false" | "0" | "no" => items.push(false),
                _ => {
                    self.errors.push(EnvError::InvalidValue {
                        var: var_name,
                        expected: "comma-separated booleans".to_string(),
                        value: value.clone(),
                    });
                    return None;
                }
            }
        }
        self.accept(var_name, items)
    }
}

impl Default for EnvParser {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn expand_tilde(value: &str) -> PathBuf {
    if let Some(stripped) = value.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(stripped);
    }
    PathBuf::from(value)
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn cleanup_env(vars: &[&str]) {
        for var in vars {
            // SAFETY: env tests are #[serial], no concurrent access to env vars
            unsafe { env::remove_var(var) };
        }
    }

    fn set_env(key: &str, value: &str) {
        // SAFETY: env tests are #[serial], no concurrent access to env vars
        unsafe { env::set_var(key, value) };
    }

    #[test]
    #[serial]
    fn test_unset_returns_none() {
        cleanup_env(&["SWEEP_TEST_UNSET"]);
        let mut parser = EnvParser::new();
        assert_eq!(parser.get_string("TEST_UNSET"), None);
        assert_eq!(parser.get_u64_range("TEST_UNSET", 0, 10), None);
        assert!(!parser.has_errors());
        assert!(parser.applied().is_empty());
    }

    #[test]
    #[serial]
    fn test_get_bool_values() {
        let vars = ["SWEEP_TEST_BOOL"];
        for (val, expected) in [("1", true), ("Yes", true), ("off", false), ("", false)] {
            set_env("SWEEP_TEST_BOOL", val);
            let mut parser = EnvParser::new();
            assert_eq!(parser.get_bool("TEST_BOOL"), Some(expected), "value '{val}'");
            assert!(!parser.has_errors());
        }
        cleanup_env(&vars);
    }

    #[test]
    #[serial]
    fn test_get_u64_range_valid_and_out_of_range() {
        let vars = ["SWEEP_TEST_U64"];
        set_env("SWEEP_TEST_U64", "50");
        let mut parser = EnvParser::new();
        assert_eq!(parser.get_u64_range("TEST_U64", 0, 100), Some(50));
        assert_eq!(parser.applied(), ["SWEEP_TEST_U64".to_string()]);

        set_env("SWEEP_TEST_U64", "500");
        let mut parser = EnvParser::new();
        assert_eq!(parser.get_u64_range("TEST_U64", 0, 100), None);
        assert!(matches!(parser.errors()[0], EnvError::OutOfRange { .. }));
        cleanup_env(&vars);
    }

    #[test]
    #[serial]
    fn test_errors_are_collected_not_fail_fast() {
        let vars = ["SWEEP_TEST_A", "SWEEP_TEST_B", "SWEEP_TEST_C"];
        set_env("SWEEP_TEST_A", "abc");
        set_env("SWEEP_TEST_B", "maybe");
        set_env("SWEEP_TEST_C", "loud");

        let mut parser = EnvParser::new();
        parser.get_u32_range("TEST_A", 0, 10);
        parser.get_bool("TEST_B");
        parser.get_log_level("TEST_C");

        let errors = parser.take_errors();
        assert_eq!(errors.len(), 3);
        assert!(matches!(errors[2], EnvError::InvalidLogLevel { .. }));
        assert!(!parser.has_errors());
        cleanup_env(&vars);
    }

    #[test]
    #[serial]
    fn test_lists() {
        let vars = ["SWEEP_TEST_LIST", "SWEEP_TEST_TP", "SWEEP_TEST_EAGER"];
        set_env("SWEEP_TEST_LIST", " a, b ,,c ");
        set_env("SWEEP_TEST_TP", "2,4,8");
        set_env("SWEEP_TEST_EAGER", "true,false");

        let mut parser = EnvParser::new();
        assert_eq!(
            parser.get_string_list("TEST_LIST"),
            Some(vec!["a".to_string(), "b".to_string(), "c".to_string()])
        );
        assert_eq!(parser.get_u32_list("TEST_TP", 1, 64), Some(vec![2, 4, 8]));
        assert_eq!(parser.get_bool_list("TEST_EAGER"), Some(vec![true, false]));

        set_env("SWEEP_TEST_TP", "2,0");
        assert_eq!(parser.get_u32_list("TEST_TP", 1, 64), None);
        assert_eq!(parser.errors().len(), 1);
        cleanup_env(&vars);
    }

    #[test]
    #[serial]
    fn test_get_path_expands_tilde() {
        let vars = ["SWEEP_TEST_PATH"];
        set_env("SWEEP_TEST_PATH", "~/results");
        let mut parser = EnvParser::new();
        let path = parser.get_path("TEST_PATH").unwrap();
        if let Some(home) = dirs::home_dir() {
            assert_eq!(path, home.join("results"));
        }
        cleanup_env(&vars);
    }
}
