//! Expansion of sweep axes into runnable configurations.
//!
//! [`ConfigurationSpace`] walks the cross product lazily in a fixed nested
//! order (model, then parallelism, then quantization, then eager mode
//! innermost). Combinations matched by a [`SkipRule`] are never emitted; each
//! one produces a warn-level notice and is recorded as a
//! [`SkippedConfiguration`].

use crate::types::{Configuration, UNQUANTIZED, normalize_quantization};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use tracing::warn;

/// The four sweep axes. Duplicate values inside one axis are removed at
/// construction (first occurrence wins), as are models whose run names collide,
/// so every configuration in the cross product has a distinct name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Axes {
    models: Vec<String>,
    parallelism: Vec<NonZeroU32>,
    quantization: Vec<Option<String>>,
    eager: Vec<bool>,
}

impl Axes {
    pub fn new(
        models: impl IntoIterator<Item = impl Into<String>>,
        parallelism: impl IntoIterator<Item = NonZeroU32>,
        quantization: impl IntoIterator<Item = Option<String>>,
        eager: impl IntoIterator<Item = bool>,
    ) -> Self {
        Self {
            models: distinct_names(dedup("model", models.into_iter().map(Into::into))),
            parallelism: dedup("parallelism", parallelism),
            quantization: dedup(
                "quantization",
                quantization
                    .into_iter()
                    .map(|q| q.and_then(|q| normalize_quantization(&q))),
            ),
            eager: dedup("eager", eager),
        }
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub fn parallelism(&self) -> &[NonZeroU32] {
        &self.parallelism
    }

    pub fn quantization(&self) -> &[Option<String>] {
        &self.quantization
    }

    pub fn eager(&self) -> &[bool] {
        &self.eager
    }

    /// Size of the full cross product, before skip rules.
    pub fn cardinality(&self) -> usize {
        self.models.len() * self.parallelism.len() * self.quantization.len() * self.eager.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cardinality() == 0
    }
}

fn dedup<T: PartialEq + std::fmt::Debug>(axis: &str, values: impl IntoIterator<Item = T>) -> Vec<T> {
    let mut out: Vec<T> = Vec::new();
    for value in values {
        if out.contains(&value) {
            warn!(axis, value = ?value, "Dropping duplicate axis value");
            continue;
        }
        out.push(value);
    }
    out
}

/// Run names replace `/` with `_`, so `org/m` and `org_m` would write to the
/// same files. The later model is dropped.
fn distinct_names(models: Vec<String>) -> Vec<String> {
    let mut seen: Vec<String> = Vec::with_capacity(models.len());
    let mut out = Vec::with_capacity(models.len());
    for model in models {
        let sanitized = model.replace('/', "_");
        if let Some(index) = seen.iter().position(|s| *s == sanitized) {
            warn!(
                model = %model,
                kept = %out[index],
                "Dropping model whose run names collide with an earlier model"
            );
            continue;
        }
        seen.push(sanitized);
        out.push(model);
    }
    out
}

/// A compatibility exclusion. Every field that is set must match for the rule
/// to apply; unset fields match anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// `"none"` matches unquantized runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eager: Option<bool>,
    pub reason: String,
}

impl SkipRule {
    /// fp8 quantization with graph capture (eager disabled) is a known failure.
    pub fn fp8_without_eager() -> Self {
        Self {
            model: None,
            quantization: Some("fp8".to_string()),
            eager: Some(false),
            reason: "known failure: fp8 requires eager mode".to_string(),
        }
    }

    pub fn matches(&self, model: &str, quantization: Option<&str>, eager: bool) -> bool {
        if let Some(rule_model) = &self.model
            && rule_model != model
        {
            return false;
        }
        if let Some(rule_quant) = &self.quantization
            && !rule_quant.eq_ignore_ascii_case(quantization.unwrap_or(UNQUANTIZED))
        {
            return false;
        }
        if let Some(rule_eager) = self.eager
            && rule_eager != eager
        {
            return false;
        }
        true
    }
}

/// A combination excluded before execution, with the rule's reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedConfiguration {
    pub configuration: Configuration,
    pub reason: String,
}

/// Lazy, finite, single-pass sequence of configurations.
#[derive(Debug)]
pub struct ConfigurationSpace {
    axes: Axes,
    rules: Vec<SkipRule>,
    cursor: usize,
    total: usize,
    skipped: Vec<SkippedConfiguration>,
}

impl ConfigurationSpace {
    pub fn new(axes: Axes, rules: Vec<SkipRule>) -> Self {
        let total = axes.cardinality();
        Self {
            axes,
            rules,
            cursor: 0,
            total,
            skipped: Vec::new(),
        }
    }

    /// Skips recorded so far.
    pub fn skipped(&self) -> &[SkippedConfiguration] {
        &self.skipped
    }

    /// Drain the space into a plan with every scheduled and skipped entry.
    pub fn plan(mut self) -> SweepPlan {
        let scheduled: Vec<Configuration> = self.by_ref().collect();
        SweepPlan {
            scheduled,
            skipped: self.skipped,
        }
    }

    fn configuration_at(&self, index: usize) -> Configuration {
        let e = self.axes.eager.len();
        let q = self.axes.quantization.len();
        let p = self.axes.parallelism.len();

        let eager = self.axes.eager[index % e];
        let quantization = self.axes.quantization[(index / e) % q].clone();
        let parallelism = self.axes.parallelism[(index / (e * q)) % p];
        let model = &self.axes.models[index / (e * q * p)];

        Configuration::new(model.clone(), parallelism, quantization, eager)
    }
}

impl Iterator for ConfigurationSpace {
    type Item = Configuration;

    fn next(&mut self) -> Option<Configuration> {
        while self.cursor < self.total {
            let configuration = self.configuration_at(self.cursor);
            self.cursor += 1;

            let rule = self.rules.iter().find(|rule| {
                rule.matches(
                    configuration.model(),
                    configuration.quantization(),
                    configuration.eager(),
                )
            });

            match rule {
                Some(rule) => {
                    warn!(
                        config = %configuration,
                        reason = %rule.reason,
                        "Skipping configuration"
                    );
                    self.skipped.push(SkippedConfiguration {
                        configuration,
                        reason: rule.reason.clone(),
                    });
                }
                None => return Some(configuration),
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.total - self.cursor))
    }
}

/// Fully expanded sweep: what will run and what was excluded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepPlan {
    pub scheduled: Vec<Configuration>,
    pub skipped: Vec<SkippedConfiguration>,
}

impl SweepPlan {
    pub fn is_empty(&self) -> bool {
        self.scheduled.is_empty()
    }
}
