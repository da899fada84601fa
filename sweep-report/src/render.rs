//! Plain-text reports: `summary.txt` and `detailed_analysis.txt`.

use crate::aggregator::ReportAggregator;
use crate::stats::Stats;
use crate::strategy::{METRIC_STRATEGIES, MetricStrategy};
use chrono::{DateTime, Local};
use std::path::PathBuf;
use sweep_common::util::humanize_hms;
use sweep_common::{Metric, Outcome};

const WIDE: usize = 80;
const NARROW: usize = 72;

/// Sweep-level facts the summary restates that the outcomes do not carry.
#[derive(Debug, Clone)]
pub struct SummaryContext {
    pub title: String,
    pub generated: DateTime<Local>,
    /// Workload parameters, rendered in order as `key: value`.
    pub workload: Vec<(String, String)>,
    pub results_dir: PathBuf,
    pub logs_dir: PathBuf,
}

impl ReportAggregator {
    pub fn render_summary(&self, ctx: &SummaryContext) -> String {
        let totals = self.totals();
        let rule = "=".repeat(NARROW);
        let thin = "-".repeat(NARROW);
        let mut lines = vec![
            ctx.title.clone(),
            rule,
            format!("Generated: {}", ctx.generated.format("%Y-%m-%d %H:%M:%S")),
            String::new(),
        ];

        if !ctx.workload.is_empty() {
            lines.push("Workload:".to_string());
            for (key, value) in &ctx.workload {
                lines.push(format!("  {key}: {value}"));
            }
            lines.push(String::new());
        }

        lines.extend([
            format!("Total Experiments: {}", totals.total),
            format!("Successful: {}", totals.succeeded),
            format!("Failed: {}", totals.failed),
            format!("Skipped: {}", totals.skipped),
            format!("Success Rate: {:.2}%", totals.success_rate),
            String::new(),
            format!("Total Duration: {}", humanize_hms(totals.duration)),
            String::new(),
        ]);

        let successes: Vec<&Outcome> = self.successes().collect();
        if !successes.is_empty() {
            lines.push("Successful Experiments:".to_string());
            lines.push(thin.clone());
            for outcome in successes {
                lines.push(format!(
                    "  ✓ {} ({})",
                    outcome.configuration().name(),
                    humanize_hms(outcome.duration())
                ));
            }
            lines.push(String::new());
        }

        let failures: Vec<&Outcome> = self.failures().collect();
        if !failures.is_empty() {
            lines.push("Failed Experiments:".to_string());
            lines.push(thin.clone());
            for outcome in failures {
                let detail = outcome
                    .error()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "unknown error".to_string());
                lines.push(format!("  ✗ {} ({detail})", outcome.configuration().name()));
            }
            lines.push(String::new());
        }

        if !self.skipped().is_empty() {
            lines.push("Skipped Configurations:".to_string());
            lines.push(thin);
            for skip in self.skipped() {
                lines.push(format!(
                    "  ⚠ {} ({})",
                    skip.configuration.name(),
                    skip.reason
                ));
            }
            lines.push(String::new());
        }

        lines.push(format!("Results Location: {}", ctx.results_dir.display()));
        lines.push(format!("Logs Location: {}", ctx.logs_dir.display()));
        lines.join("\n") + "\n"
    }

    pub fn render_analysis(&self, generated: DateTime<Local>) -> String {
        let mut lines: Vec<String> = vec![
            "=".repeat(WIDE),
            "Serving Benchmark Results Analysis".to_string(),
            "=".repeat(WIDE),
            format!("Generated: {}", generated.format("%Y-%m-%d %H:%M:%S")),
            format!("Total successful experiments: {}", self.successes().count()),
        ];

        section(&mut lines, "OVERALL STATISTICS");
        let blocks: Vec<Vec<String>> = self
            .statistics()
            .into_iter()
            .map(|(strategy, stats)| stats_block(strategy, &stats))
            .collect();
        lines.extend(blocks.join(&String::new()));

        section(&mut lines, "RESULTS BY MODEL");
        let thin = "-".repeat(WIDE);
        let header = format!(
            "{:<4} {:<6} {:<6} {:<10} {:<12} {:<12} {:<12} {:<10}",
            "TP", "Quant", "Eager", "Req/s", "Out tok/s", "TTFT (ms)", "TPOT (ms)", "Status"
        );
        for (model, mut outcomes) in self.by_model() {
            outcomes.sort_by_key(|o| {
                let c = o.configuration();
                (c.parallelism(), c.quantization_label().to_string(), c.eager())
            });
            lines.push(String::new());
            lines.push(format!("{model} ({} configurations)", outcomes.len()));
            lines.push(thin.clone());
            lines.push(header.clone());
            lines.push(thin.clone());
            for outcome in outcomes {
                lines.push(table_row(outcome));
            }
        }

        section(&mut lines, "BEST CONFIGURATIONS PER MODEL");
        for model in self.by_model().keys() {
            lines.push(String::new());
            lines.push(format!("── {model} ──"));
            let blocks: Vec<Vec<String>> = METRIC_STRATEGIES
                .iter()
                .filter_map(|s| self.best(s, Some(*model)).map(|(o, v)| best_block(s, o, v)))
                .collect();
            if blocks.is_empty() {
                lines.push("No successful configurations".to_string());
            }
            lines.extend(blocks.join(&String::new()));
        }

        section(&mut lines, "RANKINGS BY MODEL");
        for model in self.by_model().keys() {
            lines.push(String::new());
            lines.push(format!("── {model} ──"));
            let blocks: Vec<Vec<String>> = METRIC_STRATEGIES
                .iter()
                .map(|s| ranking_block(s, &self.ranking(s, Some(*model))))
                .filter(|block| !block.is_empty())
                .collect();
            if blocks.is_empty() {
                lines.push("No successful configurations".to_string());
            }
            lines.extend(blocks.join(&String::new()));
        }

        section(&mut lines, "BEST CONFIGURATIONS OVERALL");
        for (strategy, outcome, value) in self.best_overall() {
            lines.push(String::new());
            lines.extend(best_block(strategy, outcome, value));
        }
        lines.push(String::new());

        lines.join("\n") + "\n"
    }
}

fn section(lines: &mut Vec<String>, title: &str) {
    lines.push(String::new());
    lines.push("=".repeat(WIDE));
    lines.push(title.to_string());
    lines.push("=".repeat(WIDE));
}

fn stats_block(strategy: &MetricStrategy, stats: &Stats) -> Vec<String> {
    vec![
        format!("{} ({}):", strategy.stats_label, strategy.unit()),
        format!("  Min:    {:.2}", stats.min),
        format!("  Max:    {:.2}", stats.max),
        format!("  Mean:   {:.2}", stats.mean),
        format!("  Median: {:.2}", stats.median),
    ]
}

fn best_block(strategy: &MetricStrategy, outcome: &Outcome, value: f64) -> Vec<String> {
    let c = outcome.configuration();
    vec![
        format!(
            "{} {}: {value:.2} {}",
            strategy.direction.superlative(),
            strategy.label,
            strategy.unit()
        ),
        format!(
            "  Model: {}  TP: {}  Quant: {}  Eager: {}",
            c.model(),
            c.parallelism(),
            c.quantization_label(),
            c.eager()
        ),
        format!(
            "  File:  {}",
            outcome.artifact_file_name().unwrap_or_else(|| "-".to_string())
        ),
    ]
}

/// Best first; empty when no outcome reports the metric.
fn ranking_block(strategy: &MetricStrategy, ranked: &[(&Outcome, f64)]) -> Vec<String> {
    if ranked.is_empty() {
        return Vec::new();
    }
    let mut block = vec![format!("{} ({}):", strategy.label, strategy.unit())];
    for (i, (outcome, value)) in ranked.iter().enumerate() {
        let c = outcome.configuration();
        block.push(format!(
            "  {}. TP {}  Quant {}  Eager {}: {value:.2}",
            i + 1,
            c.parallelism(),
            c.quantization_label(),
            c.eager()
        ));
    }
    block
}

pub(crate) fn metric_cell(outcome: &Outcome, metric: Metric) -> Option<f64> {
    outcome.metrics().and_then(|m| m.value(metric))
}

fn table_row(outcome: &Outcome) -> String {
    let c = outcome.configuration();
    let cell = |metric| {
        metric_cell(outcome, metric)
            .map(|v| format!("{v:.2}"))
            .unwrap_or_else(|| "N/A".to_string())
    };
    let status = match (outcome.success(), outcome.category()) {
        (true, _) => "✓ Success".to_string(),
        (false, Some(category)) => format!("✗ {category}"),
        (false, None) => "✗ Failed".to_string(),
    };
    format!(
        "{:<4} {:<6} {:<6} {:<10} {:<12} {:<12} {:<12} {:<10}",
        c.parallelism(),
        c.quantization_label(),
        c.eager(),
        cell(Metric::RequestThroughput),
        cell(Metric::OutputThroughput),
        cell(Metric::MeanTtft),
        cell(Metric::MeanTpot),
        status
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::num::NonZeroU32;
    use std::time::Duration;
    use sweep_common::{
        Configuration, MetricsArtifact, SkipRule, SkippedConfiguration, SweepError,
    };

    fn at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap()
    }

    fn cfg(tp: u32, quant: Option<&str>, eager: bool) -> Configuration {
        Configuration::new(
            "Qwen/Qwen3-4B",
            NonZeroU32::new(tp).unwrap(),
            quant.map(str::to_string),
            eager,
        )
    }

    fn success(c: Configuration, req: f64) -> Outcome {
        let path = PathBuf::from(format!("/r/{}_results.json", c.name()));
        Outcome::succeeded(
            c,
            Duration::from_secs(125),
            MetricsArtifact {
                completed: 100,
                request_throughput: Some(req),
                mean_tpot_ms: Some(7.5),
                ..Default::default()
            },
            path,
        )
    }

    fn context() -> SummaryContext {
        SummaryContext {
            title: "Serving Benchmark Experiment Summary".to_string(),
            generated: at(),
            workload: vec![("input_len".to_string(), "1024".to_string())],
            results_dir: PathBuf::from("/r"),
            logs_dir: PathBuf::from("/r/logs"),
        }
    }

    #[test]
    fn test_summary_lists_every_outcome_and_skip() {
        let mut agg = ReportAggregator::new().with_skipped(vec![SkippedConfiguration {
            configuration: cfg(2, Some("fp8"), false),
            reason: SkipRule::fp8_without_eager().reason,
        }]);
        agg.record(success(cfg(2, None, true), 12.5));
        agg.record(Outcome::failed(
            cfg(4, None, true),
            Duration::from_secs(310),
            &SweepError::StartupTimedOut(Duration::from_secs(300)),
        ));
        agg.set_wall_clock(Duration::from_secs(3725));

        let text = agg.render_summary(&context());
        assert!(text.contains("Generated: 2026-01-02 03:04:05"));
        assert!(text.contains("  input_len: 1024"));
        assert!(text.contains("Total Experiments: 2"));
        assert!(text.contains("Skipped: 1"));
        assert!(text.contains("Success Rate: 50.00%"));
        assert!(text.contains("Total Duration: 1h 2m 5s"));
        assert!(text.contains("  ✓ Qwen_Qwen3-4B_tp2_quant-none_eager-true (0h 2m 5s)"));
        assert!(text.contains(
            "  ✗ Qwen_Qwen3-4B_tp4_quant-none_eager-true (startup_timed_out: server not ready within 5m)"
        ));
        assert!(text.contains("  ⚠ Qwen_Qwen3-4B_tp2_quant-fp8_eager-false (known failure"));
        assert!(text.ends_with("Logs Location: /r/logs\n"));
    }

    #[test]
    fn test_summary_for_empty_sweep() {
        let text = ReportAggregator::new().render_summary(&context());
        assert!(text.contains("Total Experiments: 0"));
        assert!(text.contains("Success Rate: 0.00%"));
        assert!(!text.contains("Successful Experiments:"));
        assert!(!text.contains("Failed Experiments:"));
    }

    #[test]
    fn test_analysis_sections_and_best_call_out() {
        let mut agg = ReportAggregator::new();
        agg.record(success(cfg(4, None, true), 8.0));
        agg.record(success(cfg(2, None, true), 12.5));

        let text = agg.render_analysis(at());
        for title in [
            "OVERALL STATISTICS",
            "RESULTS BY MODEL",
            "BEST CONFIGURATIONS PER MODEL",
            "BEST CONFIGURATIONS OVERALL",
        ] {
            assert!(text.contains(title), "missing section {title}");
        }
        assert!(text.contains("Request throughput (req/s):"));
        assert!(text.contains("Highest Request Throughput: 12.50 req/s"));
        assert!(text.contains("Lowest TPOT: 7.50 ms"));
        assert!(text.contains("  File:  Qwen_Qwen3-4B_tp2_quant-none_eager-true_results.json"));
        // absent metric: no stats block, N/A in the table
        assert!(!text.contains("Mean TTFT (ms):"));
        assert!(text.contains("N/A"));

        // ranked best first within the model
        let first = text.find("  1. TP 2  Quant none  Eager true: 12.50").unwrap();
        let second = text.find("  2. TP 4  Quant none  Eager true: 8.00").unwrap();
        assert!(first < second);
        assert!(text.contains("RANKINGS BY MODEL"));

        // rows sorted by tp even though tp4 was recorded first
        let tp2 = text.find("\n2    none").unwrap();
        let tp4 = text.find("\n4    none").unwrap();
        assert!(tp2 < tp4);
    }

    #[test]
    fn test_analysis_for_all_failed_sweep() {
        let mut agg = ReportAggregator::new();
        agg.record(Outcome::failed(
            cfg(2, None, true),
            Duration::from_secs(5),
            &SweepError::BenchmarkUnhealthy {
                completed: 0,
                failed: 0,
            },
        ));
        let text = agg.render_analysis(at());
        assert!(text.contains("Total successful experiments: 0"));
        assert!(!text.contains("Min:"));
        assert!(text.contains("✗ benchmark_unhealthy"));
        assert!(text.contains("No successful configurations"));
    }
}
