//! Outcome collection, statistics and rankings.

use crate::stats::Stats;
use crate::strategy::{METRIC_STRATEGIES, MetricStrategy};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use sweep_common::{Outcome, SkippedConfiguration};

/// Headline counts for a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SweepTotals {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Percentage; zero when nothing ran.
    pub success_rate: f64,
    pub duration: Duration,
}

/// Exclusive owner of a sweep's outcomes.
#[derive(Debug, Default)]
pub struct ReportAggregator {
    outcomes: Vec<Outcome>,
    skipped: Vec<SkippedConfiguration>,
    wall_clock: Option<Duration>,
}

impl ReportAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_skipped(mut self, skipped: Vec<SkippedConfiguration>) -> Self {
        self.skipped = skipped;
        self
    }

    pub fn record(&mut self, outcome: Outcome) {
        self.outcomes.push(outcome);
    }

    /// Sweep wall-clock time. Without it, totals fall back to the sum of the
    /// per-configuration durations.
    pub fn set_wall_clock(&mut self, duration: Duration) {
        self.wall_clock = Some(duration);
    }

    pub fn outcomes(&self) -> &[Outcome] {
        &self.outcomes
    }

    pub fn skipped(&self) -> &[SkippedConfiguration] {
        &self.skipped
    }

    pub fn successes(&self) -> impl Iterator<Item = &Outcome> {
        self.outcomes.iter().filter(|o| o.success())
    }

    pub fn failures(&self) -> impl Iterator<Item = &Outcome> {
        self.outcomes.iter().filter(|o| !o.success())
    }

    /// True when every recorded configuration succeeded (vacuously true for
    /// an empty sweep).
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(Outcome::success)
    }

    pub fn totals(&self) -> SweepTotals {
        let total = self.outcomes.len();
        let succeeded = self.successes().count();
        let success_rate = if total == 0 {
            0.0
        } else {
            succeeded as f64 / total as f64 * 100.0
        };
        let duration = self
            .wall_clock
            .unwrap_or_else(|| self.outcomes.iter().map(Outcome::duration).sum());

        SweepTotals {
            total,
            succeeded,
            failed: total - succeeded,
            skipped: self.skipped.len(),
            success_rate,
            duration,
        }
    }

    /// Statistics per metric over successful outcomes reporting it. Metrics
    /// with no data points are left out.
    pub fn statistics(&self) -> Vec<(&'static MetricStrategy, Stats)> {
        METRIC_STRATEGIES
            .iter()
            .filter_map(|strategy| {
                let values: Vec<f64> = self
                    .successes()
                    .filter_map(|o| o.metrics().and_then(|m| strategy.extract(m)))
                    .collect();
                Stats::from_values(&values).map(|stats| (strategy, stats))
            })
            .collect()
    }

    /// Outcomes grouped by model, models sorted, insertion order kept inside
    /// each group.
    pub fn by_model(&self) -> BTreeMap<&str, Vec<&Outcome>> {
        let mut groups: BTreeMap<&str, Vec<&Outcome>> = BTreeMap::new();
        for outcome in &self.outcomes {
            groups
                .entry(outcome.configuration().model())
                .or_default()
                .push(outcome);
        }
        groups
    }

    /// Best successful outcome for `strategy`, sweep-wide or within `model`.
    pub fn best<'a>(
        &'a self,
        strategy: &MetricStrategy,
        model: Option<&'a str>,
    ) -> Option<(&'a Outcome, f64)> {
        strategy.best(self.scoped(model), Outcome::metrics)
    }

    /// Successful outcomes ranked by `strategy`, best first.
    pub fn ranking<'a>(
        &'a self,
        strategy: &MetricStrategy,
        model: Option<&'a str>,
    ) -> Vec<(&'a Outcome, f64)> {
        strategy.rank(self.scoped(model), Outcome::metrics)
    }

    /// Sweep-wide best outcome for every metric that has data.
    pub fn best_overall(&self) -> Vec<(&'static MetricStrategy, &Outcome, f64)> {
        METRIC_STRATEGIES
            .iter()
            .filter_map(|s| self.best(s, None).map(|(o, v)| (s, o, v)))
            .collect()
    }

    fn scoped<'a>(&'a self, model: Option<&'a str>) -> impl Iterator<Item = &'a Outcome> + 'a {
        self.successes()
            .filter(move |o| model.is_none_or(|m| o.configuration().model() == m))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::strategy_for;
    use std::num::NonZeroU32;
    use std::path::PathBuf;
    use sweep_common::{Configuration, Metric, MetricsArtifact, SweepError};

    fn config(model: &str, tp: u32) -> Configuration {
        Configuration::new(model, NonZeroU32::new(tp).unwrap(), None, true)
    }

    fn ok(model: &str, tp: u32, req: f64, ttft: Option<f64>) -> Outcome {
        let cfg = config(model, tp);
        let path = PathBuf::from(format!("{}_results.json", cfg.name()));
        Outcome::succeeded(
            cfg,
            Duration::from_secs(60),
            MetricsArtifact {
                completed: 100,
                failed: 0,
                request_throughput: Some(req),
                mean_ttft_ms: ttft,
                ..Default::default()
            },
            path,
        )
    }

    fn failed(model: &str, tp: u32) -> Outcome {
        Outcome::failed(
            config(model, tp),
            Duration::from_secs(30),
            &SweepError::StartupTimedOut(Duration::from_secs(300)),
        )
    }

    #[test]
    fn test_totals_and_success_rate() {
        let mut agg = ReportAggregator::new();
        agg.record(ok("a", 2, 1.0, None));
        agg.record(failed("a", 4));
        agg.record(ok("b", 2, 2.0, None));

        let totals = agg.totals();
        assert_eq!(totals.total, 3);
        assert_eq!(totals.succeeded, 2);
        assert_eq!(totals.failed, 1);
        assert!((totals.success_rate - 66.666).abs() < 0.01);
        assert_eq!(totals.duration, Duration::from_secs(150));
        assert!(!agg.all_succeeded());
    }

    #[test]
    fn test_empty_sweep_is_valid() {
        let agg = ReportAggregator::new();
        let totals = agg.totals();
        assert_eq!(totals.total, 0);
        assert_eq!(totals.success_rate, 0.0);
        assert!(agg.statistics().is_empty());
        assert!(agg.best_overall().is_empty());
        assert!(agg.all_succeeded());
    }

    #[test]
    fn test_all_failed_sweep_omits_statistics() {
        let mut agg = ReportAggregator::new();
        agg.record(failed("a", 2));
        agg.record(failed("a", 4));
        assert!(agg.statistics().is_empty());
        assert!(agg.best_overall().is_empty());
        assert_eq!(agg.by_model()["a"].len(), 2);
    }

    #[test]
    fn test_statistics_exclude_absent_metrics() {
        let mut agg = ReportAggregator::new();
        agg.record(ok("a", 2, 1.0, Some(40.0)));
        agg.record(ok("a", 4, 2.0, None));
        agg.record(ok("a", 8, 3.0, None));
        agg.record(ok("a", 16, 4.0, Some(20.0)));

        let stats = agg.statistics();
        let metrics: Vec<Metric> = stats.iter().map(|(s, _)| s.metric).collect();
        assert_eq!(metrics, vec![Metric::RequestThroughput, Metric::MeanTtft]);

        let (_, req) = stats[0];
        assert_eq!(req.count, 4);
        assert_eq!(req.median, 2.0);

        let (_, ttft) = stats[1];
        assert_eq!(ttft.count, 2);
        assert_eq!(ttft.mean, 30.0);
    }

    #[test]
    fn test_best_per_model_and_overall() {
        let mut agg = ReportAggregator::new();
        agg.record(ok("a", 2, 12.5, Some(90.0)));
        agg.record(ok("a", 4, 8.0, Some(40.0)));
        agg.record(ok("b", 2, 3.0, Some(10.0)));

        let req = strategy_for(Metric::RequestThroughput);
        let (best, value) = agg.best(req, None).unwrap();
        assert_eq!(value, 12.5);
        assert_eq!(best.configuration().parallelism(), 2);

        let ttft = strategy_for(Metric::MeanTtft);
        let (best_a, value) = agg.best(ttft, Some("a")).unwrap();
        assert_eq!(value, 40.0);
        assert_eq!(best_a.configuration().parallelism(), 4);

        let ranked = agg.ranking(ttft, None);
        let values: Vec<f64> = ranked.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![10.0, 40.0, 90.0]);
    }

    #[test]
    fn test_wall_clock_overrides_sum() {
        let mut agg = ReportAggregator::new();
        agg.record(ok("a", 2, 1.0, None));
        agg.set_wall_clock(Duration::from_secs(75));
        assert_eq!(agg.totals().duration, Duration::from_secs(75));
    }
}
