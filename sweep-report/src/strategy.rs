//! Metric strategy table.
//!
//! Each headline metric is described once (how to read it, which direction
//! wins, how to label it) and every ranking or statistics pass iterates this
//! table.

use sweep_common::{Metric, MetricsArtifact};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    HigherIsBetter,
    LowerIsBetter,
}

impl Direction {
    /// Whether `candidate` strictly beats `incumbent`. Ties keep the
    /// incumbent, so the first-encountered entry wins.
    pub fn beats(self, candidate: f64, incumbent: f64) -> bool {
        match self {
            Self::HigherIsBetter => candidate > incumbent,
            Self::LowerIsBetter => candidate < incumbent,
        }
    }

    pub fn superlative(self) -> &'static str {
        match self {
            Self::HigherIsBetter => "Highest",
            Self::LowerIsBetter => "Lowest",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricStrategy {
    pub metric: Metric,
    /// Label in best-configuration call-outs.
    pub label: &'static str,
    /// Label in the statistics section.
    pub stats_label: &'static str,
    pub direction: Direction,
}

impl MetricStrategy {
    pub fn extract(&self, artifact: &MetricsArtifact) -> Option<f64> {
        artifact.value(self.metric).filter(|v| !v.is_nan())
    }

    pub fn unit(&self) -> &'static str {
        self.metric.unit()
    }

    /// First entry with the best value. Entries without the metric are
    /// skipped.
    pub fn best<'a, T>(
        &self,
        entries: impl IntoIterator<Item = &'a T>,
        artifact_of: impl Fn(&T) -> Option<&MetricsArtifact>,
    ) -> Option<(&'a T, f64)>
    where
        T: 'a,
    {
        let mut best: Option<(&'a T, f64)> = None;
        for entry in entries {
            let Some(value) = artifact_of(entry).and_then(|a| self.extract(a)) else {
                continue;
            };
            match best {
                Some((_, incumbent)) if !self.direction.beats(value, incumbent) => {}
                _ => best = Some((entry, value)),
            }
        }
        best
    }

    /// Entries carrying the metric, best first. Stable, so ties keep their
    /// original order.
    pub fn rank<'a, T>(
        &self,
        entries: impl IntoIterator<Item = &'a T>,
        artifact_of: impl Fn(&T) -> Option<&MetricsArtifact>,
    ) -> Vec<(&'a T, f64)>
    where
        T: 'a,
    {
        let mut ranked: Vec<(&'a T, f64)> = entries
            .into_iter()
            .filter_map(|entry| {
                artifact_of(entry)
                    .and_then(|a| self.extract(a))
                    .map(|value| (entry, value))
            })
            .collect();
        ranked.sort_by(|(_, a), (_, b)| match self.direction {
            Direction::HigherIsBetter => b.total_cmp(a),
            Direction::LowerIsBetter => a.total_cmp(b),
        });
        ranked
    }
}

pub const METRIC_STRATEGIES: [MetricStrategy; 4] = [
    MetricStrategy {
        metric: Metric::RequestThroughput,
        label: "Request Throughput",
        stats_label: "Request throughput",
        direction: Direction::HigherIsBetter,
    },
    MetricStrategy {
        metric: Metric::OutputThroughput,
        label: "Output Throughput",
        stats_label: "Output throughput",
        direction: Direction::HigherIsBetter,
    },
    MetricStrategy {
        metric: Metric::MeanTtft,
        label: "TTFT",
        stats_label: "Mean TTFT",
        direction: Direction::LowerIsBetter,
    },
    MetricStrategy {
        metric: Metric::MeanTpot,
        label: "TPOT",
        stats_label: "Mean TPOT",
        direction: Direction::LowerIsBetter,
    },
];

pub fn strategy_for(metric: Metric) -> &'static MetricStrategy {
    match metric {
        Metric::RequestThroughput => &METRIC_STRATEGIES[0],
        Metric::OutputThroughput => &METRIC_STRATEGIES[1],
        Metric::MeanTtft => &METRIC_STRATEGIES[2],
        Metric::MeanTpot => &METRIC_STRATEGIES[3],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(req: Option<f64>, ttft: Option<f64>) -> MetricsArtifact {
        MetricsArtifact {
            completed: 10,
            request_throughput: req,
            mean_ttft_ms: ttft,
            ..Default::default()
        }
    }

    #[test]
    fn test_table_covers_every_metric_once() {
        for metric in Metric::ALL {
            assert_eq!(strategy_for(metric).metric, metric);
        }
    }

    #[test]
    fn test_best_respects_direction() {
        let entries = [
            artifact(Some(3.0), Some(50.0)),
            artifact(Some(9.0), Some(80.0)),
            artifact(None, Some(20.0)),
        ];
        let req = strategy_for(Metric::RequestThroughput);
        let (best, value) = req.best(&entries, |a| Some(a)).unwrap();
        assert_eq!(value, 9.0);
        assert!(std::ptr::eq(best, &entries[1]));

        let ttft = strategy_for(Metric::MeanTtft);
        let (best, value) = ttft.best(&entries, |a| Some(a)).unwrap();
        assert_eq!(value, 20.0);
        assert!(std::ptr::eq(best, &entries[2]));
    }

    #[test]
    fn test_ties_go_to_first_encountered() {
        let entries = [artifact(Some(5.0), None), artifact(Some(5.0), None)];
        let req = strategy_for(Metric::RequestThroughput);
        let (best, _) = req.best(&entries, |a| Some(a)).unwrap();
        assert!(std::ptr::eq(best, &entries[0]));

        let ranked = req.rank(&entries, |a| Some(a));
        assert!(std::ptr::eq(ranked[0].0, &entries[0]));
    }

    #[test]
    fn test_best_none_when_metric_absent() {
        let entries = [artifact(None, None)];
        let tpot = strategy_for(Metric::MeanTpot);
        assert!(tpot.best(&entries, |a| Some(a)).is_none());
        assert!(tpot.rank(&entries, |a| Some(a)).is_empty());
    }

    #[test]
    fn test_rank_orders_lower_is_better() {
        let entries = [
            artifact(None, Some(30.0)),
            artifact(None, Some(10.0)),
            artifact(None, Some(20.0)),
        ];
        let ranked = strategy_for(Metric::MeanTtft).rank(&entries, |a| Some(a));
        let values: Vec<f64> = ranked.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![10.0, 20.0, 30.0]);
    }
}
