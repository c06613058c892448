use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Number of outcomes per terminal status.
///
/// Every tick generated by a scenario ends up in exactly one of these counters, so
/// [OutcomeCounts::total] is the number of ticks the scenario generated.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub success: u64,
    pub check_failure: u64,
    pub execution_error: u64,
    pub timeout: u64,
    pub dropped: u64,
}

impl OutcomeCounts {
    pub fn total(&self) -> u64 {
        self.success + self.check_failure + self.execution_error + self.timeout + self.dropped
    }

    /// The number of iterations that were actually started, that is all outcomes except drops.
    pub fn executed(&self) -> u64 {
        self.total() - self.dropped
    }

    pub fn merge(&mut self, other: &OutcomeCounts) {
        self.success += other.success;
        self.check_failure += other.check_failure;
        self.execution_error += other.execution_error;
        self.timeout += other.timeout;
        self.dropped += other.dropped;
    }

    /// Fraction of all outcomes that ended with an execution error. Zero when nothing was recorded.
    pub fn error_rate(&self) -> f64 {
        ratio(self.execution_error, self.total())
    }

    pub fn timeout_rate(&self) -> f64 {
        ratio(self.timeout, self.total())
    }

    pub fn drop_rate(&self) -> f64 {
        ratio(self.dropped, self.total())
    }

    pub fn success_rate(&self) -> f64 {
        ratio(self.success, self.total())
    }
}

/// Pass and fail counts for one named check.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckSummary {
    pub passes: u64,
    pub fails: u64,
}

impl CheckSummary {
    pub fn pass_rate(&self) -> f64 {
        ratio(self.passes, self.passes + self.fails)
    }
}

/// Approximate latency distribution, in milliseconds.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct LatencySummary {
    pub count: u64,
    pub min_ms: f64,
    pub mean_ms: f64,
    pub p50_ms: f64,
    pub p90_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
}

/// Aggregated metrics for one scenario, or for the whole run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScenarioMetrics {
    pub outcomes: OutcomeCounts,
    /// Results per check name.
    pub checks: BTreeMap<String, CheckSummary>,
    /// Execution error and timeout counts per error description.
    pub errors: BTreeMap<String, u64>,
    /// Wall clock duration of executed iterations, think time included.
    pub latency: LatencySummary,
    /// Duration of the individual requests made by iterations.
    #[serde(default)]
    pub request_latency: LatencySummary,
    /// The largest observed delay between a tick's scheduled instant and the moment it fired.
    pub max_schedule_lag_ms: f64,
}

impl ScenarioMetrics {
    /// Fraction of evaluated checks that passed, or `None` if no check was evaluated.
    pub fn check_pass_rate(&self) -> Option<f64> {
        let (passes, fails) = self
            .checks
            .values()
            .fold((0, 0), |(p, f), c| (p + c.passes, f + c.fails));

        if passes + fails == 0 {
            None
        } else {
            Some(ratio(passes, passes + fails))
        }
    }
}

/// A point in time view of the metrics of a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetricsSummary {
    pub scenarios: BTreeMap<String, ScenarioMetrics>,
    pub total: ScenarioMetrics,
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_totals_include_drops() {
        let counts = OutcomeCounts {
            success: 5,
            check_failure: 1,
            execution_error: 2,
            timeout: 1,
            dropped: 11,
        };

        assert_eq!(20, counts.total());
        assert_eq!(9, counts.executed());
        assert_eq!(0.55, counts.drop_rate());
        assert_eq!(0.1, counts.error_rate());
    }

    #[test]
    fn empty_counts_have_zero_rates() {
        let counts = OutcomeCounts::default();
        assert_eq!(0.0, counts.error_rate());
        assert_eq!(0.0, counts.drop_rate());
    }

    #[test]
    fn check_pass_rate_is_over_all_checks() {
        let mut metrics = ScenarioMetrics::default();
        assert_eq!(None, metrics.check_pass_rate());

        metrics.checks.insert(
            "status is 200".to_string(),
            CheckSummary {
                passes: 3,
                fails: 1,
            },
        );
        metrics.checks.insert(
            "body is json".to_string(),
            CheckSummary {
                passes: 4,
                fails: 0,
            },
        );

        assert_eq!(Some(7.0 / 8.0), metrics.check_pass_rate());
    }

    #[test]
    fn metrics_without_request_latency_still_load() {
        let mut value = serde_json::to_value(ScenarioMetrics::default()).unwrap();
        value.as_object_mut().unwrap().remove("request_latency");

        let metrics: ScenarioMetrics = serde_json::from_value(value).unwrap();
        assert_eq!(ScenarioMetrics::default(), metrics);
    }
}
