use crate::outcome::{IterationOutcome, OutcomeStatus};
use crosswind_summary_model::{
    CheckSummary, LatencySummary, MetricsSummary, OutcomeCounts, ScenarioMetrics,
};
use hdrhistogram::Histogram;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

/// Highest latency the histograms can tell apart, one hour in microseconds. Slower iterations are
/// clamped to it.
const MAX_TRACKABLE_LATENCY_US: u64 = 60 * 60 * 1000 * 1000;

const LATENCY_SIGNIFICANT_FIGURES: u8 = 3;

const DEFAULT_SHARD_COUNT: usize = 16;

/// Collects iteration outcomes from every scenario of a run.
///
/// Each scenario owns a fixed number of shards, each a separately locked partial aggregate.
/// Producers pick a shard with a key, normally the id of the slot that ran the iteration, so that
/// concurrent producers rarely contend. Shards are only merged when a [MetricsAggregator::snapshot]
/// is taken.
///
/// One aggregator belongs to one run. Create a new one for every run rather than sharing it, so
/// that runs in the same process never see each other's outcomes.
pub struct MetricsAggregator {
    shard_count: usize,
    scenarios: RwLock<BTreeMap<String, ScenarioRecorder>>,
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_SHARD_COUNT)
    }
}

impl MetricsAggregator {
    pub fn new(shard_count: usize) -> Self {
        Self {
            shard_count: shard_count.max(1),
            scenarios: RwLock::new(BTreeMap::new()),
        }
    }

    /// Get the recorder for a scenario, creating it if this is the first time the name is seen.
    ///
    /// Runners should register once and keep the recorder, which avoids the name lookup on every
    /// outcome.
    pub fn register(&self, scenario_name: &str) -> ScenarioRecorder {
        if let Some(recorder) = self.scenarios.read().get(scenario_name) {
            return recorder.clone();
        }

        self.scenarios
            .write()
            .entry(scenario_name.to_string())
            .or_insert_with(|| ScenarioRecorder::new(self.shard_count))
            .clone()
    }

    /// Record an outcome for the named scenario.
    pub fn record(&self, scenario_name: &str, outcome: &IterationOutcome) {
        self.register(scenario_name).record(0, outcome);
    }

    /// Take a point in time view of everything recorded so far.
    ///
    /// All shards of all scenarios are locked together before merging, so an outcome is either
    /// entirely included or not at all.
    pub fn snapshot(&self) -> MetricsSummary {
        let scenarios = self.scenarios.read();

        let guards = scenarios
            .iter()
            .map(|(name, recorder)| {
                (
                    name,
                    recorder
                        .shards
                        .iter()
                        .map(|shard| shard.lock())
                        .collect::<Vec<_>>(),
                )
            })
            .collect::<Vec<_>>();

        let mut total = PartialAggregate::new();
        let mut summary = MetricsSummary::default();
        for (name, shards) in &guards {
            let mut merged = PartialAggregate::new();
            for shard in shards {
                merged.merge(shard);
            }
            total.merge(&merged);
            summary.scenarios.insert(name.to_string(), merged.to_metrics());
        }
        summary.total = total.to_metrics();

        summary
    }
}

/// Records outcomes for a single scenario. Cheap to clone.
#[derive(Clone)]
pub struct ScenarioRecorder {
    shards: Arc<[Mutex<PartialAggregate>]>,
}

impl ScenarioRecorder {
    fn new(shard_count: usize) -> Self {
        Self {
            shards: (0..shard_count)
                .map(|_| Mutex::new(PartialAggregate::new()))
                .collect(),
        }
    }

    /// Record one outcome. The `shard_key` only spreads contention, any value is correct.
    pub fn record(&self, shard_key: usize, outcome: &IterationOutcome) {
        self.shard(shard_key).lock().add(outcome);
    }

    /// Record how late a tick fired compared to its scheduled instant.
    pub fn record_schedule_lag(&self, shard_key: usize, lag: Duration) {
        let mut shard = self.shard(shard_key).lock();
        if lag > shard.max_schedule_lag {
            shard.max_schedule_lag = lag;
        }
    }

    fn shard(&self, shard_key: usize) -> &Mutex<PartialAggregate> {
        &self.shards[shard_key % self.shards.len()]
    }
}

struct PartialAggregate {
    outcomes: OutcomeCounts,
    checks: HashMap<String, CheckSummary>,
    errors: HashMap<String, u64>,
    latency: LatencyHistogram,
    request_latency: LatencyHistogram,
    max_schedule_lag: Duration,
}

impl PartialAggregate {
    fn new() -> Self {
        Self {
            outcomes: OutcomeCounts::default(),
            checks: HashMap::new(),
            errors: HashMap::new(),
            latency: LatencyHistogram::new(),
            request_latency: LatencyHistogram::new(),
            max_schedule_lag: Duration::ZERO,
        }
    }

    fn add(&mut self, outcome: &IterationOutcome) {
        match outcome.status {
            OutcomeStatus::Success => self.outcomes.success += 1,
            OutcomeStatus::CheckFailure => self.outcomes.check_failure += 1,
            OutcomeStatus::ExecutionError => self.outcomes.execution_error += 1,
            OutcomeStatus::Timeout => self.outcomes.timeout += 1,
            OutcomeStatus::Dropped => {
                self.outcomes.dropped += 1;
                // Nothing ran so there is no latency or check to record.
                return;
            }
        }

        self.latency.record(outcome.duration);
        for duration in &outcome.request_durations {
            self.request_latency.record(*duration);
        }

        for check in &outcome.checks {
            let entry = self.checks.entry(check.name.clone()).or_default();
            if check.passed {
                entry.passes += 1;
            } else {
                entry.fails += 1;
            }
        }

        if let Some(error) = &outcome.error {
            *self.errors.entry(error.clone()).or_default() += 1;
        }
    }

    fn merge(&mut self, other: &PartialAggregate) {
        self.outcomes.merge(&other.outcomes);

        for (name, check) in &other.checks {
            let entry = self.checks.entry(name.clone()).or_default();
            entry.passes += check.passes;
            entry.fails += check.fails;
        }

        for (error, count) in &other.errors {
            *self.errors.entry(error.clone()).or_default() += count;
        }

        self.latency.merge(&other.latency);
        self.request_latency.merge(&other.request_latency);

        if other.max_schedule_lag > self.max_schedule_lag {
            self.max_schedule_lag = other.max_schedule_lag;
        }
    }

    fn to_metrics(&self) -> ScenarioMetrics {
        ScenarioMetrics {
            outcomes: self.outcomes,
            checks: self.checks.clone().into_iter().collect(),
            errors: self.errors.clone().into_iter().collect(),
            latency: self.latency.summary(),
            request_latency: self.request_latency.summary(),
            max_schedule_lag_ms: self.max_schedule_lag.as_secs_f64() * 1000.0,
        }
    }
}

/// A latency histogram in microseconds, with the exact sum kept alongside for the mean.
struct LatencyHistogram {
    histogram: Histogram<u64>,
    sum_us: u128,
}

impl LatencyHistogram {
    fn new() -> Self {
        Self {
            histogram: Histogram::new_with_bounds(
                1,
                MAX_TRACKABLE_LATENCY_US,
                LATENCY_SIGNIFICANT_FIGURES,
            )
            .expect("Latency histogram bounds are valid"),
            sum_us: 0,
        }
    }

    fn record(&mut self, duration: Duration) {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        self.histogram
            .saturating_record(micros.clamp(1, MAX_TRACKABLE_LATENCY_US));
        self.sum_us += micros as u128;
    }

    fn merge(&mut self, other: &LatencyHistogram) {
        if let Err(e) = self.histogram.add(&other.histogram) {
            log::warn!("Failed to merge latency histograms: {e:?}");
        }
        self.sum_us += other.sum_us;
    }

    fn summary(&self) -> LatencySummary {
        let count = self.histogram.len();
        if count == 0 {
            return LatencySummary::default();
        }

        LatencySummary {
            count,
            min_ms: micros_to_ms(self.histogram.min()),
            mean_ms: self.sum_us as f64 / count as f64 / 1000.0,
            p50_ms: micros_to_ms(self.histogram.value_at_quantile(0.5)),
            p90_ms: micros_to_ms(self.histogram.value_at_quantile(0.9)),
            p95_ms: micros_to_ms(self.histogram.value_at_quantile(0.95)),
            p99_ms: micros_to_ms(self.histogram.value_at_quantile(0.99)),
            max_ms: micros_to_ms(self.histogram.max()),
        }
    }
}

fn micros_to_ms(micros: u64) -> f64 {
    micros as f64 / 1000.0
}
