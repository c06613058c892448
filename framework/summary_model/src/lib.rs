mod metrics;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use sha3::Digest;
use std::collections::{BTreeMap, HashMap};
use std::io::{BufRead, Read, Write};
use std::path::PathBuf;

pub use metrics::{CheckSummary, LatencySummary, MetricsSummary, OutcomeCounts, ScenarioMetrics};

/// The configuration a scenario ran with, as recorded in the summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScenarioSettings {
    /// Name of the iteration function the scenario executed
    pub exec: String,
    /// Iterations started per time unit
    pub rate: u64,
    pub time_unit_ms: u64,
    pub duration_ms: u64,
    pub pre_allocated_slots: usize,
    pub start_time_ms: u64,
    pub graceful_stop_ms: u64,
    pub iteration_timeout_ms: u64,
    pub max_iterations: Option<u64>,
}

/// Summary of a run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    /// The unique run id
    ///
    /// Chosen by the runner unless provided on the command line. Unique for each run.
    pub run_id: String,
    /// The name of the scenario definition that was run
    pub definition_name: String,
    /// The time the run started
    ///
    /// This is a Unix timestamp in seconds.
    pub started_at: i64,
    /// How long the run actually took, in milliseconds, including the graceful stop.
    pub elapsed_ms: u64,
    /// The configuration of each scenario, by scenario name
    pub scenarios: BTreeMap<String, ScenarioSettings>,
    /// Environment variables set for the run
    ///
    /// This won't capture all environment variables. Just the ones the scenario definition
    /// declares as relevant, such as the base URLs of the compared services.
    pub env: HashMap<String, String>,
    /// Final metrics of the run
    pub metrics: MetricsSummary,
    /// Whether the run met all of its thresholds
    pub passed: bool,
    /// A description of every threshold that was not met
    pub violations: Vec<String>,
    /// The version of Crosswind that was used for this run
    pub crosswind_version: String,
}

impl RunSummary {
    /// Create a new run summary, with empty metrics and a passing result
    pub fn new(
        run_id: String,
        definition_name: String,
        started_at: i64,
        scenarios: BTreeMap<String, ScenarioSettings>,
        crosswind_version: String,
    ) -> Self {
        Self {
            run_id,
            definition_name,
            started_at,
            elapsed_ms: 0,
            scenarios,
            env: HashMap::with_capacity(0),
            metrics: MetricsSummary::default(),
            passed: true,
            violations: Vec::with_capacity(0),
            crosswind_version,
        }
    }

    /// Add an environment variable
    pub fn add_env(&mut self, key: String, value: String) {
        self.env.insert(key, value);
    }

    /// Set the final metrics and outcome of the run
    pub fn set_result(
        &mut self,
        elapsed_ms: u64,
        metrics: MetricsSummary,
        passed: bool,
        violations: Vec<String>,
    ) {
        self.elapsed_ms = elapsed_ms;
        self.metrics = metrics;
        self.passed = passed;
        self.violations = violations;
    }

    /// Compute a fingerprint for this run summary
    ///
    /// The fingerprint is intended to uniquely identify the configuration used for the run, so that
    /// results of runs with identical configuration can be grouped. It uses the
    ///     - Definition name
    ///     - Scenario settings
    ///     - Selected environment variables
    ///     - Crosswind version
    ///
    /// The fingerprint is computed using [sha3::Sha3_256].
    pub fn fingerprint(&self) -> String {
        let mut hasher = sha3::Sha3_256::new();
        Digest::update(&mut hasher, self.definition_name.as_bytes());
        for (name, settings) in &self.scenarios {
            Digest::update(&mut hasher, name.as_bytes());
            Digest::update(&mut hasher, settings.exec.as_bytes());
            Digest::update(&mut hasher, settings.rate.to_le_bytes());
            Digest::update(&mut hasher, settings.time_unit_ms.to_le_bytes());
            Digest::update(&mut hasher, settings.duration_ms.to_le_bytes());
            Digest::update(&mut hasher, settings.pre_allocated_slots.to_le_bytes());
            Digest::update(&mut hasher, settings.start_time_ms.to_le_bytes());
            Digest::update(&mut hasher, settings.graceful_stop_ms.to_le_bytes());
            Digest::update(&mut hasher, settings.iteration_timeout_ms.to_le_bytes());
            if let Some(max_iterations) = settings.max_iterations {
                Digest::update(&mut hasher, max_iterations.to_le_bytes());
            }
        }
        self.env
            .iter()
            .sorted_by_key(|(k, _)| k.to_owned())
            .for_each(|(k, v)| {
                Digest::update(&mut hasher, k.as_bytes());
                Digest::update(&mut hasher, v.as_bytes());
            });
        Digest::update(&mut hasher, self.crosswind_version.as_bytes());

        format!("{:x}", hasher.finalize())
    }
}

/// Append the run summary to a file
///
/// The summary will be serialized to JSON and output as a single line followed by a newline. The
/// recommended file extension is `.jsonl`.
pub fn append_run_summary(run_summary: &RunSummary, path: PathBuf) -> anyhow::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)?;
    store_run_summary(run_summary, &mut file)?;
    file.write_all(b"\n")?;
    Ok(())
}

/// Serialize the run summary to a writer
pub fn store_run_summary<W: Write>(run_summary: &RunSummary, writer: &mut W) -> anyhow::Result<()> {
    serde_json::to_writer(writer, run_summary)?;
    Ok(())
}

/// Load a run summary from a reader
pub fn load_run_summary<R: Read>(reader: R) -> anyhow::Result<RunSummary> {
    let reader = std::io::BufReader::new(reader);
    let run_summary: RunSummary = serde_json::from_reader(reader)?;
    Ok(run_summary)
}

/// Load run summaries from a file
///
/// The file should contain one JSON object per line. This is the format produced by
/// [append_run_summary].
pub fn load_summary_runs(path: PathBuf) -> anyhow::Result<Vec<RunSummary>> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let mut runs = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let run: RunSummary = serde_json::from_str(&line)?;
        runs.push(run);
    }
    Ok(runs)
}
