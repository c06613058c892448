use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crosswind_core::prelude::ConfigError;
use serde::{Deserialize, Deserializer};

/// The only executor the runner implements. Accepted in run files for readability.
pub const CONSTANT_ARRIVAL_RATE: &str = "constant-arrival-rate";

/// Options for one scenario, as given to [crate::definition::ScenarioDefinitionBuilder::with_scenario]
/// or in a run file.
///
/// Every option is optional so that a run file can override just part of a scenario defined in
/// code. Unknown keys in a run file are rejected.
///
/// ```toml
/// [scenarios.spring_list]
/// executor = "constant-arrival-rate"
/// rate = 20
/// time_unit = "1s"
/// duration = "30s"
/// pre_allocated_vus = 10
/// exec = "springList"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioOptions {
    pub executor: Option<String>,
    /// Iterations started per `time_unit`.
    pub rate: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_duration")]
    pub time_unit: Option<Duration>,
    #[serde(default, deserialize_with = "deserialize_duration")]
    pub duration: Option<Duration>,
    pub pre_allocated_vus: Option<usize>,
    /// Name of the iteration function to run. Defaults to `default`.
    pub exec: Option<String>,
    /// Delay between the start of the run and the first tick of this scenario.
    #[serde(default, deserialize_with = "deserialize_duration")]
    pub start_time: Option<Duration>,
    /// How long iterations still running at the end of the scenario may take to finish.
    #[serde(default, deserialize_with = "deserialize_duration")]
    pub graceful_stop: Option<Duration>,
    #[serde(default, deserialize_with = "deserialize_duration")]
    pub iteration_timeout: Option<Duration>,
    /// Stop the scenario after this many ticks, even if the duration has not elapsed.
    pub iterations: Option<u64>,
}

impl ScenarioOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rate(mut self, rate: u64, time_unit: Duration) -> Self {
        self.rate = Some(rate);
        self.time_unit = Some(time_unit);
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_pre_allocated_vus(mut self, pre_allocated_vus: usize) -> Self {
        self.pre_allocated_vus = Some(pre_allocated_vus);
        self
    }

    pub fn with_exec(mut self, exec: &str) -> Self {
        self.exec = Some(exec.to_string());
        self
    }

    pub fn with_start_time(mut self, start_time: Duration) -> Self {
        self.start_time = Some(start_time);
        self
    }

    pub fn with_graceful_stop(mut self, graceful_stop: Duration) -> Self {
        self.graceful_stop = Some(graceful_stop);
        self
    }

    pub fn with_iteration_timeout(mut self, iteration_timeout: Duration) -> Self {
        self.iteration_timeout = Some(iteration_timeout);
        self
    }

    pub fn with_iterations(mut self, iterations: u64) -> Self {
        self.iterations = Some(iterations);
        self
    }

    /// Overwrite every option that is set in `other`.
    pub fn merge(&mut self, other: ScenarioOptions) {
        fn take<T>(target: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *target = value;
            }
        }

        take(&mut self.executor, other.executor);
        take(&mut self.rate, other.rate);
        take(&mut self.time_unit, other.time_unit);
        take(&mut self.duration, other.duration);
        take(&mut self.pre_allocated_vus, other.pre_allocated_vus);
        take(&mut self.exec, other.exec);
        take(&mut self.start_time, other.start_time);
        take(&mut self.graceful_stop, other.graceful_stop);
        take(&mut self.iteration_timeout, other.iteration_timeout);
        take(&mut self.iterations, other.iterations);
    }
}

/// The contents of a run file passed with `--config`.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunFile {
    #[serde(default)]
    pub scenarios: BTreeMap<String, ScenarioOptions>,
}

impl RunFile {
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::InvalidRunFile {
            reason: e.to_string(),
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::InvalidRunFile {
                reason: format!("cannot read {}: {e}", path.display()),
            })?;
        Self::parse(&content)
    }
}

/// Parse a duration such as `500ms`, `1s`, `1.5s`, `2m` or `1h`.
pub fn parse_duration(value: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidDuration {
        value: value.to_string(),
    };

    let trimmed = value.trim();
    let (number, unit_nanos) = if let Some(number) = trimmed.strip_suffix("ms") {
        (number, 1e6)
    } else if let Some(number) = trimmed.strip_suffix('s') {
        (number, 1e9)
    } else if let Some(number) = trimmed.strip_suffix('m') {
        (number, 60e9)
    } else if let Some(number) = trimmed.strip_suffix('h') {
        (number, 3600e9)
    } else {
        return Err(invalid());
    };

    let number = number.trim().parse::<f64>().map_err(|_| invalid())?;
    let nanos = (number * unit_nanos).round();
    if !nanos.is_finite() || nanos < 0.0 || nanos > u64::MAX as f64 {
        return Err(invalid());
    }

    Ok(Duration::from_nanos(nanos as u64))
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)?
        .map(|value| parse_duration(&value).map_err(serde::de::Error::custom))
        .transpose()
}
