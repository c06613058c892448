use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use crosswind_core::prelude::ConfigError;
use crosswind_summary_model::ScenarioSettings;
use futures::future::BoxFuture;

use crate::cli::CrosswindCli;
use crate::context::{IterationContext, UserValuesConstraint};
use crate::options::{RunFile, ScenarioOptions, CONSTANT_ARRIVAL_RATE};
use crate::types::IterationResult;

/// An iteration function: one pass of scenario logic, run with a borrowed slot.
///
/// Write these as plain functions that box an async block:
///
/// ```rust
/// use crosswind_runner::prelude::*;
///
/// #[derive(Debug, Default)]
/// struct Values;
///
/// impl UserValuesConstraint for Values {}
///
/// fn iteration(_ctx: &mut IterationContext<Values>) -> BoxFuture<'_, IterationResult> {
///     Box::pin(async move { Ok(check(&200).that("status is 200", |s| *s == 200).finish()) })
/// }
///
/// let _: IterationFn<Values> = iteration;
/// ```
pub type IterationFn<S> = for<'a> fn(&'a mut IterationContext<S>) -> BoxFuture<'a, IterationResult>;

/// The iteration function used when a scenario does not name one.
pub const DEFAULT_EXEC: &str = "default";

pub const DEFAULT_TIME_UNIT: Duration = Duration::from_secs(1);
pub const DEFAULT_GRACEFUL_STOP: Duration = Duration::from_secs(30);
pub const DEFAULT_ITERATION_TIMEOUT: Duration = Duration::from_secs(60);

/// The validated, immutable configuration of one constant-arrival-rate scenario.
pub struct ScenarioConfig<S: UserValuesConstraint> {
    pub name: String,
    /// Name of the iteration function, for reporting.
    pub exec: String,
    pub iteration_fn: IterationFn<S>,
    /// Iterations started per `time_unit`.
    pub rate: u64,
    pub time_unit: Duration,
    pub duration: Duration,
    /// The number of slots, which is also the most iterations that can run at once.
    pub pre_allocated_slots: usize,
    pub start_time: Duration,
    pub graceful_stop: Duration,
    pub iteration_timeout: Duration,
    pub max_iterations: Option<u64>,
}

impl<S: UserValuesConstraint> Clone for ScenarioConfig<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            exec: self.exec.clone(),
            iteration_fn: self.iteration_fn,
            rate: self.rate,
            time_unit: self.time_unit,
            duration: self.duration,
            pre_allocated_slots: self.pre_allocated_slots,
            start_time: self.start_time,
            graceful_stop: self.graceful_stop,
            iteration_timeout: self.iteration_timeout,
            max_iterations: self.max_iterations,
        }
    }
}

impl<S: UserValuesConstraint> std::fmt::Debug for ScenarioConfig<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScenarioConfig")
            .field("name", &self.name)
            .field("exec", &self.exec)
            .field("rate", &self.rate)
            .field("time_unit", &self.time_unit)
            .field("duration", &self.duration)
            .field("pre_allocated_slots", &self.pre_allocated_slots)
            .field("start_time", &self.start_time)
            .field("graceful_stop", &self.graceful_stop)
            .field("iteration_timeout", &self.iteration_timeout)
            .field("max_iterations", &self.max_iterations)
            .finish()
    }
}

impl<S: UserValuesConstraint> ScenarioConfig<S> {
    /// A scenario running `iteration_fn` once per second for one second with a single slot. Use
    /// the `with_*` methods to configure it.
    pub fn new(name: &str, iteration_fn: IterationFn<S>) -> Self {
        Self {
            name: name.to_string(),
            exec: DEFAULT_EXEC.to_string(),
            iteration_fn,
            rate: 1,
            time_unit: DEFAULT_TIME_UNIT,
            duration: Duration::from_secs(1),
            pre_allocated_slots: 1,
            start_time: Duration::ZERO,
            graceful_stop: DEFAULT_GRACEFUL_STOP,
            iteration_timeout: DEFAULT_ITERATION_TIMEOUT,
            max_iterations: None,
        }
    }

    pub fn with_exec_name(mut self, exec: &str) -> Self {
        self.exec = exec.to_string();
        self
    }

    pub fn with_rate(mut self, rate: u64, time_unit: Duration) -> Self {
        self.rate = rate;
        self.time_unit = time_unit;
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_pre_allocated_slots(mut self, pre_allocated_slots: usize) -> Self {
        self.pre_allocated_slots = pre_allocated_slots;
        self
    }

    pub fn with_start_time(mut self, start_time: Duration) -> Self {
        self.start_time = start_time;
        self
    }

    pub fn with_graceful_stop(mut self, graceful_stop: Duration) -> Self {
        self.graceful_stop = graceful_stop;
        self
    }

    pub fn with_iteration_timeout(mut self, iteration_timeout: Duration) -> Self {
        self.iteration_timeout = iteration_timeout;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u64) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    /// Check that the scenario can be scheduled.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let name = || self.name.clone();

        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if self.rate == 0 {
            return Err(ConfigError::NonPositiveRate { name: name() });
        }
        if self.time_unit.is_zero() {
            return Err(ConfigError::NonPositiveTimeUnit { name: name() });
        }
        if self.duration.is_zero() {
            return Err(ConfigError::NonPositiveDuration { name: name() });
        }
        if self.pre_allocated_slots == 0 {
            return Err(ConfigError::NoSlots { name: name() });
        }
        if self.iteration_timeout.is_zero() {
            return Err(ConfigError::NonPositiveTimeout { name: name() });
        }
        if self.max_iterations == Some(0) {
            return Err(ConfigError::ZeroIterationLimit { name: name() });
        }
        if self.time_unit.as_nanos() < self.rate as u128 {
            return Err(ConfigError::RateTooHigh { name: name() });
        }

        Ok(())
    }

    /// The interval between two ticks.
    pub fn tick_interval(&self) -> Duration {
        let nanos = self.time_unit.as_nanos() / self.rate.max(1) as u128;
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    /// The settings of this scenario as recorded in the run summary.
    pub fn settings(&self) -> ScenarioSettings {
        ScenarioSettings {
            exec: self.exec.clone(),
            rate: self.rate,
            time_unit_ms: millis(self.time_unit),
            duration_ms: millis(self.duration),
            pre_allocated_slots: self.pre_allocated_slots,
            start_time_ms: millis(self.start_time),
            graceful_stop_ms: millis(self.graceful_stop),
            iteration_timeout_ms: millis(self.iteration_timeout),
            max_iterations: self.max_iterations,
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Check a set of scenarios before a run, as a whole and one by one.
pub fn validate_scenarios<S: UserValuesConstraint>(
    scenarios: &[ScenarioConfig<S>],
) -> Result<(), ConfigError> {
    if scenarios.is_empty() {
        return Err(ConfigError::NoScenarios);
    }

    let mut names = HashSet::new();
    for scenario in scenarios {
        scenario.validate()?;
        if !names.insert(scenario.name.as_str()) {
            return Err(ConfigError::DuplicateScenario {
                name: scenario.name.clone(),
            });
        }
    }

    Ok(())
}

/// The builder for a scenario definition.
///
/// This must be used at the start of a test to define the scenarios that you want to run.
pub struct ScenarioDefinitionBuilder<S: UserValuesConstraint> {
    /// The name of the definition, which should be unique within the test suite.
    ///
    /// Recommended value is `env!("CARGO_PKG_NAME")`.
    name: String,
    /// Command line configuration, initialised for you by [ScenarioDefinitionBuilder::new_with_init].
    cli: CrosswindCli,
    /// Iteration functions that scenarios can refer to by name through their `exec` option.
    iterations: HashMap<String, IterationFn<S>>,
    /// Scenarios in the order they were added.
    scenarios: Vec<(String, ScenarioOptions)>,
    /// Environment variables to record in the run summary.
    captured_env: Vec<String>,
}

pub struct ScenarioDefinition<S: UserValuesConstraint> {
    pub name: String,
    pub cli: CrosswindCli,
    pub scenarios: Vec<ScenarioConfig<S>>,
    pub captured_env: Vec<String>,
}

impl<S: UserValuesConstraint> ScenarioDefinitionBuilder<S> {
    /// Initialise a new scenario definition from the definition name and command line arguments.
    /// Also initialises logging.
    pub fn new_with_init(name: &str) -> Self {
        Self::new(name, crate::init::init())
    }

    /// Initialise a new scenario definition with an existing command line configuration.
    pub fn new(name: &str, cli: CrosswindCli) -> Self {
        Self {
            name: name.to_string(),
            cli,
            iterations: HashMap::new(),
            scenarios: Vec::new(),
            captured_env: Vec::new(),
        }
    }

    /// Register the iteration function used by scenarios that do not set `exec`.
    pub fn use_iteration(self, iteration_fn: IterationFn<S>) -> Self {
        self.use_named_iteration(DEFAULT_EXEC, iteration_fn)
    }

    /// Register an iteration function that scenarios can select with their `exec` option.
    pub fn use_named_iteration(mut self, name: &str, iteration_fn: IterationFn<S>) -> Self {
        let previous = self.iterations.insert(name.to_string(), iteration_fn);

        if previous.is_some() {
            panic!("Iteration function [{}] is already defined", name);
        }

        self
    }

    /// Add a scenario. Adding a scenario with the same name again merges the options.
    pub fn with_scenario(mut self, name: &str, options: ScenarioOptions) -> Self {
        match self.scenarios.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => existing.merge(options),
            None => self.scenarios.push((name.to_string(), options)),
        }
        self
    }

    /// Record the value of an environment variable in the run summary, if it is set.
    pub fn capture_env(mut self, key: &str) -> Self {
        self.captured_env.push(key.to_string());
        self
    }

    /// Resolve the definition into validated scenarios.
    ///
    /// Options from the run file given on the command line override the options in code and may
    /// add scenarios. The command line duration and grace period then override every scenario.
    pub(crate) fn build(self) -> Result<ScenarioDefinition<S>, ConfigError> {
        let mut scenarios = self.scenarios;

        if let Some(path) = &self.cli.config {
            let run_file = RunFile::load(path)?;
            for (name, options) in run_file.scenarios {
                match scenarios.iter_mut().find(|(n, _)| *n == name) {
                    Some((_, existing)) => existing.merge(options),
                    None => scenarios.push((name, options)),
                }
            }
        }

        let configs = scenarios
            .into_iter()
            .map(|(name, options)| resolve(&name, options, &self.iterations, &self.cli))
            .collect::<Result<Vec<_>, _>>()?;

        validate_scenarios(&configs)?;

        Ok(ScenarioDefinition {
            name: self.name,
            cli: self.cli,
            scenarios: configs,
            captured_env: self.captured_env,
        })
    }
}

impl<S: UserValuesConstraint> ScenarioDefinition<S> {
    pub fn settings(&self) -> BTreeMap<String, ScenarioSettings> {
        self.scenarios
            .iter()
            .map(|s| (s.name.clone(), s.settings()))
            .collect()
    }

    /// How long the run takes if no scenario is stopped early, not counting graceful stops.
    pub fn planned_runtime(&self) -> Duration {
        self.scenarios
            .iter()
            .map(|s| s.start_time + s.duration)
            .max()
            .unwrap_or_default()
    }
}

fn resolve<S: UserValuesConstraint>(
    name: &str,
    options: ScenarioOptions,
    iterations: &HashMap<String, IterationFn<S>>,
    cli: &CrosswindCli,
) -> Result<ScenarioConfig<S>, ConfigError> {
    if let Some(executor) = &options.executor {
        if executor != CONSTANT_ARRIVAL_RATE {
            return Err(ConfigError::UnsupportedExecutor {
                name: name.to_string(),
                executor: executor.clone(),
            });
        }
    }

    let exec = options.exec.unwrap_or_else(|| DEFAULT_EXEC.to_string());
    let iteration_fn = *iterations
        .get(&exec)
        .ok_or_else(|| ConfigError::UnknownExec {
            name: name.to_string(),
            exec: exec.clone(),
        })?;

    let rate = options.rate.ok_or_else(|| ConfigError::MissingOption {
        name: name.to_string(),
        option: "rate".to_string(),
    })?;
    let pre_allocated_slots =
        options
            .pre_allocated_vus
            .ok_or_else(|| ConfigError::MissingOption {
                name: name.to_string(),
                option: "pre_allocated_vus".to_string(),
            })?;
    let duration = match cli.duration {
        Some(duration_s) => Duration::from_secs(duration_s),
        None => options.duration.ok_or_else(|| ConfigError::MissingOption {
            name: name.to_string(),
            option: "duration".to_string(),
        })?,
    };
    let graceful_stop = match cli.grace_period {
        Some(grace_period_s) => Duration::from_secs(grace_period_s),
        None => options.graceful_stop.unwrap_or(DEFAULT_GRACEFUL_STOP),
    };

    let mut config = ScenarioConfig::new(name, iteration_fn)
        .with_exec_name(&exec)
        .with_rate(rate, options.time_unit.unwrap_or(DEFAULT_TIME_UNIT))
        .with_duration(duration)
        .with_pre_allocated_slots(pre_allocated_slots)
        .with_start_time(options.start_time.unwrap_or_default())
        .with_graceful_stop(graceful_stop)
        .with_iteration_timeout(
            options
                .iteration_timeout
                .unwrap_or(DEFAULT_ITERATION_TIMEOUT),
        );
    if let Some(iterations) = options.iterations {
        config = config.with_max_iterations(iterations);
    }

    Ok(config)
}
