use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crosswind_core::prelude::{ConfigError, ShutdownHandle};
use crosswind_instruments::MetricsAggregator;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::context::UserValuesConstraint;
use crate::definition::{validate_scenarios, ScenarioConfig};
use crate::scenario::{run_scenario, ScenarioReport};

/// Starts scenario runners. Holds no state of its own, everything about a started run lives in
/// the [RunHandle].
pub struct Scheduler;

impl Scheduler {
    /// Validate every scenario and then start one runner task per scenario on the current tokio
    /// runtime.
    ///
    /// Nothing is started if any scenario is invalid. The runners share nothing but the
    /// aggregator, which they register their scenarios with before this returns.
    pub fn start<S: UserValuesConstraint>(
        configs: Vec<ScenarioConfig<S>>,
        aggregator: Arc<MetricsAggregator>,
    ) -> Result<RunHandle, ConfigError> {
        validate_scenarios(&configs)?;

        let run_start = Instant::now();
        let stop = ShutdownHandle::new();

        let runners = configs
            .into_iter()
            .map(|config| {
                let name = config.name.clone();
                let recorder = aggregator.register(&name);
                let running = Arc::new(AtomicBool::new(true));
                let task = tokio::spawn(run_scenario(
                    Arc::new(config),
                    run_start,
                    recorder,
                    stop.clone(),
                    running.clone(),
                ));

                RunnerHandle {
                    name,
                    running,
                    task,
                }
            })
            .collect::<Vec<_>>();

        log::info!("Started {} scenarios", runners.len());

        Ok(RunHandle {
            run_start,
            stop,
            runners,
        })
    }
}

struct RunnerHandle {
    name: String,
    running: Arc<AtomicBool>,
    task: JoinHandle<ScenarioReport>,
}

/// A started run.
///
/// Dropping the handle does not stop the run, the runners carry on until their schedules end.
pub struct RunHandle {
    run_start: Instant,
    stop: ShutdownHandle,
    runners: Vec<RunnerHandle>,
}

/// What every scenario of a run did, in the order the scenarios were configured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub scenarios: Vec<ScenarioReport>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn scenario(&self, name: &str) -> Option<&ScenarioReport> {
        self.scenarios.iter().find(|s| s.name == name)
    }
}

impl RunHandle {
    /// Whether the named scenario is still generating ticks or waiting for its iterations.
    /// Unknown names are never running.
    pub fn is_running(&self, name: &str) -> bool {
        self.runners
            .iter()
            .find(|r| r.name == name)
            .is_some_and(|r| r.running.load(Ordering::Acquire))
    }

    /// Whether any scenario is still running.
    pub fn is_any_running(&self) -> bool {
        self.runners
            .iter()
            .any(|r| r.running.load(Ordering::Acquire))
    }

    /// A handle that stops the run when signalled, for example from a Ctrl-C listener.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.stop.clone()
    }

    /// Stop generating ticks in every scenario, give running iterations each scenario's graceful
    /// stop period, interrupt whatever is left and wait for the runners to finish.
    pub async fn stop(self) -> RunReport {
        log::info!("Stopping run");
        self.stop.shutdown();
        self.wait().await
    }

    /// Wait for every scenario to finish its schedule.
    pub async fn wait(self) -> RunReport {
        let mut scenarios = Vec::with_capacity(self.runners.len());

        for runner in self.runners {
            match runner.task.await {
                Ok(report) => scenarios.push(report),
                Err(e) => {
                    log::error!("Runner for scenario [{}] failed: {:?}", runner.name, e);
                    runner.running.store(false, Ordering::Release);
                    scenarios.push(ScenarioReport {
                        name: runner.name,
                        ..Default::default()
                    });
                }
            }
        }

        RunReport {
            scenarios,
            elapsed: self.run_start.elapsed(),
        }
    }
}
