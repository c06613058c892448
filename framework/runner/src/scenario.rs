use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crosswind_core::prelude::{ShutdownHandle, ShutdownListener};
use crosswind_instruments::{IterationOutcome, ScenarioRecorder};
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;

use crate::context::{IterationContext, UserValuesConstraint};
use crate::definition::ScenarioConfig;
use crate::executor::execute_iteration;
use crate::slot_pool::{Slot, SlotPool};
use crate::ticker::Ticker;

/// What one scenario did during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScenarioReport {
    pub name: String,
    pub ticks_generated: u64,
    pub iterations_started: u64,
    pub dropped: u64,
    /// Iterations that were still running when the grace period ran out and had to be interrupted.
    pub interrupted: u64,
    /// Whether the scenario was stopped before its schedule completed.
    pub stopped_early: bool,
}

/// Drive one scenario from its first tick until its schedule ends or `stop` is signalled.
///
/// Tick generation never waits for an iteration. Each tick either gets a slot and a task of its
/// own, or is recorded as dropped straight away. Once ticks stop, running iterations get the
/// scenario's graceful stop period to finish before they are interrupted. Every tick produces
/// exactly one outcome in `recorder`.
pub(crate) async fn run_scenario<S: UserValuesConstraint>(
    config: Arc<ScenarioConfig<S>>,
    run_start: Instant,
    recorder: ScenarioRecorder,
    stop: ShutdownHandle,
    running: Arc<AtomicBool>,
) -> ScenarioReport {
    let name: Arc<str> = Arc::from(config.name.as_str());
    let pool = Arc::new(SlotPool::new(config.pre_allocated_slots, |_| S::default()));
    let interrupt = ShutdownHandle::new();
    let mut stop_listener = stop.new_listener();

    let mut ticker = Ticker::new(
        run_start + config.start_time,
        config.rate,
        config.time_unit,
        config.duration,
        config.max_iterations,
    );

    let mut report = ScenarioReport {
        name: config.name.clone(),
        ..Default::default()
    };
    let mut tasks = JoinSet::new();

    log::info!(
        "Starting scenario [{}]: {} iterations per {:?} for {:?} with {} slots",
        name,
        config.rate,
        config.time_unit,
        config.duration,
        config.pre_allocated_slots
    );

    loop {
        let tick = tokio::select! {
            biased;
            _ = stop_listener.wait_for_shutdown() => {
                report.stopped_early = true;
                break;
            }
            tick = ticker.next_tick() => match tick {
                Some(tick) => tick,
                None => break,
            },
        };
        report.ticks_generated += 1;

        let shard_key = tick.seq as usize;
        let lag = Instant::now().saturating_duration_since(tick.scheduled_at);
        recorder.record_schedule_lag(shard_key, lag);

        let Some(slot) = pool.acquire() else {
            log::trace!("Dropped tick {} of scenario [{}], no free slot", tick.seq, name);
            recorder.record(shard_key, &IterationOutcome::dropped());
            report.dropped += 1;
            continue;
        };
        report.iterations_started += 1;

        let ctx = IterationContext::new(name.clone(), tick, slot, stop.new_listener());
        tasks.spawn(run_iteration(
            config.clone(),
            name.clone(),
            ctx,
            pool.clone(),
            recorder.clone(),
            interrupt.new_listener(),
        ));

        while let Some(result) = tasks.try_join_next() {
            log_task_failure(&name, result);
        }
    }

    let reached_limit = config
        .max_iterations
        .is_some_and(|max| ticker.produced() >= max);
    let grace_from = if report.stopped_early || reached_limit {
        Instant::now()
    } else {
        Instant::now().max(ticker.end())
    };
    let grace_deadline = grace_from + config.graceful_stop;

    let drained = tokio::time::timeout_at(grace_deadline, async {
        while let Some(result) = tasks.join_next().await {
            log_task_failure(&name, result);
        }
    })
    .await;

    if drained.is_err() {
        report.interrupted = tasks.len() as u64;
        log::warn!(
            "Interrupting {} iterations of scenario [{}] still running after the graceful stop period of {:?}",
            tasks.len(),
            name,
            config.graceful_stop
        );
        interrupt.shutdown();
        while let Some(result) = tasks.join_next().await {
            log_task_failure(&name, result);
        }
    }

    running.store(false, Ordering::Release);
    log::info!(
        "Scenario [{}] finished: {} ticks, {} iterations started, {} dropped",
        name,
        report.ticks_generated,
        report.iterations_started,
        report.dropped
    );

    report
}

/// Error recorded for an iteration whose task ended before it produced an outcome.
const ITERATION_TASK_FAILED: &str = "Iteration task failed before recording an outcome";

async fn run_iteration<S: UserValuesConstraint>(
    config: Arc<ScenarioConfig<S>>,
    scenario_name: Arc<str>,
    ctx: IterationContext<S>,
    pool: Arc<SlotPool<S>>,
    recorder: ScenarioRecorder,
    mut interrupt: ShutdownListener,
) {
    let mut guard = IterationGuard::new(scenario_name, ctx.slot_id(), pool, recorder);
    // Declared after the guard so that a lost slot is dropped before the guard replaces it.
    let mut ctx = ctx;

    let outcome = execute_iteration(
        config.iteration_fn,
        &mut ctx,
        config.iteration_timeout,
        &mut interrupt,
    )
    .await;

    guard.record(&outcome);
    guard.release(ctx.into_slot());
}

/// Keeps the accounting of one spawned iteration whole.
///
/// If the task unwinds or is aborted before the outcome is recorded and the slot returned,
/// dropping the guard records an execution error and puts a fresh slot in the pool.
struct IterationGuard<S: UserValuesConstraint> {
    scenario_name: Arc<str>,
    slot_id: usize,
    pool: Arc<SlotPool<S>>,
    recorder: ScenarioRecorder,
    recorded: bool,
    returned: bool,
}

impl<S: UserValuesConstraint> IterationGuard<S> {
    fn new(
        scenario_name: Arc<str>,
        slot_id: usize,
        pool: Arc<SlotPool<S>>,
        recorder: ScenarioRecorder,
    ) -> Self {
        Self {
            scenario_name,
            slot_id,
            pool,
            recorder,
            recorded: false,
            returned: false,
        }
    }

    fn record(&mut self, outcome: &IterationOutcome) {
        self.recorder.record(self.slot_id, outcome);
        self.recorded = true;
    }

    fn release(&mut self, slot: Slot<S>) {
        self.returned = true;
        if let Err(e) = self.pool.release(slot) {
            log::error!(
                "Failed to return slot {} of scenario [{}]: {}",
                self.slot_id,
                self.scenario_name,
                e
            );
        }
    }
}

impl<S: UserValuesConstraint> Drop for IterationGuard<S> {
    fn drop(&mut self) {
        if !self.recorded {
            log::error!(
                "Iteration on slot {} of scenario [{}] ended without an outcome",
                self.slot_id,
                self.scenario_name
            );
            self.recorder.record(
                self.slot_id,
                &IterationOutcome::execution_error(Duration::ZERO, ITERATION_TASK_FAILED),
            );
        }

        if !self.returned {
            if let Err(e) = self.pool.restore(self.slot_id, S::default()) {
                log::error!(
                    "Failed to replace lost slot {} of scenario [{}]: {}",
                    self.slot_id,
                    self.scenario_name,
                    e
                );
            }
        }
    }
}

fn log_task_failure(name: &str, result: Result<(), JoinError>) {
    if let Err(e) = result {
        log::error!("Iteration task of scenario [{}] failed: {:?}", name, e);
    }
}
