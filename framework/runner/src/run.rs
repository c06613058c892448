use std::sync::Arc;

use anyhow::Context;
use crosswind_core::prelude::ShutdownHandle;
use crosswind_instruments::{print_summary, MetricsAggregator};
use crosswind_summary_model::{append_run_summary, RunSummary};

use crate::context::UserValuesConstraint;
use crate::definition::ScenarioDefinitionBuilder;
use crate::monitor::start_monitor;
use crate::progress::start_progress;
use crate::scheduler::Scheduler;
use crate::shutdown::start_shutdown_listener;
use crate::verdict::{evaluate, Verdict};

/// Run every scenario of a definition to completion and decide whether the run passed.
///
/// Configuration errors are returned before any traffic is sent. Everything that goes wrong once the
/// run has started is recorded as an outcome instead, so a run against a backend that is down
/// still completes and returns a failing [Verdict].
///
/// Use [Verdict::exit_code] as the exit code of your scenario binary.
pub fn run<S: UserValuesConstraint>(
    definition: ScenarioDefinitionBuilder<S>,
) -> anyhow::Result<Verdict> {
    let definition = definition.build()?;

    log::info!("Running scenario definition: {}", definition.name);

    let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    let aggregator = Arc::new(MetricsAggregator::default());

    let run_id = definition
        .cli
        .run_id
        .clone()
        .unwrap_or_else(|| nanoid::nanoid!());
    let mut summary = RunSummary::new(
        run_id,
        definition.name.clone(),
        chrono::Utc::now().timestamp(),
        definition.settings(),
        env!("CARGO_PKG_VERSION").to_string(),
    );
    for key in &definition.captured_env {
        if let Ok(value) = std::env::var(key) {
            summary.add_env(key.clone(), value);
        }
    }
    log::info!(
        "Run id {}, configuration fingerprint {}",
        summary.run_id,
        summary.fingerprint()
    );

    let planned_runtime = definition.planned_runtime();
    let cli = definition.cli;

    let handle = {
        let _guard = runtime.enter();
        Scheduler::start(definition.scenarios, aggregator.clone())?
    };
    start_shutdown_listener(&runtime, handle.shutdown_handle());

    // The progress bar and monitor outlive the scenarios only until the run report is in.
    let helpers_shutdown = ShutdownHandle::new();
    if !cli.no_progress {
        start_progress(planned_runtime, helpers_shutdown.new_listener())
            .context("Failed to start progress bar")?;
    }
    start_monitor(helpers_shutdown.new_listener()).context("Failed to start resource monitor")?;

    let report = runtime.block_on(handle.wait());
    helpers_shutdown.shutdown();

    for scenario in &report.scenarios {
        log::info!(
            "Scenario [{}]: {} ticks generated, {} iterations started, {} dropped, {} interrupted",
            scenario.name,
            scenario.ticks_generated,
            scenario.iterations_started,
            scenario.dropped,
            scenario.interrupted
        );
    }

    let metrics = aggregator.snapshot();
    let verdict = evaluate(&metrics, &cli.thresholds());

    print_summary(&metrics);
    if verdict.passed() {
        println!("All thresholds met");
    } else {
        println!("Thresholds not met:");
        for violation in &verdict.violations {
            println!("  {violation}");
        }
    }

    summary.set_result(
        u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
        metrics,
        verdict.passed(),
        verdict.descriptions(),
    );

    if cli.summary_json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialize run summary")?
        );
    }

    if let Some(path) = &cli.summary_file {
        append_run_summary(&summary, path.clone())
            .with_context(|| format!("Failed to write run summary to {}", path.display()))?;
    }

    Ok(verdict)
}
