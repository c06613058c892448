use std::sync::Arc;
use std::time::Duration;

use crosswind_runner::prelude::*;
use pretty_assertions::assert_eq;

#[derive(Debug, Default)]
struct Values {
    iterations: u64,
}

impl UserValuesConstraint for Values {}

fn healthy(ctx: &mut IterationContext<Values>) -> BoxFuture<'_, IterationResult> {
    Box::pin(async move {
        ctx.get_mut().iterations += 1;
        Ok(check(&200).that("status is 200", |s| *s == 200).finish())
    })
}

fn slow_200ms(_ctx: &mut IterationContext<Values>) -> BoxFuture<'_, IterationResult> {
    Box::pin(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(vec![])
    })
}

fn slow_2s(_ctx: &mut IterationContext<Values>) -> BoxFuture<'_, IterationResult> {
    Box::pin(async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        Ok(vec![])
    })
}

fn never_finishes(_ctx: &mut IterationContext<Values>) -> BoxFuture<'_, IterationResult> {
    Box::pin(async move {
        std::future::pending::<()>().await;
        Ok(vec![])
    })
}

/// Panics before it has built a future to return.
fn panics_eagerly(ctx: &mut IterationContext<Values>) -> BoxFuture<'_, IterationResult> {
    ctx.get_mut().iterations += 1;
    if ctx.get().iterations > 0 {
        panic!("slot not ready");
    }
    Box::pin(async move { Ok(vec![]) })
}

/// Succeeds, fails a check, errors, panics or hangs depending on the tick.
fn mixed(ctx: &mut IterationContext<Values>) -> BoxFuture<'_, IterationResult> {
    Box::pin(async move {
        match ctx.tick().seq % 5 {
            0 => Ok(check(&200).that("status is 200", |s| *s == 200).finish()),
            1 => Ok(check(&500).that("status is 200", |s| *s == 200).finish()),
            2 => Err(anyhow::anyhow!("connection reset")),
            3 => panic!("bad response body"),
            _ => {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(vec![])
            }
        }
    })
}

fn scenario(name: &str, iteration_fn: IterationFn<Values>) -> ScenarioConfig<Values> {
    ScenarioConfig::new(name, iteration_fn)
        .with_rate(20, Duration::from_secs(1))
        .with_duration(Duration::from_secs(1))
        .with_pre_allocated_slots(10)
}

async fn run_to_completion(
    configs: Vec<ScenarioConfig<Values>>,
) -> (RunReport, MetricsSummary) {
    let aggregator = Arc::new(MetricsAggregator::default());
    let handle = Scheduler::start(configs, aggregator.clone()).unwrap();
    let report = handle.wait().await;
    (report, aggregator.snapshot())
}

#[tokio::test(start_paused = true)]
async fn twenty_per_second_against_healthy_backend() {
    let (report, summary) = run_to_completion(vec![scenario("spring_list", healthy)]).await;

    let scenario_report = report.scenario("spring_list").unwrap();
    assert_eq!(20, scenario_report.ticks_generated);
    assert_eq!(20, scenario_report.iterations_started);
    assert_eq!(0, scenario_report.dropped);

    let metrics = &summary.scenarios["spring_list"];
    assert_eq!(20, metrics.outcomes.success);
    assert_eq!(20, metrics.outcomes.total());
    assert_eq!(Some(1.0), metrics.check_pass_rate());
    assert!(evaluate(&summary, &Thresholds::default()).passed());
}

#[tokio::test(start_paused = true)]
async fn slow_iterations_on_one_slot_are_dropped() {
    let (report, summary) = run_to_completion(vec![
        scenario("spring_one", slow_200ms).with_pre_allocated_slots(1)
    ])
    .await;

    let scenario_report = report.scenario("spring_one").unwrap();
    assert_eq!(20, scenario_report.ticks_generated);
    assert!(
        (4..=6).contains(&scenario_report.iterations_started),
        "started {}",
        scenario_report.iterations_started
    );

    let outcomes = summary.scenarios["spring_one"].outcomes;
    assert_eq!(scenario_report.iterations_started, outcomes.success);
    assert_eq!(20 - scenario_report.iterations_started, outcomes.dropped);
    assert_eq!(scenario_report.dropped, outcomes.dropped);
}

#[tokio::test(start_paused = true)]
async fn outcomes_add_up_to_ticks_whatever_iterations_do() {
    let config = scenario("mixed", mixed)
        .with_rate(50, Duration::from_secs(1))
        .with_duration(Duration::from_secs(2))
        .with_pre_allocated_slots(5)
        .with_iteration_timeout(Duration::from_millis(500));

    let (report, summary) = run_to_completion(vec![config]).await;

    let scenario_report = report.scenario("mixed").unwrap();
    let outcomes = summary.scenarios["mixed"].outcomes;
    assert_eq!(100, scenario_report.ticks_generated);
    assert_eq!(scenario_report.ticks_generated, outcomes.total());
    assert_eq!(scenario_report.iterations_started, outcomes.executed());
    assert!(outcomes.success > 0);
    assert!(outcomes.check_failure > 0);
    assert!(outcomes.execution_error > 0);
    assert!(outcomes.timeout > 0);
    assert!(outcomes.dropped > 0);

    let errors = &summary.scenarios["mixed"].errors;
    assert!(errors.contains_key("connection reset"));
    assert!(errors.contains_key("iteration panicked: bad response body"));
}

#[tokio::test(start_paused = true)]
async fn eager_panics_keep_every_slot_in_the_pool() {
    let (report, summary) = run_to_completion(vec![
        scenario("eager", panics_eagerly).with_pre_allocated_slots(2)
    ])
    .await;

    let scenario_report = report.scenario("eager").unwrap();
    assert_eq!(20, scenario_report.ticks_generated);
    assert_eq!(20, scenario_report.iterations_started);
    assert_eq!(0, scenario_report.dropped);

    let metrics = &summary.scenarios["eager"];
    assert_eq!(20, metrics.outcomes.total());
    assert_eq!(20, metrics.outcomes.execution_error);
    assert_eq!(
        Some(&20),
        metrics.errors.get("iteration panicked: slot not ready")
    );
}

#[tokio::test(start_paused = true)]
async fn cadence_does_not_slow_down_for_slow_iterations() {
    let started = tokio::time::Instant::now();
    let config = scenario("slow", slow_2s)
        .with_rate(10, Duration::from_secs(1))
        .with_duration(Duration::from_secs(3))
        .with_pre_allocated_slots(5);

    let (report, summary) = run_to_completion(vec![config]).await;

    let scenario_report = report.scenario("slow").unwrap();
    assert_eq!(
        expected_ticks(10, Duration::from_secs(1), Duration::from_secs(3), None),
        scenario_report.ticks_generated
    );
    // Five slots busy for two seconds each cannot keep up with ten ticks a second.
    assert!(scenario_report.dropped >= 15, "dropped {}", scenario_report.dropped);
    assert!(summary.scenarios["slow"].max_schedule_lag_ms < 1.0);

    // The last tick fires before 3s and its iteration takes 2s.
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(3), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "{elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn scenarios_run_side_by_side() {
    let (report, summary) = run_to_completion(vec![
        scenario("spring_list", healthy),
        scenario("micro_list", healthy)
            .with_rate(5, Duration::from_secs(1))
            .with_duration(Duration::from_secs(2)),
        scenario("micro_one", healthy).with_start_time(Duration::from_millis(500)),
    ])
    .await;

    assert_eq!(3, report.scenarios.len());
    assert_eq!(20, summary.scenarios["spring_list"].outcomes.success);
    assert_eq!(10, summary.scenarios["micro_list"].outcomes.success);
    assert_eq!(20, summary.scenarios["micro_one"].outcomes.success);
    assert_eq!(50, summary.total.outcomes.success);
}

#[tokio::test(start_paused = true)]
async fn running_flags_follow_each_scenario() {
    let aggregator = Arc::new(MetricsAggregator::default());
    let handle = Scheduler::start(
        vec![
            scenario("short", healthy),
            scenario("long", healthy).with_duration(Duration::from_secs(10)),
        ],
        aggregator,
    )
    .unwrap();

    assert!(handle.is_running("short"));
    assert!(handle.is_running("long"));
    assert!(!handle.is_running("unknown"));

    tokio::time::sleep(Duration::from_secs(3)).await;

    assert!(!handle.is_running("short"));
    assert!(handle.is_running("long"));
    assert!(handle.is_any_running());

    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn stop_ends_the_schedule_early() {
    let aggregator = Arc::new(MetricsAggregator::default());
    let handle = Scheduler::start(
        vec![scenario("long", healthy).with_duration(Duration::from_secs(60))],
        aggregator.clone(),
    )
    .unwrap();

    tokio::time::sleep(Duration::from_millis(1010)).await;
    let report = handle.stop().await;

    let scenario_report = report.scenario("long").unwrap();
    assert!(scenario_report.stopped_early);
    assert!(
        (20..=22).contains(&scenario_report.ticks_generated),
        "ticks {}",
        scenario_report.ticks_generated
    );
    assert!(report.elapsed < Duration::from_secs(2));
    assert_eq!(
        scenario_report.ticks_generated,
        aggregator.snapshot().scenarios["long"].outcomes.total()
    );
}

#[tokio::test(start_paused = true)]
async fn stop_interrupts_iterations_after_the_grace_period() {
    let aggregator = Arc::new(MetricsAggregator::default());
    let handle = Scheduler::start(
        vec![scenario("stuck", never_finishes)
            .with_rate(2, Duration::from_secs(1))
            .with_duration(Duration::from_secs(60))
            .with_graceful_stop(Duration::from_secs(1))
            .with_iteration_timeout(Duration::from_secs(3600))],
        aggregator.clone(),
    )
    .unwrap();

    tokio::time::sleep(Duration::from_millis(1200)).await;
    let stopped_at = tokio::time::Instant::now();
    let report = handle.stop().await;

    let waited = stopped_at.elapsed();
    assert!(waited >= Duration::from_secs(1), "{waited:?}");
    assert!(waited < Duration::from_secs(2), "{waited:?}");

    let scenario_report = report.scenario("stuck").unwrap();
    assert_eq!(3, scenario_report.ticks_generated);
    assert_eq!(3, scenario_report.interrupted);

    let metrics = &aggregator.snapshot().scenarios["stuck"];
    assert_eq!(3, metrics.outcomes.execution_error);
    assert_eq!(
        Some(&3),
        metrics.errors.get("Iteration interrupted by run shutdown")
    );
}

#[tokio::test(start_paused = true)]
async fn invalid_configs_start_nothing() {
    let aggregator = Arc::new(MetricsAggregator::default());

    let result = Scheduler::start(
        vec![
            scenario("ok", healthy),
            scenario("no_rate", healthy).with_rate(0, Duration::from_secs(1)),
        ],
        aggregator.clone(),
    );
    assert_eq!(
        Some(ConfigError::NonPositiveRate {
            name: "no_rate".to_string()
        }),
        result.err()
    );

    let result = Scheduler::start(
        vec![scenario("twice", healthy), scenario("twice", healthy)],
        aggregator.clone(),
    );
    assert!(matches!(result, Err(ConfigError::DuplicateScenario { .. })));

    let result = Scheduler::start(Vec::<ScenarioConfig<Values>>::new(), aggregator.clone());
    assert!(matches!(result, Err(ConfigError::NoScenarios)));

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(aggregator.snapshot().scenarios.is_empty());
}

#[tokio::test(start_paused = true)]
async fn runs_in_the_same_process_do_not_share_metrics() {
    let first = Arc::new(MetricsAggregator::default());
    let second = Arc::new(MetricsAggregator::default());

    let first_run = Scheduler::start(vec![scenario("shared_name", healthy)], first.clone()).unwrap();
    let second_run = Scheduler::start(
        vec![scenario("shared_name", healthy).with_rate(5, Duration::from_secs(1))],
        second.clone(),
    )
    .unwrap();

    first_run.wait().await;
    second_run.wait().await;

    assert_eq!(20, first.snapshot().scenarios["shared_name"].outcomes.total());
    assert_eq!(5, second.snapshot().scenarios["shared_name"].outcomes.total());
}
