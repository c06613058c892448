use std::process::ExitCode;
use std::sync::LazyLock;
use std::time::Duration;

use crosswind_http::prelude::*;
use crosswind_runner::prelude::*;

const SPRING_BASE_URL: &str = "SPRING_BASE_URL";
const MICRO_BASE_URL: &str = "MICRO_BASE_URL";

static SPRING: LazyLock<String> =
    LazyLock::new(|| base_url(SPRING_BASE_URL, "http://localhost:8081"));
static MICRO: LazyLock<String> =
    LazyLock::new(|| base_url(MICRO_BASE_URL, "http://localhost:8082"));

/// Pause at the end of every iteration. Counted in the iteration duration but not in the request
/// latency.
const THINK_TIME: Duration = Duration::from_millis(100);

fn base_url(key: &str, default: &str) -> String {
    std::env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .trim_end_matches('/')
        .to_string()
}

async fn get_list(ctx: &mut IterationContext<HttpSlot>, base: &str) -> IterationResult {
    let response = http_get(ctx, &format!("{base}/users")).await?;
    let checks = check(&response)
        .that("status is 200", |r| r.status_is(200))
        .finish();
    tokio::time::sleep(THINK_TIME).await;
    Ok(checks)
}

async fn get_one(ctx: &mut IterationContext<HttpSlot>, base: &str) -> IterationResult {
    let response = http_get(ctx, &format!("{base}/users/1")).await?;
    let checks = check(&response)
        .that("status is 200 or 404", |r| r.status_in(&[200, 404]))
        .finish();
    tokio::time::sleep(THINK_TIME).await;
    Ok(checks)
}

fn spring_list(ctx: &mut IterationContext<HttpSlot>) -> BoxFuture<'_, IterationResult> {
    Box::pin(get_list(ctx, &SPRING))
}

fn spring_one(ctx: &mut IterationContext<HttpSlot>) -> BoxFuture<'_, IterationResult> {
    Box::pin(get_one(ctx, &SPRING))
}

fn micro_list(ctx: &mut IterationContext<HttpSlot>) -> BoxFuture<'_, IterationResult> {
    Box::pin(get_list(ctx, &MICRO))
}

fn micro_one(ctx: &mut IterationContext<HttpSlot>) -> BoxFuture<'_, IterationResult> {
    Box::pin(get_one(ctx, &MICRO))
}

/// Warn early about a backend that is not up. The run still goes ahead and records the failures.
fn check_health() -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let client = HttpClientInstrumented::new()?;

    runtime.block_on(async {
        for base in [SPRING.as_str(), MICRO.as_str()] {
            let url = format!("{base}/health");
            match tokio::time::timeout(Duration::from_secs(5), client.get(&url)).await {
                Ok(Ok(response)) if response.status_is(200) => {
                    log::info!("Backend {} is healthy", base);
                }
                Ok(Ok(response)) => {
                    log::warn!("Backend {} health check returned {}", base, response.status);
                }
                Ok(Err(e)) => log::warn!("Backend {} is not reachable: {:#}", base, e),
                Err(_) => log::warn!("Backend {} health check timed out", base),
            }
        }
    });

    Ok(())
}

fn main() -> CrosswindResult<ExitCode> {
    let scenario = ScenarioOptions::new()
        .with_rate(20, Duration::from_secs(1))
        .with_duration(Duration::from_secs(30))
        .with_pre_allocated_vus(10);

    let builder = ScenarioDefinitionBuilder::<HttpSlot>::new_with_init(env!("CARGO_PKG_NAME"))
        .use_named_iteration("springList", spring_list)
        .use_named_iteration("springOne", spring_one)
        .use_named_iteration("microList", micro_list)
        .use_named_iteration("microOne", micro_one)
        .with_scenario("spring_list", scenario.clone().with_exec("springList"))
        .with_scenario("spring_one", scenario.clone().with_exec("springOne"))
        .with_scenario("micro_list", scenario.clone().with_exec("microList"))
        .with_scenario("micro_one", scenario.with_exec("microOne"))
        .capture_env(SPRING_BASE_URL)
        .capture_env(MICRO_BASE_URL);

    check_health()?;

    let verdict = run(builder)?;

    Ok(verdict.exit_code())
}
