mod scenario_table;

use crate::report::scenario_table::{CheckRow, ScenarioRow};
use crosswind_summary_model::{MetricsSummary, ScenarioMetrics};
use tabled::settings::Style;
use tabled::Table;

/// Render the outcome and check tables for a summary.
///
/// Scenarios are listed by name with a final `(total)` row. The check table is left out if no
/// check was evaluated during the run.
pub fn render_summary(summary: &MetricsSummary) -> String {
    let mut rows = summary
        .scenarios
        .iter()
        .map(|(name, metrics)| scenario_row(name, metrics))
        .collect::<Vec<_>>();
    rows.push(scenario_row("(total)", &summary.total));

    let mut outcomes = Table::new(rows);
    outcomes.with(Style::modern());

    let check_rows = summary
        .scenarios
        .iter()
        .flat_map(|(name, metrics)| {
            metrics.checks.iter().map(move |(check, result)| CheckRow {
                scenario: name.clone(),
                check: check.clone(),
                passes: result.passes,
                fails: result.fails,
                pass_rate: result.pass_rate(),
            })
        })
        .collect::<Vec<_>>();

    if check_rows.is_empty() {
        return format!("Summary of scenarios\n{outcomes}");
    }

    let mut checks = Table::new(check_rows);
    checks.with(Style::modern());

    format!("Summary of scenarios\n{outcomes}\n\nSummary of checks\n{checks}")
}

/// Print the summary tables to stdout.
pub fn print_summary(summary: &MetricsSummary) {
    println!("\n{}", render_summary(summary));
}

fn scenario_row(name: &str, metrics: &ScenarioMetrics) -> ScenarioRow {
    ScenarioRow {
        scenario: name.to_string(),
        total: metrics.outcomes.total(),
        success: metrics.outcomes.success,
        check_failure: metrics.outcomes.check_failure,
        execution_error: metrics.outcomes.execution_error,
        timeout: metrics.outcomes.timeout,
        dropped: metrics.outcomes.dropped,
        avg_ms: metrics.latency.mean_ms,
        p95_ms: metrics.latency.p95_ms,
        max_ms: metrics.latency.max_ms,
        req_avg_ms: metrics.request_latency.mean_ms,
        req_p95_ms: metrics.request_latency.p95_ms,
        max_lag_ms: metrics.max_schedule_lag_ms,
    }
}
