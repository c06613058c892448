mod aggregator;
mod outcome;
mod report;

pub use aggregator::{MetricsAggregator, ScenarioRecorder};
pub use outcome::{CheckResult, IterationOutcome, OutcomeStatus};
pub use report::{print_summary, render_summary};
