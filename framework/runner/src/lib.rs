mod checks;
mod cli;
mod context;
mod definition;
mod executor;
mod init;
mod monitor;
mod options;
mod progress;
mod run;
mod scenario;
mod scheduler;
mod shutdown;
mod slot_pool;
mod ticker;
mod types;
mod verdict;

pub mod prelude {
    pub use crate::checks::{check, Checks};
    pub use crate::cli::CrosswindCli;
    pub use crate::context::{IterationContext, UserValuesConstraint};
    pub use crate::definition::{
        validate_scenarios, IterationFn, ScenarioConfig, ScenarioDefinitionBuilder,
    };
    pub use crate::options::{parse_duration, RunFile, ScenarioOptions, CONSTANT_ARRIVAL_RATE};
    pub use crate::run::run;
    pub use crate::scenario::ScenarioReport;
    pub use crate::scheduler::{RunHandle, RunReport, Scheduler};
    pub use crate::slot_pool::{Slot, SlotPool, SlotPoolError};
    pub use crate::ticker::{expected_ticks, Tick, Ticker};
    pub use crate::types::{CrosswindResult, IterationResult};
    pub use crate::verdict::{evaluate, ThresholdViolation, Thresholds, Verdict};

    pub use crosswind_core::prelude::{ConfigError, ShutdownHandle, ShutdownListener};
    pub use crosswind_instruments::{
        CheckResult, IterationOutcome, MetricsAggregator, OutcomeStatus,
    };
    pub use crosswind_summary_model::MetricsSummary;
    pub use futures::future::BoxFuture;
}
