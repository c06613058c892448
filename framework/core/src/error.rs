/// A scenario configuration problem. These are always detected before any traffic is sent and are
/// the only errors that abort a run.
#[derive(derive_more::Error, derive_more::Display, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[display("No scenarios are configured")]
    NoScenarios,
    #[display("Scenario name must not be empty")]
    EmptyName,
    #[display("Scenario [{name}] is defined more than once")]
    DuplicateScenario { name: String },
    #[display("Scenario [{name}] must have a rate above zero")]
    NonPositiveRate { name: String },
    #[display("Scenario [{name}] must have a time unit above zero")]
    NonPositiveTimeUnit { name: String },
    #[display("Scenario [{name}] must have a duration above zero")]
    NonPositiveDuration { name: String },
    #[display("Scenario [{name}] must pre-allocate at least one slot")]
    NoSlots { name: String },
    #[display("Scenario [{name}] must have an iteration timeout above zero")]
    NonPositiveTimeout { name: String },
    #[display("Scenario [{name}] must allow at least one iteration")]
    ZeroIterationLimit { name: String },
    #[display("Scenario [{name}] asks for a rate too high to schedule, the tick interval is below 1ns")]
    RateTooHigh { name: String },
    #[display("Scenario [{name}] refers to unknown iteration function [{exec}]")]
    UnknownExec { name: String, exec: String },
    #[display("Scenario [{name}] is missing required option [{option}]")]
    MissingOption { name: String, option: String },
    #[display("Scenario [{name}] uses executor [{executor}], only constant-arrival-rate is supported")]
    UnsupportedExecutor { name: String, executor: String },
    #[display("Invalid duration [{value}], expected a number followed by ms, s, m or h")]
    InvalidDuration { value: String },
    #[display("Invalid run file: {reason}")]
    InvalidRunFile { reason: String },
}

/// Returned to an iteration body that was still running when the run's grace period ran out.
#[derive(derive_more::Error, derive_more::Display, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[display("Iteration interrupted by run shutdown")]
pub struct IterationInterruptedError;
