use std::process::ExitCode;

use crosswind_summary_model::MetricsSummary;

/// Exit code for a run that completed but did not meet its thresholds.
pub const THRESHOLD_FAILURE_EXIT_CODE: u8 = 99;

/// Limits that every scenario must stay within for a run to pass. A limit set to `None` is not
/// checked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Lowest acceptable fraction of passing checks.
    pub min_check_pass_rate: Option<f64>,
    /// Highest acceptable fraction of outcomes that are execution errors.
    pub max_error_rate: Option<f64>,
    pub max_timeout_rate: Option<f64>,
    pub max_drop_rate: Option<f64>,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_check_pass_rate: Some(0.95),
            max_error_rate: Some(0.05),
            max_timeout_rate: Some(0.05),
            max_drop_rate: Some(0.10),
        }
    }
}

impl Thresholds {
    /// Thresholds that nothing can violate, except a scenario that never executed anything.
    pub fn none() -> Self {
        Self {
            min_check_pass_rate: None,
            max_error_rate: None,
            max_timeout_rate: None,
            max_drop_rate: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, derive_more::Display)]
pub enum ThresholdViolation {
    #[display("[{scenario}] executed no iterations")]
    NothingExecuted { scenario: String },
    #[display("[{scenario}] check pass rate {actual:.4} is below {limit}")]
    CheckPassRate {
        scenario: String,
        actual: f64,
        limit: f64,
    },
    #[display("[{scenario}] error rate {actual:.4} is above {limit}")]
    ErrorRate {
        scenario: String,
        actual: f64,
        limit: f64,
    },
    #[display("[{scenario}] timeout rate {actual:.4} is above {limit}")]
    TimeoutRate {
        scenario: String,
        actual: f64,
        limit: f64,
    },
    #[display("[{scenario}] drop rate {actual:.4} is above {limit}")]
    DropRate {
        scenario: String,
        actual: f64,
        limit: f64,
    },
}

/// The pass or fail decision for a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Verdict {
    pub violations: Vec<ThresholdViolation>,
}

impl Verdict {
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn code(&self) -> u8 {
        if self.passed() {
            0
        } else {
            THRESHOLD_FAILURE_EXIT_CODE
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }

    pub fn descriptions(&self) -> Vec<String> {
        self.violations.iter().map(ToString::to_string).collect()
    }
}

/// Check every scenario in `summary` against `thresholds`.
///
/// A scenario with outcomes where nothing was executed, because every tick was dropped, always
/// fails. Scenarios that recorded no outcomes at all are skipped.
pub fn evaluate(summary: &MetricsSummary, thresholds: &Thresholds) -> Verdict {
    let mut violations = Vec::new();

    for (name, metrics) in &summary.scenarios {
        let outcomes = &metrics.outcomes;
        if outcomes.total() == 0 {
            continue;
        }

        let scenario = || name.clone();

        if outcomes.executed() == 0 {
            violations.push(ThresholdViolation::NothingExecuted {
                scenario: scenario(),
            });
        }

        if let (Some(limit), Some(actual)) =
            (thresholds.min_check_pass_rate, metrics.check_pass_rate())
        {
            if actual < limit {
                violations.push(ThresholdViolation::CheckPassRate {
                    scenario: scenario(),
                    actual,
                    limit,
                });
            }
        }

        if let Some(limit) = thresholds.max_error_rate {
            let actual = outcomes.error_rate();
            if actual > limit {
                violations.push(ThresholdViolation::ErrorRate {
                    scenario: scenario(),
                    actual,
                    limit,
                });
            }
        }

        if let Some(limit) = thresholds.max_timeout_rate {
            let actual = outcomes.timeout_rate();
            if actual > limit {
                violations.push(ThresholdViolation::TimeoutRate {
                    scenario: scenario(),
                    actual,
                    limit,
                });
            }
        }

        if let Some(limit) = thresholds.max_drop_rate {
            let actual = outcomes.drop_rate();
            if actual > limit {
                violations.push(ThresholdViolation::DropRate {
                    scenario: scenario(),
                    actual,
                    limit,
                });
            }
        }
    }

    for violation in &violations {
        log::warn!("Threshold not met: {violation}");
    }

    Verdict { violations }
}
