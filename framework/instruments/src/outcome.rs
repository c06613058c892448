use std::time::Duration;

/// The terminal status of one tick of a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeStatus {
    /// The iteration completed and every check passed.
    Success,
    /// The iteration completed but at least one check failed.
    CheckFailure,
    /// The iteration body returned an error, panicked or was interrupted.
    ExecutionError,
    /// The iteration did not finish within its timeout.
    Timeout,
    /// No slot was free when the tick fired so no iteration was started.
    Dropped,
}

/// The result of evaluating one named check against a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
}

impl CheckResult {
    pub fn new(name: impl Into<String>, passed: bool) -> Self {
        Self {
            name: name.into(),
            passed,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IterationOutcome {
    /// Wall clock time the iteration took. Zero for dropped ticks.
    pub duration: Duration,
    pub status: OutcomeStatus,
    pub checks: Vec<CheckResult>,
    /// Description of the error for [OutcomeStatus::ExecutionError] and [OutcomeStatus::Timeout].
    pub error: Option<String>,
    /// Durations of the individual requests the iteration made to the system under test.
    pub request_durations: Vec<Duration>,
}

impl IterationOutcome {
    /// Outcome of an iteration that ran to completion. The status is [OutcomeStatus::Success]
    /// only if all checks passed, an iteration without checks counts as successful.
    pub fn completed(duration: Duration, checks: Vec<CheckResult>) -> Self {
        let status = if checks.iter().all(|c| c.passed) {
            OutcomeStatus::Success
        } else {
            OutcomeStatus::CheckFailure
        };

        Self {
            duration,
            status,
            checks,
            error: None,
            request_durations: Vec::with_capacity(0),
        }
    }

    pub fn execution_error(duration: Duration, error: impl Into<String>) -> Self {
        Self {
            duration,
            status: OutcomeStatus::ExecutionError,
            checks: Vec::with_capacity(0),
            error: Some(error.into()),
            request_durations: Vec::with_capacity(0),
        }
    }

    pub fn timeout(duration: Duration) -> Self {
        Self {
            duration,
            status: OutcomeStatus::Timeout,
            checks: Vec::with_capacity(0),
            error: Some(format!("iteration timed out after {}ms", duration.as_millis())),
            request_durations: Vec::with_capacity(0),
        }
    }

    pub fn dropped() -> Self {
        Self {
            duration: Duration::ZERO,
            status: OutcomeStatus::Dropped,
            checks: Vec::with_capacity(0),
            error: None,
            request_durations: Vec::with_capacity(0),
        }
    }

    pub fn with_request_durations(mut self, request_durations: Vec<Duration>) -> Self {
        self.request_durations = request_durations;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_checks_must_pass_for_success() {
        let outcome = IterationOutcome::completed(
            Duration::from_millis(3),
            vec![
                CheckResult::new("status is 200", true),
                CheckResult::new("body is not empty", false),
            ],
        );
        assert_eq!(OutcomeStatus::CheckFailure, outcome.status);

        let outcome = IterationOutcome::completed(
            Duration::from_millis(3),
            vec![CheckResult::new("status is 200", true)],
        );
        assert_eq!(OutcomeStatus::Success, outcome.status);
    }

    #[test]
    fn no_checks_is_success() {
        let outcome = IterationOutcome::completed(Duration::from_millis(1), vec![]);
        assert_eq!(OutcomeStatus::Success, outcome.status);
    }
}
