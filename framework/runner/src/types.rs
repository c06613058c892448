use crosswind_instruments::CheckResult;

/// Recommended error type for your scenario `main` function and any shared code that you write for
/// iteration functions. Compatible with [IterationResult] so you can use `?` to propagate errors.
pub type CrosswindResult<T> = anyhow::Result<T>;

/// What an iteration function returns: the results of the checks it evaluated, or the error that
/// stopped it.
///
/// An `Err` is recorded as an execution error for that iteration only, the scenario carries on.
pub type IterationResult = anyhow::Result<Vec<CheckResult>>;
