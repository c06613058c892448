use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use crosswind_core::prelude::{IterationInterruptedError, ShutdownListener};
use crosswind_instruments::IterationOutcome;
use futures::FutureExt;
use tokio::time::Instant;

use crate::context::{IterationContext, UserValuesConstraint};
use crate::definition::IterationFn;

/// Run one iteration to completion and describe how it went.
///
/// Exactly one outcome is produced whatever the iteration does:
/// - Returning checks gives [crosswind_instruments::OutcomeStatus::Success] or
///   [crosswind_instruments::OutcomeStatus::CheckFailure].
/// - Returning an error or panicking gives an execution error. After a panic the slot values are
///   reset to their defaults because the iteration may have left them half updated.
/// - Running past `timeout` drops the iteration future, which cancels any request in flight, and
///   gives a timeout.
/// - A signal on `interrupt` drops the iteration future in the same way and gives an execution
///   error.
pub(crate) async fn execute_iteration<S: UserValuesConstraint>(
    iteration_fn: IterationFn<S>,
    ctx: &mut IterationContext<S>,
    timeout: Duration,
    interrupt: &mut ShutdownListener,
) -> IterationOutcome {
    let started = Instant::now();

    let result = {
        // The iteration function itself is called inside the guard, it may panic before it
        // returns a future.
        let body = AssertUnwindSafe(async { iteration_fn(ctx).await }).catch_unwind();
        tokio::select! {
            biased;
            result = tokio::time::timeout(timeout, body) => Some(result),
            _ = interrupt.wait_for_shutdown() => None,
        }
    };

    let elapsed = started.elapsed();
    let outcome = match result {
        None => IterationOutcome::execution_error(elapsed, IterationInterruptedError.to_string()),
        Some(Err(_)) => IterationOutcome::timeout(timeout),
        Some(Ok(Err(panic))) => {
            let message = panic_message(panic.as_ref());
            log::debug!(
                "Iteration {} of scenario [{}] panicked: {}",
                ctx.tick().seq,
                ctx.scenario_name(),
                message
            );
            ctx.reset_values();
            IterationOutcome::execution_error(elapsed, format!("iteration panicked: {message}"))
        }
        Some(Ok(Ok(Err(e)))) => {
            log::debug!(
                "Iteration {} of scenario [{}] failed: {:?}",
                ctx.tick().seq,
                ctx.scenario_name(),
                e
            );
            IterationOutcome::execution_error(elapsed, format!("{e:#}"))
        }
        Some(Ok(Ok(Ok(checks)))) => IterationOutcome::completed(elapsed, checks),
    };

    outcome.with_request_durations(ctx.take_request_durations())
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
