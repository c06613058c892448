use crosswind_runner::prelude::IterationContext;

use crate::client::HttpResponse;
use crate::slot::HttpSlot;

/// Send a GET request with the slot's client and record its duration as a request latency of the
/// current iteration.
///
/// ```rust,no_run
/// use crosswind_http::prelude::{http_get, HttpSlot};
/// use crosswind_runner::prelude::{check, BoxFuture, IterationContext, IterationResult};
///
/// fn list_users(ctx: &mut IterationContext<HttpSlot>) -> BoxFuture<'_, IterationResult> {
///     Box::pin(async move {
///         let response = http_get(ctx, "http://localhost:8081/users").await?;
///         Ok(check(&response).that("status is 200", |r| r.status_is(200)).finish())
///     })
/// }
/// ```
///
/// Requests that fail before a response is received are not recorded, the iteration ends with
/// an execution error instead.
pub async fn http_get(
    ctx: &mut IterationContext<HttpSlot>,
    url: &str,
) -> anyhow::Result<HttpResponse> {
    let response = ctx.get_mut().client()?.get(url).await?;
    ctx.record_request_duration(response.elapsed);

    Ok(response)
}
