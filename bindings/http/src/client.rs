use std::time::{Duration, Instant};

use anyhow::Context;

/// How long an idle connection is kept in a slot's pool before it is closed.
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// A response that has been read to the end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
    /// Time from sending the request until the whole body was received.
    pub elapsed: Duration,
}

impl HttpResponse {
    pub fn status_is(&self, status: u16) -> bool {
        self.status == status
    }

    pub fn status_in(&self, statuses: &[u16]) -> bool {
        statuses.contains(&self.status)
    }
}

/// Wraps a [reqwest::Client] and logs the timing of every request.
///
/// Each slot should own its own client, so that connections are reused by consecutive iterations
/// of the same slot but never shared between slots.
#[derive(Debug, Clone)]
pub struct HttpClientInstrumented(reqwest::Client);

impl HttpClientInstrumented {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .tcp_nodelay(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self(client))
    }

    /// Send a GET request and read the full response body.
    ///
    /// Any status code is a response, only transport failures such as a refused connection are
    /// errors. Dropping the returned future cancels the request.
    pub async fn get(&self, url: &str) -> anyhow::Result<HttpResponse> {
        let started = Instant::now();

        let response = self
            .0
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read response body of GET {url}"))?;

        let elapsed = started.elapsed();
        log::trace!("GET {} returned {} in {:?}", url, status, elapsed);

        Ok(HttpResponse {
            status,
            body,
            elapsed,
        })
    }
}
